use std::collections::BTreeMap;

use crate::error::{ActionError, ActionResult};
use crate::models::{Rating, RatingId, UserId};

/// Edit state shared by every rating slot of the open title. At most one slot can be
/// edited or pending deletion at any time.
#[derive(Debug, Clone, PartialEq)]
pub enum RatingEdit {
    Idle,
    Editing { user_id: UserId, buffer: f32 },
    ConfirmingDelete { user_id: UserId, rating_id: RatingId },
    Deleting { user_id: UserId, rating_id: RatingId },
}

/// What one member's slot shows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SlotState {
    Viewing,
    Editing(f32),
    /// Confirmed locally, written on the next save.
    Staged(f32),
    ConfirmingDelete,
    Deleting,
}

/// Which part of a rating record the current view reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Scope<'a> {
    pub is_series: bool,
    pub season: Option<&'a str>,
}

#[derive(Debug, Clone)]
pub struct RatingBoard {
    title_id: String,
    ratings: Vec<Rating>,
    staged: BTreeMap<UserId, f32>,
    edit: RatingEdit,
}

/// Check a note is on the 0-10 scale and round it to one decimal.
pub fn normalize_note(value: f32) -> ActionResult<f32> {
    if !value.is_finite() || !(0.0..=10.0).contains(&value) {
        return Err(ActionError::validation("Ratings go from 0 to 10"));
    }
    Ok((value * 10.0).round() / 10.0)
}

impl RatingBoard {
    pub fn new(title_id: impl Into<String>, ratings: Vec<Rating>) -> Self {
        Self {
            title_id: title_id.into(),
            ratings,
            staged: BTreeMap::new(),
            edit: RatingEdit::Idle,
        }
    }

    pub fn ratings(&self) -> &[Rating] {
        &self.ratings
    }

    pub fn edit(&self) -> &RatingEdit {
        &self.edit
    }

    /// Swap in the server's view. Local edits are left alone.
    pub fn replace(&mut self, ratings: Vec<Rating>) {
        self.ratings = ratings
            .into_iter()
            .filter(|r| r.title_id == self.title_id)
            .collect();
    }

    /// Fold one server-confirmed record into the list.
    pub fn merge(&mut self, rating: Rating) {
        if rating.title_id != self.title_id {
            return;
        }
        match self.ratings.iter_mut().find(|r| r.id == rating.id) {
            Some(existing) => *existing = rating,
            None => self.ratings.push(rating),
        }
    }

    pub fn record_for(&self, user_id: UserId) -> Option<&Rating> {
        self.ratings
            .iter()
            .find(|r| r.title_id == self.title_id && r.user_id == user_id)
    }

    pub fn server_note(&self, user_id: UserId, scope: Scope<'_>) -> Option<f32> {
        self.record_for(user_id)
            .and_then(|r| r.visible_note(scope.is_series, scope.season))
    }

    /// Edit buffer first, then a staged value, then the server.
    pub fn displayed_note(&self, user_id: UserId, scope: Scope<'_>) -> Option<f32> {
        match self.edit {
            RatingEdit::Editing { user_id: u, buffer } if u == user_id => return Some(buffer),
            _ => {}
        }
        self.staged
            .get(&user_id)
            .copied()
            .or_else(|| self.server_note(user_id, scope))
    }

    pub fn slot_state(&self, user_id: UserId) -> SlotState {
        match self.edit {
            RatingEdit::Editing { user_id: u, buffer } if u == user_id => SlotState::Editing(buffer),
            RatingEdit::ConfirmingDelete { user_id: u, .. } if u == user_id => {
                SlotState::ConfirmingDelete
            }
            RatingEdit::Deleting { user_id: u, .. } if u == user_id => SlotState::Deleting,
            _ => match self.staged.get(&user_id) {
                Some(v) => SlotState::Staged(*v),
                None => SlotState::Viewing,
            },
        }
    }

    pub fn begin_edit(
        &mut self,
        user_id: UserId,
        current_user: UserId,
        scope: Scope<'_>,
    ) -> ActionResult<()> {
        if user_id != current_user {
            return Err(ActionError::validation("You can only edit your own rating"));
        }
        if scope.is_series && scope.season.is_none() {
            return Err(ActionError::validation("Select a season to rate"));
        }
        match self.edit {
            RatingEdit::Idle => {}
            RatingEdit::Editing { user_id: u, .. } if u == user_id => return Ok(()),
            _ => return Err(ActionError::validation("Finish the current rating first")),
        }
        let seed = self
            .staged
            .get(&user_id)
            .copied()
            .or_else(|| self.server_note(user_id, scope))
            .unwrap_or(0.0);
        self.edit = RatingEdit::Editing {
            user_id,
            buffer: seed,
        };
        Ok(())
    }

    pub fn set_buffer(&mut self, value: f32) -> ActionResult<()> {
        let value = normalize_note(value)?;
        match &mut self.edit {
            RatingEdit::Editing { buffer, .. } => {
                *buffer = value;
                Ok(())
            }
            _ => Err(ActionError::validation("No rating is being edited")),
        }
    }

    pub fn cancel_edit(&mut self) {
        if matches!(self.edit, RatingEdit::Editing { .. }) {
            self.edit = RatingEdit::Idle;
        }
    }

    /// Keep the buffer for the next save and go back to viewing.
    pub fn confirm_edit(&mut self) -> bool {
        if let RatingEdit::Editing { user_id, buffer } = self.edit {
            self.staged.insert(user_id, buffer);
            self.edit = RatingEdit::Idle;
            return true;
        }
        false
    }

    pub fn staged(&self) -> impl Iterator<Item = (UserId, f32)> + '_ {
        self.staged.iter().map(|(u, v)| (*u, *v))
    }

    pub fn has_staged(&self) -> bool {
        !self.staged.is_empty()
    }

    pub fn clear_staged(&mut self) {
        self.staged.clear();
    }

    /// Drop every local buffer, as when the season changes.
    pub fn reset_edits(&mut self) {
        self.edit = RatingEdit::Idle;
        self.staged.clear();
    }

    /// Ask for delete confirmation. The record id is resolved from the loaded list.
    pub fn request_delete(
        &mut self,
        user_id: UserId,
        current_user: UserId,
        scope: Scope<'_>,
    ) -> ActionResult<RatingId> {
        if user_id != current_user {
            return Err(ActionError::validation("You can only delete your own rating"));
        }
        if self.edit != RatingEdit::Idle {
            return Err(ActionError::validation("Finish the current rating first"));
        }
        let record = self.record_for(user_id).ok_or_else(|| {
            ActionError::NotFound(format!(
                "No rating found for user {user_id} on {}",
                self.title_id
            ))
        })?;
        if let (true, Some(season)) = (scope.is_series, scope.season) {
            if !record.seasons.contains_key(season) {
                return Err(ActionError::NotFound(format!(
                    "No rating for season {season}"
                )));
            }
        }
        let rating_id = record.id;
        self.edit = RatingEdit::ConfirmingDelete { user_id, rating_id };
        Ok(rating_id)
    }

    pub fn cancel_delete(&mut self) {
        if matches!(self.edit, RatingEdit::ConfirmingDelete { .. }) {
            self.edit = RatingEdit::Idle;
        }
    }

    /// Move a confirmed delete into flight.
    pub(crate) fn start_delete(&mut self) -> Option<RatingId> {
        if let RatingEdit::ConfirmingDelete { user_id, rating_id } = self.edit {
            self.edit = RatingEdit::Deleting { user_id, rating_id };
            return Some(rating_id);
        }
        None
    }

    pub(crate) fn finish_delete(&mut self) {
        if matches!(self.edit, RatingEdit::Deleting { .. }) {
            self.edit = RatingEdit::Idle;
        }
    }
}
