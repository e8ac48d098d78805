use chrono::{DateTime, Utc};

use super::ratings::Scope;
use crate::error::{ActionError, ActionResult};
use crate::models::{Comment, CommentId, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentEdit {
    Idle,
    Editing { comment_id: CommentId, buffer: String },
    ConfirmingDelete { comment_id: CommentId },
    Deleting { comment_id: CommentId },
}

/// One entry of the thread as the current scope shows it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentView<'a> {
    pub id: CommentId,
    pub user_id: UserId,
    /// Set for series entries shown without a selected season.
    pub season: Option<&'a str>,
    pub text: &'a str,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl CommentView<'_> {
    pub fn is_edited(&self) -> bool {
        self.updated_at.is_some() && self.updated_at != self.created_at
    }
}

#[derive(Debug, Clone)]
pub struct CommentThread {
    comments: Vec<Comment>,
    draft: String,
    edit: CommentEdit,
}

/// Trimmed text, or a validation error when nothing is left.
pub fn validate_text(text: &str) -> ActionResult<&str> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(ActionError::validation("Comment cannot be empty"));
    }
    Ok(trimmed)
}

impl CommentThread {
    pub fn new(comments: Vec<Comment>) -> Self {
        Self {
            comments,
            draft: String::new(),
            edit: CommentEdit::Idle,
        }
    }

    pub fn replace(&mut self, comments: Vec<Comment>) {
        self.comments = comments;
    }

    pub fn all(&self) -> &[Comment] {
        &self.comments
    }

    pub fn edit(&self) -> &CommentEdit {
        &self.edit
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    pub fn clear_draft(&mut self) {
        self.draft.clear();
    }

    /// Comments for the scope, oldest first.
    pub fn visible(&self, scope: Scope<'_>) -> Vec<CommentView<'_>> {
        let mut out: Vec<CommentView<'_>> = Vec::new();
        for c in &self.comments {
            if !scope.is_series {
                if let Some(text) = c.text.as_deref().filter(|t| !t.trim().is_empty()) {
                    out.push(CommentView {
                        id: c.id,
                        user_id: c.user_id,
                        season: None,
                        text,
                        created_at: c.created_at,
                        updated_at: c.updated_at,
                    });
                }
                continue;
            }
            for (label, sc) in &c.seasons {
                if scope.season.is_some_and(|s| s != label.as_str()) {
                    continue;
                }
                out.push(CommentView {
                    id: c.id,
                    user_id: c.user_id,
                    season: scope.season.is_none().then_some(label.as_str()),
                    text: &sc.text,
                    created_at: sc.created_at,
                    updated_at: sc.updated_at,
                });
            }
        }
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        out
    }

    fn text_in_scope(&self, comment: &Comment, scope: Scope<'_>) -> Option<String> {
        if scope.is_series {
            scope
                .season
                .and_then(|s| comment.seasons.get(s))
                .map(|sc| sc.text.clone())
        } else {
            comment.text.clone()
        }
    }

    fn own_comment(
        &self,
        comment_id: CommentId,
        current_user: UserId,
        scope: Scope<'_>,
    ) -> ActionResult<&Comment> {
        if scope.is_series && scope.season.is_none() {
            return Err(ActionError::validation("Select a season first"));
        }
        let comment = self
            .comments
            .iter()
            .find(|c| c.id == comment_id)
            .ok_or_else(|| ActionError::NotFound(format!("Comment {comment_id} not found")))?;
        if comment.user_id != current_user {
            return Err(ActionError::validation("You can only change your own comments"));
        }
        if self.text_in_scope(comment, scope).is_none() {
            return Err(ActionError::NotFound(format!(
                "Comment {comment_id} has no text here"
            )));
        }
        Ok(comment)
    }

    pub fn begin_edit(
        &mut self,
        comment_id: CommentId,
        current_user: UserId,
        scope: Scope<'_>,
    ) -> ActionResult<()> {
        match &self.edit {
            CommentEdit::Idle => {}
            CommentEdit::Editing { comment_id: id, .. } if *id == comment_id => return Ok(()),
            _ => return Err(ActionError::validation("Finish the current comment first")),
        }
        let comment = self.own_comment(comment_id, current_user, scope)?;
        let buffer = self.text_in_scope(comment, scope).unwrap_or_default();
        self.edit = CommentEdit::Editing { comment_id, buffer };
        Ok(())
    }

    pub fn set_edit_buffer(&mut self, text: impl Into<String>) -> ActionResult<()> {
        match &mut self.edit {
            CommentEdit::Editing { buffer, .. } => {
                *buffer = text.into();
                Ok(())
            }
            _ => Err(ActionError::validation("No comment is being edited")),
        }
    }

    pub fn cancel_edit(&mut self) {
        if matches!(self.edit, CommentEdit::Editing { .. }) {
            self.edit = CommentEdit::Idle;
        }
    }

    /// The comment id and validated text of the open edit.
    pub(crate) fn pending_edit(&self) -> ActionResult<(CommentId, String)> {
        match &self.edit {
            CommentEdit::Editing { comment_id, buffer } => {
                Ok((*comment_id, validate_text(buffer)?.to_string()))
            }
            _ => Err(ActionError::validation("No comment is being edited")),
        }
    }

    pub(crate) fn finish_edit(&mut self) {
        self.edit = CommentEdit::Idle;
    }

    pub fn request_delete(
        &mut self,
        comment_id: CommentId,
        current_user: UserId,
        scope: Scope<'_>,
    ) -> ActionResult<()> {
        if self.edit != CommentEdit::Idle {
            return Err(ActionError::validation("Finish the current comment first"));
        }
        self.own_comment(comment_id, current_user, scope)?;
        self.edit = CommentEdit::ConfirmingDelete { comment_id };
        Ok(())
    }

    pub fn cancel_delete(&mut self) {
        if matches!(self.edit, CommentEdit::ConfirmingDelete { .. }) {
            self.edit = CommentEdit::Idle;
        }
    }

    pub(crate) fn start_delete(&mut self) -> Option<CommentId> {
        if let CommentEdit::ConfirmingDelete { comment_id } = self.edit {
            self.edit = CommentEdit::Deleting { comment_id };
            return Some(comment_id);
        }
        None
    }

    pub(crate) fn finish_delete(&mut self) {
        if matches!(self.edit, CommentEdit::Deleting { .. }) {
            self.edit = CommentEdit::Idle;
        }
    }

    /// Drop the draft and any open edit, as when the season changes.
    pub fn reset_edits(&mut self) {
        self.edit = CommentEdit::Idle;
        self.draft.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SeasonComment;
    use chrono::TimeZone;
    use std::collections::BTreeMap;

    fn at(h: u32) -> Option<DateTime<Utc>> {
        Utc.with_ymd_and_hms(2024, 1, 1, h, 0, 0).single()
    }

    fn season_comment(id: CommentId, user_id: UserId, entries: &[(&str, &str, u32)]) -> Comment {
        Comment {
            id,
            title_id: "tt2".to_string(),
            user_id,
            text: None,
            seasons: entries
                .iter()
                .map(|(label, text, h)| {
                    (
                        label.to_string(),
                        SeasonComment {
                            text: text.to_string(),
                            created_at: at(*h),
                            updated_at: at(*h),
                        },
                    )
                })
                .collect::<BTreeMap<_, _>>(),
            created_at: at(0),
            updated_at: at(0),
        }
    }

    fn series(season: Option<&str>) -> Scope<'_> {
        Scope {
            is_series: true,
            season,
        }
    }

    #[test]
    fn empty_or_blank_text_is_rejected() {
        assert!(validate_text("").is_err());
        assert!(validate_text(" \n\t ").is_err());
        assert_eq!(validate_text("  nice  ").expect("valid"), "nice");
    }

    #[test]
    fn season_filter_and_order() {
        let thread = CommentThread::new(vec![
            season_comment(1, 1, &[("1", "pilot was slow", 5), ("2", "great finale", 9)]),
            season_comment(2, 2, &[("2", "agreed", 7)]),
        ]);
        let s2: Vec<_> = thread.visible(series(Some("2"))).iter().map(|v| v.text).collect();
        assert_eq!(s2, vec!["agreed", "great finale"]);
        let s1: Vec<_> = thread.visible(series(Some("1"))).iter().map(|v| v.text).collect();
        assert_eq!(s1, vec!["pilot was slow"]);

        let all = thread.visible(series(None));
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].season, Some("1"));
    }

    #[test]
    fn edited_flag_compares_timestamps() {
        let mut c = season_comment(1, 1, &[("1", "x", 3)]);
        if let Some(sc) = c.seasons.get_mut("1") {
            sc.updated_at = at(4);
        }
        let thread = CommentThread::new(vec![c]);
        let views = thread.visible(series(Some("1")));
        assert!(views[0].is_edited());
    }

    #[test]
    fn edits_are_limited_to_own_comments_in_scope() {
        let mut thread = CommentThread::new(vec![season_comment(1, 1, &[("1", "mine", 1)])]);
        assert!(thread.begin_edit(1, 2, series(Some("1"))).is_err());
        assert!(matches!(
            thread.begin_edit(1, 1, series(Some("3"))),
            Err(ActionError::NotFound(_))
        ));
        assert!(thread.begin_edit(1, 1, series(None)).is_err());
        thread.begin_edit(1, 1, series(Some("1"))).expect("edit");
        assert_eq!(
            thread.edit(),
            &CommentEdit::Editing {
                comment_id: 1,
                buffer: "mine".to_string()
            }
        );
        thread.set_edit_buffer("   ").expect("buffer");
        assert!(thread.pending_edit().is_err());
    }

    #[test]
    fn delete_needs_confirmation_state() {
        let mut thread = CommentThread::new(vec![season_comment(1, 1, &[("1", "mine", 1)])]);
        assert_eq!(thread.start_delete(), None);
        thread.request_delete(1, 1, series(Some("1"))).expect("request");
        thread.cancel_delete();
        assert_eq!(thread.edit(), &CommentEdit::Idle);
        thread.request_delete(1, 1, series(Some("1"))).expect("request");
        assert_eq!(thread.start_delete(), Some(1));
        thread.finish_delete();
        assert_eq!(thread.edit(), &CommentEdit::Idle);
    }
}
