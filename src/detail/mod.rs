//! Per-title detail view: member ratings, the comment thread and the watched editor.
//!
//! Everything here is scoped to the open title and, for series, to the selected
//! season. Edits stay local until confirmed; ratings and watched status are written
//! by [`TitleDetail::save`], comments and deletions go out immediately.
use chrono::{Local, NaiveDate};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info, warn};

mod comments;
mod ratings;
mod watched;

pub use comments::{validate_text, CommentEdit, CommentThread, CommentView};
pub use ratings::{normalize_note, RatingBoard, RatingEdit, Scope, SlotState};
pub use watched::WatchedEditor;

use crate::backend::{Gateway, RatingInput, WatchedUpdate};
use crate::collection::ListRefresh;
use crate::error::{ActionError, ActionResult};
use crate::models::{CommentId, GroupId, Title, User, UserId, WatchedState};
use crate::notify::Notifier;
use crate::session::Session;

/// One member's line in the ratings panel.
#[derive(Debug, Clone, PartialEq)]
pub struct RatingRow<'a> {
    pub user: &'a User,
    pub note: Option<f32>,
    pub state: SlotState,
    pub editable: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SaveOutcome {
    pub ratings_saved: usize,
    pub watched_updated: bool,
}

pub struct TitleDetail {
    gateway: Arc<dyn Gateway>,
    session: Arc<Session>,
    notifier: Arc<dyn Notifier>,
    title: Title,
    season: Option<String>,
    members: Vec<User>,
    ratings: RatingBoard,
    comments: CommentThread,
    watched: WatchedEditor,
}

impl std::fmt::Debug for TitleDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TitleDetail")
            .field("title", &self.title)
            .field("season", &self.season)
            .field("members", &self.members)
            .field("ratings", &self.ratings)
            .field("comments", &self.comments)
            .field("watched", &self.watched)
            .finish_non_exhaustive()
    }
}

fn degrade<T>(what: &str, result: anyhow::Result<Vec<T>>, notifier: &dyn Notifier) -> Vec<T> {
    match result {
        Ok(v) => v,
        Err(e) => {
            let action = ActionError::from_gateway(&e, what);
            if matches!(action, ActionError::LoginRequired) {
                action.report(notifier);
            }
            warn!("{}", action);
            Vec::new()
        }
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

impl TitleDetail {
    /// Open the view. Members, ratings and comments load together; any that fail come
    /// back empty instead of blocking the view.
    pub async fn open(
        gateway: Arc<dyn Gateway>,
        session: Arc<Session>,
        notifier: Arc<dyn Notifier>,
        title: Title,
    ) -> ActionResult<Self> {
        let group_id = match active_group(&session) {
            Ok(g) => g,
            Err(e) => {
                e.report(notifier.as_ref());
                return Err(e);
            }
        };
        if title.transient {
            let e = ActionError::validation("This title is not in the collection yet");
            e.report(notifier.as_ref());
            return Err(e);
        }
        debug!(title_id = %title.id, group_id, "Opening title detail");

        let (members, ratings, comments) = tokio::join!(
            gateway.fetch_users(group_id),
            gateway.fetch_ratings(&title.id),
            gateway.fetch_comments(group_id, &title.id),
        );
        let members = degrade("Could not load group members", members, notifier.as_ref());
        let ratings = degrade("Could not load ratings", ratings, notifier.as_ref());
        let comments = degrade("Could not load comments", comments, notifier.as_ref());

        let watched = WatchedEditor::new(title.watched_baseline(None));
        Ok(Self {
            ratings: RatingBoard::new(title.id.clone(), ratings),
            comments: CommentThread::new(comments),
            gateway,
            session,
            notifier,
            title,
            season: None,
            members,
            watched,
        })
    }

    /// Close the view. Unsaved buffers are dropped with it.
    pub fn close(self) {
        if self.ratings.has_staged() || self.watched.is_dirty() {
            debug!(title_id = %self.title.id, "Discarding unsaved edits");
        }
    }

    pub fn title(&self) -> &Title {
        &self.title
    }

    pub fn season(&self) -> Option<&str> {
        self.season.as_deref()
    }

    pub fn members(&self) -> &[User] {
        &self.members
    }

    pub fn ratings(&self) -> &RatingBoard {
        &self.ratings
    }

    pub fn comments(&self) -> &CommentThread {
        &self.comments
    }

    pub fn watched(&self) -> &WatchedEditor {
        &self.watched
    }

    pub fn scope(&self) -> Scope<'_> {
        Scope {
            is_series: self.title.is_series(),
            season: self.season.as_deref(),
        }
    }

    fn fail<T>(&self, err: ActionError) -> ActionResult<T> {
        err.report(self.notifier.as_ref());
        Err(err)
    }

    fn current_user(&self) -> ActionResult<UserId> {
        self.session.user_id().ok_or(ActionError::LoginRequired)
    }

    /// Switch season. Every edit buffer goes and the watched baseline is recomputed.
    pub fn select_season(&mut self, season: Option<&str>) -> ActionResult<()> {
        if let Some(label) = season {
            if !self.title.is_series() {
                return self.fail(ActionError::validation("Movies have no seasons"));
            }
            if !self.title.has_season(label) {
                return self.fail(ActionError::NotFound(format!("No season {label}")));
            }
        }
        if self.season.as_deref() == season {
            return Ok(());
        }
        self.season = season.map(str::to_string);
        self.ratings.reset_edits();
        self.comments.reset_edits();
        self.watched
            .reset(self.title.watched_baseline(self.season.as_deref()));
        debug!(title_id = %self.title.id, season = ?self.season, "Season selected");
        Ok(())
    }

    /// Members with their visible note, current user first.
    pub fn rating_rows(&self) -> Vec<RatingRow<'_>> {
        let me = self.session.user_id();
        let scope = self.scope();
        let mut rows: Vec<RatingRow<'_>> = self
            .members
            .iter()
            .map(|user| RatingRow {
                user,
                note: self.ratings.displayed_note(user.id, scope),
                state: self.ratings.slot_state(user.id),
                editable: Some(user.id) == me,
            })
            .collect();
        rows.sort_by_key(|r| !r.editable);
        rows
    }

    pub fn begin_rating_edit(&mut self, user_id: UserId) -> ActionResult<()> {
        let result = self.current_user().and_then(|me| {
            let scope = Scope {
                is_series: self.title.is_series(),
                season: self.season.as_deref(),
            };
            self.ratings.begin_edit(user_id, me, scope)
        });
        result.or_else(|e| self.fail(e))
    }

    pub fn set_rating_buffer(&mut self, value: f32) -> ActionResult<()> {
        let result = self.ratings.set_buffer(value);
        result.or_else(|e| self.fail(e))
    }

    pub fn confirm_rating_edit(&mut self) -> bool {
        self.ratings.confirm_edit()
    }

    pub fn cancel_rating_edit(&mut self) {
        self.ratings.cancel_edit();
    }

    pub fn request_rating_delete(&mut self, user_id: UserId) -> ActionResult<()> {
        let result = self.current_user().and_then(|me| {
            let scope = Scope {
                is_series: self.title.is_series(),
                season: self.season.as_deref(),
            };
            self.ratings.request_delete(user_id, me, scope).map(|_| ())
        });
        result.or_else(|e| self.fail(e))
    }

    pub fn cancel_rating_delete(&mut self) {
        self.ratings.cancel_delete();
    }

    /// Run a confirmed rating delete: the selected season only for series, else the record.
    pub async fn confirm_rating_delete(&mut self) -> ActionResult<()> {
        let Some(rating_id) = self.ratings.start_delete() else {
            return self.fail(ActionError::validation("Nothing to delete"));
        };
        let season = self.season.clone().filter(|_| self.title.is_series());
        let result = match season.as_deref() {
            Some(s) => self.gateway.delete_rating_season(rating_id, s).await,
            None => self.gateway.delete_rating(rating_id).await,
        };
        self.ratings.finish_delete();
        if let Err(e) = result {
            return self.fail(ActionError::from_gateway(&e, "Could not delete rating"));
        }
        info!(rating_id, season = ?season, "Rating deleted");
        self.reload_ratings().await;
        self.notifier.success("Rating deleted");
        Ok(())
    }

    async fn reload_ratings(&mut self) {
        match self.gateway.fetch_ratings(&self.title.id).await {
            Ok(list) => self.ratings.replace(list),
            Err(e) => warn!(title_id = %self.title.id, "Could not reload ratings: {}", e),
        }
    }

    async fn reload_comments(&mut self, group_id: GroupId) {
        match self.gateway.fetch_comments(group_id, &self.title.id).await {
            Ok(list) => self.comments.replace(list),
            Err(e) => warn!(title_id = %self.title.id, "Could not reload comments: {}", e),
        }
    }

    pub fn visible_comments(&self) -> Vec<CommentView<'_>> {
        self.comments.visible(self.scope())
    }

    pub fn set_comment_draft(&mut self, text: impl Into<String>) {
        self.comments.set_draft(text);
    }

    /// Post the draft. The thread is refetched afterwards, never patched locally.
    pub async fn add_comment(&mut self) -> ActionResult<()> {
        let prepared = active_group(&self.session).and_then(|group_id| {
            if self.title.is_series() && self.season.is_none() {
                return Err(ActionError::validation("Select a season before commenting"));
            }
            let text = validate_text(self.comments.draft())?.to_string();
            Ok((group_id, text))
        });
        let (group_id, text) = match prepared {
            Ok(p) => p,
            Err(e) => return self.fail(e),
        };
        let season = self.season.clone().filter(|_| self.title.is_series());
        if let Err(e) = self
            .gateway
            .create_comment(group_id, &self.title.id, &text, season.as_deref())
            .await
        {
            return self.fail(ActionError::from_gateway(&e, "Could not post comment"));
        }
        info!(title_id = %self.title.id, season = ?season, "Comment added");
        self.comments.clear_draft();
        self.reload_comments(group_id).await;
        Ok(())
    }

    pub fn begin_comment_edit(&mut self, comment_id: CommentId) -> ActionResult<()> {
        let result = self.current_user().and_then(|me| {
            let scope = Scope {
                is_series: self.title.is_series(),
                season: self.season.as_deref(),
            };
            self.comments.begin_edit(comment_id, me, scope)
        });
        result.or_else(|e| self.fail(e))
    }

    pub fn set_comment_buffer(&mut self, text: impl Into<String>) -> ActionResult<()> {
        let result = self.comments.set_edit_buffer(text);
        result.or_else(|e| self.fail(e))
    }

    pub fn cancel_comment_edit(&mut self) {
        self.comments.cancel_edit();
    }

    pub async fn submit_comment_edit(&mut self) -> ActionResult<()> {
        let prepared = active_group(&self.session)
            .and_then(|g| self.comments.pending_edit().map(|(id, text)| (g, id, text)));
        let (group_id, comment_id, text) = match prepared {
            Ok(p) => p,
            Err(e) => return self.fail(e),
        };
        let season = self.season.clone().filter(|_| self.title.is_series());
        if let Err(e) = self
            .gateway
            .update_comment(group_id, &self.title.id, comment_id, &text, season.as_deref())
            .await
        {
            return self.fail(ActionError::from_gateway(&e, "Could not update comment"));
        }
        info!(comment_id, "Comment updated");
        self.comments.finish_edit();
        self.reload_comments(group_id).await;
        Ok(())
    }

    pub fn request_comment_delete(&mut self, comment_id: CommentId) -> ActionResult<()> {
        let result = self.current_user().and_then(|me| {
            let scope = Scope {
                is_series: self.title.is_series(),
                season: self.season.as_deref(),
            };
            self.comments.request_delete(comment_id, me, scope)
        });
        result.or_else(|e| self.fail(e))
    }

    pub fn cancel_comment_delete(&mut self) {
        self.comments.cancel_delete();
    }

    /// Run a confirmed comment delete: only the season's text for series, else the record.
    pub async fn confirm_comment_delete(&mut self) -> ActionResult<()> {
        let group_id = match active_group(&self.session) {
            Ok(g) => g,
            Err(e) => return self.fail(e),
        };
        let Some(comment_id) = self.comments.start_delete() else {
            return self.fail(ActionError::validation("Nothing to delete"));
        };
        let season = self.season.clone().filter(|_| self.title.is_series());
        let result = match season.as_deref() {
            Some(s) => {
                self.gateway
                    .delete_comment_season(group_id, &self.title.id, comment_id, s)
                    .await
            }
            None => {
                self.gateway
                    .delete_comment(group_id, &self.title.id, comment_id)
                    .await
            }
        };
        self.comments.finish_delete();
        if let Err(e) = result {
            return self.fail(ActionError::from_gateway(&e, "Could not delete comment"));
        }
        info!(comment_id, season = ?season, "Comment deleted");
        self.reload_comments(group_id).await;
        Ok(())
    }

    fn watched_scope_ok(&self) -> ActionResult<()> {
        if self.title.is_series() && self.season.is_none() {
            return Err(ActionError::validation("Select a season to track it"));
        }
        Ok(())
    }

    pub fn set_watched(&mut self, watched: bool) -> ActionResult<()> {
        if let Err(e) = self.watched_scope_ok() {
            return self.fail(e);
        }
        self.watched.set_watched(watched, today());
        Ok(())
    }

    pub fn toggle_watched(&mut self) -> ActionResult<()> {
        let next = !self.watched.working().watched;
        self.set_watched(next)
    }

    pub fn begin_watched_date_edit(&mut self) -> ActionResult<()> {
        if let Err(e) = self.watched_scope_ok() {
            return self.fail(e);
        }
        self.watched.begin_date_edit();
        Ok(())
    }

    pub fn set_watched_temp_date(&mut self, date: Option<NaiveDate>) -> ActionResult<()> {
        if !self.watched.set_temp_date(date) {
            return self.fail(ActionError::validation("No date is being edited"));
        }
        Ok(())
    }

    pub fn confirm_watched_date_edit(&mut self) {
        self.watched.confirm_date_edit();
    }

    pub fn cancel_watched_date_edit(&mut self) {
        self.watched.cancel_date_edit();
    }

    /// Write confirmed rating edits and the watched diff, then reconcile with the server.
    ///
    /// An open rating edit counts as confirmed. With nothing to write, no call is made.
    pub async fn save(&mut self, list: &mut dyn ListRefresh) -> ActionResult<SaveOutcome> {
        self.ratings.confirm_edit();
        let staged: Vec<(UserId, f32)> = self.ratings.staged().collect();
        let watched_change = self.watched.pending();
        if staged.is_empty() && watched_change.is_none() {
            debug!(title_id = %self.title.id, "Nothing to save");
            return Ok(SaveOutcome::default());
        }
        let group_id = match active_group(&self.session) {
            Ok(g) => g,
            Err(e) => return self.fail(e),
        };

        let mut outcome = SaveOutcome::default();
        if !staged.is_empty() {
            outcome.ratings_saved = self.save_ratings(group_id, &staged).await?;
        }
        if let Some(state) = watched_change {
            self.save_watched(group_id, state).await?;
            outcome.watched_updated = true;
            if list.refresh_list().await.is_err() {
                warn!("Watched status saved but the list could not be refreshed");
            }
        }
        self.notifier.success("Saved");
        Ok(outcome)
    }

    async fn save_ratings(&mut self, group_id: GroupId, staged: &[(UserId, f32)]) -> ActionResult<usize> {
        let season = self.season.clone().filter(|_| self.title.is_series());
        let inputs: Vec<RatingInput> = staged
            .iter()
            .map(|(user_id, note)| RatingInput {
                group_id,
                title_id: self.title.id.clone(),
                user_id: *user_id,
                note: *note,
                season: season.clone(),
            })
            .collect();
        let gateway = self.gateway.clone();
        let results = join_all(inputs.iter().map(|input| gateway.save_or_update_rating(input))).await;

        let mut saved = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(rating) => saved.push(rating),
                Err(e) => {
                    return self.fail(ActionError::from_gateway(&e, "Could not save rating"));
                }
            }
        }
        let count = saved.len();
        for rating in saved {
            self.ratings.merge(rating);
        }
        self.ratings.clear_staged();

        match self
            .gateway
            .fetch_ratings_batch(std::slice::from_ref(&self.title.id))
            .await
        {
            Ok(list) => self.ratings.replace(list),
            Err(e) => warn!(title_id = %self.title.id, "Could not refetch ratings: {}", e),
        }
        info!(title_id = %self.title.id, count, season = ?season, "Ratings saved");
        Ok(count)
    }

    async fn save_watched(&mut self, group_id: GroupId, state: WatchedState) -> ActionResult<()> {
        let season = self.season.clone().filter(|_| self.title.is_series());
        let update = WatchedUpdate {
            watched: state.watched,
            watched_at: state.watched_at,
            season: season.clone(),
        };
        if let Err(e) = self
            .gateway
            .update_watched_status(group_id, &self.title.id, &update)
            .await
        {
            return self.fail(ActionError::from_gateway(&e, "Could not update watched status"));
        }
        match season {
            Some(label) => {
                self.title.watched_seasons.insert(label, state);
            }
            None => self.title.watched = state,
        }
        self.watched.commit();
        info!(title_id = %self.title.id, watched = state.watched, "Watched status saved");
        Ok(())
    }
}

fn active_group(session: &Session) -> ActionResult<GroupId> {
    if !session.is_authenticated() {
        return Err(ActionError::LoginRequired);
    }
    session.group_id().ok_or(ActionError::NoActiveGroup)
}
