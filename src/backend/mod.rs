use anyhow::Result;
use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::StatusCode;
use tracing::debug;

use crate::models::{
    Comment, CommentId, Group, GroupId, LoginGrant, MoviePage, Rating, RatingId, Title, TitleId,
    TitleType, User, UserId,
};

mod client;
mod wire;

pub use client::HttpGateway;

/// Non-2xx answer from the backend.
#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct BackendError {
    pub status: StatusCode,
    pub message: String,
}

impl BackendError {
    pub fn is_unauthorized(&self) -> bool {
        self.status == StatusCode::UNAUTHORIZED || self.status == StatusCode::FORBIDDEN
    }

    pub fn is_not_found(&self) -> bool {
        self.status == StatusCode::NOT_FOUND
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum OrderBy {
    #[serde(rename = "title")]
    Title,
    #[serde(rename = "imdbRating")]
    ExternalRating,
    #[serde(rename = "year")]
    Year,
    #[serde(rename = "runtime")]
    Runtime,
    #[serde(rename = "addedAt")]
    AddedAt,
    #[serde(rename = "watchedAt")]
    WatchedAt,
}

impl OrderBy {
    pub const ALL: [OrderBy; 6] = [
        OrderBy::Title,
        OrderBy::ExternalRating,
        OrderBy::Year,
        OrderBy::Runtime,
        OrderBy::AddedAt,
        OrderBy::WatchedAt,
    ];

    pub fn as_param(self) -> &'static str {
        match self {
            OrderBy::Title => "title",
            OrderBy::ExternalRating => "imdbRating",
            OrderBy::Year => "year",
            OrderBy::Runtime => "runtime",
            OrderBy::AddedAt => "addedAt",
            OrderBy::WatchedAt => "watchedAt",
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|o| o.as_param().eq_ignore_ascii_case(input.trim()))
    }
}

/// Query parameters for one page of the group's titles.
#[derive(Debug, Clone, PartialEq)]
pub struct MovieQuery {
    pub page: u32,
    pub size: u32,
    pub watched: Option<bool>,
    pub order_by: Option<OrderBy>,
    pub ascending: Option<bool>,
    pub title_type: Option<TitleType>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NewUser {
    pub name: Option<String>,
    pub username: Option<String>,
    pub email: Option<String>,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RatingInput {
    pub group_id: GroupId,
    pub title_id: TitleId,
    pub user_id: UserId,
    pub note: f32,
    pub season: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WatchedUpdate {
    pub watched: bool,
    pub watched_at: Option<NaiveDate>,
    pub season: Option<String>,
}

/// Typed access to the watchlist REST backend.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn login(&self, username_or_email: &str, password: &str) -> Result<LoginGrant>;
    async fn create_user(&self, user: &NewUser) -> Result<User>;

    async fn fetch_user_by_id(&self, id: UserId) -> Result<User>;
    async fn fetch_users(&self, group_id: GroupId) -> Result<Vec<User>>;

    async fn fetch_group_by_id(&self, id: GroupId) -> Result<Group>;
    async fn create_group(&self, name: &str) -> Result<Group>;

    async fn fetch_movies(&self, group_id: GroupId, query: &MovieQuery) -> Result<MoviePage>;
    /// Catalogue lookup. Carries no group's watched state.
    async fn fetch_title(&self, title_id: &str) -> Result<Title>;
    /// The group's own record of a title, watched state included.
    async fn fetch_group_title(&self, group_id: GroupId, title_id: &str) -> Result<Title>;
    async fn add_movie(&self, group_id: GroupId, title_id: &str) -> Result<Title>;
    async fn delete_movie(&self, group_id: GroupId, title_id: &str) -> Result<()>;

    async fn fetch_ratings(&self, title_id: &str) -> Result<Vec<Rating>>;
    async fn fetch_ratings_batch(&self, title_ids: &[TitleId]) -> Result<Vec<Rating>>;
    async fn create_rating(&self, input: &RatingInput) -> Result<Rating>;
    async fn update_rating(&self, id: RatingId, input: &RatingInput) -> Result<Rating>;
    async fn delete_rating(&self, id: RatingId) -> Result<()>;
    async fn delete_rating_season(&self, id: RatingId, season: &str) -> Result<()>;

    async fn fetch_comments(&self, group_id: GroupId, title_id: &str) -> Result<Vec<Comment>>;
    async fn create_comment(
        &self,
        group_id: GroupId,
        title_id: &str,
        text: &str,
        season: Option<&str>,
    ) -> Result<Comment>;
    async fn update_comment(
        &self,
        group_id: GroupId,
        title_id: &str,
        comment_id: CommentId,
        text: &str,
        season: Option<&str>,
    ) -> Result<Comment>;
    async fn delete_comment(
        &self,
        group_id: GroupId,
        title_id: &str,
        comment_id: CommentId,
    ) -> Result<()>;
    async fn delete_comment_season(
        &self,
        group_id: GroupId,
        title_id: &str,
        comment_id: CommentId,
        season: &str,
    ) -> Result<()>;

    async fn update_watched_status(
        &self,
        group_id: GroupId,
        title_id: &str,
        update: &WatchedUpdate,
    ) -> Result<()>;

    /// Create the (title, user) rating if none exists yet, otherwise update it.
    ///
    /// The existing record is looked up on the server right before writing.
    async fn save_or_update_rating(&self, input: &RatingInput) -> Result<Rating> {
        let existing = self
            .fetch_ratings(&input.title_id)
            .await?
            .into_iter()
            .find(|r| r.user_id == input.user_id);
        match existing {
            Some(rating) => {
                debug!(rating_id = rating.id, title_id = %input.title_id, "Updating rating");
                self.update_rating(rating.id, input).await
            }
            None => {
                debug!(title_id = %input.title_id, user_id = input.user_id, "Creating rating");
                self.create_rating(input).await
            }
        }
    }
}

/// Pull a [`BackendError`] out of an error chain, if one is there.
pub fn backend_error(err: &anyhow::Error) -> Option<&BackendError> {
    err.chain().find_map(|e| e.downcast_ref::<BackendError>())
}
