use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use super::wire::{
    AddMovieBody, BatchBody, CommentBody, CommentDto, ErrorBody, GroupDto, LoginBody,
    LoginResponse, NameBody, NewUserBody, PageDto, RatingBody, RatingDto, TitleDto, UserDto, WatchedBody,
};
use super::{BackendError, Gateway, MovieQuery, NewUser, RatingInput, WatchedUpdate};
use crate::config::Config;
use crate::models::{
    Comment, CommentId, Group, GroupId, LoginGrant, MoviePage, Rating, RatingId, Title, TitleId,
    User, UserId,
};
use crate::session::Session;

/// reqwest-backed [`Gateway`]. The bearer token is read from the session on every call.
#[derive(Clone)]
pub struct HttpGateway {
    client: Client,
    base_url: String,
    session: Arc<Session>,
}

impl HttpGateway {
    pub fn new(config: &Config, session: Arc<Session>) -> Result<Self> {
        let user_agent = format!("cinelist/{}", env!("CARGO_PKG_VERSION"));
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(config.request_timeout)
            .user_agent(user_agent)
            .build()
            .context("Failed to build backend HTTP client")?;
        Ok(Self {
            client,
            base_url: config.api_url.trim_end_matches('/').to_string(),
            session,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        debug!(%method, %url, "Backend request");
        let builder = self.client.request(method, url);
        match self.session.token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let res = builder.send().await.context("request failed")?;
        let status = res.status();
        if status.is_success() {
            return Ok(res);
        }
        let text = res.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .ok()
            .and_then(|b| b.message)
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| format!("Request failed with status {}", status.as_u16()));
        Err(BackendError { status, message }.into())
    }

    async fn json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        let res = self.send(builder).await?;
        let text = res.text().await.context("reading body failed")?;
        serde_json::from_str(&text).context("JSON parse failed")
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.json(self.request(Method::GET, path)).await
    }

    async fn send_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &B,
    ) -> Result<T> {
        self.json(self.request(method, path).json(body)).await
    }

    async fn send_empty(&self, method: Method, path: &str) -> Result<()> {
        self.send(self.request(method, path)).await.map(|_| ())
    }
}

fn enc(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}

fn movies_query(query: &MovieQuery) -> String {
    let mut params = vec![format!("page={}", query.page), format!("size={}", query.size)];
    if let Some(watched) = query.watched {
        params.push(format!("watched={watched}"));
    }
    if let Some(order) = query.order_by {
        params.push(format!("orderBy={}", order.as_param()));
    }
    if let Some(asc) = query.ascending {
        params.push(format!("ascending={asc}"));
    }
    if let Some(kind) = query.title_type {
        params.push(format!("titleType={}", enc(kind.as_str())));
    }
    params.join("&")
}

fn rating_body(input: &RatingInput) -> RatingBody<'_> {
    RatingBody {
        group_id: input.group_id,
        title_id: &input.title_id,
        user_id: input.user_id,
        note: input.note,
        season: input.season.as_deref(),
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn login(&self, username_or_email: &str, password: &str) -> Result<LoginGrant> {
        let body = LoginBody {
            username_or_email,
            password,
        };
        let res: LoginResponse = self
            .json(
                self.client
                    .post(format!("{}/auth/login", self.base_url))
                    .json(&body),
            )
            .await
            .context("login failed")?;
        Ok(res.into())
    }

    async fn create_user(&self, user: &NewUser) -> Result<User> {
        let body = NewUserBody {
            name: user.name.as_deref(),
            username: user.username.as_deref(),
            email: user.email.as_deref(),
            password: &user.password,
        };
        let res: UserDto = self
            .json(
                self.client
                    .post(format!("{}/auth/register", self.base_url))
                    .json(&body),
            )
            .await?;
        Ok(res.into())
    }

    async fn fetch_user_by_id(&self, id: UserId) -> Result<User> {
        let res: UserDto = self.get_json(&format!("/users/{id}")).await?;
        Ok(res.into())
    }

    async fn fetch_users(&self, group_id: GroupId) -> Result<Vec<User>> {
        let res: Vec<UserDto> = self.get_json(&format!("/groups/{group_id}/users")).await?;
        Ok(res.into_iter().map(User::from).collect())
    }

    async fn fetch_group_by_id(&self, id: GroupId) -> Result<Group> {
        let res: GroupDto = self.get_json(&format!("/groups/{id}")).await?;
        Ok(res.into())
    }

    async fn create_group(&self, name: &str) -> Result<Group> {
        let res: GroupDto = self
            .send_json(Method::POST, "/groups", &NameBody { name })
            .await?;
        Ok(res.into())
    }

    async fn fetch_movies(&self, group_id: GroupId, query: &MovieQuery) -> Result<MoviePage> {
        let path = format!("/groups/{group_id}/movies?{}", movies_query(query));
        let res: PageDto = self.get_json(&path).await?;
        Ok(res.into())
    }

    async fn fetch_title(&self, title_id: &str) -> Result<Title> {
        let res: TitleDto = self.get_json(&format!("/titles/{}", enc(title_id))).await?;
        Ok(res.into())
    }

    async fn fetch_group_title(&self, group_id: GroupId, title_id: &str) -> Result<Title> {
        let res: TitleDto = self
            .get_json(&format!("/groups/{group_id}/movies/{}", enc(title_id)))
            .await?;
        Ok(res.into())
    }

    async fn add_movie(&self, group_id: GroupId, title_id: &str) -> Result<Title> {
        let res: TitleDto = self
            .send_json(
                Method::POST,
                &format!("/groups/{group_id}/movies"),
                &AddMovieBody { imdb_id: title_id },
            )
            .await?;
        Ok(res.into())
    }

    async fn delete_movie(&self, group_id: GroupId, title_id: &str) -> Result<()> {
        self.send_empty(
            Method::DELETE,
            &format!("/groups/{group_id}/movies/{}", enc(title_id)),
        )
        .await
    }

    async fn fetch_ratings(&self, title_id: &str) -> Result<Vec<Rating>> {
        let res: Vec<RatingDto> = self
            .get_json(&format!("/ratings/titles/{}", enc(title_id)))
            .await?;
        Ok(res.into_iter().map(Rating::from).collect())
    }

    async fn fetch_ratings_batch(&self, title_ids: &[TitleId]) -> Result<Vec<Rating>> {
        let res: Vec<RatingDto> = self
            .send_json(Method::POST, "/ratings/batch", &BatchBody { title_ids })
            .await?;
        Ok(res.into_iter().map(Rating::from).collect())
    }

    async fn create_rating(&self, input: &RatingInput) -> Result<Rating> {
        let res: RatingDto = self
            .send_json(Method::POST, "/ratings", &rating_body(input))
            .await?;
        Ok(res.into())
    }

    async fn update_rating(&self, id: RatingId, input: &RatingInput) -> Result<Rating> {
        let res: RatingDto = self
            .send_json(Method::PUT, &format!("/ratings/{id}"), &rating_body(input))
            .await?;
        Ok(res.into())
    }

    async fn delete_rating(&self, id: RatingId) -> Result<()> {
        self.send_empty(Method::DELETE, &format!("/ratings/{id}"))
            .await
    }

    async fn delete_rating_season(&self, id: RatingId, season: &str) -> Result<()> {
        self.send_empty(
            Method::DELETE,
            &format!("/ratings/{id}/seasons/{}", enc(season)),
        )
        .await
    }

    async fn fetch_comments(&self, group_id: GroupId, title_id: &str) -> Result<Vec<Comment>> {
        let res: Vec<CommentDto> = self
            .get_json(&format!(
                "/groups/{group_id}/movies/{}/comments",
                enc(title_id)
            ))
            .await?;
        Ok(res.into_iter().map(Comment::from).collect())
    }

    async fn create_comment(
        &self,
        group_id: GroupId,
        title_id: &str,
        text: &str,
        season: Option<&str>,
    ) -> Result<Comment> {
        let res: CommentDto = self
            .send_json(
                Method::POST,
                &format!("/groups/{group_id}/movies/{}/comments", enc(title_id)),
                &CommentBody { text, season },
            )
            .await?;
        Ok(res.into())
    }

    async fn update_comment(
        &self,
        group_id: GroupId,
        title_id: &str,
        comment_id: CommentId,
        text: &str,
        season: Option<&str>,
    ) -> Result<Comment> {
        let res: CommentDto = self
            .send_json(
                Method::PUT,
                &format!(
                    "/groups/{group_id}/movies/{}/comments/{comment_id}",
                    enc(title_id)
                ),
                &CommentBody { text, season },
            )
            .await?;
        Ok(res.into())
    }

    async fn delete_comment(
        &self,
        group_id: GroupId,
        title_id: &str,
        comment_id: CommentId,
    ) -> Result<()> {
        self.send_empty(
            Method::DELETE,
            &format!(
                "/groups/{group_id}/movies/{}/comments/{comment_id}",
                enc(title_id)
            ),
        )
        .await
    }

    async fn delete_comment_season(
        &self,
        group_id: GroupId,
        title_id: &str,
        comment_id: CommentId,
        season: &str,
    ) -> Result<()> {
        self.send_empty(
            Method::DELETE,
            &format!(
                "/groups/{group_id}/movies/{}/comments/{comment_id}/seasons/{}",
                enc(title_id),
                enc(season)
            ),
        )
        .await
    }

    async fn update_watched_status(
        &self,
        group_id: GroupId,
        title_id: &str,
        update: &WatchedUpdate,
    ) -> Result<()> {
        let body = WatchedBody {
            watched: update.watched,
            watched_at: update.watched_at,
            season: update.season.as_deref(),
        };
        self.send(
            self.request(
                Method::PATCH,
                &format!("/groups/{group_id}/movies/{}/watched", enc(title_id)),
            )
            .json(&body),
        )
        .await
        .map(|_| ())
    }
}
