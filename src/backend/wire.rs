//! JSON shapes spoken by the backend and their mapping onto client entities.
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::models::{
    Comment, Episode, Group, LoginGrant, MoviePage, Rating, Season, SeasonComment, SeasonRating,
    Title, TitleType, User, WatchedState,
};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LoginBody<'a> {
    pub(crate) username_or_email: &'a str,
    pub(crate) password: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct NewUserBody<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) name: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) username: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) email: Option<&'a str>,
    pub(crate) password: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct NameBody<'a> {
    pub(crate) name: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AddMovieBody<'a> {
    pub(crate) imdb_id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct BatchBody<'a> {
    pub(crate) title_ids: &'a [String],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RatingBody<'a> {
    pub(crate) group_id: i64,
    pub(crate) title_id: &'a str,
    pub(crate) user_id: i64,
    pub(crate) note: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) season: Option<&'a str>,
}

#[derive(Debug, Serialize)]
pub(crate) struct CommentBody<'a> {
    pub(crate) text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) season: Option<&'a str>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct WatchedBody<'a> {
    pub(crate) watched: bool,
    pub(crate) watched_at: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(crate) season: Option<&'a str>,
}

/// Error body; only the human-readable message is ever looked at.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub(crate) message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct LoginResponse {
    id: i64,
    username: String,
    email: Option<String>,
    access_token: String,
    #[serde(default)]
    groups: Vec<GroupDto>,
}

impl From<LoginResponse> for LoginGrant {
    fn from(r: LoginResponse) -> Self {
        LoginGrant {
            user_id: r.id,
            username: r.username,
            email: r.email,
            access_token: r.access_token,
            groups: r.groups.into_iter().map(Group::from).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct GroupDto {
    id: i64,
    #[serde(default)]
    name: String,
}

impl From<GroupDto> for Group {
    fn from(g: GroupDto) -> Self {
        Group {
            id: g.id,
            name: g.name,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct UserDto {
    id: i64,
    name: Option<String>,
    #[serde(default)]
    username: String,
    email: Option<String>,
    avatar: Option<String>,
    #[serde(default)]
    groups: Vec<GroupDto>,
}

impl From<UserDto> for User {
    fn from(u: UserDto) -> Self {
        User {
            id: u.id,
            name: u.name,
            username: u.username,
            email: u.email,
            avatar: u.avatar,
            groups: u.groups.into_iter().map(Group::from).collect(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeasonDto {
    #[serde(deserialize_with = "label")]
    season: String,
    #[serde(default, alias = "episodes")]
    total_episodes: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct EpisodeDto {
    #[serde(deserialize_with = "label")]
    season: String,
    episode: u32,
    title: Option<String>,
    still: Option<String>,
    plot: Option<String>,
    #[serde(default, deserialize_with = "loose_number")]
    imdb_rating: Option<f32>,
    #[serde(default, deserialize_with = "loose_day")]
    released: Option<NaiveDate>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WatchedDto {
    #[serde(default)]
    watched: bool,
    #[serde(default, deserialize_with = "loose_day")]
    watched_at: Option<NaiveDate>,
}

impl From<WatchedDto> for WatchedState {
    fn from(w: WatchedDto) -> Self {
        WatchedState {
            watched: w.watched,
            watched_at: w.watched_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct TitleDto {
    #[serde(alias = "imdbId")]
    id: String,
    title: String,
    #[serde(default, deserialize_with = "loose_string")]
    year: Option<String>,
    poster: Option<String>,
    #[serde(default, deserialize_with = "loose_number")]
    imdb_rating: Option<f32>,
    plot: Option<String>,
    genre: Option<String>,
    director: Option<String>,
    actors: Option<String>,
    #[serde(rename = "type")]
    title_type: Option<String>,
    runtime: Option<String>,
    #[serde(default)]
    seasons: Vec<SeasonDto>,
    #[serde(default)]
    episodes: Vec<EpisodeDto>,
    #[serde(default)]
    watched: bool,
    #[serde(default, deserialize_with = "loose_day")]
    watched_at: Option<NaiveDate>,
    #[serde(default)]
    watched_seasons: BTreeMap<String, WatchedDto>,
    added_at: Option<DateTime<Utc>>,
}

pub(crate) fn title_type_from(raw: Option<&str>) -> TitleType {
    match raw.map(|s| s.trim().to_ascii_lowercase()).as_deref() {
        Some("serie") | Some("series") | Some("tv") => TitleType::Series,
        Some("mini-serie") | Some("mini-series") | Some("miniseries") => TitleType::MiniSeries,
        _ => TitleType::Movie,
    }
}

impl From<TitleDto> for Title {
    fn from(t: TitleDto) -> Self {
        let title_type = title_type_from(t.title_type.as_deref());
        let series = title_type.is_series();
        Title {
            id: t.id,
            title: t.title,
            year: t.year,
            poster: t.poster.filter(|p| p != "N/A"),
            external_rating: t.imdb_rating,
            plot: t.plot,
            genre: t.genre,
            director: t.director,
            actors: t.actors,
            title_type,
            runtime: t.runtime,
            seasons: if series {
                t.seasons
                    .into_iter()
                    .map(|s| Season {
                        label: s.season,
                        episode_count: s.total_episodes,
                    })
                    .collect()
            } else {
                Vec::new()
            },
            episodes: if series {
                t.episodes
                    .into_iter()
                    .map(|e| Episode {
                        season: e.season,
                        number: e.episode,
                        title: e.title,
                        still: e.still,
                        plot: e.plot,
                        rating: e.imdb_rating,
                        released: e.released,
                    })
                    .collect()
            } else {
                Vec::new()
            },
            watched: WatchedState {
                watched: t.watched,
                watched_at: t.watched_at,
            },
            watched_seasons: t
                .watched_seasons
                .into_iter()
                .map(|(k, v)| (k, WatchedState::from(v)))
                .collect(),
            added_at: t.added_at,
            transient: false,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeasonRatingDto {
    #[serde(default, deserialize_with = "loose_number")]
    note: Option<f32>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RatingDto {
    id: i64,
    #[serde(alias = "movieId")]
    title_id: String,
    user_id: i64,
    group_id: Option<i64>,
    #[serde(default, deserialize_with = "loose_number")]
    note: Option<f32>,
    #[serde(default)]
    seasons: BTreeMap<String, SeasonRatingDto>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl From<RatingDto> for Rating {
    fn from(r: RatingDto) -> Self {
        Rating {
            id: r.id,
            title_id: r.title_id,
            user_id: r.user_id,
            group_id: r.group_id,
            note: r.note,
            seasons: r
                .seasons
                .into_iter()
                .filter_map(|(label, s)| {
                    s.note.map(|note| {
                        (
                            label,
                            SeasonRating {
                                note,
                                created_at: s.created_at,
                                updated_at: s.updated_at,
                            },
                        )
                    })
                })
                .collect(),
            created_at: r.created_at,
            updated_at: r.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SeasonCommentDto {
    text: Option<String>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct CommentDto {
    id: i64,
    #[serde(alias = "movieId")]
    title_id: String,
    user_id: i64,
    text: Option<String>,
    #[serde(default)]
    seasons: BTreeMap<String, SeasonCommentDto>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
}

impl From<CommentDto> for Comment {
    fn from(c: CommentDto) -> Self {
        Comment {
            id: c.id,
            title_id: c.title_id,
            user_id: c.user_id,
            text: c.text,
            seasons: c
                .seasons
                .into_iter()
                .filter_map(|(label, s)| {
                    s.text.filter(|t| !t.is_empty()).map(|text| {
                        (
                            label,
                            SeasonComment {
                                text,
                                created_at: s.created_at,
                                updated_at: s.updated_at,
                            },
                        )
                    })
                })
                .collect(),
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct PageDto {
    #[serde(default)]
    content: Vec<TitleDto>,
    #[serde(default)]
    number: u32,
    #[serde(default)]
    size: u32,
    #[serde(default)]
    total_elements: u64,
    #[serde(default)]
    total_pages: u32,
    #[serde(default)]
    ratings: BTreeMap<String, Vec<RatingDto>>,
}

impl From<PageDto> for MoviePage {
    fn from(p: PageDto) -> Self {
        MoviePage {
            content: p.content.into_iter().map(Title::from).collect(),
            page: p.number,
            size: p.size,
            total_elements: p.total_elements,
            total_pages: p.total_pages,
            ratings: p
                .ratings
                .into_iter()
                .map(|(id, list)| (id, list.into_iter().map(Rating::from).collect()))
                .collect(),
        }
    }
}

fn label<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    match Value::deserialize(d)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "season label must be a string or number, got {other}"
        ))),
    }
}

fn loose_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::String(s)) if !s.is_empty() && s != "N/A" => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn loose_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<f32>, D::Error> {
    Ok(match Option::<Value>::deserialize(d)? {
        Some(Value::Number(n)) => n.as_f64().map(|v| v as f32),
        Some(Value::String(s)) => s.trim().parse::<f32>().ok(),
        _ => None,
    })
}

fn loose_day<'de, D: Deserializer<'de>>(d: D) -> Result<Option<NaiveDate>, D::Error> {
    Ok(Option::<String>::deserialize(d)?.and_then(|s| parse_day(&s)))
}

/// Accept a plain `YYYY-MM-DD` or a full timestamp and keep the day.
pub(crate) fn parse_day(input: &str) -> Option<NaiveDate> {
    let input = input.trim();
    if let Ok(d) = NaiveDate::parse_from_str(input, "%Y-%m-%d") {
        return Some(d);
    }
    DateTime::parse_from_rfc3339(input)
        .ok()
        .map(|dt| dt.date_naive())
        .or_else(|| input.get(..10).and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok()))
}
