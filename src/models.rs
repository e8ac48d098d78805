use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub type TitleId = String;
pub type UserId = i64;
pub type GroupId = i64;
pub type RatingId = i64;
pub type CommentId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TitleType {
    #[serde(rename = "movie")]
    Movie,
    #[serde(rename = "serie", alias = "series")]
    Series,
    #[serde(rename = "mini-serie", alias = "mini-series")]
    MiniSeries,
}

impl TitleType {
    pub fn is_series(self) -> bool {
        matches!(self, TitleType::Series | TitleType::MiniSeries)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TitleType::Movie => "movie",
            TitleType::Series => "serie",
            TitleType::MiniSeries => "mini-serie",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Season {
    pub label: String,
    pub episode_count: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub season: String,
    pub number: u32,
    pub title: Option<String>,
    pub still: Option<String>,
    pub plot: Option<String>,
    pub rating: Option<f32>,
    pub released: Option<NaiveDate>,
}

/// Watched flag and date for a movie or a single season.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedState {
    pub watched: bool,
    pub watched_at: Option<NaiveDate>,
}

impl WatchedState {
    /// The date of an unwatched entry carries no meaning.
    pub fn normalized(self) -> Self {
        if self.watched {
            self
        } else {
            WatchedState {
                watched: false,
                watched_at: None,
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Title {
    pub id: TitleId,
    pub title: String,
    pub year: Option<String>,
    pub poster: Option<String>,
    pub external_rating: Option<f32>,
    pub plot: Option<String>,
    pub genre: Option<String>,
    pub director: Option<String>,
    pub actors: Option<String>,
    pub title_type: TitleType,
    pub runtime: Option<String>,
    pub seasons: Vec<Season>,
    pub episodes: Vec<Episode>,
    pub watched: WatchedState,
    pub watched_seasons: BTreeMap<String, WatchedState>,
    pub added_at: Option<DateTime<Utc>>,
    /// Set on client-side placeholders that have no backend record.
    #[serde(default)]
    pub transient: bool,
}

impl Title {
    pub fn is_series(&self) -> bool {
        self.title_type.is_series()
    }

    pub fn has_season(&self, label: &str) -> bool {
        self.seasons.iter().any(|s| s.label == label)
    }

    /// Server-confirmed watched state for the movie, or for one season of a series.
    ///
    /// A series without a selected season has no watched state of its own.
    pub fn watched_baseline(&self, season: Option<&str>) -> WatchedState {
        match (self.is_series(), season) {
            (false, _) => self.watched,
            (true, Some(label)) => self
                .watched_seasons
                .get(label)
                .copied()
                .unwrap_or_default(),
            (true, None) => WatchedState::default(),
        }
    }

    pub fn episodes_in<'a>(&'a self, season: &'a str) -> impl Iterator<Item = &'a Episode> + 'a {
        self.episodes.iter().filter(move |e| e.season == season)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonRating {
    pub note: f32,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rating {
    pub id: RatingId,
    pub title_id: TitleId,
    pub user_id: UserId,
    pub group_id: Option<GroupId>,
    /// Movie note. Never shown for series, which only use `seasons`.
    pub note: Option<f32>,
    pub seasons: BTreeMap<String, SeasonRating>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Rating {
    /// The note visible for this record given the title kind and selected season.
    pub fn visible_note(&self, is_series: bool, season: Option<&str>) -> Option<f32> {
        if !is_series {
            return self.note;
        }
        season
            .and_then(|label| self.seasons.get(label))
            .map(|s| s.note)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeasonComment {
    pub text: String,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: CommentId,
    pub title_id: TitleId,
    pub user_id: UserId,
    pub text: Option<String>,
    pub seasons: BTreeMap<String, SeasonComment>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
    pub id: GroupId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: Option<String>,
    pub username: String,
    pub email: Option<String>,
    pub avatar: Option<String>,
    pub groups: Vec<Group>,
}

impl User {
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .unwrap_or(&self.username)
    }

    pub fn belongs_to(&self, group_id: GroupId) -> bool {
        self.groups.iter().any(|g| g.id == group_id)
    }
}

/// Result of a successful login.
#[derive(Debug, Clone, PartialEq)]
pub struct LoginGrant {
    pub user_id: UserId,
    pub username: String,
    pub email: Option<String>,
    pub access_token: String,
    pub groups: Vec<Group>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct MoviePage {
    pub content: Vec<Title>,
    pub page: u32,
    pub size: u32,
    pub total_elements: u64,
    pub total_pages: u32,
    pub ratings: BTreeMap<TitleId, Vec<Rating>>,
}

impl MoviePage {
    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}
