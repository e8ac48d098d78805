use chrono::{NaiveDate, TimeZone, Utc};
use cinelist::app::AppState;
use cinelist::backend::{BackendError, Gateway, MovieQuery, NewUser, RatingInput, WatchedUpdate};
use cinelist::config::Config;
use cinelist::collection::{CollectionQuery, ListRefresh, TypeFilter, WatchedFilter};
use cinelist::detail::{RatingEdit, Scope, TitleDetail};
use cinelist::error::{ActionError, ActionResult};
use cinelist::models::{
    Comment, CommentId, Group, GroupId, LoginGrant, MoviePage, Rating, RatingId, SeasonComment,
    SeasonRating, Season, Title, TitleId, TitleType, User, UserId, WatchedState,
};
use cinelist::notify::{Notice, NoticeQueue};
use cinelist::session::Session;
use cinelist::storage::MemoryStore;
use reqwest::StatusCode;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const ME: UserId = 1;
const FRIEND: UserId = 2;
const GROUP: GroupId = 10;

#[derive(Default)]
struct FakeBackend {
    titles: Mutex<Vec<Title>>,
    ratings: Mutex<Vec<Rating>>,
    comments: Mutex<Vec<Comment>>,
    calls: Mutex<Vec<String>>,
    next_id: Mutex<i64>,
    fail_writes: Mutex<bool>,
    movies_status: Mutex<Option<StatusCode>>,
}

impl FakeBackend {
    fn log(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    fn writes(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|c| !c.starts_with("fetch"))
            .collect()
    }

    fn next_id(&self) -> i64 {
        let mut id = self.next_id.lock().unwrap();
        *id += 1;
        100 + *id
    }

    fn check_write(&self) -> anyhow::Result<()> {
        if *self.fail_writes.lock().unwrap() {
            return Err(BackendError {
                status: StatusCode::INTERNAL_SERVER_ERROR,
                message: "database unavailable".to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn apply_note(rating: &mut Rating, input: &RatingInput) {
        match &input.season {
            Some(s) => {
                rating.seasons.insert(
                    s.clone(),
                    SeasonRating {
                        note: input.note,
                        created_at: None,
                        updated_at: None,
                    },
                );
            }
            None => rating.note = Some(input.note),
        }
    }

    fn find_title(&self, title_id: &str) -> anyhow::Result<Title> {
        self.titles
            .lock()
            .unwrap()
            .iter()
            .find(|t| t.id == title_id)
            .cloned()
            .ok_or_else(|| {
                BackendError {
                    status: StatusCode::NOT_FOUND,
                    message: "Title not found".to_string(),
                }
                .into()
            })
    }

    fn ratings_of(&self, title_id: &str) -> Vec<Rating> {
        self.ratings
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.title_id == title_id)
            .cloned()
            .collect()
    }
}

fn user(id: UserId, name: &str) -> User {
    User {
        id,
        name: Some(name.to_string()),
        username: name.to_lowercase(),
        email: None,
        avatar: None,
        groups: vec![Group {
            id: GROUP,
            name: "Couch".to_string(),
        }],
    }
}

#[async_trait::async_trait]
impl Gateway for FakeBackend {
    async fn login(&self, _username_or_email: &str, _password: &str) -> anyhow::Result<LoginGrant> {
        self.log("login");
        Ok(LoginGrant {
            user_id: ME,
            username: "alice".to_string(),
            email: None,
            access_token: "token".to_string(),
            groups: user(ME, "Alice").groups,
        })
    }

    async fn create_user(&self, _user: &NewUser) -> anyhow::Result<User> {
        self.log("create_user");
        Ok(user(3, "Carol"))
    }

    async fn fetch_user_by_id(&self, id: UserId) -> anyhow::Result<User> {
        self.log(format!("fetch_user_by_id {id}"));
        Ok(user(id, "Alice"))
    }

    async fn fetch_users(&self, group_id: GroupId) -> anyhow::Result<Vec<User>> {
        self.log(format!("fetch_users {group_id}"));
        Ok(vec![user(FRIEND, "Bob"), user(ME, "Alice")])
    }

    async fn fetch_group_by_id(&self, id: GroupId) -> anyhow::Result<Group> {
        self.log(format!("fetch_group_by_id {id}"));
        Ok(Group {
            id,
            name: "Couch".to_string(),
        })
    }

    async fn create_group(&self, name: &str) -> anyhow::Result<Group> {
        self.log(format!("create_group {name}"));
        Ok(Group {
            id: self.next_id(),
            name: name.to_string(),
        })
    }

    async fn fetch_movies(&self, group_id: GroupId, query: &MovieQuery) -> anyhow::Result<MoviePage> {
        self.log(format!("fetch_movies {group_id} {query:?}"));
        if let Some(status) = *self.movies_status.lock().unwrap() {
            return Err(BackendError {
                status,
                message: "nope".to_string(),
            }
            .into());
        }
        let content: Vec<Title> = self
            .titles
            .lock()
            .unwrap()
            .iter()
            .filter(|t| query.title_type.map_or(true, |k| t.title_type == k))
            .cloned()
            .collect();
        let total = content.len() as u64;
        Ok(MoviePage {
            content,
            page: query.page,
            size: query.size,
            total_elements: total,
            total_pages: if total == 0 { 0 } else { 1 },
            ratings: BTreeMap::new(),
        })
    }

    async fn fetch_title(&self, title_id: &str) -> anyhow::Result<Title> {
        self.log(format!("fetch_title {title_id}"));
        // The catalogue knows nothing about any group's viewing.
        let mut title = self.find_title(title_id)?;
        title.watched = WatchedState::default();
        title.watched_seasons.clear();
        Ok(title)
    }

    async fn fetch_group_title(&self, group_id: GroupId, title_id: &str) -> anyhow::Result<Title> {
        self.log(format!("fetch_group_title {group_id} {title_id}"));
        self.find_title(title_id)
    }

    async fn add_movie(&self, group_id: GroupId, title_id: &str) -> anyhow::Result<Title> {
        self.log(format!("add_movie {group_id} {title_id}"));
        self.check_write()?;
        let title = movie(title_id, "Added");
        self.titles.lock().unwrap().push(title.clone());
        Ok(title)
    }

    async fn delete_movie(&self, group_id: GroupId, title_id: &str) -> anyhow::Result<()> {
        self.log(format!("delete_movie {group_id} {title_id}"));
        self.check_write()?;
        self.titles.lock().unwrap().retain(|t| t.id != title_id);
        Ok(())
    }

    async fn fetch_ratings(&self, title_id: &str) -> anyhow::Result<Vec<Rating>> {
        self.log(format!("fetch_ratings {title_id}"));
        Ok(self.ratings_of(title_id))
    }

    async fn fetch_ratings_batch(&self, title_ids: &[TitleId]) -> anyhow::Result<Vec<Rating>> {
        self.log(format!("fetch_ratings_batch {}", title_ids.join(",")));
        Ok(title_ids.iter().flat_map(|id| self.ratings_of(id)).collect())
    }

    async fn create_rating(&self, input: &RatingInput) -> anyhow::Result<Rating> {
        self.log(format!("create_rating {} {:?}", input.title_id, input.season));
        self.check_write()?;
        let mut rating = Rating {
            id: self.next_id(),
            title_id: input.title_id.clone(),
            user_id: input.user_id,
            group_id: Some(input.group_id),
            note: None,
            seasons: BTreeMap::new(),
            created_at: None,
            updated_at: None,
        };
        Self::apply_note(&mut rating, input);
        self.ratings.lock().unwrap().push(rating.clone());
        Ok(rating)
    }

    async fn update_rating(&self, id: RatingId, input: &RatingInput) -> anyhow::Result<Rating> {
        self.log(format!("update_rating {id} {:?}", input.season));
        self.check_write()?;
        let mut ratings = self.ratings.lock().unwrap();
        let rating = ratings
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| anyhow::anyhow!("no rating {id}"))?;
        Self::apply_note(rating, input);
        Ok(rating.clone())
    }

    async fn delete_rating(&self, id: RatingId) -> anyhow::Result<()> {
        self.log(format!("delete_rating {id}"));
        self.check_write()?;
        self.ratings.lock().unwrap().retain(|r| r.id != id);
        Ok(())
    }

    async fn delete_rating_season(&self, id: RatingId, season: &str) -> anyhow::Result<()> {
        self.log(format!("delete_rating_season {id} {season}"));
        self.check_write()?;
        if let Some(r) = self.ratings.lock().unwrap().iter_mut().find(|r| r.id == id) {
            r.seasons.remove(season);
        }
        Ok(())
    }

    async fn fetch_comments(&self, group_id: GroupId, title_id: &str) -> anyhow::Result<Vec<Comment>> {
        self.log(format!("fetch_comments {group_id} {title_id}"));
        Ok(self
            .comments
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.title_id == title_id)
            .cloned()
            .collect())
    }

    async fn create_comment(
        &self,
        _group_id: GroupId,
        title_id: &str,
        text: &str,
        season: Option<&str>,
    ) -> anyhow::Result<Comment> {
        self.log(format!("create_comment {title_id} {season:?}"));
        self.check_write()?;
        let mut comment = Comment {
            id: self.next_id(),
            title_id: title_id.to_string(),
            user_id: ME,
            text: None,
            seasons: BTreeMap::new(),
            created_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).single(),
            updated_at: None,
        };
        match season {
            Some(s) => {
                comment.seasons.insert(
                    s.to_string(),
                    SeasonComment {
                        text: text.to_string(),
                        created_at: comment.created_at,
                        updated_at: comment.created_at,
                    },
                );
            }
            None => comment.text = Some(text.to_string()),
        }
        self.comments.lock().unwrap().push(comment.clone());
        Ok(comment)
    }

    async fn update_comment(
        &self,
        _group_id: GroupId,
        _title_id: &str,
        comment_id: CommentId,
        text: &str,
        season: Option<&str>,
    ) -> anyhow::Result<Comment> {
        self.log(format!("update_comment {comment_id} {season:?}"));
        self.check_write()?;
        let mut comments = self.comments.lock().unwrap();
        let comment = comments
            .iter_mut()
            .find(|c| c.id == comment_id)
            .ok_or_else(|| anyhow::anyhow!("no comment {comment_id}"))?;
        match season.and_then(|s| comment.seasons.get_mut(s)) {
            Some(sc) => sc.text = text.to_string(),
            None => comment.text = Some(text.to_string()),
        }
        Ok(comment.clone())
    }

    async fn delete_comment(
        &self,
        _group_id: GroupId,
        _title_id: &str,
        comment_id: CommentId,
    ) -> anyhow::Result<()> {
        self.log(format!("delete_comment {comment_id}"));
        self.check_write()?;
        self.comments.lock().unwrap().retain(|c| c.id != comment_id);
        Ok(())
    }

    async fn delete_comment_season(
        &self,
        _group_id: GroupId,
        _title_id: &str,
        comment_id: CommentId,
        season: &str,
    ) -> anyhow::Result<()> {
        self.log(format!("delete_comment_season {comment_id} {season}"));
        self.check_write()?;
        if let Some(c) = self
            .comments
            .lock()
            .unwrap()
            .iter_mut()
            .find(|c| c.id == comment_id)
        {
            c.seasons.remove(season);
        }
        Ok(())
    }

    async fn update_watched_status(
        &self,
        _group_id: GroupId,
        title_id: &str,
        update: &WatchedUpdate,
    ) -> anyhow::Result<()> {
        self.log(format!(
            "update_watched_status {title_id} {} {:?}",
            update.watched, update.season
        ));
        self.check_write()
    }
}

#[derive(Default)]
struct CountingList {
    refreshes: usize,
}

#[async_trait::async_trait]
impl ListRefresh for CountingList {
    async fn refresh_list(&mut self) -> ActionResult<()> {
        self.refreshes += 1;
        Ok(())
    }
}

fn movie(id: &str, name: &str) -> Title {
    Title {
        id: id.to_string(),
        title: name.to_string(),
        year: Some("1999".to_string()),
        poster: None,
        external_rating: Some(8.7),
        plot: None,
        genre: None,
        director: None,
        actors: None,
        title_type: TitleType::Movie,
        runtime: None,
        seasons: Vec::new(),
        episodes: Vec::new(),
        watched: WatchedState::default(),
        watched_seasons: BTreeMap::new(),
        added_at: None,
        transient: false,
    }
}

fn series(id: &str, name: &str) -> Title {
    let mut t = movie(id, name);
    t.title_type = TitleType::Series;
    t.seasons = ["1", "2"]
        .iter()
        .map(|l| Season {
            label: l.to_string(),
            episode_count: 8,
        })
        .collect();
    t
}

struct Harness {
    backend: Arc<FakeBackend>,
    session: Arc<Session>,
    notices: Arc<NoticeQueue>,
}

impl Harness {
    fn new(titles: Vec<Title>) -> Self {
        let backend = Arc::new(FakeBackend::default());
        *backend.titles.lock().unwrap() = titles;
        let session = Arc::new(Session::load(Arc::new(MemoryStore::new())));
        session
            .begin("token".to_string(), ME, Some(GROUP))
            .expect("session");
        Self {
            backend,
            session,
            notices: Arc::new(NoticeQueue::new()),
        }
    }

    async fn open(&self, title_id: &str) -> TitleDetail {
        let detail = self
            .collection()
            .open_title(title_id)
            .await
            .expect("open detail");
        self.backend.clear_calls();
        detail
    }

    fn collection(&self) -> CollectionQuery {
        CollectionQuery::new(
            self.backend.clone(),
            self.session.clone(),
            self.notices.clone(),
        )
    }
}

fn season(label: &str) -> Scope<'_> {
    Scope {
        is_series: true,
        season: Some(label),
    }
}

const MOVIE: Scope<'static> = Scope {
    is_series: false,
    season: None,
};

#[tokio::test]
async fn open_loads_members_ratings_and_comments_together() {
    let h = Harness::new(vec![movie("tt1", "Matrix")]);
    let title = h.backend.fetch_title("tt1").await.unwrap();
    h.backend.clear_calls();
    let detail = TitleDetail::open(h.backend.clone(), h.session.clone(), h.notices.clone(), title)
        .await
        .unwrap();
    let mut calls = h.backend.calls();
    calls.sort();
    assert_eq!(
        calls,
        vec!["fetch_comments 10 tt1", "fetch_ratings tt1", "fetch_users 10"]
    );
    let rows = detail.rating_rows();
    assert_eq!(rows[0].user.id, ME);
    assert!(rows[0].editable);
    assert!(!rows[1].editable);
    assert_eq!(detail.season(), None);
}

#[tokio::test]
async fn movie_rating_is_upserted_once_and_visible_after_refetch() {
    let h = Harness::new(vec![movie("tt1", "Matrix")]);
    let mut detail = h.open("tt1").await;
    let mut list = CountingList::default();

    detail.begin_rating_edit(ME).unwrap();
    detail.set_rating_buffer(7.5).unwrap();
    assert!(detail.confirm_rating_edit());
    let outcome = detail.save(&mut list).await.unwrap();

    assert_eq!(outcome.ratings_saved, 1);
    assert!(!outcome.watched_updated);
    assert_eq!(h.backend.writes(), vec!["create_rating tt1 None"]);
    assert!(h.backend.calls().contains(&"fetch_ratings_batch tt1".to_string()));
    assert_eq!(detail.ratings().displayed_note(ME, MOVIE), Some(7.5));
    assert!(!detail.ratings().has_staged());
    assert_eq!(list.refreshes, 0);
    assert!(h.notices.drain().contains(&Notice::Success("Saved".to_string())));
}

#[tokio::test]
async fn second_save_updates_the_existing_record() {
    let h = Harness::new(vec![movie("tt1", "Matrix")]);
    let mut detail = h.open("tt1").await;
    let mut list = CountingList::default();

    for note in [6.0, 8.5] {
        detail.begin_rating_edit(ME).unwrap();
        detail.set_rating_buffer(note).unwrap();
        detail.save(&mut list).await.unwrap();
    }

    let writes = h.backend.writes();
    assert_eq!(writes.len(), 2);
    assert!(writes[0].starts_with("create_rating"));
    assert!(writes[1].starts_with("update_rating"));
    let stored = h.backend.ratings_of("tt1");
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0].note, Some(8.5));
    assert_eq!(detail.ratings().ratings().len(), 1);
}

#[tokio::test]
async fn save_with_nothing_changed_makes_no_calls() {
    let h = Harness::new(vec![movie("tt1", "Matrix")]);
    let mut detail = h.open("tt1").await;
    let mut list = CountingList::default();

    detail.begin_rating_edit(ME).unwrap();
    detail.cancel_rating_edit();
    let outcome = detail.save(&mut list).await.unwrap();

    assert_eq!(outcome.ratings_saved, 0);
    assert!(h.backend.calls().is_empty());
    assert_eq!(list.refreshes, 0);
}

#[tokio::test]
async fn cannot_edit_someone_elses_rating() {
    let h = Harness::new(vec![movie("tt1", "Matrix")]);
    let mut detail = h.open("tt1").await;
    let err = detail.begin_rating_edit(FRIEND).unwrap_err();
    assert!(matches!(err, ActionError::Validation(_)));
    assert_eq!(detail.ratings().edit(), &RatingEdit::Idle);
    assert!(matches!(h.notices.drain().as_slice(), [Notice::Error(_)]));
}

#[tokio::test]
async fn failed_upsert_keeps_the_staged_value() {
    let h = Harness::new(vec![movie("tt1", "Matrix")]);
    let mut detail = h.open("tt1").await;
    let mut list = CountingList::default();
    *h.backend.fail_writes.lock().unwrap() = true;

    detail.begin_rating_edit(ME).unwrap();
    detail.set_rating_buffer(4.0).unwrap();
    let err = detail.save(&mut list).await.unwrap_err();

    assert!(matches!(err, ActionError::Backend(ref m) if m.contains("database unavailable")));
    assert!(detail.ratings().has_staged());
    assert_eq!(detail.ratings().displayed_note(ME, MOVIE), Some(4.0));
    assert!(h.backend.ratings_of("tt1").is_empty());
}

#[tokio::test]
async fn season_switch_discards_unsaved_rating() {
    let h = Harness::new(vec![series("tt2", "Dark")]);
    let mut detail = h.open("tt2").await;
    let mut list = CountingList::default();

    assert!(detail.begin_rating_edit(ME).is_err());
    detail.select_season(Some("1")).unwrap();
    detail.begin_rating_edit(ME).unwrap();
    detail.set_rating_buffer(9.0).unwrap();
    detail.confirm_rating_edit();
    detail.begin_rating_edit(ME).unwrap();
    detail.set_rating_buffer(3.0).unwrap();

    detail.select_season(Some("2")).unwrap();
    assert_eq!(detail.ratings().edit(), &RatingEdit::Idle);
    assert!(!detail.ratings().has_staged());
    detail.save(&mut list).await.unwrap();
    assert!(h.backend.calls().is_empty());
}

#[tokio::test]
async fn season_rating_is_saved_under_that_season() {
    let h = Harness::new(vec![series("tt2", "Dark")]);
    let mut detail = h.open("tt2").await;
    let mut list = CountingList::default();

    detail.select_season(Some("2")).unwrap();
    detail.begin_rating_edit(ME).unwrap();
    detail.set_rating_buffer(8.0).unwrap();
    detail.save(&mut list).await.unwrap();

    assert_eq!(h.backend.writes(), vec!["create_rating tt2 Some(\"2\")"]);
    assert_eq!(detail.ratings().displayed_note(ME, season("2")), Some(8.0));
    assert_eq!(detail.ratings().displayed_note(ME, season("1")), None);
}

#[tokio::test]
async fn deleting_a_season_rating_keeps_other_seasons() {
    let h = Harness::new(vec![series("tt2", "Dark")]);
    let mut seasons = BTreeMap::new();
    for (label, note) in [("1", 6.0), ("2", 8.0)] {
        seasons.insert(
            label.to_string(),
            SeasonRating {
                note,
                created_at: None,
                updated_at: None,
            },
        );
    }
    h.backend.ratings.lock().unwrap().push(Rating {
        id: 5,
        title_id: "tt2".to_string(),
        user_id: ME,
        group_id: Some(GROUP),
        note: None,
        seasons,
        created_at: None,
        updated_at: None,
    });
    let mut detail = h.open("tt2").await;

    detail.select_season(Some("2")).unwrap();
    detail.request_rating_delete(ME).unwrap();
    detail.confirm_rating_delete().await.unwrap();

    assert_eq!(h.backend.writes(), vec!["delete_rating_season 5 2"]);
    assert_eq!(detail.ratings().server_note(ME, season("2")), None);
    assert_eq!(detail.ratings().server_note(ME, season("1")), Some(6.0));
    assert_eq!(detail.ratings().edit(), &RatingEdit::Idle);
}

#[tokio::test]
async fn deleting_the_only_season_rating_keeps_the_record() {
    let h = Harness::new(vec![series("tt2", "Dark")]);
    let mut seasons = BTreeMap::new();
    seasons.insert(
        "2".to_string(),
        SeasonRating {
            note: 8.0,
            created_at: None,
            updated_at: None,
        },
    );
    h.backend.ratings.lock().unwrap().push(Rating {
        id: 5,
        title_id: "tt2".to_string(),
        user_id: ME,
        group_id: Some(GROUP),
        note: None,
        seasons,
        created_at: None,
        updated_at: None,
    });
    let mut detail = h.open("tt2").await;

    detail.select_season(Some("2")).unwrap();
    detail.request_rating_delete(ME).unwrap();
    detail.confirm_rating_delete().await.unwrap();

    assert_eq!(h.backend.writes(), vec!["delete_rating_season 5 2"]);
    let kept = detail.ratings().ratings();
    assert_eq!(kept.len(), 1);
    assert_eq!(kept[0].id, 5);
    assert!(kept[0].seasons.is_empty());
    assert_eq!(detail.ratings().server_note(ME, season("2")), None);

    // Rating again reuses the emptied record.
    h.backend.clear_calls();
    let mut list = CountingList::default();
    detail.begin_rating_edit(ME).unwrap();
    detail.set_rating_buffer(9.0).unwrap();
    detail.save(&mut list).await.unwrap();
    assert_eq!(h.backend.writes(), vec!["update_rating 5 Some(\"2\")"]);
}

#[tokio::test]
async fn cancelled_deletes_make_no_calls() {
    let h = Harness::new(vec![movie("tt1", "Matrix")]);
    h.backend.ratings.lock().unwrap().push(Rating {
        id: 7,
        title_id: "tt1".to_string(),
        user_id: ME,
        group_id: Some(GROUP),
        note: Some(5.0),
        seasons: BTreeMap::new(),
        created_at: None,
        updated_at: None,
    });
    h.backend.comments.lock().unwrap().push(Comment {
        id: 9,
        title_id: "tt1".to_string(),
        user_id: ME,
        text: Some("classic".to_string()),
        seasons: BTreeMap::new(),
        created_at: None,
        updated_at: None,
    });
    let mut detail = h.open("tt1").await;

    detail.request_rating_delete(ME).unwrap();
    detail.cancel_rating_delete();
    detail.request_comment_delete(9).unwrap();
    detail.cancel_comment_delete();

    assert!(h.backend.calls().is_empty());
    assert_eq!(detail.ratings().ratings().len(), 1);
    assert_eq!(detail.visible_comments().len(), 1);
    assert!(detail.confirm_rating_delete().await.is_err());
    assert!(h.backend.calls().is_empty());
}

#[tokio::test]
async fn series_comment_belongs_to_the_selected_season() {
    let h = Harness::new(vec![series("tt2", "Dark")]);
    let mut detail = h.open("tt2").await;

    detail.set_comment_draft("Needs a second watch");
    assert!(detail.add_comment().await.is_err());
    assert!(h.backend.calls().is_empty());

    detail.select_season(Some("2")).unwrap();
    detail.set_comment_draft("Season two twist!");
    detail.add_comment().await.unwrap();

    assert_eq!(h.backend.writes(), vec!["create_comment tt2 Some(\"2\")"]);
    assert_eq!(detail.comments().draft(), "");
    let texts: Vec<&str> = detail.visible_comments().iter().map(|c| c.text).collect();
    assert_eq!(texts, vec!["Season two twist!"]);

    detail.select_season(Some("1")).unwrap();
    assert!(detail.visible_comments().is_empty());
    detail.select_season(None).unwrap();
    assert_eq!(detail.visible_comments()[0].season, Some("2"));
}

#[tokio::test]
async fn blank_comment_is_rejected_without_a_call() {
    let h = Harness::new(vec![movie("tt1", "Matrix")]);
    let mut detail = h.open("tt1").await;
    detail.set_comment_draft("   ");
    assert!(matches!(
        detail.add_comment().await,
        Err(ActionError::Validation(_))
    ));
    assert!(h.backend.calls().is_empty());
}

#[tokio::test]
async fn comment_edit_round_trips_through_the_server() {
    let h = Harness::new(vec![movie("tt1", "Matrix")]);
    let mut detail = h.open("tt1").await;
    detail.set_comment_draft("first take");
    detail.add_comment().await.unwrap();
    let id = detail.visible_comments()[0].id;
    h.backend.clear_calls();

    detail.begin_comment_edit(id).unwrap();
    detail.set_comment_buffer("second take").unwrap();
    detail.submit_comment_edit().await.unwrap();

    assert_eq!(h.backend.writes(), vec![format!("update_comment {id} None")]);
    assert_eq!(detail.visible_comments()[0].text, "second take");

    detail.request_comment_delete(id).unwrap();
    detail.confirm_comment_delete().await.unwrap();
    assert!(detail.visible_comments().is_empty());
}

#[tokio::test]
async fn watched_flip_and_flip_back_makes_no_call() {
    let h = Harness::new(vec![movie("tt1", "Matrix")]);
    let mut detail = h.open("tt1").await;
    let mut list = CountingList::default();

    detail.toggle_watched().unwrap();
    detail.toggle_watched().unwrap();
    let outcome = detail.save(&mut list).await.unwrap();

    assert!(!outcome.watched_updated);
    assert!(h.backend.calls().is_empty());
    assert_eq!(list.refreshes, 0);
}

#[tokio::test]
async fn watched_title_unwatched_and_rewatched_makes_no_call() {
    let dated = WatchedState {
        watched: true,
        watched_at: NaiveDate::from_ymd_opt(2024, 3, 2),
    };
    let undated = WatchedState {
        watched: true,
        watched_at: None,
    };
    for baseline in [dated, undated] {
        let mut title = movie("tt1", "Matrix");
        title.watched = baseline;
        let h = Harness::new(vec![title]);
        let mut detail = h.open("tt1").await;
        let mut list = CountingList::default();

        detail.toggle_watched().unwrap();
        assert!(detail.watched().is_dirty());
        detail.toggle_watched().unwrap();
        let outcome = detail.save(&mut list).await.unwrap();

        assert!(!outcome.watched_updated, "baseline {baseline:?}");
        assert!(h.backend.calls().is_empty(), "baseline {baseline:?}");
        assert_eq!(list.refreshes, 0);
        assert_eq!(detail.watched().working(), baseline);
    }
}

#[tokio::test]
async fn detail_starts_from_the_groups_own_record() {
    let mut title = series("tt2", "Dark");
    title.watched_seasons.insert(
        "1".to_string(),
        WatchedState {
            watched: true,
            watched_at: NaiveDate::from_ymd_opt(2024, 3, 2),
        },
    );
    let h = Harness::new(vec![title]);

    let mut detail = h.collection().open_title("tt2").await.unwrap();
    let calls = h.backend.calls();
    assert!(calls.contains(&"fetch_group_title 10 tt2".to_string()));
    assert!(!calls.iter().any(|c| c.starts_with("fetch_title")));
    detail.select_season(Some("1")).unwrap();
    assert!(detail.watched().baseline().watched);

    // A loaded page already holds the group's record.
    let mut list = h.collection();
    list.refresh().await.unwrap();
    h.backend.clear_calls();
    let mut detail = list.open_title("tt2").await.unwrap();
    let mut calls = h.backend.calls();
    calls.sort();
    assert_eq!(
        calls,
        vec!["fetch_comments 10 tt2", "fetch_ratings tt2", "fetch_users 10"]
    );
    detail.select_season(Some("1")).unwrap();
    assert!(!detail.watched().is_dirty());
    assert_eq!(
        detail.watched().baseline().watched_at,
        NaiveDate::from_ymd_opt(2024, 3, 2)
    );
}

#[tokio::test]
async fn app_opens_titles_of_the_active_group() {
    let mut title = movie("tt1", "Matrix");
    title.watched = WatchedState {
        watched: true,
        watched_at: None,
    };
    let h = Harness::new(vec![title]);
    let state = AppState::new(
        Config {
            api_url: "http://127.0.0.1:9".to_string(),
            data_dir: std::env::temp_dir(),
            request_timeout: Duration::from_secs(1),
        },
        h.backend.clone(),
        h.session.clone(),
        h.notices.clone(),
    );

    let detail = state.open_title("tt1").await.unwrap();
    assert!(detail.watched().baseline().watched);
    assert!(h.backend.calls().contains(&"fetch_group_title 10 tt1".to_string()));

    let err = state.open_title("tt404").await.unwrap_err();
    assert_eq!(err.to_string(), "Could not load title: Title not found");
}

#[tokio::test]
async fn watched_change_is_sent_and_list_refreshed() {
    let h = Harness::new(vec![series("tt2", "Dark")]);
    let mut detail = h.open("tt2").await;
    let mut list = CountingList::default();

    assert!(detail.set_watched(true).is_err());
    detail.select_season(Some("1")).unwrap();
    detail.set_watched(true).unwrap();
    let outcome = detail.save(&mut list).await.unwrap();

    assert!(outcome.watched_updated);
    assert_eq!(
        h.backend.writes(),
        vec!["update_watched_status tt2 true Some(\"1\")"]
    );
    assert_eq!(list.refreshes, 1);
    assert!(detail.title().watched_seasons["1"].watched);
    assert!(!detail.watched().is_dirty());
}

#[tokio::test]
async fn empty_series_filter_says_so_and_is_remembered() {
    let h = Harness::new(vec![movie("tt1", "Matrix")]);
    let mut list = h.collection();

    list.set_title_type(Some(TypeFilter::Series)).await.unwrap();

    assert_eq!(
        list.empty_message().as_deref(),
        Some("No series found in this collection.")
    );
    let stored = h.session.store().get("collection.filters").unwrap();
    assert!(stored.contains("\"serie\""));
    let again = h.collection();
    assert_eq!(again.prefs().title_type, Some(TypeFilter::Series));
}

#[tokio::test]
async fn empty_message_waits_for_the_first_page() {
    let h = Harness::new(vec![]);
    let mut list = h.collection();
    assert_eq!(list.empty_message(), None);

    *h.backend.movies_status.lock().unwrap() = Some(StatusCode::BAD_GATEWAY);
    assert!(list.refresh().await.is_err());
    assert_eq!(list.empty_message(), None);

    *h.backend.movies_status.lock().unwrap() = None;
    list.refresh().await.unwrap();
    assert_eq!(
        list.empty_message().as_deref(),
        Some("This collection is empty. Add a title to get started.")
    );
}

#[tokio::test]
async fn removal_keeps_the_page_when_the_reload_fails() {
    let h = Harness::new(vec![movie("tt1", "Matrix")]);
    let mut list = h.collection();
    list.set_page(1).await.unwrap();
    assert_eq!(list.titles().len(), 1);
    *h.backend.movies_status.lock().unwrap() = Some(StatusCode::BAD_GATEWAY);

    list.remove_title("tt1").await.unwrap();

    assert_eq!(h.backend.writes(), vec!["delete_movie 10 tt1"]);
    assert_eq!(list.page(), 1);

    *h.backend.movies_status.lock().unwrap() = None;
    list.remove_title("tt1").await.unwrap();
    assert_eq!(list.page(), 0);
}

#[tokio::test]
async fn failed_fetch_restores_previous_filters() {
    let h = Harness::new(vec![movie("tt1", "Matrix")]);
    let mut list = h.collection();
    list.refresh().await.unwrap();
    *h.backend.movies_status.lock().unwrap() = Some(StatusCode::BAD_GATEWAY);

    assert!(list.set_watched_filter(WatchedFilter::Watched).await.is_err());

    assert_eq!(list.prefs().watched_filter, WatchedFilter::All);
    assert_eq!(list.titles().len(), 1);
    assert!(h.session.store().get("collection.filters").is_none());
}

#[tokio::test]
async fn expired_session_asks_for_login() {
    let h = Harness::new(vec![]);
    *h.backend.movies_status.lock().unwrap() = Some(StatusCode::UNAUTHORIZED);
    let mut list = h.collection();

    let err = list.refresh().await.unwrap_err();

    assert!(matches!(err, ActionError::LoginRequired));
    assert_eq!(h.notices.drain(), vec![Notice::LoginRequired]);
}

#[tokio::test]
async fn unknown_title_preview_falls_back_to_placeholder() {
    let h = Harness::new(vec![]);
    let mut list = h.collection();

    let preview = list.preview_title("tt404").await.unwrap();
    assert!(preview.transient);
    assert!(preview.id.starts_with("local-"));

    assert!(list.add_title(&preview.id).await.is_err());
    assert!(h.backend.writes().is_empty());

    list.add_title("tt404").await.unwrap();
    assert_eq!(list.titles().len(), 1);
}
