//! Paged, filtered and sorted view over the active group's titles.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::backend::{Gateway, MovieQuery, OrderBy};
use crate::detail::TitleDetail;
use crate::error::{ActionError, ActionResult};
use crate::models::{GroupId, MoviePage, Rating, Title, TitleType, WatchedState};
use crate::notify::Notifier;
use crate::session::Session;

pub const PAGE_SIZES: [u32; 3] = [12, 24, 48];
pub const DEFAULT_PAGE_SIZE: u32 = 24;
const FILTERS_KEY: &str = "collection.filters";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatchedFilter {
    #[default]
    All,
    Watched,
    Unwatched,
}

impl WatchedFilter {
    fn as_param(self) -> Option<bool> {
        match self {
            WatchedFilter::All => None,
            WatchedFilter::Watched => Some(true),
            WatchedFilter::Unwatched => Some(false),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeFilter {
    #[serde(rename = "serie", alias = "series")]
    Series,
    #[serde(rename = "movie")]
    Movie,
}

impl TypeFilter {
    fn title_type(self) -> TitleType {
        match self {
            TypeFilter::Series => TitleType::Series,
            TypeFilter::Movie => TitleType::Movie,
        }
    }
}

/// Filter and sort preferences, persisted between runs. Paging is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilterPrefs {
    #[serde(default)]
    pub watched_filter: WatchedFilter,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_by: Option<OrderBy>,
    #[serde(default = "default_ascending")]
    pub ascending: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title_type: Option<TypeFilter>,
}

fn default_ascending() -> bool {
    true
}

impl Default for FilterPrefs {
    fn default() -> Self {
        Self {
            watched_filter: WatchedFilter::All,
            order_by: None,
            ascending: true,
            title_type: None,
        }
    }
}

/// Anything that shows the title list and can be told to reload it.
#[async_trait]
pub trait ListRefresh: Send {
    async fn refresh_list(&mut self) -> ActionResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Params {
    page: u32,
    size: u32,
    prefs: FilterPrefs,
}

pub struct CollectionQuery {
    gateway: Arc<dyn Gateway>,
    session: Arc<Session>,
    notifier: Arc<dyn Notifier>,
    params: Params,
    current: MoviePage,
    /// Set once a page has come back from the backend.
    loaded: bool,
}

impl CollectionQuery {
    /// Build the engine with preferences rehydrated from local storage. Nothing is fetched yet.
    pub fn new(
        gateway: Arc<dyn Gateway>,
        session: Arc<Session>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let prefs = load_prefs(&session);
        Self {
            gateway,
            session,
            notifier,
            params: Params {
                page: 0,
                size: DEFAULT_PAGE_SIZE,
                prefs,
            },
            current: MoviePage::default(),
            loaded: false,
        }
    }

    pub fn prefs(&self) -> FilterPrefs {
        self.params.prefs
    }

    pub fn page(&self) -> u32 {
        self.params.page
    }

    pub fn page_size(&self) -> u32 {
        self.params.size
    }

    pub fn current(&self) -> &MoviePage {
        &self.current
    }

    pub fn titles(&self) -> &[Title] {
        &self.current.content
    }

    pub fn ratings_for(&self, title_id: &str) -> &[Rating] {
        self.current
            .ratings
            .get(title_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn query(&self) -> MovieQuery {
        let prefs = &self.params.prefs;
        MovieQuery {
            page: self.params.page,
            size: self.params.size,
            watched: prefs.watched_filter.as_param(),
            order_by: prefs.order_by,
            ascending: prefs.order_by.map(|_| prefs.ascending),
            title_type: prefs.title_type.map(TypeFilter::title_type),
        }
    }

    fn group_id(&self) -> ActionResult<GroupId> {
        if !self.session.is_authenticated() {
            return Err(ActionError::LoginRequired);
        }
        self.session.group_id().ok_or(ActionError::NoActiveGroup)
    }

    async fn fetch(&self) -> ActionResult<MoviePage> {
        let group_id = self.group_id()?;
        let query = self.query();
        debug!(group_id, ?query, "Fetching collection page");
        self.gateway
            .fetch_movies(group_id, &query)
            .await
            .map_err(|e| ActionError::from_gateway(&e, "Could not load the collection"))
    }

    /// Re-fetch the current page with the current parameters.
    pub async fn refresh(&mut self) -> ActionResult<&MoviePage> {
        match self.fetch().await {
            Ok(page) => {
                self.current = page;
                self.loaded = true;
                Ok(&self.current)
            }
            Err(e) => {
                e.report(self.notifier.as_ref());
                Err(e)
            }
        }
    }

    /// Apply a parameter change and fetch once. On failure the old parameters come back.
    async fn apply(&mut self, change: impl FnOnce(&mut Params)) -> ActionResult<()> {
        let before = self.params;
        let mut after = before;
        change(&mut after);
        if after == before {
            return Ok(());
        }
        self.params = after;
        if let Err(e) = self.refresh().await {
            self.params = before;
            return Err(e);
        }
        if after.prefs != before.prefs {
            save_prefs(&self.session, &after.prefs);
        }
        Ok(())
    }

    pub async fn set_page(&mut self, page: u32) -> ActionResult<()> {
        let last = self.current.total_pages.saturating_sub(1);
        if self.current.total_pages > 0 && page > last {
            return self.fail(ActionError::validation(format!(
                "Page {} does not exist",
                page + 1
            )));
        }
        self.apply(|p| p.page = page).await
    }

    pub async fn set_page_size(&mut self, size: u32) -> ActionResult<()> {
        if !PAGE_SIZES.contains(&size) {
            return self.fail(ActionError::validation(format!(
                "Page size must be one of {PAGE_SIZES:?}"
            )));
        }
        self.apply(|p| {
            if p.size != size {
                p.size = size;
                p.page = 0;
            }
        })
        .await
    }

    pub async fn set_watched_filter(&mut self, filter: WatchedFilter) -> ActionResult<()> {
        self.apply(|p| {
            if p.prefs.watched_filter != filter {
                p.prefs.watched_filter = filter;
                p.page = 0;
            }
        })
        .await
    }

    pub async fn set_order_by(&mut self, order_by: Option<OrderBy>) -> ActionResult<()> {
        self.apply(|p| p.prefs.order_by = order_by).await
    }

    pub async fn set_ascending(&mut self, ascending: bool) -> ActionResult<()> {
        self.apply(|p| p.prefs.ascending = ascending).await
    }

    pub async fn toggle_direction(&mut self) -> ActionResult<()> {
        let ascending = !self.params.prefs.ascending;
        self.set_ascending(ascending).await
    }

    pub async fn set_title_type(&mut self, title_type: Option<TypeFilter>) -> ActionResult<()> {
        self.apply(|p| {
            if p.prefs.title_type != title_type {
                p.prefs.title_type = title_type;
                p.page = 0;
            }
        })
        .await
    }

    /// Message to show instead of the list, or `None` when there is something to show
    /// or nothing has been loaded yet.
    pub fn empty_message(&self) -> Option<String> {
        if !self.loaded || !self.current.is_empty() {
            return None;
        }
        Some(match self.params.prefs.title_type {
            Some(TypeFilter::Series) => "No series found in this collection.".to_string(),
            Some(TypeFilter::Movie) => "No movies found in this collection.".to_string(),
            None => "This collection is empty. Add a title to get started.".to_string(),
        })
    }

    /// Look a title up before adding it. A failed lookup yields a local placeholder.
    pub async fn preview_title(&self, identifier: &str) -> ActionResult<Title> {
        let identifier = identifier.trim();
        if identifier.is_empty() {
            return Err(ActionError::validation("Enter a title identifier"));
        }
        match self.gateway.fetch_title(identifier).await {
            Ok(title) => Ok(title),
            Err(e) => {
                let action = ActionError::from_gateway(&e, "Lookup failed");
                if matches!(action, ActionError::LoginRequired) {
                    action.report(self.notifier.as_ref());
                    return Err(action);
                }
                warn!(identifier, "Title lookup failed, using placeholder: {}", e);
                Ok(fallback_title(identifier))
            }
        }
    }

    pub async fn add_title(&mut self, identifier: &str) -> ActionResult<Title> {
        let title = match self.add_title_inner(identifier).await {
            Ok(title) => title,
            Err(e) => return self.fail(e),
        };
        info!(title_id = %title.id, "Title added");
        self.notifier.success(&format!("Added \"{}\"", title.title));
        if self.refresh().await.is_err() {
            warn!("Title added but the list could not be reloaded");
        }
        Ok(title)
    }

    async fn add_title_inner(&self, identifier: &str) -> ActionResult<Title> {
        let identifier = identifier.trim();
        if identifier.is_empty() || identifier.starts_with(LOCAL_ID_PREFIX) {
            return Err(ActionError::validation(
                "Only titles known to the backend can be added",
            ));
        }
        let group_id = self.group_id()?;
        self.gateway
            .add_movie(group_id, identifier)
            .await
            .map_err(|e| ActionError::from_gateway(&e, "Could not add title"))
    }

    /// Open a title's detail view from the active group's record of it. The loaded
    /// page is used when it holds the title, otherwise the group's copy is fetched.
    pub async fn open_title(&self, title_id: &str) -> ActionResult<TitleDetail> {
        let title = match self.titles().iter().find(|t| t.id == title_id) {
            Some(title) => title.clone(),
            None => match self.fetch_group_title(title_id).await {
                Ok(title) => title,
                Err(e) => return self.fail(e),
            },
        };
        TitleDetail::open(
            self.gateway.clone(),
            self.session.clone(),
            self.notifier.clone(),
            title,
        )
        .await
    }

    async fn fetch_group_title(&self, title_id: &str) -> ActionResult<Title> {
        let group_id = self.group_id()?;
        debug!(group_id, title_id, "Loading title");
        self.gateway
            .fetch_group_title(group_id, title_id)
            .await
            .map_err(|e| ActionError::from_gateway(&e, "Could not load title"))
    }

    pub async fn remove_title(&mut self, title_id: &str) -> ActionResult<()> {
        let group_id = match self.group_id() {
            Ok(id) => id,
            Err(e) => return self.fail(e),
        };
        if let Err(e) = self.gateway.delete_movie(group_id, title_id).await {
            return self.fail(ActionError::from_gateway(&e, "Could not remove title"));
        }
        info!(title_id, group_id, "Title removed");
        self.notifier.success("Title removed");
        // Step back when the last title of a trailing page goes away.
        let page = self.params.page;
        if self.current.content.len() == 1 && page > 0 {
            self.params.page -= 1;
        }
        if self.refresh().await.is_err() {
            self.params.page = page;
            warn!("Title removed but the list could not be reloaded");
        }
        Ok(())
    }

    fn fail<T>(&self, err: ActionError) -> ActionResult<T> {
        err.report(self.notifier.as_ref());
        Err(err)
    }
}

#[async_trait]
impl ListRefresh for CollectionQuery {
    async fn refresh_list(&mut self) -> ActionResult<()> {
        self.refresh().await.map(|_| ())
    }
}

const LOCAL_ID_PREFIX: &str = "local-";

fn fallback_title(identifier: &str) -> Title {
    Title {
        id: format!("{LOCAL_ID_PREFIX}{}", Uuid::new_v4()),
        title: identifier.to_string(),
        year: None,
        poster: None,
        external_rating: None,
        plot: None,
        genre: None,
        director: None,
        actors: None,
        title_type: TitleType::Movie,
        runtime: None,
        seasons: Vec::new(),
        episodes: Vec::new(),
        watched: WatchedState::default(),
        watched_seasons: Default::default(),
        added_at: None,
        transient: true,
    }
}

fn load_prefs(session: &Session) -> FilterPrefs {
    match session.store().get(FILTERS_KEY) {
        Some(raw) => serde_json::from_str(&raw).unwrap_or_else(|e| {
            warn!("Ignoring stored filter preferences: {}", e);
            FilterPrefs::default()
        }),
        None => FilterPrefs::default(),
    }
}

fn save_prefs(session: &Session, prefs: &FilterPrefs) {
    let result = serde_json::to_string(prefs)
        .map_err(anyhow::Error::from)
        .and_then(|json| session.store().set(FILTERS_KEY, &json));
    if let Err(e) = result {
        warn!("Could not persist filter preferences: {}", e);
    }
}
