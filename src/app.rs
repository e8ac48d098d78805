use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;

use crate::backend::{Gateway, HttpGateway};
use crate::collection::CollectionQuery;
use crate::config::Config;
use crate::detail::TitleDetail;
use crate::error::ActionResult;
use crate::notify::{LogNotifier, Notifier};
use crate::session::Session;
use crate::storage::{FileStore, KeyValueStore};

/// Shared handles every view is built from.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub gateway: Arc<dyn Gateway>,
    pub session: Arc<Session>,
    pub notifier: Arc<dyn Notifier>,
}

impl AppState {
    /// Wire the HTTP gateway and the on-disk session store from `config`.
    pub fn from_config(config: Config) -> Result<Self> {
        let store: Arc<dyn KeyValueStore> = Arc::new(
            FileStore::open(&config.data_dir)
                .with_context(|| format!("Failed to open data dir {}", config.data_dir.display()))?,
        );
        let session = Arc::new(Session::load(store));
        let gateway: Arc<dyn Gateway> = Arc::new(HttpGateway::new(&config, session.clone())?);
        info!(
            api_url = %config.api_url,
            logged_in = session.is_authenticated(),
            "Client ready"
        );
        Ok(Self::new(config, gateway, session, Arc::new(LogNotifier)))
    }

    pub fn new(
        config: Config,
        gateway: Arc<dyn Gateway>,
        session: Arc<Session>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            gateway,
            session,
            notifier,
        }
    }

    pub fn collection(&self) -> CollectionQuery {
        CollectionQuery::new(
            self.gateway.clone(),
            self.session.clone(),
            self.notifier.clone(),
        )
    }

    /// Open the detail view of a title in the active group.
    pub async fn open_title(&self, title_id: &str) -> ActionResult<TitleDetail> {
        self.collection().open_title(title_id).await
    }
}
