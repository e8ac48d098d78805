//! Explicit session context: auth token, current user and active group.
//!
//! Built once at startup from the local store, filled by a successful login
//! and cleared by logout. Callers read it at call time rather than caching ids.
use crate::models::{GroupId, UserId};
use crate::storage::KeyValueStore;
use anyhow::Result;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{info, warn};

const TOKEN_KEY: &str = "session.token";
const USER_KEY: &str = "session.user_id";
const GROUP_KEY: &str = "session.group_id";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionData {
    pub token: String,
    pub user_id: UserId,
    pub group_id: Option<GroupId>,
}

pub struct Session {
    store: Arc<dyn KeyValueStore>,
    data: RwLock<Option<SessionData>>,
}

impl Session {
    /// Rehydrate from the store. A half-written session is treated as logged out.
    pub fn load(store: Arc<dyn KeyValueStore>) -> Self {
        let token = store.get(TOKEN_KEY).filter(|t| !t.is_empty());
        let user_id = store.get(USER_KEY).and_then(|v| v.parse::<UserId>().ok());
        let group_id = store.get(GROUP_KEY).and_then(|v| v.parse::<GroupId>().ok());
        let data = match (token, user_id) {
            (Some(token), Some(user_id)) => Some(SessionData {
                token,
                user_id,
                group_id,
            }),
            (Some(_), None) => {
                warn!("Stored session has a token but no user id, ignoring it");
                None
            }
            _ => None,
        };
        Self {
            store,
            data: RwLock::new(data),
        }
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    fn read(&self) -> RwLockReadGuard<'_, Option<SessionData>> {
        self.data.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Option<SessionData>> {
        self.data.write().unwrap_or_else(|p| p.into_inner())
    }

    pub fn snapshot(&self) -> Option<SessionData> {
        self.read().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.read().is_some()
    }

    pub fn token(&self) -> Option<String> {
        self.read().as_ref().map(|d| d.token.clone())
    }

    pub fn user_id(&self) -> Option<UserId> {
        self.read().as_ref().map(|d| d.user_id)
    }

    pub fn group_id(&self) -> Option<GroupId> {
        self.read().as_ref().and_then(|d| d.group_id)
    }

    /// Group id remembered from an earlier session, even while logged out.
    pub fn remembered_group(&self) -> Option<GroupId> {
        self.store
            .get(GROUP_KEY)
            .and_then(|v| v.parse::<GroupId>().ok())
    }

    pub fn begin(&self, token: String, user_id: UserId, group_id: Option<GroupId>) -> Result<()> {
        self.store.set(TOKEN_KEY, &token)?;
        self.store.set(USER_KEY, &user_id.to_string())?;
        match group_id {
            Some(g) => self.store.set(GROUP_KEY, &g.to_string())?,
            None => self.store.remove(GROUP_KEY)?,
        }
        *self.write() = Some(SessionData {
            token,
            user_id,
            group_id,
        });
        info!(user_id, group_id = ?group_id, "Session started");
        Ok(())
    }

    pub fn set_group(&self, group_id: GroupId) -> Result<()> {
        self.store.set(GROUP_KEY, &group_id.to_string())?;
        if let Some(data) = self.write().as_mut() {
            data.group_id = Some(group_id);
        }
        info!(group_id, "Active group changed");
        Ok(())
    }

    pub fn end(&self) -> Result<()> {
        self.store.remove(TOKEN_KEY)?;
        self.store.remove(USER_KEY)?;
        self.store.remove(GROUP_KEY)?;
        *self.write() = None;
        info!("Session ended");
        Ok(())
    }
}
