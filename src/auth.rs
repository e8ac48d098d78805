use tracing::{info, warn};

use crate::backend::{Gateway, NewUser};
use crate::error::{ActionError, ActionResult};
use crate::models::{Group, GroupId, LoginGrant, User, UserId};
use crate::session::Session;

fn persist(result: anyhow::Result<()>) -> ActionResult<()> {
    result.map_err(|e| ActionError::Backend(format!("Could not save session locally: {e}")))
}

/// Active group after login: the remembered one if still a member, else the only one.
fn pick_group(groups: &[Group], remembered: Option<GroupId>) -> Option<GroupId> {
    if let Some(id) = remembered.filter(|id| groups.iter().any(|g| g.id == *id)) {
        return Some(id);
    }
    match groups {
        [only] => Some(only.id),
        _ => None,
    }
}

pub async fn login(
    gateway: &dyn Gateway,
    session: &Session,
    username_or_email: &str,
    password: &str,
) -> ActionResult<LoginGrant> {
    let identifier = username_or_email.trim();
    if identifier.is_empty() || password.is_empty() {
        return Err(ActionError::validation(
            "Username or email and password are required",
        ));
    }
    let grant = gateway
        .login(identifier, password)
        .await
        .map_err(|e| match ActionError::from_gateway(&e, "Login failed") {
            ActionError::LoginRequired => ActionError::Validation("Invalid credentials".to_string()),
            other => other,
        })?;
    let group = pick_group(&grant.groups, session.remembered_group());
    persist(session.begin(grant.access_token.clone(), grant.user_id, group))?;
    info!(user = %grant.username, group_id = ?group, "Logged in");
    Ok(grant)
}

pub fn logout(session: &Session) -> ActionResult<()> {
    persist(session.end())
}

pub async fn register(gateway: &dyn Gateway, user: &NewUser) -> ActionResult<User> {
    if user.password.is_empty() {
        return Err(ActionError::validation("A password is required"));
    }
    let has_identity = [&user.username, &user.email]
        .iter()
        .any(|v| v.as_deref().is_some_and(|s| !s.trim().is_empty()));
    if !has_identity {
        return Err(ActionError::validation("A username or an email is required"));
    }
    gateway
        .create_user(user)
        .await
        .map_err(|e| ActionError::from_gateway(&e, "Could not create account"))
}

fn require_user(session: &Session) -> ActionResult<UserId> {
    session.user_id().ok_or(ActionError::LoginRequired)
}

pub async fn current_user(gateway: &dyn Gateway, session: &Session) -> ActionResult<User> {
    let user_id = require_user(session)?;
    gateway
        .fetch_user_by_id(user_id)
        .await
        .map_err(|e| ActionError::from_gateway(&e, "Could not load profile"))
}

/// Make `group_id` the active group after checking the user belongs to it.
pub async fn select_group(
    gateway: &dyn Gateway,
    session: &Session,
    group_id: GroupId,
) -> ActionResult<Group> {
    let user = current_user(gateway, session).await?;
    let Some(group) = user.groups.into_iter().find(|g| g.id == group_id) else {
        warn!(group_id, user_id = user.id, "Refusing to select foreign group");
        return Err(ActionError::NotFound(format!(
            "You are not a member of group {group_id}"
        )));
    };
    persist(session.set_group(group_id))?;
    Ok(group)
}

pub async fn create_group(
    gateway: &dyn Gateway,
    session: &Session,
    name: &str,
) -> ActionResult<Group> {
    require_user(session)?;
    let name = name.trim();
    if name.is_empty() {
        return Err(ActionError::validation("Group name cannot be empty"));
    }
    let group = gateway
        .create_group(name)
        .await
        .map_err(|e| ActionError::from_gateway(&e, "Could not create group"))?;
    persist(session.set_group(group.id))?;
    info!(group_id = group.id, name = %group.name, "Group created");
    Ok(group)
}

pub async fn active_group(gateway: &dyn Gateway, session: &Session) -> ActionResult<Group> {
    let group_id = session.group_id().ok_or(ActionError::NoActiveGroup)?;
    gateway
        .fetch_group_by_id(group_id)
        .await
        .map_err(|e| ActionError::from_gateway(&e, "Could not load group"))
}
