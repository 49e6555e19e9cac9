//! Caller resolution and the two permission guards.
//!
//! Every request passes authentication first and then the capability check,
//! both before any record is looked up. Ownership is a separate concern handled
//! by [`crate::scope`].

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use std::{fmt, str::FromStr, sync::Arc};

use crate::{models::User, service::NotebookService, service::ServiceError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Action {
    Add,
    Change,
    Delete,
    View,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EntityKind {
    Note,
    Folder,
}

/// Coarse-grained capability such as `add_note` or `view_folder`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Permission {
    pub action: Action,
    pub kind: EntityKind,
}

impl Permission {
    pub const fn new(action: Action, kind: EntityKind) -> Self {
        Self { action, kind }
    }

    pub fn all() -> impl Iterator<Item = Self> {
        [EntityKind::Note, EntityKind::Folder]
            .into_iter()
            .flat_map(|kind| {
                [Action::Add, Action::Change, Action::Delete, Action::View]
                    .into_iter()
                    .map(move |action| Self::new(action, kind))
            })
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let action = match self.action {
            Action::Add => "add",
            Action::Change => "change",
            Action::Delete => "delete",
            Action::View => "view",
        };
        let kind = match self.kind {
            EntityKind::Note => "note",
            EntityKind::Folder => "folder",
        };
        write!(f, "{action}_{kind}")
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown permission codename: {0}")]
pub struct UnknownPermission(String);

impl FromStr for Permission {
    type Err = UnknownPermission;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let unknown = || UnknownPermission(s.to_string());
        let (action, kind) = s.split_once('_').ok_or_else(unknown)?;

        let action = match action {
            "add" => Action::Add,
            "change" => Action::Change,
            "delete" => Action::Delete,
            "view" => Action::View,
            _ => return Err(unknown()),
        };
        let kind = match kind {
            "note" => EntityKind::Note,
            "folder" => EntityKind::Folder,
            _ => return Err(unknown()),
        };

        Ok(Self::new(action, kind))
    }
}

impl TryFrom<String> for Permission {
    type Error = UnknownPermission;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Permission> for String {
    fn from(value: Permission) -> Self {
        value.to_string()
    }
}

/// The identity behind a request, if it presented a valid token.
#[derive(Debug, Clone, Default)]
pub struct Caller(Option<User>);

impl Caller {
    pub const fn anonymous() -> Self {
        Self(None)
    }

    pub const fn user(user: User) -> Self {
        Self(Some(user))
    }

    /// Authentication guard.
    pub fn authenticated(self) -> Result<User, ServiceError> {
        self.0.ok_or(ServiceError::AuthenticationRequired)
    }

    /// Authentication guard followed by the capability guard.
    pub fn require(self, permission: Permission) -> Result<User, ServiceError> {
        let user = self.authenticated()?;

        if !user.has_permission(permission) {
            tracing::debug!("user '{}' lacks '{}'", user.username, permission);
            return Err(ServiceError::AuthorizationDenied(permission));
        }

        Ok(user)
    }
}

/// Extracts the key from an `Authorization: Token <key>` header.
fn token_from_parts(parts: &Parts) -> Option<&str> {
    let value = parts.headers.get(AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.trim().split_once(' ')?;

    if !scheme.eq_ignore_ascii_case("token") {
        return None;
    }

    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

impl FromRequestParts<Arc<NotebookService>> for Caller {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        service: &Arc<NotebookService>,
    ) -> Result<Self, Self::Rejection> {
        let Some(token) = token_from_parts(parts) else {
            return Ok(Self::anonymous());
        };

        match service.resolve_token(token).await {
            Ok(user) => Ok(Self(user)),
            Err(e) => Err(e.into_response()),
        }
    }
}
