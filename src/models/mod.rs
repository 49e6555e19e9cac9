use chrono::{DateTime, Duration, SubsecRound, Utc};

use std::collections::BTreeSet;

use crate::auth::Permission;

pub type UserId = i64;
pub type FolderId = i64;
pub type NoteId = i64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub username: String,
    pub permissions: BTreeSet<Permission>,
}

impl User {
    pub fn has_permission(&self, permission: Permission) -> bool {
        self.permissions.contains(&permission)
    }
}

/// User record as loaded from configuration, before it has an id.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub token: String,
    pub permissions: BTreeSet<Permission>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folder {
    pub id: FolderId,
    pub title: String,
    pub container: Option<FolderId>,
    pub owner: UserId,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub id: NoteId,
    pub title: String,
    pub content: String,
    pub container: Option<FolderId>,
    pub owner: UserId,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

/// A folder together with its immediate children.
#[derive(Debug, Clone)]
pub struct FolderTree {
    pub folder: Folder,
    pub notes: Vec<Note>,
    pub folders: Vec<Folder>,
}

#[derive(Debug, Clone)]
pub struct NewFolder {
    pub title: String,
    pub container: Option<FolderId>,
}

#[derive(Debug, Clone)]
pub struct NewNote {
    pub title: String,
    pub content: String,
    pub container: Option<FolderId>,
}

/// Field changes for a folder. `None` leaves the field untouched,
/// `container: Some(None)` moves the folder to the top level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FolderChanges {
    pub title: Option<String>,
    pub container: Option<Option<FolderId>>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NoteChanges {
    pub title: Option<String>,
    pub content: Option<String>,
    pub container: Option<Option<FolderId>>,
}

/// Current time at the precision the store keeps.
pub fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Next `updated` value for a record last touched at `previous`.
/// Always strictly later, even if the clock has not advanced.
pub fn touch(previous: DateTime<Utc>) -> DateTime<Utc> {
    now().max(previous + Duration::microseconds(1))
}
