mod validate;

pub use validate::{Mode, ValidationErrors, missing_container};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, Serializer};
use utoipa::ToSchema;

use crate::models::{Folder, FolderId, FolderTree, Note, NoteId, UserId};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

fn serialize_timestamp<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&ts.format(TIMESTAMP_FORMAT))
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct NoteSummary {
    /// Note ID
    pub pk: NoteId,
    pub title: String,
    /// Containing folder, `null` when the note is not in a folder
    pub container: Option<FolderId>,
    #[serde(serialize_with = "serialize_timestamp")]
    pub created: DateTime<Utc>,
    #[serde(serialize_with = "serialize_timestamp")]
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct NoteDetail {
    /// Note ID
    pub pk: NoteId,
    pub title: String,
    pub content: String,
    /// Containing folder, `null` when the note is not in a folder
    pub container: Option<FolderId>,
    /// Owning user, always the caller
    pub owner: UserId,
    #[serde(serialize_with = "serialize_timestamp")]
    pub created: DateTime<Utc>,
    #[serde(serialize_with = "serialize_timestamp")]
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FolderSummary {
    /// Folder ID
    pub pk: FolderId,
    pub title: String,
    /// Parent folder, `null` for top-level folders
    pub container: Option<FolderId>,
    #[serde(serialize_with = "serialize_timestamp")]
    pub created: DateTime<Utc>,
    #[serde(serialize_with = "serialize_timestamp")]
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FolderDetail {
    /// Folder ID
    pub pk: FolderId,
    pub title: String,
    /// Parent folder, `null` for top-level folders
    pub container: Option<FolderId>,
    /// Owning user, always the caller
    pub owner: UserId,
    /// Notes directly inside this folder
    pub notes: Vec<NoteSummary>,
    /// Folders directly inside this folder
    pub folders: Vec<FolderSummary>,
    #[serde(serialize_with = "serialize_timestamp")]
    pub created: DateTime<Utc>,
    #[serde(serialize_with = "serialize_timestamp")]
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct NoteList {
    pub notes: Vec<NoteSummary>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FolderList {
    pub folders: Vec<FolderSummary>,
}

/// Body of note POST, PUT and PATCH requests. Read-only fields (`pk`, `owner`,
/// `created`, `updated`) are accepted and ignored.
///
/// Every field keeps absent (`None`) apart from `null` (`Some(None)`) so the
/// validator can tell a missing field from an explicit null.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct NotePayload {
    /// Required on create and full update, at most 30 characters
    #[serde(default, with = "serde_with::rust::double_option")]
    #[schema(value_type = Option<String>)]
    pub title: Option<Option<String>>,
    /// Required on create and full update
    #[serde(default, with = "serde_with::rust::double_option")]
    #[schema(value_type = Option<String>)]
    pub content: Option<Option<String>>,
    /// Existing folder ID or `null`
    #[serde(default, with = "serde_with::rust::double_option")]
    #[schema(value_type = Option<i64>)]
    pub container: Option<Option<ContainerRef>>,
}

/// Body of folder POST, PUT and PATCH requests. Read-only fields are ignored.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct FolderPayload {
    /// Required on create and full update, at most 30 characters
    #[serde(default, with = "serde_with::rust::double_option")]
    #[schema(value_type = Option<String>)]
    pub title: Option<Option<String>>,
    /// Existing folder ID or `null`
    #[serde(default, with = "serde_with::rust::double_option")]
    #[schema(value_type = Option<i64>)]
    pub container: Option<Option<ContainerRef>>,
}

/// A container id as clients send it: a JSON integer, the same id as a
/// string, or anything else, which validation reports on the `container` field.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ContainerRef {
    Id(FolderId),
    Text(String),
    Other(serde_json::Value),
}

impl From<FolderId> for ContainerRef {
    fn from(id: FolderId) -> Self {
        Self::Id(id)
    }
}

impl From<Note> for NoteSummary {
    fn from(note: Note) -> Self {
        Self {
            pk: note.id,
            title: note.title,
            container: note.container,
            created: note.created,
            updated: note.updated,
        }
    }
}

impl From<Note> for NoteDetail {
    fn from(note: Note) -> Self {
        Self {
            pk: note.id,
            title: note.title,
            content: note.content,
            container: note.container,
            owner: note.owner,
            created: note.created,
            updated: note.updated,
        }
    }
}

impl From<Folder> for FolderSummary {
    fn from(folder: Folder) -> Self {
        Self {
            pk: folder.id,
            title: folder.title,
            container: folder.container,
            created: folder.created,
            updated: folder.updated,
        }
    }
}

impl From<FolderTree> for FolderDetail {
    fn from(tree: FolderTree) -> Self {
        let FolderTree {
            folder,
            notes,
            folders,
        } = tree;

        Self {
            pk: folder.id,
            title: folder.title,
            container: folder.container,
            owner: folder.owner,
            notes: notes.into_iter().map(NoteSummary::from).collect(),
            folders: folders.into_iter().map(FolderSummary::from).collect(),
            created: folder.created,
            updated: folder.updated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{TimeZone, Timelike};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn timestamps_use_microseconds_and_z_suffix() {
        let ts = Utc
            .with_ymd_and_hms(2018, 9, 4, 16, 30, 28)
            .unwrap()
            .with_nanosecond(469_865_000)
            .unwrap();
        let note = Note {
            id: 3,
            title: "t".to_string(),
            content: "c".to_string(),
            container: None,
            owner: 1,
            created: ts,
            updated: ts,
        };

        let value = serde_json::to_value(NoteSummary::from(note)).unwrap();

        assert_eq!(
            value,
            json!({
                "pk": 3,
                "title": "t",
                "container": null,
                "created": "2018-09-04T16:30:28.469865Z",
                "updated": "2018-09-04T16:30:28.469865Z",
            })
        );
    }

    #[test]
    fn payload_distinguishes_null_from_absent_container() {
        let absent: FolderPayload = serde_json::from_value(json!({"title": "t"})).unwrap();
        assert_eq!(absent.container, None);

        let null: FolderPayload = serde_json::from_value(json!({"container": null})).unwrap();
        assert_eq!(null.container, Some(None));

        let set: FolderPayload = serde_json::from_value(json!({"container": 4})).unwrap();
        assert_eq!(set.container, Some(Some(ContainerRef::Id(4))));
    }

    #[test]
    fn container_accepts_strings_and_keeps_other_values_for_validation() {
        let text: FolderPayload = serde_json::from_value(json!({"container": "4"})).unwrap();
        assert_eq!(text.container, Some(Some(ContainerRef::Text("4".to_string()))));

        let flag: NotePayload = serde_json::from_value(json!({"container": true})).unwrap();
        assert_eq!(flag.container, Some(Some(ContainerRef::Other(json!(true)))));
    }

    #[test]
    fn payload_distinguishes_null_from_absent_title() {
        let null: FolderPayload = serde_json::from_value(json!({"title": null})).unwrap();
        assert_eq!(null.title, Some(None));

        let absent: FolderPayload = serde_json::from_value(json!({})).unwrap();
        assert_eq!(absent.title, None);
    }

    #[test]
    fn payload_ignores_read_only_fields() {
        let payload: NotePayload = serde_json::from_value(json!({
            "pk": 99,
            "owner": 12,
            "created": "2000-01-01T00:00:00.000000Z",
            "title": "kept",
        }))
        .unwrap();

        assert_eq!(payload.title, Some(Some("kept".to_string())));
        assert_eq!(payload.content, None);
    }
}
