use serde::Serialize;
use serde_json::Value;

use std::{collections::BTreeMap, fmt};

use crate::{
    dto::{ContainerRef, FolderPayload, NotePayload},
    models::{FolderChanges, FolderId, NewFolder, NewNote, NoteChanges},
};

pub const TITLE_MAX_CHARS: usize = 30;

const REQUIRED: &str = "This field is required.";
const BLANK: &str = "This field may not be blank.";
const NULL: &str = "This field may not be null.";

/// How much of a payload must be present.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// POST: every required field.
    Create,
    /// PUT: every required field, container optional.
    Replace,
    /// PATCH: any subset.
    Partial,
}

impl Mode {
    const fn requires_all(self) -> bool {
        matches!(self, Self::Create | Self::Replace)
    }
}

/// Field name to messages, serialized as `{"title": ["This field is required."]}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn field(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    fn into_result<T>(self, value: T) -> Result<T, Self> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            for message in messages {
                if !first {
                    f.write_str("; ")?;
                }
                write!(f, "{field}: {message}")?;
                first = false;
            }
        }
        Ok(())
    }
}

fn text(
    field: &str,
    value: Option<Option<String>>,
    mode: Mode,
    errors: &mut ValidationErrors,
) -> Option<String> {
    let value = match value {
        None => {
            if mode.requires_all() {
                errors.add(field, REQUIRED);
            }
            return None;
        }
        Some(None) => {
            errors.add(field, NULL);
            return None;
        }
        Some(Some(value)) => value,
    };

    let value = value.trim();
    if value.is_empty() {
        errors.add(field, BLANK);
        return None;
    }

    Some(value.to_string())
}

fn title(
    value: Option<Option<String>>,
    mode: Mode,
    errors: &mut ValidationErrors,
) -> Option<String> {
    let value = text("title", value, mode, errors)?;
    if value.chars().count() > TITLE_MAX_CHARS {
        errors.add(
            "title",
            format!("Ensure this field has no more than {TITLE_MAX_CHARS} characters."),
        );
        return None;
    }

    Some(value)
}

/// `None` when absent or invalid, `Some(None)` for an explicit `null`.
fn container(
    value: Option<Option<ContainerRef>>,
    errors: &mut ValidationErrors,
) -> Option<Option<FolderId>> {
    match value? {
        None => Some(None),
        Some(reference) => match reference.id() {
            Ok(id) => Some(Some(id)),
            Err(message) => {
                errors.add("container", message);
                None
            }
        },
    }
}

impl ContainerRef {
    fn id(&self) -> Result<FolderId, String> {
        match self {
            Self::Id(id) => Ok(*id),
            Self::Text(text) => text.trim().parse().map_err(|_| incorrect_type("str")),
            Self::Other(Value::Number(number)) => Err(missing_container(number)),
            Self::Other(Value::Bool(_)) => Err(incorrect_type("bool")),
            Self::Other(Value::Array(_)) => Err(incorrect_type("list")),
            Self::Other(_) => Err(incorrect_type("dict")),
        }
    }
}

fn incorrect_type(received: &str) -> String {
    format!("Incorrect type. Expected pk value, received {received}.")
}

/// Message for a well-formed container id that names no folder of the caller.
pub fn missing_container(id: impl fmt::Display) -> String {
    format!("Invalid pk \"{id}\" - object does not exist.")
}

impl NotePayload {
    pub fn into_new(self) -> Result<NewNote, ValidationErrors> {
        let mut errors = ValidationErrors::default();
        let title = title(self.title, Mode::Create, &mut errors);
        let content = text("content", self.content, Mode::Create, &mut errors);
        let container = container(self.container, &mut errors);

        match (title, content) {
            (Some(title), Some(content)) => errors.into_result(NewNote {
                title,
                content,
                container: container.flatten(),
            }),
            _ => Err(errors),
        }
    }

    pub fn into_changes(self, mode: Mode) -> Result<NoteChanges, ValidationErrors> {
        let mut errors = ValidationErrors::default();
        let changes = NoteChanges {
            title: title(self.title, mode, &mut errors),
            content: text("content", self.content, mode, &mut errors),
            container: container(self.container, &mut errors),
        };

        errors.into_result(changes)
    }
}

impl FolderPayload {
    pub fn into_new(self) -> Result<NewFolder, ValidationErrors> {
        let mut errors = ValidationErrors::default();
        let title = title(self.title, Mode::Create, &mut errors);
        let container = container(self.container, &mut errors);

        match title {
            Some(title) => errors.into_result(NewFolder {
                title,
                container: container.flatten(),
            }),
            None => Err(errors),
        }
    }

    pub fn into_changes(self, mode: Mode) -> Result<FolderChanges, ValidationErrors> {
        let mut errors = ValidationErrors::default();
        let changes = FolderChanges {
            title: title(self.title, mode, &mut errors),
            container: container(self.container, &mut errors),
        };

        errors.into_result(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    fn note_payload(title: Option<&str>, content: Option<&str>) -> NotePayload {
        NotePayload {
            title: title.map(|t| Some(t.to_string())),
            content: content.map(|c| Some(c.to_string())),
            container: None,
        }
    }

    #[test]
    fn create_requires_title_and_content() {
        let errors = note_payload(None, None).into_new().unwrap_err();
        assert_eq!(errors.field("title"), Some(&[REQUIRED.to_string()][..]));
        assert_eq!(errors.field("content"), Some(&[REQUIRED.to_string()][..]));

        let errors = note_payload(Some("t"), None).into_new().unwrap_err();
        assert!(errors.field("title").is_none());
        assert!(errors.field("content").is_some());
    }

    #[test]
    fn title_is_trimmed_and_bounded() {
        let note = note_payload(Some("  padded  "), Some("c")).into_new().unwrap();
        assert_eq!(note.title, "padded");

        let exact = "x".repeat(TITLE_MAX_CHARS);
        assert!(note_payload(Some(&exact), Some("c")).into_new().is_ok());

        let long = "x".repeat(TITLE_MAX_CHARS + 1);
        let errors = note_payload(Some(&long), Some("c")).into_new().unwrap_err();
        assert!(errors.field("title").is_some());

        let errors = note_payload(Some("   "), Some("c")).into_new().unwrap_err();
        assert_eq!(errors.field("title"), Some(&[BLANK.to_string()][..]));
    }

    #[test]
    fn title_length_counts_characters_not_bytes() {
        let wide = "é".repeat(TITLE_MAX_CHARS);
        assert!(note_payload(Some(&wide), Some("c")).into_new().is_ok());
    }

    #[test]
    fn partial_update_accepts_any_subset() {
        let changes = note_payload(None, None).into_changes(Mode::Partial).unwrap();
        assert_eq!(changes, NoteChanges::default());

        let changes = note_payload(Some("new"), None)
            .into_changes(Mode::Partial)
            .unwrap();
        assert_eq!(changes.title.as_deref(), Some("new"));
        assert_eq!(changes.content, None);
    }

    #[test]
    fn replace_requires_all_but_container() {
        assert!(note_payload(Some("t"), None).into_changes(Mode::Replace).is_err());

        let changes = note_payload(Some("t"), Some("c"))
            .into_changes(Mode::Replace)
            .unwrap();
        assert_eq!(changes.container, None);

        let folder = FolderPayload {
            title: None,
            container: Some(None),
        };
        let errors = folder.into_changes(Mode::Replace).unwrap_err();
        assert!(errors.field("title").is_some());
    }

    #[test]
    fn null_container_on_create_means_top_level() {
        let folder = FolderPayload {
            title: Some(Some("t".to_string())),
            container: Some(None),
        }
        .into_new()
        .unwrap();
        assert_eq!(folder.container, None);
    }

    #[test]
    fn content_is_trimmed_like_title() {
        let note = note_payload(Some("t"), Some("  body\n")).into_new().unwrap();
        assert_eq!(note.content, "body");

        let errors = note_payload(Some("t"), Some(" \t ")).into_new().unwrap_err();
        assert_eq!(errors.field("content"), Some(&[BLANK.to_string()][..]));
    }

    #[test]
    fn null_text_fields_are_rejected_even_on_partial_update() {
        let payload = NotePayload {
            title: Some(None),
            content: Some(None),
            container: None,
        };
        let errors = payload.into_changes(Mode::Partial).unwrap_err();
        assert_eq!(errors.field("title"), Some(&[NULL.to_string()][..]));
        assert_eq!(errors.field("content"), Some(&[NULL.to_string()][..]));
    }

    #[test]
    fn container_ids_may_be_sent_as_strings() {
        let folder = FolderPayload {
            title: Some(Some("t".to_string())),
            container: Some(Some(ContainerRef::Text(" 7 ".to_string()))),
        }
        .into_new()
        .unwrap();
        assert_eq!(folder.container, Some(7));

        let changes = FolderPayload {
            title: None,
            container: Some(Some(ContainerRef::Id(3))),
        }
        .into_changes(Mode::Partial)
        .unwrap();
        assert_eq!(changes.container, Some(Some(3)));
    }

    #[test]
    fn malformed_container_is_a_container_error() {
        let errors = FolderPayload {
            title: Some(Some("t".to_string())),
            container: Some(Some(ContainerRef::Text("abc".to_string()))),
        }
        .into_new()
        .unwrap_err();
        assert_eq!(
            errors.field("container"),
            Some(&["Incorrect type. Expected pk value, received str.".to_string()][..])
        );

        let errors = NotePayload {
            title: None,
            content: None,
            container: Some(Some(ContainerRef::Other(Value::Bool(true)))),
        }
        .into_changes(Mode::Partial)
        .unwrap_err();
        assert_eq!(
            errors.field("container"),
            Some(&["Incorrect type. Expected pk value, received bool.".to_string()][..])
        );
    }

    #[test]
    fn errors_display_every_message() {
        let mut errors = ValidationErrors::single("title", REQUIRED);
        errors.add("content", BLANK);
        assert_eq!(
            errors.to_string(),
            "content: This field may not be blank.; title: This field is required."
        );
    }
}
