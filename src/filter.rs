//! Query filters for listings and the committed listing order.
//!
//! All matching is case-insensitive substring containment. Filters that are
//! supplied together are ANDed; `search` alone ORs across the searchable fields.

use chrono::{DateTime, Utc};
use utoipa::IntoParams;

use std::cmp::Ordering;

use crate::models::{Folder, Note};

#[derive(Debug, Clone, Default, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NoteFilter {
    /// Matches notes whose title or content contains the value
    pub search: Option<String>,
    /// Matches notes whose title contains the value
    pub title: Option<String>,
    /// Matches notes whose content contains the value
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct FolderFilter {
    /// Matches folders whose title contains the value
    pub search: Option<String>,
    /// Matches folders whose title contains the value
    pub title: Option<String>,
}

impl NoteFilter {
    /// Builds the filter from raw query pairs. Unknown keys are ignored and a
    /// repeated key keeps its last value.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut filter = Self::default();
        for (key, value) in pairs {
            match key.as_str() {
                "search" => filter.search = Some(value),
                "title" => filter.title = Some(value),
                "content" => filter.content = Some(value),
                _ => {}
            }
        }
        filter
    }

    pub fn matches(&self, note: &Note) -> bool {
        let search = self.search.as_deref().is_none_or(|q| {
            contains_ignore_case(&note.title, q) || contains_ignore_case(&note.content, q)
        });
        let title = self
            .title
            .as_deref()
            .is_none_or(|q| contains_ignore_case(&note.title, q));
        let content = self
            .content
            .as_deref()
            .is_none_or(|q| contains_ignore_case(&note.content, q));

        search && title && content
    }

    /// Conditions as `(columns, pattern)` pairs: a row passes a condition when
    /// any of its columns matches the pattern, and must pass all conditions.
    pub fn conditions(&self) -> Vec<(&'static [&'static str], String)> {
        let mut conditions: Vec<(&'static [&'static str], String)> = Vec::new();

        if let Some(q) = &self.search {
            conditions.push((&["title", "content"], like_pattern(q)));
        }
        if let Some(q) = &self.title {
            conditions.push((&["title"], like_pattern(q)));
        }
        if let Some(q) = &self.content {
            conditions.push((&["content"], like_pattern(q)));
        }

        conditions
    }
}

impl FolderFilter {
    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut filter = Self::default();
        for (key, value) in pairs {
            match key.as_str() {
                "search" => filter.search = Some(value),
                "title" => filter.title = Some(value),
                _ => {}
            }
        }
        filter
    }

    pub fn matches(&self, folder: &Folder) -> bool {
        [&self.search, &self.title]
            .into_iter()
            .flatten()
            .all(|q| contains_ignore_case(&folder.title, q))
    }

    pub fn conditions(&self) -> Vec<(&'static [&'static str], String)> {
        [&self.search, &self.title]
            .into_iter()
            .flatten()
            .map(|q| (&["title"] as &'static [&'static str], like_pattern(q)))
            .collect()
    }
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

/// Wraps `needle` for `ILIKE`, escaping the wildcard characters.
pub fn like_pattern(needle: &str) -> String {
    let mut pattern = String::with_capacity(needle.len() + 2);
    pattern.push('%');
    for c in needle.chars() {
        if matches!(c, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

/// SQL `ORDER BY` clause matching [`listing_order`].
pub const ORDER_BY: &str = r#"ORDER BY title COLLATE "C" ASC, updated DESC, id ASC"#;

pub trait Listed {
    fn id(&self) -> i64;
    fn title(&self) -> &str;
    fn updated(&self) -> DateTime<Utc>;
}

impl Listed for Note {
    fn id(&self) -> i64 {
        self.id
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn updated(&self) -> DateTime<Utc> {
        self.updated
    }
}

impl Listed for Folder {
    fn id(&self) -> i64 {
        self.id
    }

    fn title(&self) -> &str {
        &self.title
    }

    fn updated(&self) -> DateTime<Utc> {
        self.updated
    }
}

/// Title ascending, most recently updated first among equal titles.
pub fn listing_order<T: Listed>(a: &T, b: &T) -> Ordering {
    a.title()
        .cmp(b.title())
        .then_with(|| b.updated().cmp(&a.updated()))
        .then_with(|| a.id().cmp(&b.id()))
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::Duration;
    use pretty_assertions::assert_eq;

    use crate::models::now;

    fn note(id: i64, title: &str, content: &str) -> Note {
        let ts = now();
        Note {
            id,
            title: title.to_string(),
            content: content.to_string(),
            container: None,
            owner: 1,
            created: ts,
            updated: ts,
        }
    }

    fn titles(notes: &[Note], filter: &NoteFilter) -> Vec<String> {
        let mut matched: Vec<Note> = notes.iter().filter(|n| filter.matches(n)).cloned().collect();
        matched.sort_by(listing_order);
        matched.into_iter().map(|n| n.title).collect()
    }

    fn pairs(raw: &[(&str, &str)]) -> Vec<(String, String)> {
        raw.iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn repeated_query_keys_keep_the_last_value() {
        let filter = NoteFilter::from_pairs(pairs(&[
            ("title", "a"),
            ("page", "2"),
            ("title", "b"),
            ("content", "c"),
        ]));
        assert_eq!(filter.title.as_deref(), Some("b"));
        assert_eq!(filter.content.as_deref(), Some("c"));
        assert_eq!(filter.search, None);

        let filter = FolderFilter::from_pairs(pairs(&[("search", "x"), ("search", "y")]));
        assert_eq!(filter.search.as_deref(), Some("y"));
        assert_eq!(filter.title, None);
    }

    #[test]
    fn title_filter_is_case_insensitive_substring() {
        let notes = [note(1, "cd", "x"), note(2, "ab", "x"), note(3, "BC", "x")];
        let filter = NoteFilter {
            title: Some("c".to_string()),
            ..Default::default()
        };
        assert_eq!(titles(&notes, &filter), vec!["BC", "cd"]);
    }

    #[test]
    fn field_filters_are_anded() {
        let notes = [
            note(1, "a", "1"),
            note(2, "c", "3"),
            note(3, "ab", "13"),
            note(4, "ac", "23"),
        ];
        let filter = NoteFilter {
            title: Some("a".to_string()),
            content: Some("3".to_string()),
            ..Default::default()
        };
        assert_eq!(titles(&notes, &filter), vec!["ab", "ac"]);
    }

    #[test]
    fn search_ors_across_title_and_content() {
        let notes = [
            note(1, "Groceries", "milk"),
            note(2, "todo", "buy MILK"),
            note(3, "other", "nothing"),
        ];
        let filter = NoteFilter {
            search: Some("milk".to_string()),
            ..Default::default()
        };
        assert_eq!(titles(&notes, &filter), vec!["Groceries", "todo"]);
    }

    #[test]
    fn folder_filter_ignores_missing_params() {
        let ts = now();
        let folder = Folder {
            id: 1,
            title: "Work".to_string(),
            container: None,
            owner: 1,
            created: ts,
            updated: ts,
        };
        assert!(FolderFilter::default().matches(&folder));
        assert!(
            FolderFilter {
                search: Some("wor".to_string()),
                title: Some("RK".to_string()),
            }
            .matches(&folder)
        );
        assert!(
            !FolderFilter {
                search: Some("home".to_string()),
                title: None,
            }
            .matches(&folder)
        );
    }

    #[test]
    fn equal_titles_order_by_most_recent_update() {
        let older = note(1, "same", "x");
        let mut newer = note(2, "same", "y");
        newer.updated = older.updated + Duration::seconds(1);

        let mut notes = vec![older, newer, note(3, "first", "z")];
        notes.sort_by(listing_order);

        let ids: Vec<i64> = notes.iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![3, 2, 1]);
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off\\"), "%50\\%\\_off\\\\%");
        assert_eq!(like_pattern(""), "%%");
    }

    #[test]
    fn conditions_follow_supplied_params() {
        let filter = NoteFilter {
            search: Some("a".to_string()),
            title: None,
            content: Some("b".to_string()),
        };
        let conditions = filter.conditions();
        assert_eq!(conditions.len(), 2);
        assert_eq!(conditions[0].0, &["title", "content"]);
        assert_eq!(conditions[1], (&["content"] as &[&str], "%b%".to_string()));
    }
}
