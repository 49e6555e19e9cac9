use async_trait::async_trait;
use tokio::sync::RwLock;

use std::collections::BTreeMap;

use crate::{
    filter::{FolderFilter, NoteFilter, listing_order},
    models::{
        self, Folder, FolderChanges, FolderId, FolderTree, NewFolder, NewNote, NewUser, Note,
        NoteChanges, NoteId, User, UserId,
    },
    repository::{Repository, RepositoryError},
    scope::Scope,
};

struct StoredUser {
    user: User,
    token: String,
}

#[derive(Default)]
struct Tables {
    last_id: i64,
    users: BTreeMap<UserId, StoredUser>,
    folders: BTreeMap<FolderId, Folder>,
    notes: BTreeMap<NoteId, Note>,
}

impl Tables {
    fn next_id(&mut self) -> i64 {
        self.last_id += 1;
        self.last_id
    }

    fn scoped_folder(&self, scope: Scope, id: FolderId) -> Option<&Folder> {
        self.folders.get(&id).filter(|f| scope.admits(*f))
    }

    fn scoped_note(&self, scope: Scope, id: NoteId) -> Option<&Note> {
        self.notes.get(&id).filter(|n| scope.admits(*n))
    }

    fn check_container(
        &self,
        scope: Scope,
        container: Option<FolderId>,
    ) -> Result<(), RepositoryError> {
        match container {
            Some(id) if self.scoped_folder(scope, id).is_none() => {
                Err(RepositoryError::MissingContainer(id))
            }
            _ => Ok(()),
        }
    }

    /// Walks up from `container` and fails if `folder` is on the way.
    fn check_acyclic(&self, folder: FolderId, container: FolderId) -> Result<(), RepositoryError> {
        let mut current = Some(container);

        while let Some(id) = current {
            if id == folder {
                return Err(RepositoryError::ContainerCycle { folder, container });
            }
            current = self.folders.get(&id).and_then(|f| f.container);
        }

        Ok(())
    }

    /// Folder ids of the subtree rooted at `root`, children before parents.
    fn subtree_post_order(&self, root: FolderId) -> Vec<FolderId> {
        let mut order = Vec::new();
        let mut stack = vec![(root, false)];

        while let Some((id, expanded)) = stack.pop() {
            if expanded {
                order.push(id);
                continue;
            }
            stack.push((id, true));
            stack.extend(
                self.folders
                    .values()
                    .filter(|f| f.container == Some(id))
                    .map(|f| (f.id, false)),
            );
        }

        order
    }
}

/// Process-local store. A single lock guards all tables so that every
/// operation, including cascading deletes, is observed all-or-nothing.
#[derive(Default)]
pub struct MemoryRepository {
    tables: RwLock<Tables>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for MemoryRepository {
    async fn migrate(&self) -> Result<(), RepositoryError> {
        tracing::info!("In-memory storage needs no migrations");
        Ok(())
    }

    async fn upsert_user(&self, user: NewUser) -> Result<User, RepositoryError> {
        let mut tables = self.tables.write().await;

        let existing = tables
            .users
            .values()
            .find(|stored| stored.user.username == user.username)
            .map(|stored| stored.user.id);
        let id = match existing {
            Some(id) => id,
            None => tables.next_id(),
        };

        let stored = StoredUser {
            user: User {
                id,
                username: user.username,
                permissions: user.permissions,
            },
            token: user.token,
        };
        let result = stored.user.clone();
        tables.users.insert(id, stored);

        Ok(result)
    }

    async fn find_user_by_token(&self, token: &str) -> Result<Option<User>, RepositoryError> {
        let tables = self.tables.read().await;

        Ok(tables
            .users
            .values()
            .find(|stored| stored.token == token)
            .map(|stored| stored.user.clone()))
    }

    async fn create_folder(
        &self,
        scope: Scope,
        folder: NewFolder,
    ) -> Result<Folder, RepositoryError> {
        let mut tables = self.tables.write().await;
        tables.check_container(scope, folder.container)?;

        let ts = models::now();
        let folder = Folder {
            id: tables.next_id(),
            title: folder.title,
            container: folder.container,
            owner: scope.owner(),
            created: ts,
            updated: ts,
        };
        tables.folders.insert(folder.id, folder.clone());

        Ok(folder)
    }

    async fn get_folder(&self, scope: Scope, id: FolderId) -> Result<Option<Folder>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.scoped_folder(scope, id).cloned())
    }

    async fn get_folder_tree(
        &self,
        scope: Scope,
        id: FolderId,
    ) -> Result<Option<FolderTree>, RepositoryError> {
        let tables = self.tables.read().await;

        let Some(folder) = tables.scoped_folder(scope, id).cloned() else {
            return Ok(None);
        };

        let mut notes: Vec<Note> = tables
            .notes
            .values()
            .filter(|n| n.container == Some(id) && scope.admits(*n))
            .cloned()
            .collect();
        notes.sort_by(listing_order);

        let mut folders: Vec<Folder> = tables
            .folders
            .values()
            .filter(|f| f.container == Some(id) && scope.admits(*f))
            .cloned()
            .collect();
        folders.sort_by(listing_order);

        Ok(Some(FolderTree {
            folder,
            notes,
            folders,
        }))
    }

    async fn update_folder(
        &self,
        scope: Scope,
        id: FolderId,
        changes: FolderChanges,
    ) -> Result<Option<Folder>, RepositoryError> {
        let mut tables = self.tables.write().await;

        let Some(mut folder) = tables.scoped_folder(scope, id).cloned() else {
            return Ok(None);
        };

        if let Some(container) = changes.container {
            tables.check_container(scope, container)?;
            if let Some(container) = container {
                tables.check_acyclic(id, container)?;
            }
            folder.container = container;
        }
        if let Some(title) = changes.title {
            folder.title = title;
        }
        folder.updated = models::touch(folder.updated);

        tables.folders.insert(id, folder.clone());

        Ok(Some(folder))
    }

    async fn delete_folder(&self, scope: Scope, id: FolderId) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.write().await;

        if tables.scoped_folder(scope, id).is_none() {
            return Ok(false);
        }

        let subtree = tables.subtree_post_order(id);
        for folder in &subtree {
            tables.notes.retain(|_, n| n.container != Some(*folder));
            tables.folders.remove(folder);
        }

        tracing::debug!("Removed folder {} with {} folder(s) in subtree", id, subtree.len());

        Ok(true)
    }

    async fn list_folders(
        &self,
        scope: Scope,
        filter: &FolderFilter,
    ) -> Result<Vec<Folder>, RepositoryError> {
        let tables = self.tables.read().await;

        let mut folders: Vec<Folder> = tables
            .folders
            .values()
            .filter(|f| scope.admits(*f) && filter.matches(f))
            .cloned()
            .collect();
        folders.sort_by(listing_order);

        Ok(folders)
    }

    async fn create_note(&self, scope: Scope, note: NewNote) -> Result<Note, RepositoryError> {
        let mut tables = self.tables.write().await;
        tables.check_container(scope, note.container)?;

        let ts = models::now();
        let note = Note {
            id: tables.next_id(),
            title: note.title,
            content: note.content,
            container: note.container,
            owner: scope.owner(),
            created: ts,
            updated: ts,
        };
        tables.notes.insert(note.id, note.clone());

        Ok(note)
    }

    async fn get_note(&self, scope: Scope, id: NoteId) -> Result<Option<Note>, RepositoryError> {
        let tables = self.tables.read().await;
        Ok(tables.scoped_note(scope, id).cloned())
    }

    async fn update_note(
        &self,
        scope: Scope,
        id: NoteId,
        changes: NoteChanges,
    ) -> Result<Option<Note>, RepositoryError> {
        let mut tables = self.tables.write().await;

        let Some(mut note) = tables.scoped_note(scope, id).cloned() else {
            return Ok(None);
        };

        if let Some(container) = changes.container {
            tables.check_container(scope, container)?;
            note.container = container;
        }
        if let Some(title) = changes.title {
            note.title = title;
        }
        if let Some(content) = changes.content {
            note.content = content;
        }
        note.updated = models::touch(note.updated);

        tables.notes.insert(id, note.clone());

        Ok(Some(note))
    }

    async fn delete_note(&self, scope: Scope, id: NoteId) -> Result<bool, RepositoryError> {
        let mut tables = self.tables.write().await;

        if tables.scoped_note(scope, id).is_none() {
            return Ok(false);
        }

        Ok(tables.notes.remove(&id).is_some())
    }

    async fn list_notes(
        &self,
        scope: Scope,
        filter: &NoteFilter,
    ) -> Result<Vec<Note>, RepositoryError> {
        let tables = self.tables.read().await;

        let mut notes: Vec<Note> = tables
            .notes
            .values()
            .filter(|n| scope.admits(*n) && filter.matches(n))
            .cloned()
            .collect();
        notes.sort_by(listing_order);

        Ok(notes)
    }
}
