mod memory;
mod postgres;

pub use memory::MemoryRepository;
pub use postgres::PostgresRepository;

use async_trait::async_trait;

use crate::{
    filter::{FolderFilter, NoteFilter},
    models::{
        Folder, FolderChanges, FolderId, FolderTree, NewFolder, NewNote, NewUser, Note,
        NoteChanges, NoteId, User,
    },
    scope::Scope,
};

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("container folder {0} does not exist")]
    MissingContainer(FolderId),

    #[error("folder {folder} cannot be moved into its own subtree (target {container})")]
    ContainerCycle {
        folder: FolderId,
        container: FolderId,
    },

    #[error("database error: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error("migration error: {0}")]
    Migration(#[from] refinery::Error),
}

/// Persistent storage for users, folders and notes.
///
/// Every record operation is scoped: a record whose owner differs from the
/// scope is reported exactly like a missing one (`None` / `false`). Each call
/// is atomic with respect to concurrent calls.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn migrate(&self) -> Result<(), RepositoryError>;

    /// Inserts the user, or replaces token and permissions of an existing
    /// user with the same name.
    async fn upsert_user(&self, user: NewUser) -> Result<User, RepositoryError>;

    async fn find_user_by_token(&self, token: &str) -> Result<Option<User>, RepositoryError>;

    async fn create_folder(&self, scope: Scope, folder: NewFolder)
    -> Result<Folder, RepositoryError>;

    async fn get_folder(&self, scope: Scope, id: FolderId) -> Result<Option<Folder>, RepositoryError>;

    /// The folder and its immediate children, read from one snapshot.
    async fn get_folder_tree(
        &self,
        scope: Scope,
        id: FolderId,
    ) -> Result<Option<FolderTree>, RepositoryError>;

    /// Rejects a container that is missing, outside the scope, or inside the
    /// folder's own subtree.
    async fn update_folder(
        &self,
        scope: Scope,
        id: FolderId,
        changes: FolderChanges,
    ) -> Result<Option<Folder>, RepositoryError>;

    /// Removes the folder with every descendant folder and note.
    async fn delete_folder(&self, scope: Scope, id: FolderId) -> Result<bool, RepositoryError>;

    async fn list_folders(
        &self,
        scope: Scope,
        filter: &FolderFilter,
    ) -> Result<Vec<Folder>, RepositoryError>;

    async fn create_note(&self, scope: Scope, note: NewNote) -> Result<Note, RepositoryError>;

    async fn get_note(&self, scope: Scope, id: NoteId) -> Result<Option<Note>, RepositoryError>;

    async fn update_note(
        &self,
        scope: Scope,
        id: NoteId,
        changes: NoteChanges,
    ) -> Result<Option<Note>, RepositoryError>;

    async fn delete_note(&self, scope: Scope, id: NoteId) -> Result<bool, RepositoryError>;

    async fn list_notes(&self, scope: Scope, filter: &NoteFilter)
    -> Result<Vec<Note>, RepositoryError>;
}
