mod error;

pub use error::ServiceError;

use std::sync::Arc;

use crate::{
    auth::{Action, Caller, EntityKind, Permission},
    dto::{
        FolderDetail, FolderList, FolderPayload, FolderSummary, Mode, NoteDetail, NoteList,
        NotePayload, NoteSummary, ValidationErrors,
    },
    filter::{FolderFilter, NoteFilter},
    models::{FolderId, NewUser, NoteId, User},
    repository::Repository,
    scope::Scope,
};

/// A request body that has already been decoded, or the reason it could not be.
pub type Payload<T> = Result<T, ValidationErrors>;

const fn permission(action: Action, kind: EntityKind) -> Permission {
    Permission::new(action, kind)
}

/// Orchestrates every note and folder operation: guards, scoping, validation,
/// storage and response shaping.
#[derive(Clone)]
pub struct NotebookService {
    repo: Arc<dyn Repository>,
}

impl NotebookService {
    pub fn new(repo: Arc<dyn Repository>) -> Self {
        Self { repo }
    }

    pub async fn resolve_token(&self, token: &str) -> Result<Option<User>, ServiceError> {
        Ok(self.repo.find_user_by_token(token).await?)
    }

    pub async fn bootstrap_users(&self, users: Vec<NewUser>) -> Result<Vec<User>, ServiceError> {
        let mut created = Vec::with_capacity(users.len());

        for user in users {
            let user = self.repo.upsert_user(user).await?;
            tracing::info!(
                "Registered user '{}' with {} permission(s)",
                user.username,
                user.permissions.len()
            );
            created.push(user);
        }

        Ok(created)
    }

    pub async fn list_notes(
        &self,
        caller: Caller,
        filter: &NoteFilter,
    ) -> Result<NoteList, ServiceError> {
        let user = caller.require(permission(Action::View, EntityKind::Note))?;

        let notes = self.repo.list_notes(Scope::of(&user), filter).await?;

        Ok(NoteList {
            notes: notes.into_iter().map(NoteSummary::from).collect(),
        })
    }

    pub async fn create_note(
        &self,
        caller: Caller,
        payload: Payload<NotePayload>,
    ) -> Result<NoteDetail, ServiceError> {
        let user = caller.require(permission(Action::Add, EntityKind::Note))?;
        let note = payload?.into_new()?;

        let note = self.repo.create_note(Scope::of(&user), note).await?;
        tracing::info!("User '{}' created note {}", user.username, note.id);

        Ok(note.into())
    }

    pub async fn get_note(&self, caller: Caller, id: NoteId) -> Result<NoteDetail, ServiceError> {
        let user = caller.require(permission(Action::View, EntityKind::Note))?;

        self.repo
            .get_note(Scope::of(&user), id)
            .await?
            .map(NoteDetail::from)
            .ok_or(ServiceError::NotFound)
    }

    pub async fn update_note(
        &self,
        caller: Caller,
        id: NoteId,
        payload: Payload<NotePayload>,
        mode: Mode,
    ) -> Result<NoteDetail, ServiceError> {
        let user = caller.require(permission(Action::Change, EntityKind::Note))?;
        let scope = Scope::of(&user);

        // A missing record wins over an invalid body.
        if self.repo.get_note(scope, id).await?.is_none() {
            return Err(ServiceError::NotFound);
        }
        let changes = payload?.into_changes(mode)?;

        let note = self
            .repo
            .update_note(scope, id, changes)
            .await?
            .ok_or(ServiceError::NotFound)?;
        tracing::info!("User '{}' updated note {}", user.username, note.id);

        Ok(note.into())
    }

    pub async fn delete_note(&self, caller: Caller, id: NoteId) -> Result<(), ServiceError> {
        let user = caller.require(permission(Action::Delete, EntityKind::Note))?;

        if !self.repo.delete_note(Scope::of(&user), id).await? {
            return Err(ServiceError::NotFound);
        }
        tracing::info!("User '{}' deleted note {}", user.username, id);

        Ok(())
    }

    pub async fn list_folders(
        &self,
        caller: Caller,
        filter: &FolderFilter,
    ) -> Result<FolderList, ServiceError> {
        let user = caller.require(permission(Action::View, EntityKind::Folder))?;

        let folders = self.repo.list_folders(Scope::of(&user), filter).await?;

        Ok(FolderList {
            folders: folders.into_iter().map(FolderSummary::from).collect(),
        })
    }

    pub async fn create_folder(
        &self,
        caller: Caller,
        payload: Payload<FolderPayload>,
    ) -> Result<FolderDetail, ServiceError> {
        let user = caller.require(permission(Action::Add, EntityKind::Folder))?;
        let folder = payload?.into_new()?;
        let scope = Scope::of(&user);

        let folder = self.repo.create_folder(scope, folder).await?;
        tracing::info!("User '{}' created folder {}", user.username, folder.id);

        self.folder_detail(scope, folder.id).await
    }

    pub async fn get_folder(
        &self,
        caller: Caller,
        id: FolderId,
    ) -> Result<FolderDetail, ServiceError> {
        let user = caller.require(permission(Action::View, EntityKind::Folder))?;

        self.folder_detail(Scope::of(&user), id).await
    }

    pub async fn update_folder(
        &self,
        caller: Caller,
        id: FolderId,
        payload: Payload<FolderPayload>,
        mode: Mode,
    ) -> Result<FolderDetail, ServiceError> {
        let user = caller.require(permission(Action::Change, EntityKind::Folder))?;
        let scope = Scope::of(&user);

        if self.repo.get_folder(scope, id).await?.is_none() {
            return Err(ServiceError::NotFound);
        }
        let changes = payload?.into_changes(mode)?;

        let folder = self
            .repo
            .update_folder(scope, id, changes)
            .await?
            .ok_or(ServiceError::NotFound)?;
        tracing::info!("User '{}' updated folder {}", user.username, folder.id);

        self.folder_detail(scope, id).await
    }

    pub async fn delete_folder(&self, caller: Caller, id: FolderId) -> Result<(), ServiceError> {
        let user = caller.require(permission(Action::Delete, EntityKind::Folder))?;

        if !self.repo.delete_folder(Scope::of(&user), id).await? {
            return Err(ServiceError::NotFound);
        }
        tracing::info!("User '{}' deleted folder {} and its contents", user.username, id);

        Ok(())
    }

    async fn folder_detail(&self, scope: Scope, id: FolderId) -> Result<FolderDetail, ServiceError> {
        self.repo
            .get_folder_tree(scope, id)
            .await?
            .map(FolderDetail::from)
            .ok_or(ServiceError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use pretty_assertions::assert_eq;

    use crate::repository::MemoryRepository;

    async fn service_with_users() -> (NotebookService, User, User, User) {
        let service = NotebookService::new(Arc::new(MemoryRepository::new()));
        let users = service
            .bootstrap_users(vec![
                NewUser {
                    username: "owner".to_string(),
                    token: "owner-token".to_string(),
                    permissions: Permission::all().collect(),
                },
                NewUser {
                    username: "other".to_string(),
                    token: "other-token".to_string(),
                    permissions: Permission::all().collect(),
                },
                NewUser {
                    username: "reader".to_string(),
                    token: "reader-token".to_string(),
                    permissions: ["view_note".parse::<Permission>().unwrap()].into(),
                },
            ])
            .await
            .unwrap();
        let [owner, other, reader]: [User; 3] = users.try_into().unwrap();
        (service, owner, other, reader)
    }

    fn note(title: &str, content: &str) -> Payload<NotePayload> {
        Ok(NotePayload {
            title: Some(Some(title.to_string())),
            content: Some(Some(content.to_string())),
            container: None,
        })
    }

    #[tokio::test]
    async fn token_resolves_to_user() {
        let (service, owner, _, _) = service_with_users().await;

        let resolved = service.resolve_token("owner-token").await.unwrap();
        assert_eq!(resolved, Some(owner));
        assert_eq!(service.resolve_token("nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn guards_run_before_body_validation() {
        let (service, _, _, reader) = service_with_users().await;
        let bad_body = Err(ValidationErrors::single("non_field_errors", "bad json"));

        let err = service
            .create_note(Caller::anonymous(), bad_body.clone())
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::AuthenticationRequired));

        let err = service
            .create_note(Caller::user(reader), bad_body)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::AuthorizationDenied(_)));
    }

    #[tokio::test]
    async fn capability_is_checked_before_existence() {
        let (service, _, _, reader) = service_with_users().await;

        let err = service
            .delete_note(Caller::user(reader), 12345)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::AuthorizationDenied(_)));
    }

    #[tokio::test]
    async fn other_users_records_are_not_found() {
        let (service, owner, other, _) = service_with_users().await;
        let created = service
            .create_note(Caller::user(owner), note("t", "c"))
            .await
            .unwrap();

        let err = service
            .get_note(Caller::user(other.clone()), created.pk)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound));

        let err = service
            .update_note(Caller::user(other.clone()), created.pk, note("x", "y"), Mode::Replace)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound));

        let err = service
            .delete_note(Caller::user(other), created.pk)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound));
    }

    #[tokio::test]
    async fn missing_record_wins_over_invalid_body() {
        let (service, owner, _, _) = service_with_users().await;

        let err = service
            .update_folder(
                Caller::user(owner),
                999,
                Ok(FolderPayload::default()),
                Mode::Replace,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NotFound));
    }

    #[tokio::test]
    async fn bad_container_is_a_validation_error() {
        let (service, owner, _, _) = service_with_users().await;

        let err = service
            .create_folder(
                Caller::user(owner),
                Ok(FolderPayload {
                    title: Some(Some("t".to_string())),
                    container: Some(Some(404.into())),
                }),
            )
            .await
            .unwrap_err();

        let errors = match err {
            ServiceError::Validation(errors) => errors,
            other => panic!("expected validation error, got {other:?}"),
        };
        assert_eq!(
            errors.field("container"),
            Some(&["Invalid pk \"404\" - object does not exist.".to_string()][..])
        );
    }

    #[tokio::test]
    async fn folder_detail_includes_children() {
        let (service, owner, _, _) = service_with_users().await;
        let caller = || Caller::user(owner.clone());

        let top = service
            .create_folder(
                caller(),
                Ok(FolderPayload {
                    title: Some(Some("top".to_string())),
                    container: None,
                }),
            )
            .await
            .unwrap();
        assert!(top.notes.is_empty());
        assert!(top.folders.is_empty());

        service
            .create_note(
                caller(),
                Ok(NotePayload {
                    title: Some(Some("inside".to_string())),
                    content: Some(Some("c".to_string())),
                    container: Some(Some(top.pk.into())),
                }),
            )
            .await
            .unwrap();

        let detail = service.get_folder(caller(), top.pk).await.unwrap();
        assert_eq!(detail.owner, owner.id);
        assert_eq!(detail.notes.len(), 1);
        assert_eq!(detail.notes[0].title, "inside");
    }
}
