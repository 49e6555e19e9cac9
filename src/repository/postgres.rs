mod embedded {
    refinery::embed_migrations!("migrations");
}

use embedded::migrations;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_postgres::{Client, IsolationLevel, NoTls, Row, Transaction, types::ToSql};

use crate::{
    auth::Permission,
    filter::{FolderFilter, NoteFilter, ORDER_BY},
    models::{
        Folder, FolderChanges, FolderId, FolderTree, NewFolder, NewNote, NewUser, Note,
        NoteChanges, NoteId, User,
    },
    repository::{Repository, RepositoryError},
    scope::Scope,
};

const FOLDER_COLUMNS: &str = "id, title, container_id, owner_id, created, updated";
const NOTE_COLUMNS: &str = "id, title, content, container_id, owner_id, created, updated";

const TOUCH_UPDATED: &str = "updated = GREATEST(clock_timestamp(), updated + interval '1 microsecond')";

/// Store backed by a single PostgreSQL connection. Multi-statement operations
/// run inside one transaction each.
pub struct PostgresRepository {
    client: Mutex<Client>,
}

impl PostgresRepository {
    pub async fn new(database_dsn: &str) -> Result<Self, tokio_postgres::Error> {
        let (client, con) = tokio_postgres::connect(database_dsn, NoTls).await?;

        tokio::spawn(async move {
            if let Err(e) = con.await {
                tracing::error!("connection error: {}", e);
            }
        });

        Ok(Self {
            client: Mutex::new(client),
        })
    }
}

fn user_from_row(row: &Row) -> User {
    let codenames: Vec<String> = row.get("permissions");
    let permissions = codenames
        .into_iter()
        .filter_map(|codename| match codename.parse::<Permission>() {
            Ok(permission) => Some(permission),
            Err(e) => {
                tracing::warn!("ignoring stored permission: {e}");
                None
            }
        })
        .collect();

    User {
        id: row.get("id"),
        username: row.get("username"),
        permissions,
    }
}

fn folder_from_row(row: &Row) -> Folder {
    Folder {
        id: row.get("id"),
        title: row.get("title"),
        container: row.get("container_id"),
        owner: row.get("owner_id"),
        created: row.get("created"),
        updated: row.get("updated"),
    }
}

fn note_from_row(row: &Row) -> Note {
    Note {
        id: row.get("id"),
        title: row.get("title"),
        content: row.get("content"),
        container: row.get("container_id"),
        owner: row.get("owner_id"),
        created: row.get("created"),
        updated: row.get("updated"),
    }
}

/// Builds a scoped `SELECT` whose conditions are ANDed, with the columns of a
/// single condition ORed.
fn filtered_select<'a>(
    table: &str,
    columns: &str,
    owner: &'a i64,
    conditions: &'a [(&'static [&'static str], String)],
) -> (String, Vec<&'a (dyn ToSql + Sync)>) {
    let mut sql = format!("SELECT {columns} FROM {table} WHERE owner_id = $1");
    let mut params: Vec<&(dyn ToSql + Sync)> = Vec::with_capacity(conditions.len() + 1);
    params.push(owner);

    for (fields, pattern) in conditions {
        params.push(pattern);
        let placeholder = params.len();
        let any = fields
            .iter()
            .map(|field| format!("{field} ILIKE ${placeholder}"))
            .collect::<Vec<_>>()
            .join(" OR ");
        sql.push_str(&format!(" AND ({any})"));
    }

    sql.push(' ');
    sql.push_str(ORDER_BY);

    (sql, params)
}

async fn check_container(
    tx: &Transaction<'_>,
    scope: Scope,
    container: Option<FolderId>,
) -> Result<(), RepositoryError> {
    let Some(id) = container else {
        return Ok(());
    };

    let row = tx
        .query_opt(
            "SELECT 1 FROM folders WHERE id = $1 AND owner_id = $2 FOR KEY SHARE",
            &[&id, &scope.owner()],
        )
        .await?;

    match row {
        Some(_) => Ok(()),
        None => Err(RepositoryError::MissingContainer(id)),
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn migrate(&self) -> Result<(), RepositoryError> {
        let mut client = self.client.lock().await;
        let migrations_report = migrations::runner().run_async(&mut *client).await?;

        for migration in migrations_report.applied_migrations() {
            tracing::info!(
                "Migration Applied -  Name: {}, Version: {}",
                migration.name(),
                migration.version()
            );
        }

        tracing::info!("DB migrations finished!");

        Ok(())
    }

    async fn upsert_user(&self, user: NewUser) -> Result<User, RepositoryError> {
        let permissions: Vec<String> = user.permissions.iter().map(ToString::to_string).collect();

        let row = self
            .client
            .lock()
            .await
            .query_one(
                "INSERT INTO users (username, token, permissions) VALUES ($1, $2, $3) \
                 ON CONFLICT (username) DO UPDATE \
                 SET token = EXCLUDED.token, permissions = EXCLUDED.permissions \
                 RETURNING id, username, permissions",
                &[&user.username, &user.token, &permissions],
            )
            .await?;

        Ok(user_from_row(&row))
    }

    async fn find_user_by_token(&self, token: &str) -> Result<Option<User>, RepositoryError> {
        let row = self
            .client
            .lock()
            .await
            .query_opt(
                "SELECT id, username, permissions FROM users WHERE token = $1",
                &[&token],
            )
            .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    async fn create_folder(
        &self,
        scope: Scope,
        folder: NewFolder,
    ) -> Result<Folder, RepositoryError> {
        let mut client = self.client.lock().await;
        let tx = client.transaction().await?;

        check_container(&tx, scope, folder.container).await?;

        let row = tx
            .query_one(
                &format!(
                    "INSERT INTO folders (title, container_id, owner_id) VALUES ($1, $2, $3) \
                     RETURNING {FOLDER_COLUMNS}"
                ),
                &[&folder.title, &folder.container, &scope.owner()],
            )
            .await?;

        tx.commit().await?;

        Ok(folder_from_row(&row))
    }

    async fn get_folder(&self, scope: Scope, id: FolderId) -> Result<Option<Folder>, RepositoryError> {
        let row = self
            .client
            .lock()
            .await
            .query_opt(
                &format!("SELECT {FOLDER_COLUMNS} FROM folders WHERE id = $1 AND owner_id = $2"),
                &[&id, &scope.owner()],
            )
            .await?;

        Ok(row.as_ref().map(folder_from_row))
    }

    async fn get_folder_tree(
        &self,
        scope: Scope,
        id: FolderId,
    ) -> Result<Option<FolderTree>, RepositoryError> {
        let mut client = self.client.lock().await;
        let tx = client
            .build_transaction()
            .isolation_level(IsolationLevel::RepeatableRead)
            .read_only(true)
            .start()
            .await?;

        let owner = scope.owner();

        let Some(row) = tx
            .query_opt(
                &format!("SELECT {FOLDER_COLUMNS} FROM folders WHERE id = $1 AND owner_id = $2"),
                &[&id, &owner],
            )
            .await?
        else {
            return Ok(None);
        };

        let notes = tx
            .query(
                &format!(
                    "SELECT {NOTE_COLUMNS} FROM notes WHERE container_id = $1 AND owner_id = $2 \
                     {ORDER_BY}"
                ),
                &[&id, &owner],
            )
            .await?;

        let folders = tx
            .query(
                &format!(
                    "SELECT {FOLDER_COLUMNS} FROM folders WHERE container_id = $1 AND owner_id = $2 \
                     {ORDER_BY}"
                ),
                &[&id, &owner],
            )
            .await?;

        tx.commit().await?;

        Ok(Some(FolderTree {
            folder: folder_from_row(&row),
            notes: notes.iter().map(note_from_row).collect(),
            folders: folders.iter().map(folder_from_row).collect(),
        }))
    }

    async fn update_folder(
        &self,
        scope: Scope,
        id: FolderId,
        changes: FolderChanges,
    ) -> Result<Option<Folder>, RepositoryError> {
        let mut client = self.client.lock().await;
        let tx = client.transaction().await?;

        let Some(row) = tx
            .query_opt(
                &format!(
                    "SELECT {FOLDER_COLUMNS} FROM folders WHERE id = $1 AND owner_id = $2 \
                     FOR UPDATE"
                ),
                &[&id, &scope.owner()],
            )
            .await?
        else {
            return Ok(None);
        };
        let mut folder = folder_from_row(&row);

        if let Some(container) = changes.container {
            check_container(&tx, scope, container).await?;

            if let Some(container) = container {
                let cyclic: bool = tx
                    .query_one(
                        "WITH RECURSIVE ancestors (id, container_id) AS ( \
                             SELECT id, container_id FROM folders WHERE id = $1 \
                             UNION \
                             SELECT f.id, f.container_id FROM folders f \
                             JOIN ancestors a ON f.id = a.container_id \
                         ) \
                         SELECT EXISTS (SELECT 1 FROM ancestors WHERE id = $2)",
                        &[&container, &id],
                    )
                    .await?
                    .get(0);

                if cyclic {
                    return Err(RepositoryError::ContainerCycle {
                        folder: id,
                        container,
                    });
                }
            }

            folder.container = container;
        }
        if let Some(title) = changes.title {
            folder.title = title;
        }

        let row = tx
            .query_one(
                &format!(
                    "UPDATE folders SET title = $1, container_id = $2, {TOUCH_UPDATED} \
                     WHERE id = $3 RETURNING {FOLDER_COLUMNS}"
                ),
                &[&folder.title, &folder.container, &id],
            )
            .await?;

        tx.commit().await?;

        Ok(Some(folder_from_row(&row)))
    }

    async fn delete_folder(&self, scope: Scope, id: FolderId) -> Result<bool, RepositoryError> {
        let mut client = self.client.lock().await;
        let tx = client.transaction().await?;

        // Deepest folders first.
        let subtree: Vec<FolderId> = tx
            .query(
                "WITH RECURSIVE subtree (id, depth) AS ( \
                     SELECT id, 0 FROM folders WHERE id = $1 AND owner_id = $2 \
                     UNION ALL \
                     SELECT f.id, s.depth + 1 FROM folders f \
                     JOIN subtree s ON f.container_id = s.id \
                 ) \
                 SELECT id FROM subtree ORDER BY depth DESC",
                &[&id, &scope.owner()],
            )
            .await?
            .iter()
            .map(|row| row.get("id"))
            .collect();

        if subtree.is_empty() {
            return Ok(false);
        }

        let notes = tx
            .execute("DELETE FROM notes WHERE container_id = ANY($1)", &[&subtree])
            .await?;
        for folder in &subtree {
            tx.execute("DELETE FROM folders WHERE id = $1", &[folder])
                .await?;
        }

        tx.commit().await?;

        tracing::debug!(
            "Removed folder {} with {} folder(s) and {} note(s) in subtree",
            id,
            subtree.len(),
            notes
        );

        Ok(true)
    }

    async fn list_folders(
        &self,
        scope: Scope,
        filter: &FolderFilter,
    ) -> Result<Vec<Folder>, RepositoryError> {
        let owner = scope.owner();
        let conditions = filter.conditions();
        let (sql, params) = filtered_select("folders", FOLDER_COLUMNS, &owner, &conditions);

        let rows = self.client.lock().await.query(&sql, &params).await?;

        Ok(rows.iter().map(folder_from_row).collect())
    }

    async fn create_note(&self, scope: Scope, note: NewNote) -> Result<Note, RepositoryError> {
        let mut client = self.client.lock().await;
        let tx = client.transaction().await?;

        check_container(&tx, scope, note.container).await?;

        let row = tx
            .query_one(
                &format!(
                    "INSERT INTO notes (title, content, container_id, owner_id) \
                     VALUES ($1, $2, $3, $4) RETURNING {NOTE_COLUMNS}"
                ),
                &[&note.title, &note.content, &note.container, &scope.owner()],
            )
            .await?;

        tx.commit().await?;

        Ok(note_from_row(&row))
    }

    async fn get_note(&self, scope: Scope, id: NoteId) -> Result<Option<Note>, RepositoryError> {
        let row = self
            .client
            .lock()
            .await
            .query_opt(
                &format!("SELECT {NOTE_COLUMNS} FROM notes WHERE id = $1 AND owner_id = $2"),
                &[&id, &scope.owner()],
            )
            .await?;

        Ok(row.as_ref().map(note_from_row))
    }

    async fn update_note(
        &self,
        scope: Scope,
        id: NoteId,
        changes: NoteChanges,
    ) -> Result<Option<Note>, RepositoryError> {
        let mut client = self.client.lock().await;
        let tx = client.transaction().await?;

        let Some(row) = tx
            .query_opt(
                &format!(
                    "SELECT {NOTE_COLUMNS} FROM notes WHERE id = $1 AND owner_id = $2 FOR UPDATE"
                ),
                &[&id, &scope.owner()],
            )
            .await?
        else {
            return Ok(None);
        };
        let mut note = note_from_row(&row);

        if let Some(container) = changes.container {
            check_container(&tx, scope, container).await?;
            note.container = container;
        }
        if let Some(title) = changes.title {
            note.title = title;
        }
        if let Some(content) = changes.content {
            note.content = content;
        }

        let row = tx
            .query_one(
                &format!(
                    "UPDATE notes SET title = $1, content = $2, container_id = $3, {TOUCH_UPDATED} \
                     WHERE id = $4 RETURNING {NOTE_COLUMNS}"
                ),
                &[&note.title, &note.content, &note.container, &id],
            )
            .await?;

        tx.commit().await?;

        Ok(Some(note_from_row(&row)))
    }

    async fn delete_note(&self, scope: Scope, id: NoteId) -> Result<bool, RepositoryError> {
        let rows = self
            .client
            .lock()
            .await
            .execute(
                "DELETE FROM notes WHERE id = $1 AND owner_id = $2",
                &[&id, &scope.owner()],
            )
            .await?;

        Ok(rows == 1)
    }

    async fn list_notes(
        &self,
        scope: Scope,
        filter: &NoteFilter,
    ) -> Result<Vec<Note>, RepositoryError> {
        let owner = scope.owner();
        let conditions = filter.conditions();
        let (sql, params) = filtered_select("notes", NOTE_COLUMNS, &owner, &conditions);

        let rows = self.client.lock().await.query(&sql, &params).await?;

        Ok(rows.iter().map(note_from_row).collect())
    }
}
