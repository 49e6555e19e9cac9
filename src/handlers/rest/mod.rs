use axum::{
    Json, Router,
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use axum_macros::debug_handler;
use tower_http::trace::TraceLayer;
use utoipa::{
    Modify, OpenApi,
    openapi::security::{ApiKey, ApiKeyValue, SecurityScheme},
};
use utoipa_swagger_ui::SwaggerUi;

use std::sync::Arc;

use crate::{
    auth::Caller,
    dto::{
        FolderDetail, FolderList, FolderPayload, FolderSummary, Mode, NoteDetail, NoteList,
        NotePayload, NoteSummary, ValidationErrors,
    },
    filter::{FolderFilter, NoteFilter},
    service::{NotebookService, Payload},
};

#[derive(OpenApi)]
#[openapi(
    paths(
        list_notes,
        create_note,
        get_note,
        replace_note,
        patch_note,
        delete_note,
        list_folders,
        create_folder,
        get_folder,
        replace_folder,
        patch_folder,
        delete_folder
    ),
    components(schemas(
        NoteSummary,
        NoteDetail,
        NoteList,
        NotePayload,
        FolderSummary,
        FolderDetail,
        FolderList,
        FolderPayload
    )),
    modifiers(&TokenAuth),
    security(("token" = [])),
    tags(
        (name = "notes", description = "Notes owned by the caller"),
        (name = "folders", description = "Folders owned by the caller")
    )
)]
pub struct ApiDoc;

struct TokenAuth;

impl Modify for TokenAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "token",
                SecurityScheme::ApiKey(ApiKey::Header(ApiKeyValue::with_description(
                    "Authorization",
                    "`Token <key>`",
                ))),
            );
        }
    }
}

pub fn router(service: Arc<NotebookService>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/note", get(list_notes).post(create_note))
        .route(
            "/note/{id}",
            get(get_note)
                .put(replace_note)
                .patch(patch_note)
                .delete(delete_note),
        )
        .route("/folder", get(list_folders).post(create_folder))
        .route(
            "/folder/{id}",
            get(get_folder)
                .put(replace_folder)
                .patch(patch_folder)
                .delete(delete_folder),
        )
        .merge(SwaggerUi::new("/swagger-ui").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .with_state(service)
        .layer(TraceLayer::new_for_http())
}

async fn root() -> Response {
    (StatusCode::OK, "Hello world!").into_response()
}

/// Record ids are plain non-negative integers; anything else names no record.
fn record_id(raw: &str) -> Option<i64> {
    if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    raw.parse().ok()
}

fn payload<T>(body: Result<Json<T>, JsonRejection>) -> Payload<T> {
    body.map(|Json(payload)| payload).map_err(|rejection| {
        tracing::debug!("rejected request body: {}", rejection.body_text());
        ValidationErrors::single("non_field_errors", rejection.body_text())
    })
}

fn not_found() -> Response {
    StatusCode::NOT_FOUND.into_response()
}

#[utoipa::path(
    get,
    path = "/note",
    params(NoteFilter),
    responses(
        (status = 200, description = "Notes owned by the caller", body = NoteList),
        (status = 403, description = "Not authenticated or missing view_note")
    ),
    tag = "notes"
)]
#[debug_handler]
pub async fn list_notes(
    State(service): State<Arc<NotebookService>>,
    caller: Caller,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    let filter = NoteFilter::from_pairs(params);
    match service.list_notes(caller, &filter).await {
        Ok(notes) => (StatusCode::OK, Json(notes)).into_response(),
        Err(e) => e.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/note",
    request_body = NotePayload,
    responses(
        (status = 201, description = "Note created successfully", body = NoteDetail),
        (status = 400, description = "Invalid fields or unknown container"),
        (status = 403, description = "Not authenticated or missing add_note")
    ),
    tag = "notes"
)]
#[debug_handler]
pub async fn create_note(
    State(service): State<Arc<NotebookService>>,
    caller: Caller,
    body: Result<Json<NotePayload>, JsonRejection>,
) -> Response {
    match service.create_note(caller, payload(body)).await {
        Ok(note) => (StatusCode::CREATED, Json(note)).into_response(),
        Err(e) => e.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/note/{id}",
    params(
        ("id" = i64, Path, description = "Note ID")
    ),
    responses(
        (status = 200, description = "Note found", body = NoteDetail),
        (status = 403, description = "Not authenticated or missing view_note"),
        (status = 404, description = "Note not found")
    ),
    tag = "notes"
)]
#[debug_handler]
pub async fn get_note(
    State(service): State<Arc<NotebookService>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Response {
    let Some(id) = record_id(&id) else {
        return not_found();
    };

    match service.get_note(caller, id).await {
        Ok(note) => (StatusCode::OK, Json(note)).into_response(),
        Err(e) => e.into_response(),
    }
}

#[utoipa::path(
    put,
    path = "/note/{id}",
    params(
        ("id" = i64, Path, description = "Note ID")
    ),
    request_body = NotePayload,
    responses(
        (status = 200, description = "Note updated successfully", body = NoteDetail),
        (status = 400, description = "Missing fields or unknown container"),
        (status = 403, description = "Not authenticated or missing change_note"),
        (status = 404, description = "Note not found")
    ),
    tag = "notes"
)]
#[debug_handler]
pub async fn replace_note(
    State(service): State<Arc<NotebookService>>,
    caller: Caller,
    Path(id): Path<String>,
    body: Result<Json<NotePayload>, JsonRejection>,
) -> Response {
    update_note(&service, caller, &id, body, Mode::Replace).await
}

#[utoipa::path(
    patch,
    path = "/note/{id}",
    params(
        ("id" = i64, Path, description = "Note ID")
    ),
    request_body = NotePayload,
    responses(
        (status = 200, description = "Note updated successfully", body = NoteDetail),
        (status = 400, description = "Invalid fields or unknown container"),
        (status = 403, description = "Not authenticated or missing change_note"),
        (status = 404, description = "Note not found")
    ),
    tag = "notes"
)]
#[debug_handler]
pub async fn patch_note(
    State(service): State<Arc<NotebookService>>,
    caller: Caller,
    Path(id): Path<String>,
    body: Result<Json<NotePayload>, JsonRejection>,
) -> Response {
    update_note(&service, caller, &id, body, Mode::Partial).await
}

async fn update_note(
    service: &NotebookService,
    caller: Caller,
    id: &str,
    body: Result<Json<NotePayload>, JsonRejection>,
    mode: Mode,
) -> Response {
    let Some(id) = record_id(id) else {
        return not_found();
    };

    match service.update_note(caller, id, payload(body), mode).await {
        Ok(note) => (StatusCode::OK, Json(note)).into_response(),
        Err(e) => e.into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/note/{id}",
    params(
        ("id" = i64, Path, description = "Note ID")
    ),
    responses(
        (status = 204, description = "Note deleted successfully"),
        (status = 403, description = "Not authenticated or missing delete_note"),
        (status = 404, description = "Note not found")
    ),
    tag = "notes"
)]
#[debug_handler]
pub async fn delete_note(
    State(service): State<Arc<NotebookService>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Response {
    let Some(id) = record_id(&id) else {
        return not_found();
    };

    match service.delete_note(caller, id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/folder",
    params(FolderFilter),
    responses(
        (status = 200, description = "Folders owned by the caller", body = FolderList),
        (status = 403, description = "Not authenticated or missing view_folder")
    ),
    tag = "folders"
)]
#[debug_handler]
pub async fn list_folders(
    State(service): State<Arc<NotebookService>>,
    caller: Caller,
    Query(params): Query<Vec<(String, String)>>,
) -> Response {
    let filter = FolderFilter::from_pairs(params);
    match service.list_folders(caller, &filter).await {
        Ok(folders) => (StatusCode::OK, Json(folders)).into_response(),
        Err(e) => e.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/folder",
    request_body = FolderPayload,
    responses(
        (status = 201, description = "Folder created successfully", body = FolderDetail),
        (status = 400, description = "Invalid fields or unknown container"),
        (status = 403, description = "Not authenticated or missing add_folder")
    ),
    tag = "folders"
)]
#[debug_handler]
pub async fn create_folder(
    State(service): State<Arc<NotebookService>>,
    caller: Caller,
    body: Result<Json<FolderPayload>, JsonRejection>,
) -> Response {
    match service.create_folder(caller, payload(body)).await {
        Ok(folder) => (StatusCode::CREATED, Json(folder)).into_response(),
        Err(e) => e.into_response(),
    }
}

#[utoipa::path(
    get,
    path = "/folder/{id}",
    params(
        ("id" = i64, Path, description = "Folder ID")
    ),
    responses(
        (status = 200, description = "Folder with its immediate children", body = FolderDetail),
        (status = 403, description = "Not authenticated or missing view_folder"),
        (status = 404, description = "Folder not found")
    ),
    tag = "folders"
)]
#[debug_handler]
pub async fn get_folder(
    State(service): State<Arc<NotebookService>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Response {
    let Some(id) = record_id(&id) else {
        return not_found();
    };

    match service.get_folder(caller, id).await {
        Ok(folder) => (StatusCode::OK, Json(folder)).into_response(),
        Err(e) => e.into_response(),
    }
}

#[utoipa::path(
    put,
    path = "/folder/{id}",
    params(
        ("id" = i64, Path, description = "Folder ID")
    ),
    request_body = FolderPayload,
    responses(
        (status = 200, description = "Folder updated successfully", body = FolderDetail),
        (status = 400, description = "Missing title, unknown container or cycle"),
        (status = 403, description = "Not authenticated or missing change_folder"),
        (status = 404, description = "Folder not found")
    ),
    tag = "folders"
)]
#[debug_handler]
pub async fn replace_folder(
    State(service): State<Arc<NotebookService>>,
    caller: Caller,
    Path(id): Path<String>,
    body: Result<Json<FolderPayload>, JsonRejection>,
) -> Response {
    update_folder(&service, caller, &id, body, Mode::Replace).await
}

#[utoipa::path(
    patch,
    path = "/folder/{id}",
    params(
        ("id" = i64, Path, description = "Folder ID")
    ),
    request_body = FolderPayload,
    responses(
        (status = 200, description = "Folder updated successfully", body = FolderDetail),
        (status = 400, description = "Invalid title, unknown container or cycle"),
        (status = 403, description = "Not authenticated or missing change_folder"),
        (status = 404, description = "Folder not found")
    ),
    tag = "folders"
)]
#[debug_handler]
pub async fn patch_folder(
    State(service): State<Arc<NotebookService>>,
    caller: Caller,
    Path(id): Path<String>,
    body: Result<Json<FolderPayload>, JsonRejection>,
) -> Response {
    update_folder(&service, caller, &id, body, Mode::Partial).await
}

async fn update_folder(
    service: &NotebookService,
    caller: Caller,
    id: &str,
    body: Result<Json<FolderPayload>, JsonRejection>,
    mode: Mode,
) -> Response {
    let Some(id) = record_id(id) else {
        return not_found();
    };

    match service.update_folder(caller, id, payload(body), mode).await {
        Ok(folder) => (StatusCode::OK, Json(folder)).into_response(),
        Err(e) => e.into_response(),
    }
}

#[utoipa::path(
    delete,
    path = "/folder/{id}",
    params(
        ("id" = i64, Path, description = "Folder ID")
    ),
    responses(
        (status = 204, description = "Folder and its contents deleted"),
        (status = 403, description = "Not authenticated or missing delete_folder"),
        (status = 404, description = "Folder not found")
    ),
    tag = "folders"
)]
#[debug_handler]
pub async fn delete_folder(
    State(service): State<Arc<NotebookService>>,
    caller: Caller,
    Path(id): Path<String>,
) -> Response {
    let Some(id) = record_id(&id) else {
        return not_found();
    };

    match service.delete_folder(caller, id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}
