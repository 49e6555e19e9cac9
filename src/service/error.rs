use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::{
    auth::Permission,
    dto::{ValidationErrors, missing_container},
    repository::RepositoryError,
};

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("invalid request: {0}")]
    Validation(ValidationErrors),

    #[error("authentication required")]
    AuthenticationRequired,

    #[error("missing permission '{0}'")]
    AuthorizationDenied(Permission),

    #[error("record not found")]
    NotFound,

    #[error(transparent)]
    Repository(RepositoryError),
}

impl From<ValidationErrors> for ServiceError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}

impl From<RepositoryError> for ServiceError {
    fn from(error: RepositoryError) -> Self {
        match error {
            RepositoryError::MissingContainer(id) => {
                Self::Validation(ValidationErrors::single("container", missing_container(id)))
            }
            RepositoryError::ContainerCycle { .. } => Self::Validation(ValidationErrors::single(
                "container",
                "A folder cannot be placed inside itself or one of its descendants.",
            )),
            other => Self::Repository(other),
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        match self {
            Self::Validation(errors) => (StatusCode::BAD_REQUEST, Json(errors)).into_response(),
            Self::AuthenticationRequired | Self::AuthorizationDenied(_) => {
                StatusCode::FORBIDDEN.into_response()
            }
            Self::NotFound => StatusCode::NOT_FOUND.into_response(),
            Self::Repository(e) => {
                tracing::error!("storage failure: {e}");
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
        }
    }
}
