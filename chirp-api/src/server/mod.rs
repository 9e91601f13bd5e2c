use axum::{
    Router,
    extract::{
        FromRef,
        rejection::{JsonRejection, PathRejection},
    },
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
};
use axum_extra::typed_header::TypedHeaderRejection;
use bridge::BridgeError;
use chirp_common::{error::ServiceError, service::PostStore};
use json::Json;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::error;

mod auth;
mod bridge;
mod json;
mod routes;

pub type ServerRouter = Router<ServerState>;

#[derive(Clone, FromRef)]
pub struct ServerState {
    pub store: Arc<dyn PostStore>,
}

pub fn routes() -> ServerRouter {
    routes::routes()
}

pub type Result<T, E = ServerError> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Unknown route requested: {0}")]
    UnknownRoute(Uri),
    #[error("Path rejected: {0}")]
    PathRejection(#[from] PathRejection),
    #[error("Incoming JSON rejected: {0}")]
    JsonRejection(#[from] JsonRejection),
    #[error("JSON response could not be serialized: {0}")]
    JsonResponse(#[from] serde_json::Error),
    #[error("User header was missing or invalid: {0}")]
    InvalidUserHeader(TypedHeaderRejection),
    #[error(transparent)]
    Service(#[from] ServiceError),
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

fn service_status(err: &ServiceError) -> StatusCode {
    match err {
        ServiceError::NotFound { .. } => StatusCode::NOT_FOUND,
        ServiceError::ValidationFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        ServiceError::Unauthenticated => StatusCode::UNAUTHORIZED,
        ServiceError::NetworkFailure { .. } => StatusCode::BAD_GATEWAY,
        ServiceError::Unknown { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::UnknownRoute(_) | ServerError::PathRejection(_) => StatusCode::NOT_FOUND,
            ServerError::InvalidUserHeader(_) => StatusCode::UNAUTHORIZED,
            ServerError::JsonRejection(_) => StatusCode::BAD_REQUEST,
            ServerError::JsonResponse(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ServerError::Service(err)
            | ServerError::Bridge(BridgeError::NotFound(err) | BridgeError::Service(err)) => {
                service_status(err)
            }
        }
    }

    /// The error as the client's procedure boundary understands it.
    fn service_error(&self) -> ServiceError {
        match self {
            ServerError::UnknownRoute(uri) => ServiceError::not_found(format!("Route {uri}")),
            ServerError::PathRejection(rejection) => ServiceError::not_found(rejection.body_text()),
            ServerError::JsonRejection(rejection) => {
                ServiceError::field("body", rejection.body_text())
            }
            ServerError::InvalidUserHeader(_) => ServiceError::Unauthenticated,
            ServerError::JsonResponse(_) => ServiceError::unknown("Response could not be encoded"),
            ServerError::Service(err)
            | ServerError::Bridge(BridgeError::NotFound(err) | BridgeError::Service(err)) => {
                err.clone()
            }
        }
    }
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
struct ErrorResponse {
    status: u16,
    error: ServiceError,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();

        error!(error = %self, %status, "Replying with error");

        let error_response = ErrorResponse {
            status: status.as_u16(),
            error: self.service_error(),
        };
        (status, Json(error_response)).into_response()
    }
}
