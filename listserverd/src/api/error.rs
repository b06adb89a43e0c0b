use std::net::IpAddr;
use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use crate::registry::error::RegistryError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("missing or wrong server key")]
    Unauthorized,

    #[error("{0} is not in the access control list")]
    AccessDenied(IpAddr),

    #[error("invalid request: {0}")]
    BadRequest(String),

    #[error("too many requests, retry in {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::AccessDenied(_) => StatusCode::FORBIDDEN,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Registry(e) => match e {
                RegistryError::InvalidInput(_) => StatusCode::BAD_REQUEST,
                RegistryError::Conflict { .. } => StatusCode::CONFLICT,
                RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
                RegistryError::Forbidden(_) => StatusCode::FORBIDDEN,
                RegistryError::IdSpaceExhausted(_) | RegistryError::Unavailable => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("Request failed: {}", self);
        }

        let retry_after = match &self {
            ApiError::Registry(RegistryError::Conflict { retry_after_secs, .. }) => *retry_after_secs,
            ApiError::RateLimited { retry_after_secs } => Some(*retry_after_secs),
            _ => None,
        };

        let body = match retry_after {
            Some(secs) => json!({ "error": self.to_string(), "retryAfter": secs }),
            None => json!({ "error": self.to_string() }),
        };

        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}
