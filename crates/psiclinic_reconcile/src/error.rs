// --- File: crates/psiclinic_reconcile/src/error.rs ---
use axum::response::{IntoResponse, Response};
use psiclinic_common::{ClinicError, HttpStatusCode, ProviderError};
use psiclinic_store::StoreError;
use thiserror::Error;

/// Errors surfaced by the reconciliation workflow and its HTTP handlers.
#[derive(Error, Debug)]
pub enum ReconcileError {
    #[error("{0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("{0}")]
    Conflict(String),

    /// The row exists but its current state does not allow the operation.
    #[error("{0}")]
    PreconditionFailed(String),

    #[error("invalid webhook signature: {0}")]
    InvalidSignature(String),

    #[error("{0}")]
    Internal(String),
}

impl ReconcileError {
    pub fn validation(message: impl Into<String>) -> Self {
        ReconcileError::Validation(message.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        ReconcileError::NotFound(what.into())
    }
}

impl HttpStatusCode for ReconcileError {
    fn status_code(&self) -> u16 {
        match self {
            ReconcileError::Validation(_) => 400,
            ReconcileError::NotFound(_) => 404,
            ReconcileError::Provider(e) => e.status_code(),
            ReconcileError::Store(e) => e.status_code(),
            ReconcileError::Conflict(_) => 409,
            ReconcileError::PreconditionFailed(_) => 400,
            ReconcileError::InvalidSignature(_) => 401,
            ReconcileError::Internal(_) => 500,
        }
    }
}

impl From<ReconcileError> for ClinicError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::Validation(msg) => ClinicError::ValidationError(msg),
            ReconcileError::NotFound(what) => ClinicError::NotFoundError(what),
            ReconcileError::Provider(e) => e.into(),
            ReconcileError::Store(e) => e.into(),
            ReconcileError::Conflict(msg) => ClinicError::ConflictError(msg),
            ReconcileError::PreconditionFailed(msg) => ClinicError::ValidationError(msg),
            ReconcileError::InvalidSignature(msg) => ClinicError::AuthError(msg),
            ReconcileError::Internal(msg) => ClinicError::InternalError(msg),
        }
    }
}

impl IntoResponse for ReconcileError {
    fn into_response(self) -> Response {
        ClinicError::from(self).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_the_taxonomy() {
        assert_eq!(ReconcileError::validation("x").status_code(), 400);
        assert_eq!(ReconcileError::not_found("booking b-1").status_code(), 404);
        assert_eq!(ReconcileError::Conflict("c".into()).status_code(), 409);
        assert_eq!(
            ReconcileError::PreconditionFailed("not approved".into()).status_code(),
            400
        );
        assert_eq!(
            ReconcileError::Store(StoreError::TokenMismatch("c-1".into())).status_code(),
            409
        );
        assert_eq!(
            ReconcileError::Provider(ProviderError::Api {
                provider: "mercadopago".into(),
                status_code: 400,
                message: "bad".into()
            })
            .status_code(),
            502
        );
        assert_eq!(
            ReconcileError::InvalidSignature("mismatch".into()).status_code(),
            401
        );
    }

    #[test]
    fn response_status_matches_status_code() {
        let response = ReconcileError::not_found("payment p-1").into_response();
        assert_eq!(response.status().as_u16(), 404);
    }
}
