use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use tabula_payment_engine::{api::ReconcileError, OrchestratorError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("No signature header was supplied with the webhook")]
    MissingSignature,
    #[error("Charge error. {0}")]
    ChargeError(#[from] OrchestratorError),
    #[error("Webhook error. {0}")]
    WebhookError(#[from] ReconcileError),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::MissingSignature => StatusCode::UNAUTHORIZED,
            Self::ChargeError(e) => match e {
                OrchestratorError::IntentConflict(_) => StatusCode::CONFLICT,
                OrchestratorError::IntentNotFound(_) => StatusCode::NOT_FOUND,
                OrchestratorError::UnknownProvider(_) => StatusCode::BAD_REQUEST,
                OrchestratorError::NotRefundable(_, _) => StatusCode::CONFLICT,
                OrchestratorError::PartialRefundUnsupported => StatusCode::BAD_REQUEST,
                OrchestratorError::RefundFailed(_) => StatusCode::BAD_GATEWAY,
                OrchestratorError::LedgerError(_) |
                OrchestratorError::CredentialError(_) |
                OrchestratorError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::WebhookError(e) => match e {
                ReconcileError::VerificationFailed(_) => StatusCode::UNAUTHORIZED,
                ReconcileError::UnknownProvider(_) => StatusCode::NOT_FOUND,
                ReconcileError::MalformedPayload(_) => StatusCode::BAD_REQUEST,
                ReconcileError::UnknownReference => StatusCode::NOT_FOUND,
                ReconcileError::LedgerError(_) | ReconcileError::CredentialError(_) => {
                    StatusCode::INTERNAL_SERVER_ERROR
                },
            },
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}
