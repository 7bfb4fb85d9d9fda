use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use order_stream_engine::EventFlowError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("Event has already been processed")]
    DuplicateEvent,
    #[error("Order is already in a final status")]
    OrderAlreadyFinal,
    #[error("Could not deliver message because the client mailbox has closed")]
    MailboxClosed,
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Could not initialize the server. {0}")]
    InitializeError(String),
    #[error("Backend error. {0}")]
    BackendError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::DuplicateEvent => StatusCode::CONFLICT,
            Self::OrderAlreadyFinal => StatusCode::GONE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let mut builder = HttpResponse::build(self.status_code());
        match self {
            // The webhook contract expects empty 409/410 responses
            Self::DuplicateEvent | Self::OrderAlreadyFinal => builder.finish(),
            _ => builder.json(serde_json::json!({ "message": self.to_string() })),
        }
    }
}

impl From<EventFlowError> for ServerError {
    fn from(e: EventFlowError) -> Self {
        match e {
            EventFlowError::DuplicateEvent(_) => Self::DuplicateEvent,
            EventFlowError::OrderAlreadyFinal(_) => Self::OrderAlreadyFinal,
            EventFlowError::UnknownStatus(name) => Self::InvalidRequestBody(format!("unknown order status: {name}")),
            EventFlowError::DatabaseError(e) => Self::BackendError(e.to_string()),
        }
    }
}
