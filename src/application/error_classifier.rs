//! Failure classification for list and mutation calls
//!
//! Every failure coming back from the products backend is mapped to exactly
//! one [`Classification`]: an error class, the recovery action the controller
//! must take and the single notice shown to the user.
//!
//! Classification order (first match wins):
//! 1. timeout → transient
//! 2. non-HTTP failure → unknown
//! 3. 401 with no code or an auth code → auth-expired
//! 4. 404 `product_not_found` → stale-reference
//! 5. known validation code → validation
//! 6. anything else → unknown

use thiserror::Error;

use crate::application::ports::NoticeLevel;
use crate::domain::OperationKind;

pub const AUTH_ERROR_CODES: &[&str] = &["missing_token", "invalid_token", "expired_token"];
pub const NOT_FOUND_CODE: &str = "product_not_found";

pub const TIMEOUT_MESSAGE: &str = "The server is slow to respond. Please try again.";
pub const SESSION_EXPIRED_MESSAGE: &str = "Your session has expired. Please sign in again.";
pub const STALE_REFERENCE_MESSAGE: &str = "That product no longer exists. The list has been refreshed.";

/// Failure reported by the products backend or the transport underneath it
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("request timed out")]
    Timeout,

    #[error("HTTP {status} ({})", code.as_deref().unwrap_or("no error code"))]
    Http { status: u16, code: Option<String> },

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("unexpected response body: {0}")]
    Decode(String),
}

impl ApiError {
    pub fn http(status: u16, code: Option<&str>) -> Self {
        Self::Http {
            status,
            code: code.map(str::to_string),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Http { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

/// Which call path produced the failure; selects the generic wording
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Load,
    Create,
    Update,
    Delete,
}

impl Operation {
    pub fn failure_message(self) -> &'static str {
        match self {
            Self::Load => "Could not load products.",
            Self::Create => "Could not create the product.",
            Self::Update => "Could not update the product.",
            Self::Delete => "Could not delete the product.",
        }
    }
}

impl From<OperationKind> for Operation {
    fn from(kind: OperationKind) -> Self {
        match kind {
            OperationKind::Create => Self::Create,
            OperationKind::Update => Self::Update,
            OperationKind::Delete => Self::Delete,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorClass {
    Transient,
    Validation,
    AuthExpired,
    StaleReference,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecoveryAction {
    /// Surface the message, nothing else
    Notify,
    /// Clear the local session and redirect to the login surface
    InvalidateSession,
    /// Re-fetch the current page once, without polling
    Refetch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub class: ErrorClass,
    pub action: RecoveryAction,
    pub level: NoticeLevel,
    pub message: String,
}

impl Classification {
    fn new(class: ErrorClass, action: RecoveryAction, level: NoticeLevel, message: &str) -> Self {
        Self {
            class,
            action,
            level,
            message: message.to_string(),
        }
    }
}

/// User-facing message for a backend validation code
pub fn validation_message(code: &str) -> Option<&'static str> {
    let message = match code {
        "invalid_payload" => "The product data is invalid.",
        "nome_is_required" | "nome_must_be_string" => "Name is required.",
        "marca_is_required" | "marca_must_be_string" => "Brand is required.",
        "valor_must_be_numeric" => "Price must be a number.",
        "valor_must_be_greater_than_zero" => "Price must be greater than zero.",
        "invalid_pagination" => "The requested page is invalid.",
        _ => return None,
    };
    Some(message)
}

pub fn is_auth_code(code: Option<&str>) -> bool {
    code.is_none_or(|code| AUTH_ERROR_CODES.contains(&code))
}

pub fn classify(error: &ApiError, operation: Operation) -> Classification {
    match error {
        ApiError::Timeout => Classification::new(
            ErrorClass::Transient,
            RecoveryAction::Notify,
            NoticeLevel::Error,
            TIMEOUT_MESSAGE,
        ),
        ApiError::Transport(_) | ApiError::Decode(_) => Classification::new(
            ErrorClass::Unknown,
            RecoveryAction::Notify,
            NoticeLevel::Error,
            operation.failure_message(),
        ),
        ApiError::Http { status, code } => classify_http(*status, code.as_deref(), operation),
    }
}

fn classify_http(status: u16, code: Option<&str>, operation: Operation) -> Classification {
    if status == 401 && is_auth_code(code) {
        return Classification::new(
            ErrorClass::AuthExpired,
            RecoveryAction::InvalidateSession,
            NoticeLevel::Error,
            SESSION_EXPIRED_MESSAGE,
        );
    }

    if status == 404 && code == Some(NOT_FOUND_CODE) {
        return Classification::new(
            ErrorClass::StaleReference,
            RecoveryAction::Refetch,
            NoticeLevel::Info,
            STALE_REFERENCE_MESSAGE,
        );
    }

    if let Some(message) = code.and_then(validation_message) {
        return Classification::new(
            ErrorClass::Validation,
            RecoveryAction::Notify,
            NoticeLevel::Error,
            message,
        );
    }

    Classification::new(
        ErrorClass::Unknown,
        RecoveryAction::Notify,
        NoticeLevel::Error,
        operation.failure_message(),
    )
}
