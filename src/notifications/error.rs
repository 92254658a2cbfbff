use crate::error::AppError;

use super::model::EventCode;

/// Why a notification could not be taken in.
///
/// Only `Unhandled` indicates something went wrong on our side; the other two
/// are expected under Adyen's at-least-once delivery.
#[derive(Debug, thiserror::Error)]
pub enum NotificationError {
    /// The `(psp_reference, event_code, success)` tuple is already stored
    #[error("notification already stored: {psp_reference}/{event_code}/success={success}")]
    Duplicate {
        psp_reference: String,
        event_code: EventCode,
        success: bool,
    },

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error(transparent)]
    Unhandled(#[from] AppError),
}

impl NotificationError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::ValidationFailed(msg.into())
    }

    /// Duplicate deliveries and malformed payloads are expected; neither is worth an alert
    pub fn is_expected(&self) -> bool {
        matches!(self, Self::Duplicate { .. } | Self::ValidationFailed(_))
    }
}

#[cfg(feature = "database")]
impl From<sea_orm::DbErr> for NotificationError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Unhandled(err.into())
    }
}
