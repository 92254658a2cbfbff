use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Payment state as recorded by the host shop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentState {
    Checkout,
    Pending,
    Processing,
    /// Funds captured
    Completed,
    Failed,
    Void,
    Invalid,
}

impl PaymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Checkout => "checkout",
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Void => "void",
            Self::Invalid => "invalid",
        }
    }

    /// Apply `event`, or report why it cannot be applied.
    ///
    /// Re-applying an event to a payment already in its target state is a
    /// no-op, so duplicate reconciliations are harmless.
    pub fn apply(self, event: PaymentEvent) -> Result<Transition, RejectedTransition> {
        let target = event.target();
        if self == target {
            return Ok(Transition::AlreadyInState(target));
        }
        if event.allowed_from().contains(&self) {
            Ok(Transition::Applied { from: self, to: target })
        } else {
            Err(RejectedTransition { from: self, event })
        }
    }
}

impl fmt::Display for PaymentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "checkout" => Ok(Self::Checkout),
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "void" => Ok(Self::Void),
            "invalid" => Ok(Self::Invalid),
            other => Err(format!("unknown payment state: {}", other)),
        }
    }
}

/// Events the reconciler drives a payment with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentEvent {
    Capture,
    Invalidate,
}

impl PaymentEvent {
    pub fn target(&self) -> PaymentState {
        match self {
            Self::Capture => PaymentState::Completed,
            Self::Invalidate => PaymentState::Invalid,
        }
    }

    /// States the event may move a payment out of
    pub fn allowed_from(&self) -> &'static [PaymentState] {
        match self {
            Self::Capture => &[PaymentState::Pending, PaymentState::Processing],
            Self::Invalidate => &[
                PaymentState::Checkout,
                PaymentState::Pending,
                PaymentState::Processing,
            ],
        }
    }
}

impl fmt::Display for PaymentEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Capture => f.write_str("capture"),
            Self::Invalidate => f.write_str("invalidate"),
        }
    }
}

/// Result of a permitted transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied { from: PaymentState, to: PaymentState },
    AlreadyInState(PaymentState),
}

impl Transition {
    pub fn changed(&self) -> bool {
        matches!(self, Self::Applied { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RejectedTransition {
    pub from: PaymentState,
    pub event: PaymentEvent,
}
