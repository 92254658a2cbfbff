//! Notification records and field-bag validation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::error::NotificationError;
use super::fields::NotificationFields;

/// Adyen event code carried by a notification.
///
/// Codes this service does not know about are kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum EventCode {
    Authorisation,
    Cancellation,
    Refund,
    CancelOrRefund,
    Capture,
    CaptureFailed,
    RefundFailed,
    Pending,
    NotificationOfChargeback,
    Chargeback,
    ChargebackReversed,
    ReportAvailable,
    Other(String),
}

impl EventCode {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Authorisation => "AUTHORISATION",
            Self::Cancellation => "CANCELLATION",
            Self::Refund => "REFUND",
            Self::CancelOrRefund => "CANCEL_OR_REFUND",
            Self::Capture => "CAPTURE",
            Self::CaptureFailed => "CAPTURE_FAILED",
            Self::RefundFailed => "REFUND_FAILED",
            Self::Pending => "PENDING",
            Self::NotificationOfChargeback => "NOTIFICATION_OF_CHARGEBACK",
            Self::Chargeback => "CHARGEBACK",
            Self::ChargebackReversed => "CHARGEBACK_REVERSED",
            Self::ReportAvailable => "REPORT_AVAILABLE",
            Self::Other(code) => code,
        }
    }

    pub fn is_authorisation(&self) -> bool {
        matches!(self, Self::Authorisation)
    }
}

impl From<String> for EventCode {
    fn from(code: String) -> Self {
        match code.as_str() {
            "AUTHORISATION" => Self::Authorisation,
            "CANCELLATION" => Self::Cancellation,
            "REFUND" => Self::Refund,
            "CANCEL_OR_REFUND" => Self::CancelOrRefund,
            "CAPTURE" => Self::Capture,
            "CAPTURE_FAILED" => Self::CaptureFailed,
            "REFUND_FAILED" => Self::RefundFailed,
            "PENDING" => Self::Pending,
            "NOTIFICATION_OF_CHARGEBACK" => Self::NotificationOfChargeback,
            "CHARGEBACK" => Self::Chargeback,
            "CHARGEBACK_REVERSED" => Self::ChargebackReversed,
            "REPORT_AVAILABLE" => Self::ReportAvailable,
            _ => Self::Other(code),
        }
    }
}

impl From<&str> for EventCode {
    fn from(code: &str) -> Self {
        Self::from(code.to_string())
    }
}

impl From<EventCode> for String {
    fn from(code: EventCode) -> Self {
        match code {
            EventCode::Other(code) => code,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for EventCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The tuple a notification is deduplicated on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NotificationKey {
    pub psp_reference: String,
    pub event_code: EventCode,
    pub success: bool,
}

/// A validated notification that has not been stored yet.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewNotification {
    pub psp_reference: String,
    pub event_code: EventCode,
    pub success: bool,
    pub merchant_reference: Option<String>,
    pub original_reference: Option<String>,
    pub merchant_account_code: Option<String>,
    pub payment_method: Option<String>,
    pub currency: Option<String>,
    /// Amount in minor units
    pub value: Option<i64>,
    pub event_date: Option<String>,
    pub live: Option<bool>,
    pub reason: Option<String>,
    pub operations: Vec<String>,
    /// Every field received, including the ones mapped above
    pub raw: serde_json::Value,
}

impl NewNotification {
    /// Validate a field bag.
    ///
    /// `pspReference`, `eventCode` and `success` are required; `success` must
    /// be `true` or `false`.
    pub fn from_fields(fields: &NotificationFields) -> Result<Self, NotificationError> {
        let psp_reference = fields
            .non_empty("pspReference")
            .ok_or_else(|| NotificationError::validation("pspReference can't be blank"))?
            .to_string();
        let event_code = EventCode::from(
            fields
                .non_empty("eventCode")
                .ok_or_else(|| NotificationError::validation("eventCode can't be blank"))?,
        );

        let flag = fields
            .non_empty("success")
            .ok_or_else(|| NotificationError::validation("success can't be blank"))?;
        let success = parse_bool(flag).ok_or_else(|| {
            NotificationError::validation(format!("success must be true or false, got {flag:?}"))
        })?;

        let value = fields
            .non_empty("value")
            .map(|raw| {
                raw.parse::<i64>().map_err(|_| {
                    NotificationError::validation(format!("value must be an integer, got {raw:?}"))
                })
            })
            .transpose()?;

        let live = fields
            .non_empty("live")
            .map(|raw| {
                parse_bool(raw).ok_or_else(|| {
                    NotificationError::validation(format!("live must be true or false, got {raw:?}"))
                })
            })
            .transpose()?;

        let operations = fields
            .non_empty("operations")
            .map(|ops| {
                ops.split(',')
                    .map(str::trim)
                    .filter(|op| !op.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            psp_reference,
            event_code,
            success,
            merchant_reference: fields.non_empty("merchantReference").map(str::to_string),
            original_reference: fields.non_empty("originalReference").map(str::to_string),
            merchant_account_code: fields.non_empty("merchantAccountCode").map(str::to_string),
            payment_method: fields.non_empty("paymentMethod").map(str::to_string),
            currency: fields.non_empty("currency").map(str::to_string),
            value,
            event_date: fields.non_empty("eventDate").map(str::to_string),
            live,
            reason: fields.non_empty("reason").map(str::to_string),
            operations,
            raw: fields.to_json(),
        })
    }

    pub fn key(&self) -> NotificationKey {
        NotificationKey {
            psp_reference: self.psp_reference.clone(),
            event_code: self.event_code.clone(),
            success: self.success,
        }
    }

    /// Attach storage identity
    pub fn into_notification(self, id: String, created_at: DateTime<Utc>) -> Notification {
        Notification {
            id,
            psp_reference: self.psp_reference,
            event_code: self.event_code,
            success: self.success,
            merchant_reference: self.merchant_reference,
            original_reference: self.original_reference,
            merchant_account_code: self.merchant_account_code,
            payment_method: self.payment_method,
            currency: self.currency,
            value: self.value,
            event_date: self.event_date,
            live: self.live,
            reason: self.reason,
            operations: self.operations,
            raw: self.raw,
            created_at,
        }
    }
}

/// A stored notification. Never updated, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub psp_reference: String,
    pub event_code: EventCode,
    pub success: bool,
    pub merchant_reference: Option<String>,
    pub original_reference: Option<String>,
    pub merchant_account_code: Option<String>,
    pub payment_method: Option<String>,
    pub currency: Option<String>,
    pub value: Option<i64>,
    pub event_date: Option<String>,
    pub live: Option<bool>,
    pub reason: Option<String>,
    pub operations: Vec<String>,
    pub raw: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn key(&self) -> NotificationKey {
        NotificationKey {
            psp_reference: self.psp_reference.clone(),
            event_code: self.event_code.clone(),
            success: self.success,
        }
    }

    /// Successful AUTHORISATION: funds are reserved and may be captured
    pub fn is_successful_authorisation(&self) -> bool {
        self.event_code.is_authorisation() && self.success
    }

    /// Refused AUTHORISATION: the payment should be invalidated
    pub fn is_failed_authorisation(&self) -> bool {
        self.event_code.is_authorisation() && !self.success
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, &str)]) -> NotificationFields {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn authorisation() -> NotificationFields {
        fields(&[
            ("pspReference", "8513823667306210"),
            ("eventDate", "2013-10-21T14:45:45.93Z"),
            ("merchantAccountCode", "Test"),
            ("reason", "41061:1111:6/2016"),
            ("originalReference", ""),
            ("value", "6999"),
            ("eventCode", "AUTHORISATION"),
            ("merchantReference", "R354361834-A3JC8TNJ"),
            ("operations", "CANCEL,CAPTURE,REFUND"),
            ("success", "true"),
            ("paymentMethod", "visa"),
            ("currency", "USD"),
            ("live", "false"),
        ])
    }

    #[test]
    fn test_parses_full_authorisation() {
        let notification = NewNotification::from_fields(&authorisation()).unwrap();

        assert_eq!(notification.psp_reference, "8513823667306210");
        assert_eq!(notification.event_code, EventCode::Authorisation);
        assert!(notification.success);
        assert_eq!(notification.value, Some(6999));
        assert_eq!(notification.live, Some(false));
        assert_eq!(notification.original_reference, None);
        assert_eq!(notification.operations, vec!["CANCEL", "CAPTURE", "REFUND"]);
        assert_eq!(notification.raw["merchantReference"], "R354361834-A3JC8TNJ");
    }

    #[test]
    fn test_missing_success_is_rejected() {
        let mut bag = authorisation();
        bag.remove("success");
        assert!(matches!(
            NewNotification::from_fields(&bag),
            Err(NotificationError::ValidationFailed(_))
        ));

        bag.insert("success", "");
        assert!(matches!(
            NewNotification::from_fields(&bag),
            Err(NotificationError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_missing_psp_reference_is_rejected() {
        let mut bag = authorisation();
        bag.insert("pspReference", "");

        let err = NewNotification::from_fields(&bag).unwrap_err();
        assert!(matches!(err, NotificationError::ValidationFailed(_)));
    }

    #[test]
    fn test_bad_success_flag_is_rejected() {
        let mut bag = authorisation();
        bag.insert("success", "maybe");

        assert!(matches!(
            NewNotification::from_fields(&bag),
            Err(NotificationError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_bad_value_is_rejected() {
        let mut bag = authorisation();
        bag.insert("value", "69.99");

        assert!(matches!(
            NewNotification::from_fields(&bag),
            Err(NotificationError::ValidationFailed(_))
        ));
    }

    #[test]
    fn test_unknown_event_code_is_kept() {
        let mut bag = authorisation();
        bag.insert("eventCode", "FOO");

        let notification = NewNotification::from_fields(&bag).unwrap();
        assert_eq!(notification.event_code, EventCode::Other("FOO".to_string()));
        assert_eq!(notification.event_code.to_string(), "FOO");
    }

    #[test]
    fn test_event_code_serde_uses_wire_names() {
        let json = serde_json::to_string(&EventCode::CancelOrRefund).unwrap();
        assert_eq!(json, "\"CANCEL_OR_REFUND\"");

        let parsed: EventCode = serde_json::from_str("\"AUTHORISATION\"").unwrap();
        assert_eq!(parsed, EventCode::Authorisation);
    }

    #[test]
    fn test_authorisation_predicates() {
        let mut bag = authorisation();
        let ok = NewNotification::from_fields(&bag)
            .unwrap()
            .into_notification("1".to_string(), Utc::now());
        assert!(ok.is_successful_authorisation());
        assert!(!ok.is_failed_authorisation());

        bag.insert("success", "false");
        let refused = NewNotification::from_fields(&bag)
            .unwrap()
            .into_notification("2".to_string(), Utc::now());
        assert!(refused.is_failed_authorisation());

        bag.insert("eventCode", "CAPTURE");
        let capture = NewNotification::from_fields(&bag)
            .unwrap()
            .into_notification("3".to_string(), Utc::now());
        assert!(!capture.is_failed_authorisation());
        assert!(!capture.is_successful_authorisation());
    }
}
