//! The flat field bag an Adyen notification arrives as.

use axum::{
    Form, Json,
    extract::{
        FromRequest, Request,
        rejection::{FormRejection, JsonRejection},
    },
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::Value;
use std::collections::BTreeMap;

/// Notification fields keyed by their Adyen names (`pspReference`, `eventCode`, ...).
///
/// Extracted from `application/x-www-form-urlencoded` bodies, or from a flat
/// JSON object when the content type is `application/json`. JSON numbers and
/// booleans are kept in their textual form.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NotificationFields(BTreeMap<String, String>);

impl NotificationFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    /// The value of `key`, treating blank values as absent
    pub fn non_empty(&self, key: &str) -> Option<&str> {
        self.get(key).map(str::trim).filter(|value| !value.is_empty())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) -> Option<String> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Raw bag as a JSON object, for storage
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect(),
        )
    }

    fn from_json_object(
        object: serde_json::Map<String, Value>,
    ) -> Result<Self, FieldBagRejection> {
        let mut fields = Self::new();
        for (key, value) in object {
            let text = match value {
                Value::Null => continue,
                Value::String(text) => text,
                Value::Bool(flag) => flag.to_string(),
                Value::Number(number) => number.to_string(),
                Value::Array(_) | Value::Object(_) => {
                    return Err(FieldBagRejection::NestedValue { field: key });
                }
            };
            fields.insert(key, text);
        }
        Ok(fields)
    }
}

impl FromIterator<(String, String)> for NotificationFields {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl From<BTreeMap<String, String>> for NotificationFields {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

/// Why a request body could not be read as a field bag.
#[derive(Debug, thiserror::Error)]
pub enum FieldBagRejection {
    #[error("invalid form body: {0}")]
    Form(#[from] FormRejection),

    #[error("invalid JSON body: {0}")]
    Json(#[from] JsonRejection),

    #[error("field {field:?} is nested; notifications must be a flat object")]
    NestedValue { field: String },
}

impl IntoResponse for FieldBagRejection {
    fn into_response(self) -> Response {
        (StatusCode::BAD_REQUEST, self.to_string()).into_response()
    }
}

fn is_json_request(req: &Request) -> bool {
    req.headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(|content_type| content_type.trim_start().starts_with("application/json"))
        .unwrap_or(false)
}

impl<S> FromRequest<S> for NotificationFields
where
    S: Send + Sync,
{
    type Rejection = FieldBagRejection;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        if is_json_request(&req) {
            let Json(object) =
                Json::<serde_json::Map<String, Value>>::from_request(req, state).await?;
            Self::from_json_object(object)
        } else {
            let Form(map) = Form::<BTreeMap<String, String>>::from_request(req, state).await?;
            Ok(Self(map))
        }
    }
}
