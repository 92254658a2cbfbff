//! Drive a `Router` in-process and assert on the response.
//!
//! ```rust,ignore
//! testing::post(router, "/adyen/notify")
//!     .basic_auth("username", "password")
//!     .form_body(&[("pspReference", "8513823667306210"), ("eventCode", "AUTHORISATION")])
//!     .execute()
//!     .await
//!     .assert_ok()
//!     .assert_body("[accepted]")
//!     .await;
//! ```

use axum::{
    Router,
    body::{Body, Bytes},
    http::{HeaderName, Method, Request, StatusCode, header},
    response::Response,
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use serde::{Serialize, de::DeserializeOwned};
use tower::ServiceExt;

/// A single request against an in-process router
pub struct Scenario {
    app: Router,
    request: Request<Body>,
}

impl Scenario {
    pub fn new(app: Router) -> Self {
        Self {
            app,
            request: Request::new(Body::empty()),
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        *self.request.method_mut() = method;
        self
    }

    pub fn uri(mut self, uri: &str) -> Self {
        *self.request.uri_mut() = uri.parse().unwrap();
        self
    }

    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.request.headers_mut().insert(
            HeaderName::from_bytes(key.as_bytes()).unwrap(),
            value.parse().unwrap(),
        );
        self
    }

    /// `Authorization: Basic base64(username:password)`
    pub fn basic_auth(self, username: &str, password: &str) -> Self {
        let encoded = BASE64.encode(format!("{}:{}", username, password));
        self.header("authorization", &format!("Basic {}", encoded))
    }

    /// URL-encoded form body, the way Adyen posts notifications
    pub fn form_body(mut self, fields: &[(&str, &str)]) -> Self {
        let body = fields
            .iter()
            .map(|(key, value)| format!("{}={}", urlencoding::encode(key), urlencoding::encode(value)))
            .collect::<Vec<_>>()
            .join("&");
        *self.request.body_mut() = Body::from(body);
        self.request.headers_mut().insert(
            header::CONTENT_TYPE,
            "application/x-www-form-urlencoded".parse().unwrap(),
        );
        self
    }

    pub fn json_body<T: Serialize>(mut self, body: &T) -> Self {
        let json = serde_json::to_string(body).unwrap();
        *self.request.body_mut() = Body::from(json);
        self.request
            .headers_mut()
            .insert(header::CONTENT_TYPE, "application/json".parse().unwrap());
        self
    }

    /// Raw body, with no content type set
    pub fn text_body(mut self, body: impl Into<String>) -> Self {
        *self.request.body_mut() = Body::from(body.into());
        self
    }

    pub async fn execute(self) -> ScenarioAssert {
        let response = self.app.oneshot(self.request).await.unwrap();
        ScenarioAssert { response }
    }
}

/// Fluent assertions over the response
pub struct ScenarioAssert {
    response: Response,
}

impl ScenarioAssert {
    pub fn assert_status(self, expected: StatusCode) -> Self {
        assert_eq!(
            self.response.status(),
            expected,
            "Expected status {}, got {}",
            expected,
            self.response.status()
        );
        self
    }

    pub fn assert_ok(self) -> Self {
        self.assert_status(StatusCode::OK)
    }

    pub fn assert_unauthorized(self) -> Self {
        self.assert_status(StatusCode::UNAUTHORIZED)
    }

    pub fn assert_not_found(self) -> Self {
        self.assert_status(StatusCode::NOT_FOUND)
    }

    pub fn assert_header(self, key: &str, expected: &str) -> Self {
        let value = self
            .response
            .headers()
            .get(key)
            .unwrap_or_else(|| panic!("Header '{}' not found", key))
            .to_str()
            .unwrap();
        assert_eq!(value, expected, "Header '{}' value mismatch", key);
        self
    }

    pub fn assert_json(self) -> Self {
        let content_type = self
            .response
            .headers()
            .get(header::CONTENT_TYPE)
            .expect("Content-Type header not found")
            .to_str()
            .unwrap();
        assert!(
            content_type.contains("application/json"),
            "Expected JSON content type, got: {}",
            content_type
        );
        self
    }

    /// Assert the whole body equals `expected`
    pub async fn assert_body(self, expected: &str) -> Self {
        let (this, bytes) = self.buffer().await;
        assert_eq!(String::from_utf8_lossy(&bytes), expected, "Response body mismatch");
        this
    }

    /// Assert a JSON field, addressed as `checks.0.name`
    pub async fn assert_json_path(self, path: &str, expected: serde_json::Value) -> Self {
        let (this, bytes) = self.buffer().await;
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let actual =
            json_path_get(&json, path).unwrap_or_else(|| panic!("Path '{}' not found in JSON", path));
        assert_eq!(actual, &expected, "JSON path '{}' value mismatch", path);
        this
    }

    pub fn status(&self) -> StatusCode {
        self.response.status()
    }

    pub async fn body_string(self) -> String {
        let bytes = axum::body::to_bytes(self.response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    pub async fn json<T: DeserializeOwned>(self) -> T {
        let bytes = axum::body::to_bytes(self.response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).expect("Failed to parse JSON response")
    }

    /// Print status, headers and body to stderr
    pub async fn dump(self) -> Self {
        let (this, bytes) = self.buffer().await;
        eprintln!("=== Response Dump ===");
        eprintln!("Status: {}", this.response.status());
        for (key, value) in this.response.headers() {
            eprintln!("  {}: {}", key, value.to_str().unwrap_or("<invalid>"));
        }
        eprintln!("Body: {}", String::from_utf8_lossy(&bytes));
        this
    }

    pub fn response(self) -> Response {
        self.response
    }

    /// Read the body while keeping status and headers for further assertions
    async fn buffer(self) -> (Self, Bytes) {
        let (parts, body) = self.response.into_parts();
        let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
        let response = Response::from_parts(parts, Body::from(bytes.clone()));
        (Self { response }, bytes)
    }
}

fn json_path_get<'a>(json: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    let mut current = json;
    for part in path.split('.') {
        current = match part.parse::<usize>() {
            Ok(index) => current.get(index)?,
            Err(_) => current.get(part)?,
        };
    }
    Some(current)
}

pub fn get(app: Router, uri: &str) -> Scenario {
    Scenario::new(app).method(Method::GET).uri(uri)
}

pub fn post(app: Router, uri: &str) -> Scenario {
    Scenario::new(app).method(Method::POST).uri(uri)
}
