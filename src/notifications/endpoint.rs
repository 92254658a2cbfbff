//! `POST /adyen/notify`: the webhook Adyen delivers notifications to.
//!
//! Adyen retries any delivery that is not acknowledged with `[accepted]`, so
//! once a request is authenticated the endpoint always answers 200. Intake
//! failures are logged, never returned.

use std::sync::Arc;

use axum::{
    Extension, Router,
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::post,
};
use base64::{Engine, engine::general_purpose::STANDARD as BASE64};
use chrono::{DateTime, Duration, Utc};

use crate::app::AppContext;
use crate::error::AppError;
use crate::http::RouteModule;
use crate::traits::job::JobQueue;

use super::config::NotifyConfig;
use super::error::NotificationError;
use super::fields::{FieldBagRejection, NotificationFields};
use super::jobs::ReconcileNotificationJob;
use super::model::Notification;

/// Acknowledgement body Adyen expects
pub const ACCEPTED: &str = "[accepted]";

const REALM: &str = "Basic realm=\"Application\"";
const ACCESS_DENIED: &str = "HTTP Basic: Access denied.\n";

/// Route module serving the notification webhook.
pub struct WebhookEndpoint {
    config: Arc<NotifyConfig>,
}

impl WebhookEndpoint {
    pub fn new(config: NotifyConfig) -> Self {
        Self {
            config: Arc::new(config),
        }
    }
}

impl RouteModule for WebhookEndpoint {
    fn routes(&self) -> Router<AppContext> {
        Router::new()
            .route(&self.config.path, post(notify))
            .route_layer(middleware::from_fn_with_state(
                self.config.clone(),
                require_basic_auth,
            ))
            .layer(Extension(self.config.clone()))
    }
}

/// Reject requests without the configured Basic credentials before the body
/// is read.
async fn require_basic_auth(
    State(config): State<Arc<NotifyConfig>>,
    request: Request,
    next: Next,
) -> Response {
    let authorized = basic_credentials(request.headers())
        .is_some_and(|(username, password)| config.credentials_match(&username, &password));

    if !authorized {
        tracing::warn!(path = %request.uri().path(), "Notification rejected: bad or missing credentials");
        return (
            StatusCode::UNAUTHORIZED,
            [(header::WWW_AUTHENTICATE, REALM)],
            ACCESS_DENIED,
        )
            .into_response();
    }

    next.run(request).await
}

/// Decode an `Authorization: Basic ...` header into `(username, password)`
fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }

    let decoded = BASE64.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

async fn notify(
    State(ctx): State<AppContext>,
    Extension(config): Extension<Arc<NotifyConfig>>,
    fields: Result<NotificationFields, FieldBagRejection>,
) -> (StatusCode, &'static str) {
    match intake(&ctx, &config, fields).await {
        Ok(notification) => {
            tracing::info!(
                notification_id = %notification.id,
                psp_reference = %notification.psp_reference,
                event_code = %notification.event_code,
                success = notification.success,
                "Notification accepted"
            );
        }
        Err(err @ NotificationError::Duplicate { .. }) => {
            tracing::info!(error = %err, "Duplicate notification ignored");
        }
        Err(err @ NotificationError::ValidationFailed(_)) => {
            tracing::info!(error = %err, "Invalid notification ignored");
        }
        Err(NotificationError::Unhandled(err)) => {
            tracing::error!(error = %err, details = ?err, "Failed to take in notification");
        }
    }

    (StatusCode::OK, ACCEPTED)
}

/// Store the notification and schedule its reconciliation
async fn intake(
    ctx: &AppContext,
    config: &NotifyConfig,
    fields: Result<NotificationFields, FieldBagRejection>,
) -> Result<Notification, NotificationError> {
    let fields = fields.map_err(|rejection| NotificationError::validation(rejection.to_string()))?;

    let notification = ctx.notifications()?.log(&fields).await?;

    // Only a capture has to wait for Adyen to settle; refusals apply at once
    let run_at = if notification.is_successful_authorisation() {
        capture_run_at(config.reconcile_delay_seconds).ok_or_else(|| {
            AppError::internal(format!(
                "notification {} stored but reconcile delay of {}s is out of range",
                notification.id, config.reconcile_delay_seconds
            ))
        })?
    } else {
        Utc::now()
    };
    ctx.jobs()?
        .schedule(&ReconcileNotificationJob::new(notification.id.clone()), run_at)
        .await
        .map_err(|e| {
            AppError::internal(format!(
                "notification {} stored but reconciliation not scheduled: {}",
                notification.id, e
            ))
        })?;

    Ok(notification)
}

fn capture_run_at(delay_seconds: u64) -> Option<DateTime<Utc>> {
    let delay = Duration::try_seconds(i64::try_from(delay_seconds).ok()?)?;
    Utc::now().checked_add_signed(delay)
}
