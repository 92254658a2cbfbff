use crate::error::{AppError, Result};
use crate::utils::{get_env_with_prefix, parse_env_with_prefix};
use secrecy::{ExposeSecret, SecretString};
use std::fmt;
use subtle::ConstantTimeEq;

/// Upper bound for `reconcile_delay_seconds`: one day
pub const MAX_RECONCILE_DELAY_SECONDS: u64 = 24 * 60 * 60;

/// Settings for the notification webhook.
///
/// The credentials are the ones entered in the Adyen customer area for the
/// "standard notification" endpoint. Adyen sends them with every call.
pub struct NotifyConfig {
    pub username: String,
    pub password: SecretString,
    /// Route the webhook is mounted at
    pub path: String,
    /// Delay between intake and reconciliation, giving Adyen time to settle
    /// the authorisation before we capture it
    pub reconcile_delay_seconds: u64,
}

impl NotifyConfig {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    #[must_use]
    pub fn with_reconcile_delay_seconds(mut self, seconds: u64) -> Self {
        self.reconcile_delay_seconds = seconds;
        self
    }

    /// Load from `ADYEN_NOTIFY_USER`, `ADYEN_NOTIFY_PASSWD`, `ADYEN_NOTIFY_PATH`
    /// and `ADYEN_RECONCILE_DELAY_SECONDS` (each also readable unprefixed).
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(username) = get_env_with_prefix("NOTIFY_USER") {
            config.username = username;
        }
        if let Some(password) = get_env_with_prefix("NOTIFY_PASSWD") {
            config.password = SecretString::from(password);
        }
        if let Some(path) = get_env_with_prefix("NOTIFY_PATH") {
            config.path = path;
        }
        if let Some(delay) = parse_env_with_prefix("RECONCILE_DELAY_SECONDS") {
            config.reconcile_delay_seconds = delay;
        }

        config
    }

    pub fn validate(&self) -> Result<()> {
        if self.username.is_empty() || self.password.expose_secret().is_empty() {
            return Err(AppError::bad_request(
                "Notification credentials are required (ADYEN_NOTIFY_USER / ADYEN_NOTIFY_PASSWD)",
            ));
        }
        if !self.path.starts_with('/') {
            return Err(AppError::bad_request(format!(
                "Notification path must start with '/': {}",
                self.path
            )));
        }
        if self.reconcile_delay_seconds > MAX_RECONCILE_DELAY_SECONDS {
            return Err(AppError::bad_request(format!(
                "Reconcile delay must be at most {} seconds, got {}",
                MAX_RECONCILE_DELAY_SECONDS, self.reconcile_delay_seconds
            )));
        }
        Ok(())
    }

    /// Compare presented credentials in constant time
    pub fn credentials_match(&self, username: &str, password: &str) -> bool {
        let user_ok = username.as_bytes().ct_eq(self.username.as_bytes());
        let pass_ok = password
            .as_bytes()
            .ct_eq(self.password.expose_secret().as_bytes());
        (user_ok & pass_ok).into()
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            password: SecretString::from(String::new()),
            path: default_path(),
            reconcile_delay_seconds: default_reconcile_delay_seconds(),
        }
    }
}

impl Clone for NotifyConfig {
    fn clone(&self) -> Self {
        Self {
            username: self.username.clone(),
            password: SecretString::from(self.password.expose_secret().to_owned()),
            path: self.path.clone(),
            reconcile_delay_seconds: self.reconcile_delay_seconds,
        }
    }
}

impl fmt::Debug for NotifyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifyConfig")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("path", &self.path)
            .field("reconcile_delay_seconds", &self.reconcile_delay_seconds)
            .finish()
    }
}

fn default_path() -> String {
    "/adyen/notify".to_string()
}

fn default_reconcile_delay_seconds() -> u64 {
    120
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_credentials_match() {
        let config = NotifyConfig::new("adyen", "s3cret");
        assert!(config.credentials_match("adyen", "s3cret"));
        assert!(!config.credentials_match("adyen", "wrong"));
        assert!(!config.credentials_match("other", "s3cret"));
        assert!(!config.credentials_match("", ""));
    }

    #[test]
    fn test_validate() {
        assert!(NotifyConfig::default().validate().is_err());
        assert!(NotifyConfig::new("adyen", "s3cret").validate().is_ok());
        assert!(
            NotifyConfig::new("adyen", "s3cret")
                .with_path("adyen/notify")
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_reconcile_delay_is_bounded() {
        let config = NotifyConfig::new("adyen", "s3cret");
        assert!(
            config
                .clone()
                .with_reconcile_delay_seconds(MAX_RECONCILE_DELAY_SECONDS)
                .validate()
                .is_ok()
        );
        assert!(
            config
                .with_reconcile_delay_seconds(10_000_000_000_000_000)
                .validate()
                .is_err()
        );
    }

    #[test]
    fn test_debug_redacts_password() {
        let config = NotifyConfig::new("adyen", "s3cret");
        let debug = format!("{:?}", config);
        assert!(debug.contains("adyen"));
        assert!(!debug.contains("s3cret"));
    }

    #[test]
    fn test_defaults() {
        let config = NotifyConfig::default();
        assert_eq!(config.path, "/adyen/notify");
        assert_eq!(config.reconcile_delay_seconds, 120);
    }

    #[test]
    fn test_from_env() {
        unsafe {
            std::env::set_var("ADYEN_NOTIFY_USER", "env-user");
            std::env::set_var("ADYEN_NOTIFY_PASSWD", "env-pass");
            std::env::set_var("ADYEN_RECONCILE_DELAY_SECONDS", "5");
        }

        let config = NotifyConfig::from_env();
        assert_eq!(config.username, "env-user");
        assert!(config.credentials_match("env-user", "env-pass"));
        assert_eq!(config.reconcile_delay_seconds, 5);

        unsafe {
            std::env::remove_var("ADYEN_NOTIFY_USER");
            std::env::remove_var("ADYEN_NOTIFY_PASSWD");
            std::env::remove_var("ADYEN_RECONCILE_DELAY_SECONDS");
        }
    }
}
