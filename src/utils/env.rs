/// Prefix checked before the bare variable name.
pub const ENV_PREFIX: &str = "ADYEN_";

/// Get environment variable with ADYEN_ prefix, falling back to unprefixed version
///
/// `get_env_with_prefix("NOTIFY_USER")` reads `ADYEN_NOTIFY_USER`, then `NOTIFY_USER`.
/// `get_env_with_prefix("PORT")` reads `ADYEN_PORT`, then `PORT` (Heroku-style hosts).
pub fn get_env_with_prefix(key: &str) -> Option<String> {
    std::env::var(format!("{}{}", ENV_PREFIX, key))
        .or_else(|_| std::env::var(key))
        .ok()
}

/// Parse a prefixed environment variable, ignoring values that fail to parse
pub fn parse_env_with_prefix<T: std::str::FromStr>(key: &str) -> Option<T> {
    get_env_with_prefix(key).and_then(|value| value.parse().ok())
}
