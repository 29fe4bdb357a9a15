//! Environment variable utilities
//!
//! Generic `env_get<T>` for parsing environment variables with defaults.

use std::str::FromStr;

/// Get environment variable parsed as type T, or return default
///
/// Works with any type that implements `FromStr`.
///
/// # Examples
///
/// ```ignore
/// let stack: usize = env_get("CORONET_STACK_SIZE", 64 * 1024);
/// ```
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Get environment variable as boolean
///
/// Accepts "1", "true", "yes", "on" (case-insensitive) as true. Everything
/// else returns false; unset returns the default.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}
