//! Rate-limit hint parsing.
//!
//! Messaging transports report throttling by embedding
//! `{"retry_after":N}` in the error text. Callers sleep `N` seconds and
//! retry once.

use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;

/// Compiled `{"retry_after":N}` matcher.
static RETRY_AFTER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\{"retry_after":([0-9]+)\}"#).expect("valid regex"));

/// Extract the wait hint from an error message, if present.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use renderq_core::retry::parse_retry_after;
///
/// assert_eq!(
///     parse_retry_after(r#"Too Many Requests {"retry_after":5}"#),
///     Some(Duration::from_secs(5))
/// );
/// assert_eq!(parse_retry_after("connection reset"), None);
/// ```
pub fn parse_retry_after(message: &str) -> Option<Duration> {
    let caps = RETRY_AFTER_RE.captures(message)?;
    let secs: u64 = caps.get(1)?.as_str().parse().ok()?;
    Some(Duration::from_secs(secs))
}
