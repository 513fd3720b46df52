//! Environment helpers: centralized dotenv loading and ergonomic getters.
//! Every getter calls `init_env()` first, so callers never need to.
use std::str::FromStr;
use std::sync::Once;

use tracing::warn;

static INIT: Once = Once::new();

/// Load `.env` from the working directory exactly once. Safe to call many times.
pub fn init_env() {
    INIT.call_once(|| {
        let _ = dotenv::dotenv();
    });
}

/// Get optional env var (None if unset or blank).
pub fn env_opt(key: &str) -> Option<String> {
    init_env();
    match std::env::var(key) {
        Ok(v) if !v.trim().is_empty() => Some(v),
        _ => None,
    }
}

/// Get parsed value with default fallback. A value that fails to parse is
/// logged and replaced by the default.
pub fn env_parse<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    init_env();
    match std::env::var(key) {
        Ok(raw) if !raw.trim().is_empty() => match raw.trim().parse::<T>() {
            Ok(v) => v,
            Err(_) => {
                warn!(target = "env", key, value = %raw, "unparsable value; using default");
                default
            }
        },
        _ => default,
    }
}

/// Parsed value, or `None` when unset, blank or unparsable.
pub fn env_parse_opt<T: FromStr>(key: &str) -> Option<T> {
    let raw = env_opt(key)?;
    match raw.trim().parse::<T>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(target = "env", key, value = %raw, "unparsable value; ignoring");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unset_and_blank_values_fall_back() {
        std::env::set_var("RATING_PORTER_TEST_BLANK", "   ");
        assert_eq!(env_opt("RATING_PORTER_TEST_BLANK"), None);
        assert_eq!(env_opt("RATING_PORTER_TEST_UNSET"), None);
        assert_eq!(env_parse("RATING_PORTER_TEST_BLANK", 7u64), 7);
    }

    #[test]
    fn parsed_values_and_garbage() {
        std::env::set_var("RATING_PORTER_TEST_NUM", " 42 ");
        std::env::set_var("RATING_PORTER_TEST_BAD", "forty");
        assert_eq!(env_parse("RATING_PORTER_TEST_NUM", 0u64), 42);
        assert_eq!(env_parse("RATING_PORTER_TEST_BAD", 5u64), 5);
        assert_eq!(env_parse_opt::<u64>("RATING_PORTER_TEST_NUM"), Some(42));
        assert_eq!(env_parse_opt::<u64>("RATING_PORTER_TEST_BAD"), None);
    }
}
