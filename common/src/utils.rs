// common/src/utils.rs
use chrono::Utc;
use std::str::FromStr;
use tracing::Level;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::FmtSubscriber;

/// Setup tracing for consistent logging across the server and client.
/// Unknown level names fall back to INFO.
pub fn setup_tracing(level: &str) -> Result<(), SetGlobalDefaultError> {
    let parsed = Level::from_str(level).ok();
    let subscriber = FmtSubscriber::builder()
        .with_max_level(parsed.unwrap_or(Level::INFO))
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    if parsed.is_none() {
        tracing::warn!("Unknown log level '{}', using info", level);
    }
    Ok(())
}

/// Current time as Unix seconds
pub fn unix_now() -> i64 {
    Utc::now().timestamp()
}

/// Short, non-reversible label for a token so rejections can be correlated
/// in logs without writing the credential itself.
pub fn token_fingerprint(token: &str) -> String {
    let tail: String = token
        .chars()
        .rev()
        .take(8)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("…{} ({} bytes)", tail, token.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_fingerprint_hides_prefix() {
        let token = "header.payload.signature12345678";
        let fp = token_fingerprint(token);
        assert!(fp.contains("12345678"));
        assert!(!fp.contains("header"));
        assert!(fp.contains(&token.len().to_string()));
    }

    #[test]
    fn test_token_fingerprint_short_token() {
        assert_eq!(token_fingerprint("abc"), "…abc (3 bytes)");
    }
}
