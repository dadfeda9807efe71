//! Endpoint validation for Live API WebSocket URLs
//!
//! Ensures endpoint URLs:
//! - Are properly formatted
//! - Use a WebSocket scheme, `wss` unless insecure endpoints are allowed
//! - Have a host
//!
//! Also handles the `key` query parameter carrying the API key, including
//! redaction for logging.

use thiserror::Error;
use tracing::warn;
use url::Url;

/// Query parameter carrying the API key.
pub const API_KEY_PARAM: &str = "key";

/// Errors that can occur during endpoint validation
#[derive(Debug, Error)]
pub enum EndpointValidationError {
    #[error("Invalid URL format: {0}")]
    InvalidFormat(#[from] url::ParseError),

    #[error("URL scheme must be ws or wss, got: {0}")]
    WebSocketSchemeRequired(String),

    #[error("Insecure ws:// endpoint not allowed")]
    SecureSchemeRequired,

    #[error("URL must have a host")]
    MissingHost,
}

/// Validates a Live API endpoint URL
///
/// # Arguments
/// * `url` - The URL string to validate
/// * `allow_insecure` - Whether plain `ws://` is acceptable (local mocks, proxies)
///
/// # Example
/// ```rust,ignore
/// use waav_live::utils::validate_live_endpoint;
///
/// assert!(validate_live_endpoint("wss://generativelanguage.googleapis.com/ws/x", false).is_ok());
/// assert!(validate_live_endpoint("ws://127.0.0.1:9000/ws", false).is_err());
/// assert!(validate_live_endpoint("ws://127.0.0.1:9000/ws", true).is_ok());
/// ```
pub fn validate_live_endpoint(
    url: &str,
    allow_insecure: bool,
) -> Result<Url, EndpointValidationError> {
    let parsed = Url::parse(url)?;

    match parsed.scheme() {
        "wss" => {}
        "ws" if allow_insecure => {
            warn!(url = %redact_api_key(url), "Using insecure WebSocket endpoint");
        }
        "ws" => return Err(EndpointValidationError::SecureSchemeRequired),
        other => {
            return Err(EndpointValidationError::WebSocketSchemeRequired(
                other.to_string(),
            ));
        }
    }

    match parsed.host_str() {
        Some(host) if !host.is_empty() => Ok(parsed),
        _ => Err(EndpointValidationError::MissingHost),
    }
}

/// Set the API key query parameter, replacing any existing one.
pub fn with_api_key(mut url: Url, api_key: &str) -> Url {
    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(name, _)| name != API_KEY_PARAM)
        .map(|(name, value)| (name.into_owned(), value.into_owned()))
        .collect();

    {
        let mut pairs = url.query_pairs_mut();
        pairs.clear();
        for (name, value) in &retained {
            pairs.append_pair(name, value);
        }
        pairs.append_pair(API_KEY_PARAM, api_key);
    }
    url
}

/// Mask the API key query parameter so the URL can be logged.
///
/// Unparseable input is returned with its query string dropped.
pub fn redact_api_key(url: &str) -> String {
    let Ok(mut parsed) = Url::parse(url) else {
        return url.split('?').next().unwrap_or_default().to_string();
    };

    if !parsed.query_pairs().any(|(name, _)| name == API_KEY_PARAM) {
        return url.to_string();
    }

    let pairs: Vec<(String, String)> = parsed
        .query_pairs()
        .map(|(name, value)| {
            let value = if name == API_KEY_PARAM {
                "***".to_string()
            } else {
                value.into_owned()
            };
            (name.into_owned(), value)
        })
        .collect();

    {
        let mut query = parsed.query_pairs_mut();
        query.clear();
        for (name, value) in &pairs {
            query.append_pair(name, value);
        }
    }
    parsed.to_string()
}
