//! Input validation for values typed into the dashboard.
//!
//! Everything here runs before a request is built, so malformed input never
//! reaches the detection server.

use anyhow::{anyhow, Result};
use url::Url;

// ============================================================================
// CONSTANTS: Input Size Limits
// ============================================================================

/// Maximum length for source ids assigned by the server
pub const MAX_ID_LENGTH: usize = 256;

/// Maximum length for URIs (RTSP, webhooks)
pub const MAX_URI_LENGTH: usize = 4096;

/// Maximum length for display names
pub const MAX_NAME_LENGTH: usize = 512;

// ============================================================================
// String Validation
// ============================================================================

/// Validate string length against a maximum
pub fn validate_length(value: &str, max_length: usize, field_name: &str) -> Result<()> {
    if value.len() > max_length {
        return Err(anyhow!(
            "{} exceeds maximum length of {} bytes (got {})",
            field_name,
            max_length,
            value.len()
        ));
    }
    Ok(())
}

/// Validate non-empty string
pub fn validate_non_empty(value: &str, field_name: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(anyhow!("{} cannot be empty", field_name));
    }
    Ok(())
}

/// Validate a server-assigned source id before it is placed in a request path
pub fn validate_id(id: &str, field_name: &str) -> Result<()> {
    validate_non_empty(id, field_name)?;
    validate_length(id, MAX_ID_LENGTH, field_name)?;

    if id.contains("..") || id.contains('/') || id.contains('\\') {
        return Err(anyhow!(
            "{} contains invalid characters (no path separators or '..' allowed)",
            field_name
        ));
    }

    Ok(())
}

/// Validate display name
pub fn validate_name(name: &str, field_name: &str) -> Result<()> {
    validate_non_empty(name, field_name)?;
    validate_length(name, MAX_NAME_LENGTH, field_name)?;
    Ok(())
}

/// Validate stream URI (RTSP and friends)
pub fn validate_uri(uri: &str, field_name: &str) -> Result<()> {
    validate_non_empty(uri, field_name)?;
    validate_length(uri, MAX_URI_LENGTH, field_name)?;

    // The server hands stream URIs to external tooling
    let dangerous_chars = ['`', '$', ';', '|', '&', '\n', '\r'];
    if uri.chars().any(|c| dangerous_chars.contains(&c)) {
        return Err(anyhow!(
            "{} contains dangerous shell metacharacters",
            field_name
        ));
    }

    Ok(())
}

/// Validate a webhook URL: absolute http(s) URL with a host
pub fn validate_webhook_url(url: &str) -> Result<Url> {
    validate_non_empty(url, "webhook URL")?;
    validate_length(url, MAX_URI_LENGTH, "webhook URL")?;

    let parsed = Url::parse(url.trim()).map_err(|e| anyhow!("invalid webhook URL: {}", e))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(anyhow!(
            "webhook URL must use http or https, got {}",
            parsed.scheme()
        ));
    }
    if parsed.host_str().is_none() {
        return Err(anyhow!("webhook URL has no host"));
    }
    Ok(parsed)
}

// ============================================================================
// Numeric Validation
// ============================================================================

/// Validate port number (1-65535)
pub fn validate_port(port: u16) -> Result<()> {
    if port == 0 {
        return Err(anyhow!("Port number must be between 1 and 65535, got 0"));
    }
    Ok(())
}

/// Validate value is within range
pub fn validate_range<T: PartialOrd + std::fmt::Display>(
    value: T,
    min: T,
    max: T,
    field_name: &str,
) -> Result<()> {
    if value < min || value > max {
        return Err(anyhow!(
            "{} must be between {} and {}, got {}",
            field_name,
            min,
            max,
            value
        ));
    }
    Ok(())
}

/// Parse a numeric form value, rejecting NaN and infinities
pub fn parse_number(value: &str, field_name: &str) -> Result<f64> {
    let parsed: f64 = value
        .trim()
        .parse()
        .map_err(|_| anyhow!("{} must be a number, got '{}'", field_name, value))?;
    if !parsed.is_finite() {
        return Err(anyhow!("{} must be a finite number", field_name));
    }
    Ok(parsed)
}

/// Detection threshold: a number in [0, 1]
pub fn parse_threshold(value: &str) -> Result<f64> {
    let threshold = parse_number(value, "threshold")?;
    validate_range(threshold, 0.0, 1.0, "threshold")?;
    Ok(threshold)
}

/// Detection delay in seconds: a non-negative number
pub fn parse_delay(value: &str) -> Result<f64> {
    let delay = parse_number(value, "delay")?;
    if delay < 0.0 {
        return Err(anyhow!("delay cannot be negative, got {}", delay));
    }
    Ok(delay)
}

// ============================================================================
// Tests
// ============================================================================
