//! Device JWTs
//!
//! Sensors authenticate with an HS256 token as their MQTT password. This
//! module mints such tokens from a shared secret, verifies them, and decodes
//! the payload of any token without a key so its claims and expiry can be
//! checked by eye.

use std::fmt;
use std::time::Duration;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Issuer the broker's JWT authenticator expects
pub const DEFAULT_ISSUER: &str = "esp32-sensor";

/// Audience the broker's JWT authenticator expects
pub const DEFAULT_AUDIENCE: &str = "emqx";

/// Lifetime of a minted token
pub const DEFAULT_LIFETIME: Duration = Duration::from_secs(3600);

/// Token error types
#[derive(Debug)]
pub enum TokenError {
    /// Token is not three dot-separated parts
    InvalidFormat,
    /// Payload is not base64url
    Base64(base64::DecodeError),
    /// Payload is not a JSON object
    Json(serde_json::Error),
    /// Signing failed, or the signature or registered claims did not verify
    Jwt(jsonwebtoken::errors::Error),
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenError::InvalidFormat => write!(f, "invalid JWT format"),
            TokenError::Base64(e) => write!(f, "invalid base64 payload: {}", e),
            TokenError::Json(e) => write!(f, "invalid JSON payload: {}", e),
            TokenError::Jwt(e) => write!(f, "JWT error: {}", e),
        }
    }
}

impl std::error::Error for TokenError {}

impl From<jsonwebtoken::errors::Error> for TokenError {
    fn from(e: jsonwebtoken::errors::Error) -> Self {
        TokenError::Jwt(e)
    }
}

/// Claims carried by a sensor's MQTT password
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceClaims {
    pub iss: String,
    /// Device hostname
    pub sub: String,
    pub aud: String,
    pub exp: u64,
    pub iat: u64,
    pub device_id: String,
    /// Colon separated, e.g. `8C:BF:EA:8E:A4:0C`
    pub mac_address: String,
}

impl DeviceClaims {
    /// Claims issued at `now` (seconds since the epoch) and valid for `lifetime`
    pub fn new(
        hostname: impl Into<String>,
        device_id: impl Into<String>,
        mac: &str,
        now: u64,
        lifetime: Duration,
    ) -> Self {
        Self {
            iss: DEFAULT_ISSUER.to_string(),
            sub: hostname.into(),
            aud: DEFAULT_AUDIENCE.to_string(),
            exp: now + lifetime.as_secs(),
            iat: now,
            device_id: device_id.into(),
            mac_address: format_mac(mac),
        }
    }
}

/// Insert colons into a bare 12 digit MAC (`8CBFEA8EA40C`).
///
/// Anything else is returned unchanged.
pub fn format_mac(mac: &str) -> String {
    if mac.len() != 12 || !mac.chars().all(|c| c.is_ascii_hexdigit()) {
        return mac.to_string();
    }
    mac.as_bytes()
        .chunks(2)
        .map(|pair| String::from_utf8_lossy(pair).to_ascii_uppercase())
        .collect::<Vec<_>>()
        .join(":")
}

/// Sign `claims` with HS256 using the shared `secret`
pub fn mint(claims: &DeviceClaims, secret: &[u8]) -> Result<String, TokenError> {
    let token = jsonwebtoken::encode(
        &Header::new(Algorithm::HS256),
        claims,
        &EncodingKey::from_secret(secret),
    )?;
    Ok(token)
}

/// Verify an HS256 token against `secret` and return its claims.
///
/// `exp` is required and checked. The audience is not, since brokers are
/// configured with different ones.
pub fn verify(token: &str, secret: &[u8]) -> Result<Claims, TokenError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_aud = false;

    let data = jsonwebtoken::decode::<Map<String, Value>>(
        token.trim(),
        &DecodingKey::from_secret(secret),
        &validation,
    )?;
    Ok(Claims { raw: data.claims })
}

/// Decoded JWT payload
#[derive(Debug, Clone, PartialEq)]
pub struct Claims {
    raw: Map<String, Value>,
}

/// Token lifetime relative to a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expiry {
    Valid { remaining: Duration },
    Expired { ago: Duration },
}

/// Decode the claims of `token` without verifying its signature
pub fn decode_claims(token: &str) -> Result<Claims, TokenError> {
    let parts: Vec<&str> = token.trim().split('.').collect();
    if parts.len() != 3 {
        return Err(TokenError::InvalidFormat);
    }

    // Tokens may arrive with or without '=' padding
    let payload = URL_SAFE_NO_PAD
        .decode(parts[1].trim_end_matches('='))
        .map_err(TokenError::Base64)?;

    match serde_json::from_slice(&payload).map_err(TokenError::Json)? {
        Value::Object(raw) => Ok(Claims { raw }),
        _ => Err(TokenError::InvalidFormat),
    }
}

impl Claims {
    pub fn get(&self, claim: &str) -> Option<&Value> {
        self.raw.get(claim)
    }

    fn str_claim(&self, claim: &str) -> Option<&str> {
        self.raw.get(claim).and_then(Value::as_str)
    }

    /// Expiration time, seconds since the epoch
    pub fn exp(&self) -> Option<u64> {
        self.raw.get("exp").and_then(Value::as_u64)
    }

    /// Issued-at time, seconds since the epoch
    pub fn iat(&self) -> Option<u64> {
        self.raw.get("iat").and_then(Value::as_u64)
    }

    pub fn iss(&self) -> Option<&str> {
        self.str_claim("iss")
    }

    pub fn sub(&self) -> Option<&str> {
        self.str_claim("sub")
    }

    pub fn aud(&self) -> Option<&str> {
        self.str_claim("aud")
    }

    /// Expiry relative to `now` (seconds since the epoch).
    ///
    /// A token without `exp` is treated as having expired at the epoch.
    pub fn expiry(&self, now: u64) -> Expiry {
        let exp = self.exp().unwrap_or(0);
        if exp > now {
            Expiry::Valid {
                remaining: Duration::from_secs(exp - now),
            }
        } else {
            Expiry::Expired {
                ago: Duration::from_secs(now - exp),
            }
        }
    }

    pub fn to_json_pretty(&self) -> String {
        serde_json::to_string_pretty(&self.raw).unwrap_or_default()
    }
}
