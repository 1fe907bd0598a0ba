//! Request view and client identification.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION};
use reqwest::Method;
use serde_json::Value;
use std::fmt;

/// Client address header set by the trusted reverse proxy.
pub const TRUSTED_CLIENT_IP_HEADER: &str = "cf-connecting-ip";
/// Client-supplied and therefore untrusted.
pub const FORWARDED_FOR_HEADER: &str = "x-forwarded-for";

static IP_CHARS: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^[0-9a-fA-F.:]+$").ok());

/// What the router hands the limiter for one inbound request.
#[derive(Debug, Clone)]
pub struct RequestInfo {
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    /// Set by the router once the credential has actually been verified.
    pub verified_identity: bool,
}

impl RequestInfo {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            verified_identity: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    /// Adds a header. Names or values that are not valid HTTP are skipped.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            _ => tracing::debug!(header = name, "skipping invalid header"),
        }
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_verified_identity(mut self, verified: bool) -> Self {
        self.verified_identity = verified;
        self
    }

    fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Bucket a request is counted in.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ClientIdentity {
    User(String),
    Ip(String),
    Unknown,
}

impl ClientIdentity {
    /// Bearer subject, then trusted proxy address, then forwarded-for, then unknown.
    ///
    /// The bearer token is decoded but not verified; it only picks a bucket.
    pub fn from_request(request: &RequestInfo) -> Self {
        if let Some(id) = request.header(AUTHORIZATION.as_str()).and_then(bearer_subject) {
            return ClientIdentity::User(id);
        }
        if let Some(ip) = request
            .header(TRUSTED_CLIENT_IP_HEADER)
            .map(str::trim)
            .filter(|ip| is_ip_like(ip))
        {
            return ClientIdentity::Ip(ip.to_string());
        }
        if let Some(ip) = request
            .header(FORWARDED_FOR_HEADER)
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|ip| is_ip_like(ip))
        {
            return ClientIdentity::Ip(ip.to_string());
        }
        ClientIdentity::Unknown
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, ClientIdentity::Unknown)
    }
}

impl fmt::Display for ClientIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClientIdentity::User(id) => write!(f, "user:{}", id),
            ClientIdentity::Ip(ip) => write!(f, "ip:{}", ip),
            ClientIdentity::Unknown => f.write_str("unknown"),
        }
    }
}

fn is_ip_like(value: &str) -> bool {
    IP_CHARS.as_ref().map_or(false, |re| re.is_match(value))
}

/// `sub`, `userId` or `user_id` from the payload of a bearer JWT.
fn bearer_subject(authorization: &str) -> Option<String> {
    let token = authorization
        .strip_prefix("Bearer ")
        .or_else(|| authorization.strip_prefix("bearer "))?
        .trim();
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
    let claims: Value = serde_json::from_slice(&bytes).ok()?;

    ["sub", "userId", "user_id"]
        .iter()
        .find_map(|claim| match claims.get(*claim)? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}
