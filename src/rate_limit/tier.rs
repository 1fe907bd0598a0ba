//! Endpoint tiers and their limits.

use crate::{Error, ErrorContext, Result};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RateLimitTier {
    /// Credential endpoints. Strictest.
    Auth,
    /// Expensive computed endpoints.
    Compute,
    /// Read-heavy listings. Most generous.
    Read,
    Api,
    Public,
}

impl RateLimitTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitTier::Auth => "auth",
            RateLimitTier::Compute => "compute",
            RateLimitTier::Read => "read",
            RateLimitTier::Api => "api",
            RateLimitTier::Public => "public",
        }
    }
}

impl fmt::Display for RateLimitTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierLimit {
    pub max_requests: u32,
    pub window_secs: u64,
}

impl TierLimit {
    pub fn new(max_requests: u32, window_secs: u64) -> Self {
        Self {
            max_requests,
            window_secs,
        }
    }

    pub fn window(&self) -> Duration {
        Duration::from_secs(self.window_secs)
    }
}

impl std::str::FromStr for RateLimitTier {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auth" => Ok(RateLimitTier::Auth),
            "compute" => Ok(RateLimitTier::Compute),
            "read" => Ok(RateLimitTier::Read),
            "api" => Ok(RateLimitTier::Api),
            "public" => Ok(RateLimitTier::Public),
            other => Err(Error::validation_with_context(
                format!("unknown rate limit tier '{}'", other),
                ErrorContext::new().with_details("expected one of: auth, compute, read, api, public"),
            )),
        }
    }
}

/// Where a matching request goes. Written as `bypass` or a tier name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum RouteTarget {
    /// Not rate limited at all (health checks).
    Bypass,
    Tier(RateLimitTier),
}

impl fmt::Display for RouteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteTarget::Bypass => f.write_str("bypass"),
            RouteTarget::Tier(tier) => fmt::Display::fmt(tier, f),
        }
    }
}

impl From<RouteTarget> for String {
    fn from(target: RouteTarget) -> Self {
        target.to_string()
    }
}

impl TryFrom<String> for RouteTarget {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        if s.eq_ignore_ascii_case("bypass") {
            Ok(RouteTarget::Bypass)
        } else {
            s.parse().map(RouteTarget::Tier)
        }
    }
}

/// Path-prefix rule, optionally restricted to some methods.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierRule {
    pub prefix: String,
    /// Empty matches every method.
    #[serde(default)]
    pub methods: Vec<String>,
    pub target: RouteTarget,
}

impl TierRule {
    pub fn new(prefix: impl Into<String>, target: RouteTarget) -> Self {
        Self {
            prefix: prefix.into(),
            methods: Vec::new(),
            target,
        }
    }

    pub fn with_methods<I: IntoIterator<Item = Method>>(mut self, methods: I) -> Self {
        self.methods = methods.into_iter().map(|m| m.as_str().to_string()).collect();
        self
    }

    pub fn matches(&self, method: &Method, path: &str) -> bool {
        path.starts_with(self.prefix.as_str())
            && (self.methods.is_empty()
                || self
                    .methods
                    .iter()
                    .any(|m| m.eq_ignore_ascii_case(method.as_str())))
    }
}

/// Ordered rules (first match wins) plus the limit of every tier.
///
/// Fields missing from a deserialized table keep their defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TierTable {
    pub rules: Vec<TierRule>,
    pub limits: BTreeMap<RateLimitTier, TierLimit>,
    /// Tier for requests no rule matches.
    pub default_tier: RateLimitTier,
}

impl Default for TierTable {
    fn default() -> Self {
        use RateLimitTier::*;
        let tier = RouteTarget::Tier;
        Self {
            rules: vec![
                TierRule::new("/health", RouteTarget::Bypass),
                TierRule::new("/v1/health", RouteTarget::Bypass),
                TierRule::new("/v1/analytics/health", RouteTarget::Bypass),
                TierRule::new("/v1/auth", tier(Auth)),
                TierRule::new("/v1/models/recommend", tier(Compute)).with_methods([Method::POST]),
                TierRule::new("/v1/models", tier(Read)).with_methods([Method::GET, Method::HEAD]),
                TierRule::new("/v1/transformations", tier(Read)).with_methods([Method::GET, Method::HEAD]),
                TierRule::new("/v1/", tier(Api)),
                TierRule::new("/api/", tier(Api)),
            ],
            limits: BTreeMap::from([
                (Auth, TierLimit::new(10, 60)),
                (Compute, TierLimit::new(20, 60)),
                (Read, TierLimit::new(300, 60)),
                (Api, TierLimit::new(60, 60)),
                (Public, TierLimit::new(120, 60)),
            ]),
            default_tier: Public,
        }
    }
}

impl TierTable {
    pub fn resolve(&self, method: &Method, path: &str) -> RouteTarget {
        self.rules
            .iter()
            .find(|r| r.matches(method, path))
            .map(|r| r.target)
            .unwrap_or(RouteTarget::Tier(self.default_tier))
    }

    pub fn limit(&self, tier: RateLimitTier) -> Option<TierLimit> {
        self.limits.get(&tier).copied()
    }

    pub fn with_limit(mut self, tier: RateLimitTier, limit: TierLimit) -> Self {
        self.limits.insert(tier, limit);
        self
    }

    /// Puts every tier on the same window length.
    pub fn with_window_secs(mut self, window_secs: u64) -> Self {
        for limit in self.limits.values_mut() {
            limit.window_secs = window_secs;
        }
        self
    }

    pub fn with_rules(mut self, rules: Vec<TierRule>) -> Self {
        self.rules = rules;
        self
    }

    /// Every reachable tier needs a positive limit and window.
    pub fn validate(&self) -> Result<()> {
        let referenced = self
            .rules
            .iter()
            .filter_map(|r| match r.target {
                RouteTarget::Tier(t) => Some(t),
                RouteTarget::Bypass => None,
            })
            .chain(std::iter::once(self.default_tier));

        for tier in referenced {
            let field = format!("rate_limit.limits.{}", tier);
            let limit = self.limit(tier).ok_or_else(|| {
                Error::configuration_with_context(
                    format!("no limit configured for tier '{}'", tier),
                    ErrorContext::new().with_field_path(field.clone()),
                )
            })?;
            if limit.max_requests == 0 {
                return Err(Error::configuration_with_context(
                    "max_requests must be greater than zero",
                    ErrorContext::new().with_field_path(format!("{}.max_requests", field)),
                ));
            }
            if limit.window_secs == 0 {
                return Err(Error::configuration_with_context(
                    "window_secs must be greater than zero",
                    ErrorContext::new().with_field_path(format!("{}.window_secs", field)),
                ));
            }
        }
        Ok(())
    }
}
