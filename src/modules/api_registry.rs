use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Health reported for an external API
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiHealth {
    Healthy,
    Degraded,
    Unhealthy,
    #[default]
    Unknown,
}

impl std::fmt::Display for ApiHealth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ApiHealth::Healthy => "healthy",
            ApiHealth::Degraded => "degraded",
            ApiHealth::Unhealthy => "unhealthy",
            ApiHealth::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// Availability of the external APIs tasks may depend on
pub trait ApiRegistry: std::fmt::Debug + Send + Sync {
    fn is_active(&self, api: &str) -> bool;

    fn health_status(&self, api: &str) -> ApiHealth;

    /// Fails unless `api` is both active and healthy
    fn check_available(&self, api: &str) -> Result<()> {
        if !self.is_active(api) {
            return Err(Error::ExternalApiUnavailable {
                api: api.to_string(),
                reason: "API is not active".to_string(),
            });
        }
        match self.health_status(api) {
            ApiHealth::Healthy => Ok(()),
            other => Err(Error::ExternalApiUnavailable {
                api: api.to_string(),
                reason: format!("health status is {}", other),
            }),
        }
    }
}

/// Status of one API as declared in settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiStatus {
    #[serde(default)]
    pub active: bool,
    #[serde(default)]
    pub health: ApiHealth,
}

/// Registry answering from a fixed table; unknown APIs are inactive
#[derive(Debug, Clone, Default)]
pub struct StaticApiRegistry {
    pub apis: HashMap<String, ApiStatus>,
}

impl StaticApiRegistry {
    pub fn new(apis: HashMap<String, ApiStatus>) -> Self {
        StaticApiRegistry { apis }
    }

    pub fn with_api(mut self, api: &str, active: bool, health: ApiHealth) -> Self {
        self.apis
            .insert(api.to_string(), ApiStatus { active, health });
        self
    }
}

impl ApiRegistry for StaticApiRegistry {
    fn is_active(&self, api: &str) -> bool {
        self.apis.get(api).map(|s| s.active).unwrap_or(false)
    }

    fn health_status(&self, api: &str) -> ApiHealth {
        self.apis.get(api).map(|s| s.health).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_active_and_healthy_apis_pass() {
        let registry = StaticApiRegistry::default()
            .with_api("search", true, ApiHealth::Healthy)
            .with_api("llm", true, ApiHealth::Degraded)
            .with_api("images", false, ApiHealth::Healthy);

        assert!(registry.check_available("search").is_ok());

        let err = registry.check_available("llm").unwrap_err();
        assert!(err.to_string().contains("degraded"));

        let err = registry.check_available("images").unwrap_err();
        assert!(err.to_string().contains("not active"));

        assert!(registry.check_available("missing").is_err());
    }
}
