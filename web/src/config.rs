//! Server configuration loaded from environment variables.
//!
//! | Variable | Required | Default |
//! |---|---|---|
//! | `API_BASE_URL` | yes | (https origin, e.g. `https://auth.example.com`) |
//! | `API_RP_ID` | yes | (bare domain, e.g. `example.com`) |
//! | `APP_ID` | yes | (Apple `TEAMID.bundle.id`) |
//! | `REDIS_URL` | yes | |
//! | `WEBAUTHN_VERIFIER_URL` | yes | |
//! | `PORT` | no | `3001` |
//! | `METRICS_ADDR` | no | exporter disabled |
//! | `TRUSTED_PROXIES` | no | none (forwarding headers ignored) |

use crate::extractors::TrustedProxies;
use passkey_auth::PasskeyConfig;
use std::net::{IpAddr, SocketAddr};
use thiserror::Error;

/// Configuration errors. Fatal at startup.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Required variables are unset or empty.
    #[error("Missing required environment variables: {}", .0.join(", "))]
    Missing(Vec<&'static str>),

    /// A variable is set but unusable.
    #[error("Invalid {name}: {reason}")]
    Invalid {
        /// Variable name
        name: &'static str,
        /// What is wrong with it
        reason: String,
    },
}

/// Server configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// Listen port.
    pub port: u16,
    /// Expected ceremony origin.
    pub base_url: String,
    /// Relying party id.
    pub rp_id: String,
    /// Apple app id for the app-site-association document.
    pub app_id: String,
    /// Redis connection URL.
    pub redis_url: String,
    /// Base URL of the WebAuthn verification service.
    pub verifier_url: String,
    /// Prometheus exporter listen address.
    pub metrics_addr: Option<SocketAddr>,
    /// Reverse proxies whose `X-Forwarded-For` is believed.
    pub trusted_proxies: Vec<IpAddr>,
}

impl ServerConfig {
    /// Load from the process environment (after `.env`, if present).
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load from an arbitrary variable source.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if required variables are missing or invalid.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let required = [
            "API_BASE_URL",
            "API_RP_ID",
            "APP_ID",
            "REDIS_URL",
            "WEBAUTHN_VERIFIER_URL",
        ];
        let missing: Vec<&'static str> = required
            .into_iter()
            .filter(|name| get(*name).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(ConfigError::Missing(missing));
        }

        let port = match get("PORT") {
            Some(port) => port.parse::<u16>().map_err(|e| ConfigError::Invalid {
                name: "PORT",
                reason: format!("{e}"),
            })?,
            None => 3001,
        };

        let metrics_addr = get("METRICS_ADDR")
            .map(|addr| {
                addr.parse::<SocketAddr>().map_err(|e| ConfigError::Invalid {
                    name: "METRICS_ADDR",
                    reason: format!("{e}"),
                })
            })
            .transpose()?;

        let trusted_proxies = get("TRUSTED_PROXIES")
            .map(|list| {
                list.split(',')
                    .map(str::trim)
                    .filter(|entry| !entry.is_empty())
                    .map(|entry| {
                        entry.parse::<IpAddr>().map_err(|e| ConfigError::Invalid {
                            name: "TRUSTED_PROXIES",
                            reason: format!("{entry}: {e}"),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .unwrap_or_default();

        let config = Self {
            port,
            base_url: get("API_BASE_URL").unwrap_or_default(),
            rp_id: get("API_RP_ID").unwrap_or_default(),
            app_id: get("APP_ID").unwrap_or_default(),
            redis_url: get("REDIS_URL").unwrap_or_default(),
            verifier_url: get("WEBAUTHN_VERIFIER_URL").unwrap_or_default(),
            metrics_addr,
            trusted_proxies,
        };

        config.passkey().validate().map_err(|e| ConfigError::Invalid {
            name: "API_BASE_URL/API_RP_ID",
            reason: e.to_string(),
        })?;

        Ok(config)
    }

    /// Trusted proxies for client address resolution.
    #[must_use]
    pub fn trusted_proxies(&self) -> TrustedProxies {
        TrustedProxies::new(self.trusted_proxies.iter().copied())
    }

    /// Ceremony configuration.
    #[must_use]
    pub fn passkey(&self) -> PasskeyConfig {
        PasskeyConfig::new(&self.base_url, &self.rp_id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name: &str| vars.get(name).cloned()
    }

    const VALID: [(&str, &str); 5] = [
        ("API_BASE_URL", "https://auth.example.com"),
        ("API_RP_ID", "example.com"),
        ("APP_ID", "TEAM123.com.example.app"),
        ("REDIS_URL", "redis://127.0.0.1:6379"),
        ("WEBAUTHN_VERIFIER_URL", "http://127.0.0.1:4000"),
    ];

    fn with(overrides: &[(&'static str, &'static str)]) -> Vec<(&'static str, &'static str)> {
        let mut pairs: Vec<_> = VALID
            .iter()
            .filter(|(k, _)| !overrides.iter().any(|(o, _)| o == k))
            .copied()
            .collect();
        pairs.extend_from_slice(overrides);
        pairs
    }

    #[test]
    fn test_defaults() {
        let config = ServerConfig::from_lookup(env(&VALID)).unwrap();
        assert_eq!(config.port, 3001);
        assert_eq!(config.metrics_addr, None);
        assert!(config.trusted_proxies.is_empty());
        assert_eq!(config.passkey().rp_name, "Passkey Authentication");
    }

    #[test]
    fn test_missing_variables_listed() {
        let err = ServerConfig::from_lookup(env(&[("API_RP_ID", "example.com")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Missing(vec![
                "API_BASE_URL",
                "APP_ID",
                "REDIS_URL",
                "WEBAUTHN_VERIFIER_URL"
            ])
        );
    }

    #[test]
    fn test_rp_id_with_scheme_rejected() {
        let pairs = with(&[("API_RP_ID", "https://example.com")]);
        assert!(matches!(
            ServerConfig::from_lookup(env(&pairs)),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_http_origin_rejected() {
        let pairs = with(&[("API_BASE_URL", "http://auth.example.com")]);
        assert!(matches!(
            ServerConfig::from_lookup(env(&pairs)),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn test_trusted_proxies() {
        let pairs = with(&[("TRUSTED_PROXIES", "10.0.0.1, ::1,")]);
        let config = ServerConfig::from_lookup(env(&pairs)).unwrap();
        assert_eq!(
            config.trusted_proxies,
            vec![
                "10.0.0.1".parse::<IpAddr>().unwrap(),
                "::1".parse::<IpAddr>().unwrap()
            ]
        );
        assert!(config.trusted_proxies().contains(&"10.0.0.1".parse().unwrap()));

        let pairs = with(&[("TRUSTED_PROXIES", "10.0.0.0/8")]);
        assert!(matches!(
            ServerConfig::from_lookup(env(&pairs)),
            Err(ConfigError::Invalid {
                name: "TRUSTED_PROXIES",
                ..
            })
        ));
    }

    #[test]
    fn test_port_and_metrics() {
        let pairs = with(&[("PORT", "8080"), ("METRICS_ADDR", "0.0.0.0:9000")]);
        let config = ServerConfig::from_lookup(env(&pairs)).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.metrics_addr, Some("0.0.0.0:9000".parse().unwrap()));

        let pairs = with(&[("PORT", "eighty")]);
        assert!(matches!(
            ServerConfig::from_lookup(env(&pairs)),
            Err(ConfigError::Invalid { name: "PORT", .. })
        ));
    }
}
