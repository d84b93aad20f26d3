//! # Config
//!
//! Builder supplied overrides plus the environment, resolved again for every invocation

use super::{dimensions::Dimensions, Error};
use std::collections::HashMap;
use std::time::Duration;

pub const AUTH_TOKEN: &str = "SIGNALFX_AUTH_TOKEN";
pub const REALM: &str = "SIGNALFX_REALM";
pub const INGEST_ENDPOINT: &str = "SIGNALFX_INGEST_ENDPOINT";
pub const SEND_TIMEOUT: &str = "SIGNALFX_SEND_TIMEOUT";

pub const DEFAULT_REALM: &str = "us0";
pub const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_millis(300);

/// Source of configuration values, the process environment unless a test says otherwise
pub trait Environment {
    fn var(&self, name: &str) -> Option<String>;
}

/// Reads from [std::env]
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessEnv;

impl Environment for ProcessEnv {
    fn var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }
}

impl Environment for HashMap<String, String> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name).cloned()
    }
}

/// Configuration via Builder
#[derive(Clone, Debug, Default)]
pub struct Config {
    pub access_token: Option<String>,
    pub realm: Option<String>,
    pub ingest_endpoint: Option<String>,
    pub send_timeout: Option<Duration>,
    pub extra_dimensions: Dimensions,
}

/// What a single invocation needs to open an ingest session
#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub access_token: String,
    pub ingest_endpoint: String,
    pub send_timeout: Duration,
}

impl Config {
    /// Resolve the session settings, builder values take precedence over the environment
    pub fn resolve(&self, env: &impl Environment) -> Result<Settings, Error> {
        let access_token = self
            .access_token
            .clone()
            .or_else(|| env.var(AUTH_TOKEN))
            .filter(|token| !token.is_empty())
            .ok_or(Error::MissingAccessToken)?;

        let ingest_endpoint = match self.ingest_endpoint.clone().or_else(|| env.var(INGEST_ENDPOINT)) {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => {
                let realm = self
                    .realm
                    .clone()
                    .or_else(|| env.var(REALM))
                    .unwrap_or_else(|| DEFAULT_REALM.to_string());
                ingest_url(&realm)
            }
        };

        let send_timeout = match (self.send_timeout, env.var(SEND_TIMEOUT)) {
            (Some(timeout), _) => timeout,
            (None, Some(raw)) => parse_timeout(&raw)?,
            (None, None) => DEFAULT_SEND_TIMEOUT,
        };

        Ok(Settings {
            access_token,
            ingest_endpoint,
            send_timeout,
        })
    }
}

/// Ingest endpoint for a realm
pub fn ingest_url(realm: &str) -> String {
    format!("https://ingest.{realm}.signalfx.com")
}

/// Timeouts are given in (fractional) seconds
fn parse_timeout(raw: &str) -> Result<Duration, Error> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .ok_or_else(|| Error::InvalidSendTimeout(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test::env;

    #[test]
    fn defaults() {
        let settings = Config::default().resolve(&env(&[(AUTH_TOKEN, "SFXTOKEN")])).unwrap();

        assert_eq!(
            settings,
            Settings {
                access_token: "SFXTOKEN".into(),
                ingest_endpoint: "https://ingest.us0.signalfx.com".into(),
                send_timeout: Duration::from_millis(300),
            }
        );
    }

    #[test]
    fn realm_selects_host() {
        let settings = Config::default()
            .resolve(&env(&[(AUTH_TOKEN, "SFXTOKEN"), (REALM, "eu0")]))
            .unwrap();
        assert_eq!(settings.ingest_endpoint, "https://ingest.eu0.signalfx.com");
        assert!(settings.ingest_endpoint.contains("eu0"));
    }

    #[test]
    fn missing_token() {
        let err = Config::default().resolve(&env(&[(REALM, "eu0")])).unwrap_err();
        assert!(matches!(err, Error::MissingAccessToken));
        assert_eq!(err.to_string(), "Missing SIGNALFX_AUTH_TOKEN");

        let err = Config::default().resolve(&env(&[(AUTH_TOKEN, "")])).unwrap_err();
        assert!(matches!(err, Error::MissingAccessToken));
    }

    #[test]
    fn builder_values_win() {
        let config = Config {
            access_token: Some("builder-token".into()),
            realm: Some("ap0".into()),
            send_timeout: Some(Duration::from_secs(2)),
            ..Default::default()
        };
        let settings = config
            .resolve(&env(&[(AUTH_TOKEN, "SFXTOKEN"), (REALM, "eu0"), (SEND_TIMEOUT, "5")]))
            .unwrap();

        assert_eq!(settings.access_token, "builder-token");
        assert_eq!(settings.ingest_endpoint, "https://ingest.ap0.signalfx.com");
        assert_eq!(settings.send_timeout, Duration::from_secs(2));
    }

    #[test]
    fn endpoint_override_ignores_realm() {
        let settings = Config::default()
            .resolve(&env(&[
                (AUTH_TOKEN, "SFXTOKEN"),
                (REALM, "eu0"),
                (INGEST_ENDPOINT, "http://127.0.0.1:9943/"),
            ]))
            .unwrap();
        assert_eq!(settings.ingest_endpoint, "http://127.0.0.1:9943");
    }

    #[test]
    fn send_timeout_parsing() {
        let resolve = |raw: &str| Config::default().resolve(&env(&[(AUTH_TOKEN, "SFXTOKEN"), (SEND_TIMEOUT, raw)]));

        assert_eq!(resolve("1.5").unwrap().send_timeout, Duration::from_millis(1500));
        assert_eq!(resolve(" 2 ").unwrap().send_timeout, Duration::from_secs(2));
        assert!(matches!(resolve("fast"), Err(Error::InvalidSendTimeout(_))));
        assert!(matches!(resolve("-1"), Err(Error::InvalidSendTimeout(_))));
    }

    // Each test runs in its own process so the environment can be mutated freely
    use rusty_fork::rusty_fork_test;

    rusty_fork_test! {
        #[test]
        fn reads_process_environment() {
            std::env::set_var(AUTH_TOKEN, "SFXTOKEN");
            std::env::set_var(REALM, "eu0");
            std::env::set_var(SEND_TIMEOUT, "0.5");

            let settings = Config::default().resolve(&ProcessEnv).unwrap();
            assert_eq!(settings.access_token, "SFXTOKEN");
            assert_eq!(settings.ingest_endpoint, "https://ingest.eu0.signalfx.com");
            assert_eq!(settings.send_timeout, Duration::from_millis(500));
        }

        #[test]
        fn process_environment_without_token() {
            std::env::remove_var(AUTH_TOKEN);

            let err = Config::default().resolve(&ProcessEnv).unwrap_err();
            assert!(matches!(err, Error::MissingAccessToken));
        }
    }
}
