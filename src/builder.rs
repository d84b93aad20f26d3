use super::config::{Config, Environment, ProcessEnv};
use super::dimensions::{self, Dimensions};
use super::ingest::{HttpIngest, Ingest};
use super::wrapper::Instrumentation;
use super::Error;
use std::time::Duration;

/// Builder for the SignalFx function [Instrumentation]
///
/// Anything left unset is read from the environment on every invocation.
///
/// # Example
/// ```
///  let instrumentation = signalfx_azure_function::Builder::new()
///      .realm("eu0")
///      .with_dimension("team", "payments")
///      .init()
///      .unwrap();
/// ```
pub struct Builder<I = HttpIngest, V = ProcessEnv> {
    config: Config,
    ingest: I,
    env: V,
}

impl Builder {
    pub fn new() -> Self {
        Builder {
            config: Default::default(),
            ingest: HttpIngest,
            env: ProcessEnv,
        }
    }
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl<I, V> Builder<I, V> {
    /// Sets the access token instead of reading `SIGNALFX_AUTH_TOKEN`
    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.config.access_token = Some(token.into());
        self
    }

    /// Sets the realm instead of reading `SIGNALFX_REALM`, metrics go to `https://ingest.<realm>.signalfx.com`
    pub fn realm(mut self, realm: impl Into<String>) -> Self {
        self.config.realm = Some(realm.into());
        self
    }

    /// Sends to the given endpoint regardless of the realm
    pub fn ingest_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.ingest_endpoint = Some(endpoint.into());
        self
    }

    /// Sets the send timeout instead of reading `SIGNALFX_SEND_TIMEOUT`
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.config.send_timeout = Some(timeout);
        self
    }

    /// Adds a dimension (name, value) sent with every datapoint.
    /// * Overrides a default dimension of the same name
    /// * Names must be valid SignalFx dimension names or init() will fail
    pub fn with_dimension(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.extra_dimensions.insert(name, value);
        self
    }

    pub fn with_dimensions<K: Into<String>, D: Into<String>>(mut self, extra: impl IntoIterator<Item = (K, D)>) -> Self {
        let extra: Dimensions = extra.into_iter().collect();
        self.config.extra_dimensions.merge(&extra);
        self
    }

    /// Replaces the HTTP ingest client
    pub fn ingest<J: Ingest>(self, ingest: J) -> Builder<J, V> {
        Builder {
            config: self.config,
            ingest,
            env: self.env,
        }
    }

    /// Replaces the process environment as the source of configuration
    pub fn environment<W: Environment>(self, env: W) -> Builder<I, W> {
        Builder {
            config: self.config,
            ingest: self.ingest,
            env,
        }
    }

    /// Private helper for validating the collected configuration
    fn build(self) -> Result<(Config, I, V), Error> {
        if let Some((name, _)) = self.config.extra_dimensions.iter().find(|(name, _)| !dimensions::is_valid_name(name)) {
            return Err(Error::InvalidDimension(name.to_string()));
        }
        Ok((self.config, self.ingest, self.env))
    }

    /// Create the instrumentation, credentials are only checked once an invocation starts
    pub fn init(self) -> Result<Instrumentation<I, V>, Error>
    where
        I: Ingest,
        V: Environment,
    {
        let (config, ingest, env) = self.build()?;
        Ok(Instrumentation::new(config, ingest, env))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_invalid_dimension_names() {
        let err = Builder::new().with_dimension("extra dim", "value").init().err().unwrap();
        assert!(matches!(err, Error::InvalidDimension(ref name) if name == "extra dim"));
    }

    #[test]
    fn collects_overrides() {
        let instrumentation = Builder::new()
            .access_token("SFXTOKEN")
            .realm("eu0")
            .send_timeout(Duration::from_secs(1))
            .with_dimension("extraDim1", "one")
            .with_dimensions([("extraDim2", "two"), ("extraDim1", "uno")])
            .init()
            .unwrap();

        let config = instrumentation.config();
        assert_eq!(config.access_token.as_deref(), Some("SFXTOKEN"));
        assert_eq!(config.realm.as_deref(), Some("eu0"));
        assert_eq!(config.send_timeout, Some(Duration::from_secs(1)));
        assert_eq!(config.extra_dimensions.get("extraDim1"), Some("uno"));
        assert_eq!(config.extra_dimensions.get("extraDim2"), Some("two"));
    }
}
