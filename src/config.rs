use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::env;

use crate::errors::Error;

pub const LIVE_REST_URL: &str = "https://www.okx.com";
pub const LIVE_PUBLIC_WS_URL: &str = "wss://ws.okx.com:8443/ws/v5/public";
pub const LIVE_PRIVATE_WS_URL: &str = "wss://ws.okx.com:8443/ws/v5/private";
pub const DEMO_PUBLIC_WS_URL: &str = "wss://wspap.okx.com:8443/ws/v5/public";
pub const DEMO_PRIVATE_WS_URL: &str = "wss://wspap.okx.com:8443/ws/v5/private";

/// Where requests are routed. The demo server shares the live REST host but
/// requires the `x-simulated-trading` header on every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Destination {
    #[default]
    Live,
    Demo,
}

impl Destination {
    pub fn rest_url(self) -> &'static str {
        LIVE_REST_URL
    }

    pub fn public_ws_url(self) -> &'static str {
        match self {
            Self::Live => LIVE_PUBLIC_WS_URL,
            Self::Demo => DEMO_PUBLIC_WS_URL,
        }
    }

    pub fn private_ws_url(self) -> &'static str {
        match self {
            Self::Live => LIVE_PRIVATE_WS_URL,
            Self::Demo => DEMO_PRIVATE_WS_URL,
        }
    }

    pub fn is_demo(self) -> bool {
        self == Self::Demo
    }
}

/// API credentials. Secrets are wrapped so they never leak through `Debug`
/// or serialization.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub api_key: Secret<String>,
    pub secret_key: Secret<String>,
    pub passphrase: Secret<String>,
}

impl Serialize for Credentials {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut state = serializer.serialize_struct("Credentials", 3)?;
        state.serialize_field("api_key", "[REDACTED]")?;
        state.serialize_field("secret_key", "[REDACTED]")?;
        state.serialize_field("passphrase", "[REDACTED]")?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for Credentials {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct CredentialsHelper {
            api_key: String,
            secret_key: String,
            passphrase: String,
        }

        let helper = CredentialsHelper::deserialize(deserializer)?;
        Ok(Self::new(helper.api_key, helper.secret_key, helper.passphrase))
    }
}

impl Credentials {
    #[must_use]
    pub fn new(api_key: String, secret_key: String, passphrase: String) -> Self {
        Self {
            api_key: Secret::new(api_key),
            secret_key: Secret::new(secret_key),
            passphrase: Secret::new(passphrase),
        }
    }

    /// Credentials for public-endpoint-only use; private calls will fail
    /// with an auth error.
    #[must_use]
    pub fn anonymous() -> Self {
        Self::new(String::new(), String::new(), String::new())
    }

    /// Read credentials from `OKX_API_KEY`, `OKX_SECRET_KEY` and
    /// `OKX_PASSPHRASE`.
    pub fn from_env() -> Result<Self, Error> {
        let var = |name: &str| {
            env::var(name).map_err(|_| Error::Config(format!("missing environment variable {name}")))
        };
        Ok(Self::new(
            var("OKX_API_KEY")?,
            var("OKX_SECRET_KEY")?,
            var("OKX_PASSPHRASE")?,
        ))
    }

    /// Load a .env file first (if present), then read from the environment.
    ///
    /// **Security Warning**: never commit .env files to version control.
    #[cfg(feature = "env-file")]
    pub fn from_env_file(path: &str) -> Result<Self, Error> {
        match dotenv::from_path(path) {
            Ok(()) => {}
            Err(dotenv::Error::Io(io_err)) if io_err.kind() == std::io::ErrorKind::NotFound => {
                // Missing file is fine, fall back to the process environment.
            }
            Err(e) => {
                return Err(Error::Config(format!("failed to load env file '{path}': {e}")));
            }
        }
        Self::from_env()
    }

    #[must_use]
    pub fn has_credentials(&self) -> bool {
        !self.api_key.expose_secret().is_empty() && !self.secret_key.expose_secret().is_empty()
    }

    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }

    pub fn secret_key(&self) -> &str {
        self.secret_key.expose_secret()
    }

    pub fn passphrase(&self) -> &str {
        self.passphrase.expose_secret()
    }
}
