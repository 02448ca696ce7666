//! Process-wide venue handle.
//!
//! One [`OkxClient`] owns the credentials, a shared [`Signer`], the REST
//! dispatcher and up to two WebSocket connections (public and private).
//! Sockets are established lazily on the first subscribe that needs them;
//! [`OkxClient::close`] tears both down and releases every receiver.

use secrecy::Secret;
use std::sync::Arc;
use std::time::Duration;

use crate::config::{Credentials, Destination};
use crate::errors::Error;
use crate::rest::{RestApi, RestClient};
use crate::signer::Signer;
use crate::ws::private::PrivateChannels;
use crate::ws::public::PublicChannels;
use crate::ws::{Scope, WsConfig, WsConnection};

pub struct OkxClient {
    rest: RestApi,
    public: PublicChannels,
    private: PrivateChannels,
    signer: Arc<Signer>,
}

impl OkxClient {
    pub fn builder() -> OkxClientBuilder {
        OkxClientBuilder::default()
    }

    /// Anonymous client against the live venue. Public data only; private
    /// subscriptions and signed REST calls will be rejected upstream.
    pub fn anonymous() -> Result<Self, Error> {
        Self::builder().build()
    }

    /// Authenticated client against the given destination.
    pub fn with_credentials(
        credentials: Credentials,
        destination: Destination,
    ) -> Result<Self, Error> {
        Self::builder()
            .credentials(credentials)
            .destination(destination)
            .build()
    }

    pub fn rest(&self) -> &RestApi {
        &self.rest
    }

    pub fn public(&self) -> &PublicChannels {
        &self.public
    }

    pub fn private(&self) -> &PrivateChannels {
        &self.private
    }

    pub fn signer(&self) -> &Arc<Signer> {
        &self.signer
    }

    /// Close both sockets. In-flight subscribe waits fail, receivers
    /// observe a terminal close, and later calls return `Closed`.
    pub fn close(&self) {
        self.public.close();
        self.private.close();
    }
}

/// Fluent construction with per-concern overrides.
pub struct OkxClientBuilder {
    credentials: Credentials,
    destination: Destination,
    rest_url: Option<String>,
    public_ws_url: Option<String>,
    private_ws_url: Option<String>,
    rest_timeout: Duration,
    ws_config: WsConfig,
}

impl Default for OkxClientBuilder {
    fn default() -> Self {
        Self {
            credentials: Credentials::anonymous(),
            destination: Destination::Live,
            rest_url: None,
            public_ws_url: None,
            private_ws_url: None,
            rest_timeout: Duration::from_secs(30),
            ws_config: WsConfig::default(),
        }
    }
}

impl OkxClientBuilder {
    #[must_use]
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    #[must_use]
    pub fn destination(mut self, destination: Destination) -> Self {
        self.destination = destination;
        self
    }

    /// Override the REST base URL, e.g. for a local test server.
    #[must_use]
    pub fn rest_url(mut self, url: impl Into<String>) -> Self {
        self.rest_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn public_ws_url(mut self, url: impl Into<String>) -> Self {
        self.public_ws_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn private_ws_url(mut self, url: impl Into<String>) -> Self {
        self.private_ws_url = Some(url.into());
        self
    }

    #[must_use]
    pub fn rest_timeout(mut self, timeout: Duration) -> Self {
        self.rest_timeout = timeout;
        self
    }

    #[must_use]
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.ws_config.connect_timeout = timeout;
        self
    }

    #[must_use]
    pub fn ack_timeout(mut self, timeout: Duration) -> Self {
        self.ws_config.ack_timeout = timeout;
        self
    }

    #[must_use]
    pub fn ping_interval(mut self, interval: Duration) -> Self {
        self.ws_config.ping_interval = interval;
        self
    }

    #[must_use]
    pub fn reconnect_policy(mut self, base_delay: Duration, max_attempts: u32) -> Self {
        self.ws_config.reconnect_delay = base_delay;
        self.ws_config.max_reconnect_attempts = max_attempts;
        self
    }

    #[must_use]
    pub fn ws_config(mut self, config: WsConfig) -> Self {
        self.ws_config = config;
        self
    }

    pub fn build(self) -> Result<OkxClient, Error> {
        let signer = Arc::new(Signer::new(Secret::new(
            self.credentials.secret_key().to_string(),
        )));

        let rest_url = self
            .rest_url
            .unwrap_or_else(|| self.destination.rest_url().to_string());
        let rest_client = RestClient::new(
            rest_url,
            self.credentials.clone(),
            Arc::clone(&signer),
            self.destination.is_demo(),
            self.rest_timeout,
        )?;

        let public_url = self
            .public_ws_url
            .unwrap_or_else(|| self.destination.public_ws_url().to_string());
        let private_url = self
            .private_ws_url
            .unwrap_or_else(|| self.destination.private_ws_url().to_string());

        let public_conn = Arc::new(WsConnection::new(
            public_url,
            Scope::Public,
            self.credentials.clone(),
            Arc::clone(&signer),
            self.ws_config.clone(),
        ));
        let private_conn = Arc::new(WsConnection::new(
            private_url,
            Scope::Private,
            self.credentials,
            Arc::clone(&signer),
            self.ws_config,
        ));

        Ok(OkxClient {
            rest: RestApi::new(rest_client),
            public: PublicChannels::new(public_conn),
            private: PrivateChannels::new(private_conn),
            signer,
        })
    }
}
