use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

use crate::config::Credentials;
use crate::errors::Error;
use crate::signer::Signer;

/// Response envelope shared by every venue endpoint. `code` is a
/// string-encoded integer; anything non-zero is an application error even
/// when the HTTP status is 200.
#[derive(Debug, serde::Deserialize)]
struct ApiResponse<T> {
    #[serde(default)]
    code: String,
    #[serde(default)]
    msg: String,
    #[serde(default = "Vec::new")]
    data: Vec<T>,
}

/// One-request-per-call HTTP dispatcher. Endpoint knowledge lives in the
/// typed facades; this layer only knows how to encode parameters, attach
/// auth headers and decode the envelope.
#[derive(Clone)]
pub struct RestClient {
    http: reqwest::Client,
    base_url: String,
    credentials: Credentials,
    signer: Arc<Signer>,
    demo: bool,
}

impl RestClient {
    pub(crate) fn new(
        base_url: impl Into<String>,
        credentials: Credentials,
        signer: Arc<Signer>,
        demo: bool,
        timeout: Duration,
    ) -> Result<Self, Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(Error::Http)?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            credentials,
            signer,
            demo,
        })
    }

    pub fn signer(&self) -> &Arc<Signer> {
        &self.signer
    }

    pub async fn get<T>(
        &self,
        path: &str,
        params: Option<Value>,
        private: bool,
    ) -> Result<Vec<T>, Error>
    where
        T: DeserializeOwned,
    {
        self.dispatch(Method::GET, path, params, private).await
    }

    pub async fn post<T>(
        &self,
        path: &str,
        params: Option<Value>,
        private: bool,
    ) -> Result<Vec<T>, Error>
    where
        T: DeserializeOwned,
    {
        self.dispatch(Method::POST, path, params, private).await
    }

    /// Send one request. GET parameters travel as a query string with quote
    /// characters stripped; other methods carry a JSON body. Private
    /// requests are signed over `timestamp + method + path(+query) + body`.
    #[instrument(skip(self, params), fields(base = %self.base_url))]
    async fn dispatch<T>(
        &self,
        method: Method,
        path: &str,
        params: Option<Value>,
        private: bool,
    ) -> Result<Vec<T>, Error>
    where
        T: DeserializeOwned,
    {
        let (request_path, body) = if method == Method::GET {
            let query = params.as_ref().map(query_string).transpose()?;
            let request_path = match query.as_deref() {
                Some(q) if !q.is_empty() => format!("{path}?{q}"),
                _ => path.to_string(),
            };
            (request_path, String::new())
        } else {
            let body = match &params {
                Some(params) => serde_json::to_string(params)?,
                None => String::new(),
            };
            (path.to_string(), body)
        };

        let url = format!("{}{request_path}", self.base_url);
        let mut request = self.http.request(method.clone(), &url);

        if !body.is_empty() {
            request = request
                .header("Content-Type", "application/json")
                .body(body.clone());
        }
        if private {
            let signed_body = body_for_signing(&body);
            let timestamp = self.signer.iso_timestamp();
            let sign = self
                .signer
                .sign(&timestamp, method.as_str(), &request_path, signed_body)?;
            request = request
                .header("OK-ACCESS-KEY", self.credentials.api_key())
                .header("OK-ACCESS-PASSPHRASE", self.credentials.passphrase())
                .header("OK-ACCESS-SIGN", sign)
                .header("OK-ACCESS-TIMESTAMP", timestamp);
        }
        if self.demo {
            request = request.header("x-simulated-trading", "1");
        }

        let response = request.send().await.map_err(Error::Http)?;
        let status = response.status();
        let raw = response.text().await.map_err(Error::Http)?;
        debug!(%status, bytes = raw.len(), "response received");

        let envelope: ApiResponse<T> = serde_json::from_str(&raw).map_err(|e| {
            if status.is_success() {
                Error::Json(e)
            } else {
                Error::Transport(format!("http status {status}: {raw}"))
            }
        })?;

        let code: i64 = envelope.code.parse().unwrap_or(0);
        if code != 0 {
            return Err(Error::Api {
                code,
                msg: envelope.msg,
            });
        }
        if !status.is_success() {
            return Err(Error::Transport(format!("http status {status}")));
        }
        Ok(envelope.data)
    }
}

/// An empty JSON object signs as an empty string, though it is still sent
/// as the request body.
fn body_for_signing(body: &str) -> &str {
    if body == "{}" {
        ""
    } else {
        body
    }
}

/// Encode a JSON object as a query string. Literal quote characters are
/// stripped so string and numeric parameter values encode identically, then
/// keys and values are percent-encoded; the same string is signed and sent,
/// so reserved characters must not corrupt either.
fn query_string(params: &Value) -> Result<String, Error> {
    let map: &Map<String, Value> = params
        .as_object()
        .ok_or_else(|| Error::Protocol("query parameters must be an object".to_string()))?;
    let mut parts = Vec::with_capacity(map.len());
    for (key, value) in map {
        if value.is_null() {
            continue;
        }
        let rendered = value.to_string().replace('"', "");
        parts.push(format!(
            "{}={}",
            urlencoding::encode(key),
            urlencoding::encode(&rendered)
        ));
    }
    Ok(parts.join("&"))
}
