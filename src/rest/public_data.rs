//! Public reference-data endpoints: instruments, funding, system time and
//! status.

use chrono::Utc;
use serde_json::json;
use tracing::debug;

use crate::errors::Error;
use crate::rest::client::RestClient;
use crate::types::{FundingRate, Instrument, MarkPrice, OpenInterest, SystemStatus, SystemTime};

#[derive(Clone)]
pub struct PublicDataApi {
    client: RestClient,
}

impl PublicDataApi {
    pub(crate) fn new(client: RestClient) -> Self {
        Self { client }
    }

    pub async fn instruments(
        &self,
        inst_type: &str,
        inst_id: Option<&str>,
    ) -> Result<Vec<Instrument>, Error> {
        self.client
            .get(
                "/api/v5/public/instruments",
                Some(json!({ "instType": inst_type, "instId": inst_id })),
                false,
            )
            .await
    }

    pub async fn funding_rate(&self, inst_id: &str) -> Result<Vec<FundingRate>, Error> {
        self.client
            .get(
                "/api/v5/public/funding-rate",
                Some(json!({ "instId": inst_id })),
                false,
            )
            .await
    }

    pub async fn mark_price(
        &self,
        inst_type: &str,
        inst_id: Option<&str>,
    ) -> Result<Vec<MarkPrice>, Error> {
        self.client
            .get(
                "/api/v5/public/mark-price",
                Some(json!({ "instType": inst_type, "instId": inst_id })),
                false,
            )
            .await
    }

    pub async fn open_interest(
        &self,
        inst_type: &str,
        inst_id: Option<&str>,
    ) -> Result<Vec<OpenInterest>, Error> {
        self.client
            .get(
                "/api/v5/public/open-interest",
                Some(json!({ "instType": inst_type, "instId": inst_id })),
                false,
            )
            .await
    }

    pub async fn system_time(&self) -> Result<Vec<SystemTime>, Error> {
        self.client.get("/api/v5/public/time", None, false).await
    }

    pub async fn status(&self, state: Option<&str>) -> Result<Vec<SystemStatus>, Error> {
        self.client
            .get("/api/v5/system/status", Some(json!({ "state": state })), false)
            .await
    }

    /// Query the venue clock and record the measured skew on the shared
    /// signer, so subsequent signed requests survive local drift.
    pub async fn sync_clock(&self) -> Result<chrono::Duration, Error> {
        let times = self.system_time().await?;
        let server_ms: i64 = times
            .first()
            .and_then(|t| t.ts.parse().ok())
            .ok_or_else(|| Error::Protocol("empty system time response".to_string()))?;
        let offset = chrono::Duration::milliseconds(server_ms - Utc::now().timestamp_millis());
        self.client.signer().set_clock_offset(offset);
        debug!(offset_ms = offset.num_milliseconds(), "clock offset recorded");
        Ok(offset)
    }
}
