//! Private account endpoints. Every request here is signed.

use serde_json::json;

use crate::errors::Error;
use crate::rest::client::RestClient;
use crate::types::{AccountBalance, Position};

#[derive(Clone)]
pub struct AccountApi {
    client: RestClient,
}

impl AccountApi {
    pub(crate) fn new(client: RestClient) -> Self {
        Self { client }
    }

    /// Account balance snapshot, optionally narrowed to a comma-separated
    /// list of currencies.
    pub async fn balance(&self, ccy: Option<&str>) -> Result<Vec<AccountBalance>, Error> {
        self.client
            .get("/api/v5/account/balance", Some(json!({ "ccy": ccy })), true)
            .await
    }

    pub async fn positions(
        &self,
        inst_type: Option<&str>,
        inst_id: Option<&str>,
    ) -> Result<Vec<Position>, Error> {
        self.client
            .get(
                "/api/v5/account/positions",
                Some(json!({ "instType": inst_type, "instId": inst_id })),
                true,
            )
            .await
    }
}
