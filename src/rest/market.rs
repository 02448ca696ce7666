//! Market-data endpoints. All public; no signing involved.

use serde_json::json;

use crate::errors::Error;
use crate::rest::client::RestClient;
use crate::types::{Candle, IndexTicker, OrderBookData, Ticker, TradeData};

#[derive(Clone)]
pub struct MarketApi {
    client: RestClient,
}

impl MarketApi {
    pub(crate) fn new(client: RestClient) -> Self {
        Self { client }
    }

    /// Latest tickers for every instrument of `inst_type`.
    pub async fn tickers(&self, inst_type: &str) -> Result<Vec<Ticker>, Error> {
        self.client
            .get("/api/v5/market/tickers", Some(json!({ "instType": inst_type })), false)
            .await
    }

    pub async fn ticker(&self, inst_id: &str) -> Result<Vec<Ticker>, Error> {
        self.client
            .get("/api/v5/market/ticker", Some(json!({ "instId": inst_id })), false)
            .await
    }

    pub async fn order_book(
        &self,
        inst_id: &str,
        depth: Option<u32>,
    ) -> Result<Vec<OrderBookData>, Error> {
        self.client
            .get(
                "/api/v5/market/books",
                Some(json!({ "instId": inst_id, "sz": depth })),
                false,
            )
            .await
    }

    /// Most recent candles, newest first. `bar` uses the venue's
    /// granularity names (`1m`, `15m`, `1H`, `1D`).
    pub async fn candles(
        &self,
        inst_id: &str,
        bar: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<Candle>, Error> {
        self.client
            .get(
                "/api/v5/market/candles",
                Some(json!({ "instId": inst_id, "bar": bar, "limit": limit })),
                false,
            )
            .await
    }

    pub async fn history_candles(
        &self,
        inst_id: &str,
        bar: Option<&str>,
        limit: Option<u32>,
    ) -> Result<Vec<Candle>, Error> {
        self.client
            .get(
                "/api/v5/market/history-candles",
                Some(json!({ "instId": inst_id, "bar": bar, "limit": limit })),
                false,
            )
            .await
    }

    pub async fn trades(&self, inst_id: &str, limit: Option<u32>) -> Result<Vec<TradeData>, Error> {
        self.client
            .get(
                "/api/v5/market/trades",
                Some(json!({ "instId": inst_id, "limit": limit })),
                false,
            )
            .await
    }

    pub async fn index_tickers(&self, inst_id: &str) -> Result<Vec<IndexTicker>, Error> {
        self.client
            .get(
                "/api/v5/market/index-tickers",
                Some(json!({ "instId": inst_id })),
                false,
            )
            .await
    }
}
