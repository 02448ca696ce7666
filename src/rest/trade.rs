//! Private trading endpoints: order placement, cancellation and lookup.
//!
//! Order endpoints carry a per-order `sCode` in each data element on top of
//! the envelope code; a batch can half-succeed, so acks are returned as-is
//! for the caller to inspect.

use serde_json::json;

use crate::errors::Error;
use crate::rest::client::RestClient;
use crate::types::{Order, OrderAck, OrderRequest};

#[derive(Clone)]
pub struct TradeApi {
    client: RestClient,
}

impl TradeApi {
    pub(crate) fn new(client: RestClient) -> Self {
        Self { client }
    }

    pub async fn place_order(&self, order: &OrderRequest) -> Result<Vec<OrderAck>, Error> {
        self.client
            .post("/api/v5/trade/order", Some(serde_json::to_value(order)?), true)
            .await
    }

    pub async fn place_orders(&self, orders: &[OrderRequest]) -> Result<Vec<OrderAck>, Error> {
        self.client
            .post(
                "/api/v5/trade/batch-orders",
                Some(serde_json::to_value(orders)?),
                true,
            )
            .await
    }

    /// Cancel by venue order id or client order id; at least one must be
    /// set or the venue rejects the request.
    pub async fn cancel_order(
        &self,
        inst_id: &str,
        ord_id: Option<&str>,
        cl_ord_id: Option<&str>,
    ) -> Result<Vec<OrderAck>, Error> {
        self.client
            .post(
                "/api/v5/trade/cancel-order",
                Some(json!({ "instId": inst_id, "ordId": ord_id, "clOrdId": cl_ord_id })),
                true,
            )
            .await
    }

    pub async fn order(
        &self,
        inst_id: &str,
        ord_id: Option<&str>,
        cl_ord_id: Option<&str>,
    ) -> Result<Vec<Order>, Error> {
        self.client
            .get(
                "/api/v5/trade/order",
                Some(json!({ "instId": inst_id, "ordId": ord_id, "clOrdId": cl_ord_id })),
                true,
            )
            .await
    }

    pub async fn pending_orders(
        &self,
        inst_type: Option<&str>,
        inst_id: Option<&str>,
    ) -> Result<Vec<Order>, Error> {
        self.client
            .get(
                "/api/v5/trade/orders-pending",
                Some(json!({ "instType": inst_type, "instId": inst_id })),
                true,
            )
            .await
    }
}
