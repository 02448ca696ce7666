use serde::{Deserialize, Serialize};

// Push payloads carry container-level defaults: the venue omits fields that
// have no value for the instrument type, and a partial frame must still
// decode rather than being dropped on the routing path.

/// Ticker snapshot, pushed on the `tickers` channel and returned by
/// `/api/v5/market/ticker`.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Ticker {
    pub inst_type: String,
    pub inst_id: String,
    pub last: String,        // Last traded price
    pub last_sz: String,     // Last traded size
    pub ask_px: String,
    pub ask_sz: String,
    pub bid_px: String,
    pub bid_sz: String,
    pub open_24h: String,
    pub high_24h: String,
    pub low_24h: String,
    pub vol_ccy_24h: String, // 24h volume in quote currency
    pub vol_24h: String,     // 24h volume in base currency
    pub sod_utc0: String,
    pub sod_utc8: String,
    pub ts: String,
}

/// Candlestick row. The venue sends candles as positional string arrays
/// `[ts, o, h, l, c, vol, ...]`; trailing columns vary by channel.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Candle(pub Vec<String>);

impl Candle {
    fn col(&self, idx: usize) -> Option<&str> {
        self.0.get(idx).map(String::as_str)
    }

    pub fn ts(&self) -> Option<&str> {
        self.col(0)
    }

    pub fn open(&self) -> Option<&str> {
        self.col(1)
    }

    pub fn high(&self) -> Option<&str> {
        self.col(2)
    }

    pub fn low(&self) -> Option<&str> {
        self.col(3)
    }

    pub fn close(&self) -> Option<&str> {
        self.col(4)
    }

    pub fn volume(&self) -> Option<&str> {
        self.col(5)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct TradeData {
    pub inst_id: String,
    pub trade_id: String,
    pub px: String,
    pub sz: String,
    pub side: String,
    pub ts: String,
}

/// One order-book level is `[price, size, liquidated_orders, order_count]`.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct OrderBookData {
    pub asks: Vec<Vec<String>>,
    pub bids: Vec<Vec<String>>,
    pub ts: String,
    pub checksum: Option<i64>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Instrument {
    pub inst_type: String, // SPOT, MARGIN, SWAP, FUTURES, OPTION
    pub inst_id: String,
    pub uly: String,       // Underlying, derivatives only
    pub base_ccy: String,
    pub quote_ccy: String,
    pub settle_ccy: String,
    pub ct_val: String,    // Contract value
    pub ct_mult: String,
    pub lever: String,
    pub tick_sz: String,
    pub lot_sz: String,
    pub min_sz: String,
    pub list_time: String,
    pub exp_time: String,
    pub state: String, // live, suspend, preopen, test
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct OpenInterest {
    pub inst_type: String,
    pub inst_id: String,
    pub oi: String,     // Open interest in contracts
    pub oi_ccy: String, // Open interest in currency
    pub ts: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct MarkPrice {
    pub inst_type: String,
    pub inst_id: String,
    pub mark_px: String,
    pub ts: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct PriceLimit {
    pub inst_id: String,
    pub buy_lmt: String,
    pub sell_lmt: String,
    pub ts: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct EstimatedPrice {
    pub inst_type: String,
    pub inst_id: String,
    pub settle_px: String, // Estimated delivery/exercise price
    pub ts: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct OptionSummary {
    pub inst_type: String,
    pub inst_id: String,
    pub uly: String,
    pub delta: String,
    pub gamma: String,
    pub theta: String,
    pub vega: String,
    pub mark_vol: String,
    pub ts: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct FundingRate {
    pub inst_type: String,
    pub inst_id: String,
    pub funding_rate: String,
    pub next_funding_rate: String,
    pub funding_time: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct IndexTicker {
    pub inst_id: String,
    pub idx_px: String,
    pub high_24h: String,
    pub low_24h: String,
    pub open_24h: String,
    pub sod_utc0: String,
    pub sod_utc8: String,
    pub ts: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct BalanceDetail {
    pub ccy: String,
    pub eq: String,
    pub cash_bal: String,
    pub avail_eq: String,
    pub avail_bal: String,
    pub frozen_bal: String,
    pub upl: String, // Unrealized P&L
}

/// Account snapshot pushed on the private `account` channel and returned by
/// `/api/v5/account/balance`.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct AccountBalance {
    pub u_time: String,
    pub total_eq: String,
    pub iso_eq: String,
    pub adj_eq: String,
    pub details: Vec<BalanceDetail>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Position {
    pub inst_type: String,
    pub inst_id: String,
    pub pos_id: String,
    pub pos_side: String, // long, short, net
    pub pos: String,
    pub avg_px: String,
    pub upl: String,
    pub lever: String,
    pub liq_px: String,
    pub margin: String,
    pub mgn_mode: String, // cross, isolated
    pub c_time: String,
    pub u_time: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct BalanceAndPosition {
    pub p_time: String,
    pub event_type: String, // snapshot, delivered, exercised, transferred, filled
    pub bal_data: Vec<BalanceDetail>,
    pub pos_data: Vec<Position>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Order {
    pub inst_type: String,
    pub inst_id: String,
    pub ord_id: String,
    pub cl_ord_id: String,
    pub px: String,
    pub sz: String,
    pub ord_type: String, // market, limit, post_only, fok, ioc
    pub side: String,
    pub td_mode: String, // cash, cross, isolated
    pub acc_fill_sz: String,
    pub fill_px: String,
    pub fill_sz: String,
    pub avg_px: String,
    pub state: String, // live, partially_filled, filled, canceled
    pub fee_ccy: String,
    pub fee: String,
    pub c_time: String,
    pub u_time: String,
}

/// Order placement request body for `/api/v5/trade/order`.
#[derive(Debug, Serialize, Clone)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    pub inst_id: String,
    pub td_mode: String,
    pub side: String,
    pub ord_type: String,
    pub sz: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub px: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cl_ord_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct OrderAck {
    pub ord_id: String,
    pub cl_ord_id: String,
    pub tag: String,
    pub s_code: String, // Per-order success code
    pub s_msg: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(default)]
pub struct SystemTime {
    pub ts: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct SystemStatus {
    pub title: String,
    pub state: String,
    pub begin: String,
    pub end: String,
    pub service_type: String,
}
