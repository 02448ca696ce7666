//! Typed facade over the public WebSocket channels.
//!
//! Every method builds the channel's [`Topic`], installs a decoding sink and
//! returns the receiver. The `*_topic` constructors are public so callers can
//! address the same subscription later for [`PublicChannels::unsubscribe`] or
//! [`PublicChannels::resume`].

use std::sync::Arc;
use tokio::sync::mpsc;

use crate::errors::Error;
use crate::types::{
    EstimatedPrice, FundingRate, IndexTicker, Instrument, MarkPrice, OpenInterest, OptionSummary,
    OrderBookData, PriceLimit, Ticker, TradeData,
};
use crate::types::Candle;
use crate::ws::topic::Topic;
use crate::ws::{subscribe_typed, subscribe_typed_many, Push, SubscribeOptions, WsConnection};

/// Order book channel flavors. Depth and update cadence differ per flavor
/// but the payload shape is shared.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookChannel {
    /// 400 levels, snapshot then incremental updates.
    Books,
    /// Top 5 levels, full snapshot every update.
    Books5,
    /// 400 levels, tick-by-tick.
    BooksTbt,
    /// 50 levels, tick-by-tick.
    Books50Tbt,
    /// Best bid/offer, tick-by-tick.
    BboTbt,
}

impl BookChannel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Books => "books",
            Self::Books5 => "books5",
            Self::BooksTbt => "books-l2-tbt",
            Self::Books50Tbt => "books50-l2-tbt",
            Self::BboTbt => "bbo-tbt",
        }
    }
}

pub fn instruments_topic(inst_type: impl Into<String>) -> Topic {
    Topic::new("instruments").arg("instType", inst_type)
}

pub fn tickers_topic(inst_id: impl Into<String>) -> Topic {
    Topic::new("tickers").arg("instId", inst_id)
}

pub fn open_interest_topic(inst_id: impl Into<String>) -> Topic {
    Topic::new("open-interest").arg("instId", inst_id)
}

/// `bar` is the venue's granularity suffix, e.g. `1m`, `15m`, `1H`, `1D`.
pub fn candlesticks_topic(inst_id: impl Into<String>, bar: &str) -> Topic {
    Topic::new(format!("candle{bar}")).arg("instId", inst_id)
}

pub fn trades_topic(inst_id: impl Into<String>) -> Topic {
    Topic::new("trades").arg("instId", inst_id)
}

pub fn estimated_price_topic(inst_type: impl Into<String>, uly: Option<&str>) -> Topic {
    let topic = Topic::new("estimated-price").arg("instType", inst_type);
    match uly {
        Some(uly) => topic.arg("uly", uly),
        None => topic,
    }
}

pub fn mark_price_topic(inst_id: impl Into<String>) -> Topic {
    Topic::new("mark-price").arg("instId", inst_id)
}

pub fn mark_price_candlesticks_topic(inst_id: impl Into<String>, bar: &str) -> Topic {
    Topic::new(format!("mark-price-candle{bar}")).arg("instId", inst_id)
}

pub fn price_limit_topic(inst_id: impl Into<String>) -> Topic {
    Topic::new("price-limit").arg("instId", inst_id)
}

pub fn order_book_topic(channel: BookChannel, inst_id: impl Into<String>) -> Topic {
    Topic::new(channel.as_str()).arg("instId", inst_id)
}

pub fn option_summary_topic(inst_family: impl Into<String>) -> Topic {
    Topic::new("opt-summary").arg("instFamily", inst_family)
}

pub fn funding_rate_topic(inst_id: impl Into<String>) -> Topic {
    Topic::new("funding-rate").arg("instId", inst_id)
}

pub fn index_candlesticks_topic(inst_id: impl Into<String>, bar: &str) -> Topic {
    Topic::new(format!("index-candle{bar}")).arg("instId", inst_id)
}

pub fn index_tickers_topic(inst_id: impl Into<String>) -> Topic {
    Topic::new("index-tickers").arg("instId", inst_id)
}

/// Public market-data channels. Cheap to clone; all clones share the same
/// connection.
#[derive(Clone)]
pub struct PublicChannels {
    conn: Arc<WsConnection>,
}

impl PublicChannels {
    pub(crate) fn new(conn: Arc<WsConnection>) -> Self {
        Self { conn }
    }

    pub fn connection(&self) -> &WsConnection {
        &self.conn
    }

    pub async fn instruments(
        &self,
        inst_type: &str,
    ) -> Result<mpsc::Receiver<Push<Instrument>>, Error> {
        subscribe_typed(&self.conn, instruments_topic(inst_type), SubscribeOptions::default())
            .await
    }

    pub async fn tickers(&self, inst_id: &str) -> Result<mpsc::Receiver<Push<Ticker>>, Error> {
        subscribe_typed(&self.conn, tickers_topic(inst_id), SubscribeOptions::default()).await
    }

    pub async fn tickers_with(
        &self,
        inst_id: &str,
        options: SubscribeOptions,
    ) -> Result<mpsc::Receiver<Push<Ticker>>, Error> {
        subscribe_typed(&self.conn, tickers_topic(inst_id), options).await
    }

    pub async fn open_interest(
        &self,
        inst_id: &str,
    ) -> Result<mpsc::Receiver<Push<OpenInterest>>, Error> {
        subscribe_typed(&self.conn, open_interest_topic(inst_id), SubscribeOptions::default())
            .await
    }

    pub async fn candlesticks(
        &self,
        inst_id: &str,
        bar: &str,
    ) -> Result<mpsc::Receiver<Push<Candle>>, Error> {
        subscribe_typed(
            &self.conn,
            candlesticks_topic(inst_id, bar),
            SubscribeOptions::default(),
        )
        .await
    }

    pub async fn trades(&self, inst_id: &str) -> Result<mpsc::Receiver<Push<TradeData>>, Error> {
        subscribe_typed(&self.conn, trades_topic(inst_id), SubscribeOptions::default()).await
    }

    pub async fn estimated_price(
        &self,
        inst_type: &str,
        uly: Option<&str>,
    ) -> Result<mpsc::Receiver<Push<EstimatedPrice>>, Error> {
        subscribe_typed(
            &self.conn,
            estimated_price_topic(inst_type, uly),
            SubscribeOptions::default(),
        )
        .await
    }

    pub async fn mark_price(
        &self,
        inst_id: &str,
    ) -> Result<mpsc::Receiver<Push<MarkPrice>>, Error> {
        subscribe_typed(&self.conn, mark_price_topic(inst_id), SubscribeOptions::default()).await
    }

    pub async fn mark_price_candlesticks(
        &self,
        inst_id: &str,
        bar: &str,
    ) -> Result<mpsc::Receiver<Push<Candle>>, Error> {
        subscribe_typed(
            &self.conn,
            mark_price_candlesticks_topic(inst_id, bar),
            SubscribeOptions::default(),
        )
        .await
    }

    pub async fn price_limit(
        &self,
        inst_id: &str,
    ) -> Result<mpsc::Receiver<Push<PriceLimit>>, Error> {
        subscribe_typed(&self.conn, price_limit_topic(inst_id), SubscribeOptions::default()).await
    }

    /// Subscribe several instruments to the same book flavor in one control
    /// frame. Receivers come back in the order of `inst_ids`.
    pub async fn order_book(
        &self,
        channel: BookChannel,
        inst_ids: &[&str],
    ) -> Result<Vec<mpsc::Receiver<Push<OrderBookData>>>, Error> {
        let topics = inst_ids
            .iter()
            .map(|id| order_book_topic(channel, *id))
            .collect();
        subscribe_typed_many(&self.conn, topics, SubscribeOptions::default()).await
    }

    pub async fn option_summary(
        &self,
        inst_family: &str,
    ) -> Result<mpsc::Receiver<Push<OptionSummary>>, Error> {
        subscribe_typed(
            &self.conn,
            option_summary_topic(inst_family),
            SubscribeOptions::default(),
        )
        .await
    }

    pub async fn funding_rate(
        &self,
        inst_id: &str,
    ) -> Result<mpsc::Receiver<Push<FundingRate>>, Error> {
        subscribe_typed(&self.conn, funding_rate_topic(inst_id), SubscribeOptions::default()).await
    }

    pub async fn index_candlesticks(
        &self,
        inst_id: &str,
        bar: &str,
    ) -> Result<mpsc::Receiver<Push<Candle>>, Error> {
        subscribe_typed(
            &self.conn,
            index_candlesticks_topic(inst_id, bar),
            SubscribeOptions::default(),
        )
        .await
    }

    pub async fn index_tickers(
        &self,
        inst_id: &str,
    ) -> Result<mpsc::Receiver<Push<IndexTicker>>, Error> {
        subscribe_typed(&self.conn, index_tickers_topic(inst_id), SubscribeOptions::default())
            .await
    }

    /// Tear down subscriptions. With `clear_sink` the receivers observe a
    /// close; without it they stay attached for a later [`Self::resume`].
    pub async fn unsubscribe(&self, topics: Vec<Topic>, clear_sink: bool) -> Result<(), Error> {
        self.conn.unsubscribe(topics, clear_sink).await
    }

    /// Re-subscribe a topic whose sink was retained across an unsubscribe.
    pub async fn resume(&self, topic: Topic) -> Result<(), Error> {
        self.conn.resume(topic).await
    }

    pub fn dropped_frames(&self, topic: &Topic) -> u64 {
        self.conn.dropped_frames(topic)
    }

    pub fn close(&self) {
        self.conn.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candle_topics_carry_bar_in_channel_name() {
        let t = candlesticks_topic("BTC-USDT", "15m");
        assert_eq!(t.channel(), "candle15m");
        assert_eq!(t.args().get("instId").map(String::as_str), Some("BTC-USDT"));

        let m = mark_price_candlesticks_topic("BTC-USDT", "1m");
        assert_eq!(m.channel(), "mark-price-candle1m");
        assert_ne!(t, m);
    }

    #[test]
    fn estimated_price_underlying_is_optional() {
        let bare = estimated_price_topic("OPTION", None);
        assert!(!bare.args().contains_key("uly"));
        let full = estimated_price_topic("OPTION", Some("BTC-USD"));
        assert_eq!(full.args().get("uly").map(String::as_str), Some("BTC-USD"));
    }

    #[test]
    fn book_channels_map_to_wire_names() {
        assert_eq!(BookChannel::Books5.as_str(), "books5");
        assert_eq!(BookChannel::BboTbt.as_str(), "bbo-tbt");
        assert_eq!(
            order_book_topic(BookChannel::Books50Tbt, "ETH-USDT").channel(),
            "books50-l2-tbt"
        );
    }
}
