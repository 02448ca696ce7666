//! REST surface: one dispatcher plus typed endpoint facades.

pub mod account;
pub mod client;
pub mod market;
pub mod public_data;
pub mod trade;

pub use account::AccountApi;
pub use client::RestClient;
pub use market::MarketApi;
pub use public_data::PublicDataApi;
pub use trade::TradeApi;

/// Typed endpoint groups sharing one dispatcher.
#[derive(Clone)]
pub struct RestApi {
    pub market: MarketApi,
    pub public_data: PublicDataApi,
    pub account: AccountApi,
    pub trade: TradeApi,
}

impl RestApi {
    pub(crate) fn new(client: RestClient) -> Self {
        Self {
            market: MarketApi::new(client.clone()),
            public_data: PublicDataApi::new(client.clone()),
            account: AccountApi::new(client.clone()),
            trade: TradeApi::new(client),
        }
    }
}
