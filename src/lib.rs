//! Async client for the OKX v5 trading venue.
//!
//! The crate centers on the WebSocket subscription layer: typed channel
//! facades register [`ws::Topic`]s with a per-connection router, and pushed
//! frames are decoded and delivered to bounded `mpsc` receivers that survive
//! reconnects. A signed REST surface shares the same HMAC signer as the
//! private-socket login handshake.
//!
//! ```no_run
//! use okx_connect::OkxClient;
//!
//! # async fn run() -> Result<(), okx_connect::Error> {
//! let client = OkxClient::anonymous()?;
//! let mut tickers = client.public().tickers("BTC-USDT").await?;
//! while let Some(push) = tickers.recv().await {
//!     for ticker in push.data {
//!         println!("{} last={}", ticker.inst_id, ticker.last);
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod errors;
pub mod rest;
pub mod signer;
pub mod types;
pub mod ws;

pub use client::{OkxClient, OkxClientBuilder};
pub use config::{Credentials, Destination};
pub use errors::Error;
pub use signer::Signer;
pub use ws::{ConnState, Push, Scope, SubscribeOptions, Topic, WsConfig};
