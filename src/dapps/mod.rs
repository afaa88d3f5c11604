//! Dapp clients
//!
//! Thin clients for common contracts, each built by composing an
//! [`Account`](crate::account::Account) or an
//! [`IntentsClient`](crate::intents::IntentsClient).

pub mod ft;
pub mod keypom;
pub mod orderbook;
pub mod staking;

pub use ft::{FtClient, FtMetadata, StorageBalance};
pub use keypom::{CreateDrop, DropConfig, KeyInfo, KeypomClient, KEYPOM_CONTRACT};
pub use orderbook::{
    FeeCollector, MarketOrderSimulation, Order, OrderBook, OrderEntry, OrderInfo, OrderbookClient,
    ProtocolFees, TokenPair,
};
pub use staking::StakingClient;
