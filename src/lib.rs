//! Omni client library
//!
//! Client-side orchestration for a JSON-RPC ledger: concurrent transaction
//! submission over a pool of signing keys, intent batches settled by an
//! off-chain solver network, and quote routing for token swaps.

pub mod account;
pub mod config;
pub mod crypto;
pub mod dapps;
pub mod error;
pub mod intents;
pub mod primitives;
pub mod router;
pub mod rpc;
pub mod service;
pub mod solver_client;

// Re-export public types for convenience
pub use account::{Account, KeyLease, KeyPool, NonceTracker, SigningIdentity};
pub use config::ClientConfig;
pub use crypto::{InMemorySigner, Signer};
pub use error::{ClientError, ClientResult, Reach, RpcError};
pub use intents::{Commitment, Intent, IntentBuilder, IntentSigner, IntentsClient, TokenId};
pub use primitives::{AccountId, Action, Balance, CryptoHash, Gas, PublicKey, Signature};
pub use router::{Quote, QuoteAmount, QuoteRouter, QuoteSource, Route};
pub use rpc::{JsonRpcClient, LedgerRpc, RpcTransport};
pub use service::{Completion, SubmissionOutcome, SubmissionPipeline, TransactionBuilder};
pub use solver_client::{SettlementStatus, SolverGateway};
