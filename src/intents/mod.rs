//! Intents
//!
//! Declarative batches signed by an account and settled by the solver
//! network (or executed directly on the verifying contract).

pub mod builder;
pub mod client;
pub mod model;

pub use builder::{
    format_deadline, nonce_from_seed, random_nonce, sign_payload, IntentBuilder, IntentSigner,
    DEADLINE_FORMAT, NFT_COLLECTION_SUFFIX,
};
pub use client::IntentsClient;
pub use model::{
    Commitment, Intent, IntentExecuted, IntentPayload, NftMetadata, SimulationResult, SimulationState, TokenId,
    DEFAULT_MT_TOKEN, RAW_ED25519_STANDARD,
};
