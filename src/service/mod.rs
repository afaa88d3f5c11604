//! Transaction services
//!
//! Building transactions against a cached block hash, and the submission
//! pipeline that signs, broadcasts and waits for them.

pub mod builder;
pub mod submission;

// Re-export for convenience
pub use builder::{RecentBlock, TransactionBuilder};
pub use submission::{Completion, SubmissionOutcome, SubmissionPipeline, SubmissionState};
