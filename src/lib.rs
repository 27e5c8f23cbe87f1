// Federated stake-weighted consensus and ledger core.

pub mod attestation;
pub mod auction;
pub mod block;
pub mod bus;
pub mod components;
pub mod config;
pub mod consensus;
pub mod contracts;
pub mod coordinator;
pub mod error;
pub mod federated;
pub mod identity;
pub mod ledger;
pub mod node;
pub mod policy;
pub mod scoring;
pub mod state;
pub mod wallet;

pub use coordinator::{FederatedChain, RoundOutcome, RoundStatus};
pub use error::{ChainError, Result};

/// Hash of the sentinel genesis block, and `last_hash()` of an empty ledger.
pub const GENESIS_HASH: &str = "genesis";
