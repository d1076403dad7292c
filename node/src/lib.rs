//! Simulate many participants agreeing on concurrently proposed blocks.
//!
//! Every participant runs a [rapidchain_consensus::Engine] over an in-memory network.
//! Each participant gossips with a random set of peers. In every round, the elected
//! leaders propose a block of random payload that extends the blocks decided in the
//! previous round (starting from a fixed genesis block).
//!
//! # Usage
//!
//! ```bash
//! cargo run --release --bin rapidchain -- --config node/config.yaml --log-level info
//! ```

use rapidchain_consensus::types::Round;
use thiserror::Error;

pub mod config;
pub mod driver;
pub mod metrics;

pub use config::Config;

/// Errors that can occur while running a simulation.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
    #[error("unable to parse config: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("consensus failed: {0}")]
    Consensus(#[from] rapidchain_consensus::Error),
    #[error("participant task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
    #[error("participants decided different blocks in round {0}")]
    Diverged(Round),
    #[error("broken chain at round {round}: {reason}")]
    BrokenChain { round: Round, reason: &'static str },
}
