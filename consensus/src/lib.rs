//! Agree on the blocks of many concurrent leaders in a Byzantine environment.
//!
//! # Overview
//!
//! Every round, a deterministic set of leaders each propose a block. A leader splits its
//! block into chunks authenticated by a merkle root (optionally extended with
//! Reed-Solomon parity chunks), signs every chunk, disseminates them, and broadcasts a
//! `Propose` vote naming the root. Every participant then:
//!
//! 1. Collects one `Propose` vote from each leader.
//! 2. Collects chunks until every leader block can be reassembled, and checks that each
//!    block extends the previous round.
//! 3. Checks that the reassembled roots are exactly the proposed roots.
//! 4. Broadcasts an `Echo` vote over the roots and waits for a quorum of matching echoes.
//! 5. Broadcasts an `Accept` vote carrying that echo quorum and waits for a quorum of
//!    accepts (each certified by its own echo quorum).
//!
//! The blocks of the round are then decided, ordered by merkle root. A quorum is a strict
//! majority of participants (see [rapidchain_utils::quorum]).
//!
//! # Architecture
//!
//! Inbound traffic is routed by a shared [demux::Demultiplexer] into per-round queues
//! (deduplicated and bounded). A single [engine::Engine] per participant consumes those
//! queues one round at a time. Outbound traffic is handed to a [Relay], telemetry to a
//! [Reporter], and leader selection is delegated to an [election::Elector].
//!
//! # Status
//!
//! `rapidchain-consensus` is **ALPHA** software and is not yet recommended for production
//! use. Developers should expect breaking changes and occasional instability.

use std::future::Future;
use types::{BlockChunk, Vote};

pub mod chunk;
pub mod config;
pub mod demux;
pub mod election;
pub mod engine;
mod error;
pub mod mocks;
pub mod receiver;
pub mod types;

pub use config::NodeConfig;
pub use engine::{Config, Engine};
pub use error::Error;

/// Relay is the interface responsible for sending chunks and votes to other participants.
pub trait Relay: Clone + Send + 'static {
    /// Sends the chunks of a locally proposed block to the network.
    ///
    /// Chunks are usually spread across peers rather than all sent to each of them.
    fn disseminate(&mut self, chunks: Vec<BlockChunk>) -> impl Future<Output = ()> + Send;

    /// Gossips a chunk received from another participant.
    fn forward_chunk(&mut self, chunk: BlockChunk) -> impl Future<Output = ()> + Send;

    /// Broadcasts a vote (either created locally or received from another participant).
    fn forward_vote(&mut self, vote: Vote) -> impl Future<Output = ()> + Send;
}

/// Reporter is the interface responsible for reporting activity to some external actor.
///
/// Reporting must not block the engine.
pub trait Reporter: Clone + Send + 'static {
    /// Activity is specified by the underlying consensus implementation and can be
    /// interpreted if desired.
    type Activity;

    /// Report some activity observed by the consensus implementation.
    fn report(&mut self, activity: Self::Activity);
}
