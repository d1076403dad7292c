use crate::types::{Phase, Round};
use thiserror::Error;

/// Errors that can occur while chunking, routing, reassembling, or agreeing on blocks.
///
/// Digests in messages are truncated to their first 4 bytes.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid config: {0}")]
    InvalidConfig(&'static str),
    #[error("invalid chunk count: {0}")]
    InvalidChunkCount(u32),
    #[error("chunk payload size is 0")]
    ZeroChunkSize,
    #[error("invalid padding after block")]
    InvalidPadding,
    #[error("invalid proposal for round {round}: {reason}")]
    InvalidProposal { round: Round, reason: &'static str },
    #[error("stale round: {round} < {current}")]
    StaleRound { round: Round, current: Round },
    #[error("invalid round transition: {current} -> {round}")]
    InvalidRoundTransition { current: Round, round: Round },
    #[error("too many blocks in round {round}: more than {leaders} merkle roots")]
    TooManyBlocks { round: Round, leaders: usize },
    #[error("invalid chunk in round {round}: {reason}")]
    InvalidChunk { round: Round, reason: &'static str },
    #[error("inconsistent encoding in round {round}: shards do not match root {root}")]
    InconsistentEncoding { round: Round, root: String },
    #[error("blocks of round {round} are incomplete")]
    Incomplete { round: Round },
    #[error("block not valid in round {round}: previous hash {found} != {expected}")]
    BlockNotValid {
        round: Round,
        expected: String,
        found: String,
    },
    #[error("decided on different block in round {round}: proposed {proposed} != received {received}")]
    DecidedOnDifferentBlock {
        round: Round,
        proposed: String,
        received: String,
    },
    #[error("equivocation by {leader} in round {round}: {first} != {second}")]
    Equivocation {
        round: Round,
        leader: String,
        first: String,
        second: String,
    },
    #[error("timeout in round {round} during {phase}")]
    Timeout { round: Round, phase: Phase },
    #[error("queue closed in round {0}")]
    Closed(Round),
    #[error("codec: {0}")]
    Codec(#[from] rapidchain_codec::Error),
    #[error("coding: {0}")]
    Coding(#[from] rapidchain_coding::Error),
    #[error("merkle: {0}")]
    Merkle(#[from] rapidchain_cryptography::Error),
}
