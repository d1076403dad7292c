use crate::Error;
use rapidchain_utils::quorum;
use serde::{Deserialize, Serialize};

/// Erasure coding parameters: every group of `data_chunks` block chunks is extended
/// with `parity_chunks` recovery chunks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Erasure {
    pub data_chunks: u32,
    pub parity_chunks: u32,
}

impl Erasure {
    pub(crate) fn coding(&self) -> rapidchain_coding::Config {
        rapidchain_coding::Config::new(self.data_chunks as usize, self.parity_chunks as usize)
    }
}

/// Parameters shared by every participant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Number of participants.
    pub node_count: u32,
    /// Number of gossip peers per participant.
    pub gossip_fanout: u32,
    /// Number of leaders proposing a block in each round.
    pub leader_count: u32,
    /// Target size (in bytes) of all payloads proposed in a round.
    pub block_size: usize,
    /// Number of chunks a block is split into (before parity chunks are added).
    pub block_chunk_count: u32,
    /// Plain chunking when unset.
    #[serde(default)]
    pub erasure: Option<Erasure>,
}

/// Expected shape of the chunks of a single block.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layout {
    Plain { chunks: u32 },
    Coded { erasure: Erasure, total: u32 },
}

impl Layout {
    /// Returns the number of chunks a block is disseminated as.
    pub fn total(&self) -> u32 {
        match self {
            Layout::Plain { chunks } => *chunks,
            Layout::Coded { total, .. } => *total,
        }
    }
}

impl NodeConfig {
    /// Returns an error if the configuration cannot run a round.
    pub fn validate(&self) -> Result<(), Error> {
        if self.node_count == 0 {
            return Err(Error::InvalidConfig("node_count must be at least 1"));
        }
        if self.leader_count == 0 || self.leader_count > self.node_count {
            return Err(Error::InvalidConfig(
                "leader_count must be between 1 and node_count",
            ));
        }
        if self.block_chunk_count == 0 {
            return Err(Error::InvalidConfig("block_chunk_count must be at least 1"));
        }
        if self.node_count > 1 && self.gossip_fanout == 0 {
            return Err(Error::InvalidConfig("gossip_fanout must be at least 1"));
        }
        if let Some(erasure) = &self.erasure {
            if erasure.data_chunks == 0 {
                return Err(Error::InvalidConfig("data_chunks must be at least 1"));
            }
            if self.block_chunk_count < erasure.data_chunks
                || self.block_chunk_count % erasure.data_chunks != 0
            {
                return Err(Error::InvalidConfig(
                    "block_chunk_count must be a multiple of data_chunks",
                ));
            }
            if self.total_chunks().is_none() {
                return Err(Error::InvalidConfig("too many chunks"));
            }
        }
        Ok(())
    }

    /// Returns the number of votes required to make progress in a phase.
    pub fn quorum(&self) -> usize {
        quorum(self.node_count) as usize
    }

    /// Returns the number of chunks (data and parity) produced for a block.
    pub fn total_chunks(&self) -> Option<u32> {
        match &self.erasure {
            None => Some(self.block_chunk_count),
            Some(erasure) => (self.block_chunk_count / erasure.data_chunks)
                .checked_mul(erasure.data_chunks.checked_add(erasure.parity_chunks)?),
        }
    }

    /// Returns the chunk layout of a validated configuration.
    pub fn layout(&self) -> Layout {
        match &self.erasure {
            None => Layout::Plain {
                chunks: self.block_chunk_count,
            },
            Some(erasure) => Layout::Coded {
                erasure: *erasure,
                total: self.total_chunks().unwrap_or(0),
            },
        }
    }
}
