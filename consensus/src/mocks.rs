//! In-memory network and reporters for simulations and tests.

use crate::{
    demux::Demultiplexer,
    types::{Activity, BlockChunk, Fault, Phase, Round, Vote},
    Reporter,
};
use rapidchain_cryptography::{ed25519::PublicKey, sha256::Digest};
use std::{
    collections::{HashMap, HashSet},
    sync::{Arc, Mutex},
    time::Duration,
};

/// Delivers messages to the [Demultiplexer] of every registered participant.
///
/// Each delivery runs on its own task, so messages may be reordered.
#[derive(Clone, Default)]
pub struct Network {
    participants: Arc<Mutex<HashMap<PublicKey, Arc<Demultiplexer>>>>,
}

impl Network {
    /// Registers the inbound demultiplexer of `participant`.
    pub fn register(&self, participant: PublicKey, demux: Arc<Demultiplexer>) {
        self.participants.lock().unwrap().insert(participant, demux);
    }

    fn demux(&self, participant: &PublicKey) -> Option<Arc<Demultiplexer>> {
        self.participants.lock().unwrap().get(participant).cloned()
    }

    /// Delivers `chunk` to `recipient` (dropped if unknown).
    pub fn send_chunk(&self, recipient: &PublicKey, chunk: BlockChunk) {
        if let Some(demux) = self.demux(recipient) {
            tokio::spawn(async move {
                demux.enqueue_chunk(chunk).await;
            });
        }
    }

    /// Delivers `vote` to `recipient` (dropped if unknown).
    pub fn send_vote(&self, recipient: &PublicKey, vote: Vote) {
        if let Some(demux) = self.demux(recipient) {
            tokio::spawn(async move {
                demux.enqueue_vote(vote).await;
            });
        }
    }
}

/// [crate::Relay] over a [Network] with a fixed set of gossip peers.
///
/// Chunk `i` of a locally proposed block is sent to peer `i mod peers`. Everything
/// else is sent to every peer.
#[derive(Clone)]
pub struct Relay {
    me: PublicKey,
    peers: Vec<PublicKey>,
    network: Network,
    withheld: Arc<HashSet<u32>>,
}

impl Relay {
    /// Creates a relay for `me` (which is removed from `peers` if present).
    pub fn new(me: PublicKey, peers: Vec<PublicKey>, network: Network) -> Self {
        let peers = peers.into_iter().filter(|peer| *peer != me).collect();
        Self {
            me,
            peers,
            network,
            withheld: Arc::default(),
        }
    }

    /// Never disseminates the chunks with these indices (they remain available locally).
    pub fn withhold(mut self, indices: impl IntoIterator<Item = u32>) -> Self {
        self.withheld = Arc::new(indices.into_iter().collect());
        self
    }

    pub fn peers(&self) -> &[PublicKey] {
        &self.peers
    }
}

impl crate::Relay for Relay {
    async fn disseminate(&mut self, chunks: Vec<BlockChunk>) {
        if self.peers.is_empty() {
            return;
        }
        for (i, chunk) in chunks.into_iter().enumerate() {
            if self.withheld.contains(&chunk.chunk_index) {
                continue;
            }
            let peer = &self.peers[i % self.peers.len()];
            self.network.send_chunk(peer, chunk);
        }
    }

    async fn forward_chunk(&mut self, chunk: BlockChunk) {
        for peer in &self.peers {
            self.network.send_chunk(peer, chunk.clone());
        }
    }

    async fn forward_vote(&mut self, vote: Vote) {
        for peer in &self.peers {
            self.network.send_vote(peer, vote.clone());
        }
    }
}

#[derive(Default)]
struct Record {
    phases: Vec<(Round, Phase, Duration)>,
    faults: Vec<(Round, PublicKey, Fault)>,
    decided: Vec<(Round, Vec<Digest>)>,
}

/// Records every [Activity].
#[derive(Clone, Default)]
pub struct Collector {
    record: Arc<Mutex<Record>>,
}

impl Collector {
    pub fn phases(&self) -> Vec<(Round, Phase)> {
        let record = self.record.lock().unwrap();
        record
            .phases
            .iter()
            .map(|(round, phase, _)| (*round, *phase))
            .collect()
    }

    pub fn faults(&self) -> Vec<(Round, PublicKey, Fault)> {
        self.record.lock().unwrap().faults.clone()
    }

    pub fn decided(&self) -> Vec<(Round, Vec<Digest>)> {
        self.record.lock().unwrap().decided.clone()
    }
}

impl Reporter for Collector {
    type Activity = Activity;

    fn report(&mut self, activity: Activity) {
        let mut record = self.record.lock().unwrap();
        match activity {
            Activity::Phase {
                round,
                phase,
                elapsed,
            } => record.phases.push((round, phase, elapsed)),
            Activity::Fault {
                round,
                issuer,
                fault,
            } => record.faults.push((round, issuer, fault)),
            Activity::Decided { round, roots } => record.decided.push((round, roots)),
        }
    }
}
