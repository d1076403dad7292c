//! Route inbound chunks and votes to per-round queues.
//!
//! The [Demultiplexer] is shared by every producer (the transport, the local engine)
//! and the single consumer of each round (the engine). Messages for the current or a
//! future round are deduplicated and queued. Messages for a round below the current one
//! are dropped. Advancing the round evicts every older round and closes its queues.
//!
//! Duplicates are recognized by the digest of the full message encoding, signature
//! included. Keying on the signed digest alone would let anyone suppress a message by
//! delivering a copy with a bad signature first.

use crate::{
    types::{BlockChunk, Round, Tag, Vote},
    Error,
};
use rapidchain_cryptography::sha256::Digest;
use std::{
    collections::{BTreeMap, HashSet},
    sync::{Arc, Mutex},
};
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tracing::trace;

/// Default capacity of each queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Outcome of delivering a message to the [Demultiplexer].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Enqueued {
    /// The message was queued for its round.
    Queued,
    /// The message belongs to a round that was already evicted.
    Stale,
    /// An identical message was already delivered for the round.
    Duplicate,
}

/// Bounded FIFO queue with a single consumer.
///
/// Producers wait for space when the queue is full.
pub struct Queue<T> {
    capacity: usize,
    sender: Mutex<Option<mpsc::Sender<T>>>,
    receiver: AsyncMutex<mpsc::Receiver<T>>,
    closed: watch::Sender<bool>,
}

impl<T> Queue<T> {
    fn new(capacity: usize) -> Self {
        let (sender, receiver) = mpsc::channel(capacity);
        Self {
            capacity,
            sender: Mutex::new(Some(sender)),
            receiver: AsyncMutex::new(receiver),
            closed: watch::Sender::new(false),
        }
    }

    /// Returns false if the queue was closed before the item could be pushed.
    async fn push(&self, item: T) -> bool {
        let Some(sender) = self.sender.lock().unwrap().clone() else {
            return false;
        };
        let mut closed = self.closed.subscribe();
        tokio::select! {
            result = sender.send(item) => result.is_ok(),
            _ = closed.wait_for(|closed| *closed) => false,
        }
    }

    /// Waits for the next item.
    ///
    /// Returns `None` once the queue is closed and drained. Dropping the returned future
    /// before it completes loses no item.
    pub async fn recv(&self) -> Option<T> {
        self.receiver.lock().await.recv().await
    }

    /// Returns the next item if one is ready.
    pub fn try_recv(&self) -> Option<T> {
        self.receiver.try_lock().ok()?.try_recv().ok()
    }

    /// Returns the number of queued items.
    pub fn len(&self) -> usize {
        match self.sender.lock().unwrap().as_ref() {
            Some(sender) => self.capacity - sender.capacity(),
            None => self
                .receiver
                .try_lock()
                .map(|receiver| receiver.len())
                .unwrap_or_default(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Rejects further pushes and releases producers waiting for space.
    ///
    /// The consumer still receives what was queued before it sees `None`.
    fn close(&self) {
        self.sender.lock().unwrap().take();
        self.closed.send_replace(true);
    }
}

#[derive(Default)]
struct RoundState {
    chunks: Option<Arc<Queue<BlockChunk>>>,
    votes: [Option<Arc<Queue<Vote>>>; 3],
    seen_chunks: HashSet<Digest>,
    seen_votes: [HashSet<Digest>; 3],
}

impl RoundState {
    fn chunks(&mut self, capacity: usize) -> Arc<Queue<BlockChunk>> {
        self.chunks
            .get_or_insert_with(|| Arc::new(Queue::new(capacity)))
            .clone()
    }

    fn votes(&mut self, tag: Tag, capacity: usize) -> Arc<Queue<Vote>> {
        self.votes[tag.index()]
            .get_or_insert_with(|| Arc::new(Queue::new(capacity)))
            .clone()
    }

    fn close(&self) {
        if let Some(queue) = &self.chunks {
            queue.close();
        }
        for queue in self.votes.iter().flatten() {
            queue.close();
        }
    }
}

struct Inner {
    current: Round,
    rounds: BTreeMap<Round, RoundState>,
}

/// Round-scoped router of chunks and votes.
pub struct Demultiplexer {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl Default for Demultiplexer {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

impl Demultiplexer {
    /// Creates a demultiplexer at round 0 whose queues each hold up to `capacity` items.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(Inner {
                current: 0,
                rounds: BTreeMap::new(),
            }),
        }
    }

    /// Returns the current round.
    pub fn current_round(&self) -> Round {
        self.inner.lock().unwrap().current
    }

    /// Queues `chunk` for its round unless it is stale or a duplicate.
    pub async fn enqueue_chunk(&self, chunk: BlockChunk) -> Enqueued {
        let key = chunk.key();
        let queue = {
            let mut inner = self.inner.lock().unwrap();
            if chunk.round < inner.current {
                trace!(round = chunk.round, current = inner.current, "dropping stale chunk");
                return Enqueued::Stale;
            }
            let state = inner.rounds.entry(chunk.round).or_default();
            if !state.seen_chunks.insert(key) {
                return Enqueued::Duplicate;
            }
            state.chunks(self.capacity)
        };

        // The round may be evicted while waiting for space
        if queue.push(chunk).await {
            Enqueued::Queued
        } else {
            Enqueued::Stale
        }
    }

    /// Queues `vote` for its round and tag unless it is stale or a duplicate.
    pub async fn enqueue_vote(&self, vote: Vote) -> Enqueued {
        let key = vote.key();
        let queue = {
            let mut inner = self.inner.lock().unwrap();
            if vote.round < inner.current {
                trace!(round = vote.round, current = inner.current, tag = %vote.tag, "dropping stale vote");
                return Enqueued::Stale;
            }
            let state = inner.rounds.entry(vote.round).or_default();
            if !state.seen_votes[vote.tag.index()].insert(key) {
                return Enqueued::Duplicate;
            }
            state.votes(vote.tag, self.capacity)
        };
        if queue.push(vote).await {
            Enqueued::Queued
        } else {
            Enqueued::Stale
        }
    }

    /// Returns the chunk queue of `round`, creating it if needed.
    pub fn chunk_queue(&self, round: Round) -> Result<Arc<Queue<BlockChunk>>, Error> {
        let mut inner = self.inner.lock().unwrap();
        if round < inner.current {
            return Err(Error::StaleRound {
                round,
                current: inner.current,
            });
        }
        Ok(inner.rounds.entry(round).or_default().chunks(self.capacity))
    }

    /// Returns the queue of `tag` votes of `round`, creating it if needed.
    pub fn vote_queue(&self, round: Round, tag: Tag) -> Result<Arc<Queue<Vote>>, Error> {
        let mut inner = self.inner.lock().unwrap();
        if round < inner.current {
            return Err(Error::StaleRound {
                round,
                current: inner.current,
            });
        }
        Ok(inner.rounds.entry(round).or_default().votes(tag, self.capacity))
    }

    /// Moves to `round`, which must directly follow the current round, and evicts every
    /// older round.
    pub fn advance_round(&self, round: Round) -> Result<(), Error> {
        let evicted = {
            let mut inner = self.inner.lock().unwrap();
            if inner.current.checked_add(1) != Some(round) {
                return Err(Error::InvalidRoundTransition {
                    current: inner.current,
                    round,
                });
            }
            inner.current = round;
            let retained = inner.rounds.split_off(&round);
            std::mem::replace(&mut inner.rounds, retained)
        };
        for state in evicted.values() {
            state.close();
        }
        trace!(round, evicted = evicted.len(), "advanced round");
        Ok(())
    }

    #[cfg(test)]
    fn rounds(&self) -> Vec<Round> {
        self.inner.lock().unwrap().rounds.keys().copied().collect()
    }
}
