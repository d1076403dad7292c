//! Drive a participant through the phases of a round.

use crate::{
    chunk::{chunk, chunk_with_erasure},
    config::NodeConfig,
    demux::{Demultiplexer, Queue},
    election::Elector,
    receiver::BlockReceiver,
    types::{AcceptProof, Activity, Block, BlockChunk, Fault, Phase, Round, Tag, Vote},
    Error, Relay, Reporter,
};
use rapidchain_cryptography::{
    ed25519::{PrivateKey, PublicKey},
    sha256::Digest,
    Signer,
};
use rapidchain_utils::short_hex;
use std::{
    collections::{btree_map::Entry, BTreeMap, HashSet},
    sync::Arc,
    time::Duration,
};
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn};

/// Configuration of an [Engine].
pub struct Config<E: Elector, R: Relay, P: Reporter<Activity = Activity>> {
    /// Key used to sign chunks and votes.
    pub signer: PrivateKey,

    /// Every participant (including the signer).
    pub participants: Vec<PublicKey>,

    pub node: NodeConfig,

    /// Prefix of every signed message, preventing replay across deployments.
    pub namespace: Vec<u8>,

    /// Source of inbound chunks and votes.
    pub demux: Arc<Demultiplexer>,

    pub relay: R,
    pub reporter: P,
    pub elector: E,

    /// Maximum time spent collecting messages in any phase (unbounded if unset).
    pub phase_timeout: Option<Duration>,
}

/// A block proposed by this participant.
struct Proposal {
    root: Digest,
    chunks: Vec<BlockChunk>,
}

/// Participant in the agreement on the blocks of each round.
pub struct Engine<E: Elector, R: Relay, P: Reporter<Activity = Activity>> {
    signer: PrivateKey,
    public_key: PublicKey,
    participants: Vec<PublicKey>,
    node: NodeConfig,
    namespace: Vec<u8>,
    demux: Arc<Demultiplexer>,
    relay: R,
    reporter: P,
    elector: E,
    phase_timeout: Option<Duration>,
}

impl<E: Elector, R: Relay, P: Reporter<Activity = Activity>> Engine<E, R, P> {
    /// Creates a new engine.
    ///
    /// Participants are sorted so that every engine elects the same leaders.
    pub fn new(cfg: Config<E, R, P>) -> Result<Self, Error> {
        cfg.node.validate()?;
        let mut participants = cfg.participants;
        participants.sort();
        participants.dedup();
        if participants.len() != cfg.node.node_count as usize {
            return Err(Error::InvalidConfig(
                "participants must contain node_count distinct keys",
            ));
        }
        let public_key = cfg.signer.public_key();
        if participants.binary_search(&public_key).is_err() {
            return Err(Error::InvalidConfig("signer is not a participant"));
        }
        Ok(Self {
            signer: cfg.signer,
            public_key,
            participants,
            node: cfg.node,
            namespace: cfg.namespace,
            demux: cfg.demux,
            relay: cfg.relay,
            reporter: cfg.reporter,
            elector: cfg.elector,
            phase_timeout: cfg.phase_timeout,
        })
    }

    pub fn public_key(&self) -> &PublicKey {
        &self.public_key
    }

    /// Returns the leaders of `round`.
    pub fn leaders(&self, round: Round) -> Vec<PublicKey> {
        self.elector
            .leaders(round, &self.participants, self.node.leader_count as usize)
    }

    /// Returns true if this participant is a leader of `round`.
    pub fn is_leader(&self, round: Round) -> bool {
        self.leaders(round).contains(&self.public_key)
    }

    /// Proposes `block` in `round` (which must be the round after the last one run) and
    /// returns the decided blocks of the round.
    pub async fn propose(
        &mut self,
        round: Round,
        block: Block,
        prev_hash: &[u8],
    ) -> Result<Vec<Block>, Error> {
        self.node.validate()?;
        if block.round != round {
            return Err(Error::InvalidProposal {
                round,
                reason: "block is for another round",
            });
        }
        if !self.is_leader(round) {
            return Err(Error::InvalidProposal {
                round,
                reason: "not a leader",
            });
        }
        self.demux.advance_round(round)?;
        let start = Instant::now();

        let (mut chunks, root) = match &self.node.erasure {
            None => chunk(&self.public_key, &block, self.node.block_chunk_count)?,
            Some(erasure) => {
                chunk_with_erasure(&self.public_key, &block, self.node.block_chunk_count, erasure)?
            }
        };
        for chunk in &mut chunks {
            chunk.sign(&self.signer, &self.namespace);
        }
        info!(
            round,
            root = %short_hex(&root),
            chunks = chunks.len(),
            "proposing block"
        );
        self.relay.disseminate(chunks.clone()).await;

        let vote = Vote::sign(
            &self.signer,
            &self.namespace,
            Tag::Propose,
            round,
            vec![root],
            AcceptProof::default(),
        );
        self.broadcast(vote).await;
        self.run(round, prev_hash, start, Some(Proposal { root, chunks }))
            .await
    }

    /// Participates in `round` (which must be the round after the last one run) without
    /// proposing and returns the decided blocks of the round.
    pub async fn decide(&mut self, round: Round, prev_hash: &[u8]) -> Result<Vec<Block>, Error> {
        self.node.validate()?;
        self.demux.advance_round(round)?;
        let start = Instant::now();
        self.run(round, prev_hash, start, None).await
    }

    /// Runs the round, counting `own` (if any) without routing it through the
    /// demultiplexer.
    async fn run(
        &mut self,
        round: Round,
        prev_hash: &[u8],
        start: Instant,
        own: Option<Proposal>,
    ) -> Result<Vec<Block>, Error> {
        let (own_root, own_chunks) = match own {
            Some(Proposal { root, chunks }) => (Some(root), chunks),
            None => (None, Vec::new()),
        };
        let leaders = self.leaders(round);
        let proposed = self.collect_proposals(round, &leaders, own_root).await?;
        self.phase(round, Phase::Propose, start);

        let (blocks, roots) = self.collect_blocks(round, &leaders, own_chunks).await?;
        for block in &blocks {
            if block.prev_block_hash.as_ref() != prev_hash {
                return Err(Error::BlockNotValid {
                    round,
                    expected: short_hex(prev_hash),
                    found: short_hex(&block.prev_block_hash),
                });
            }
        }
        self.phase(round, Phase::Block, start);

        if proposed != roots {
            return Err(Error::DecidedOnDifferentBlock {
                round,
                proposed: join(&proposed),
                received: join(&roots),
            });
        }

        let echoes = self.collect_echoes(round, &roots).await?;
        self.phase(round, Phase::Echo, start);

        self.collect_accepts(round, &roots, echoes).await?;
        self.phase(round, Phase::Accept, start);

        self.phase(round, Phase::EndOfRound, start);
        info!(
            round,
            blocks = blocks.len(),
            roots = %join(&roots),
            elapsed = ?start.elapsed(),
            "decided"
        );
        self.reporter.report(Activity::Decided { round, roots });
        Ok(blocks)
    }

    /// Waits for one `Propose` vote from every leader and returns the proposed roots in
    /// ascending order.
    async fn collect_proposals(
        &mut self,
        round: Round,
        leaders: &[PublicKey],
        own: Option<Digest>,
    ) -> Result<Vec<Digest>, Error> {
        let queue = self.demux.vote_queue(round, Tag::Propose)?;
        let deadline = self.deadline();
        let mut proposals: BTreeMap<PublicKey, Digest> = BTreeMap::new();
        if let Some(root) = own {
            proposals.insert(self.public_key.clone(), root);
        }
        while proposals.len() < leaders.len() {
            let vote = Self::next(&queue, round, Phase::Propose, deadline).await?;
            if !leaders.contains(&vote.issuer) {
                self.fault(round, &vote.issuer, Fault::NotLeader);
                continue;
            }
            if !vote.verify(&self.namespace) {
                self.fault(round, &vote.issuer, Fault::InvalidSignature);
                continue;
            }
            let [root] = vote.block_hashes.as_slice() else {
                self.fault(round, &vote.issuer, Fault::Malformed);
                continue;
            };
            let root = *root;
            if !vote.proof.is_empty() {
                self.fault(round, &vote.issuer, Fault::Malformed);
                continue;
            }
            match proposals.entry(vote.issuer.clone()) {
                Entry::Occupied(entry) => {
                    if *entry.get() != root {
                        return Err(Error::Equivocation {
                            round,
                            leader: short_hex(vote.issuer.as_ref()),
                            first: short_hex(entry.get()),
                            second: short_hex(&root),
                        });
                    }
                    continue;
                }
                Entry::Vacant(entry) => {
                    debug!(round, leader = %vote.issuer, root = %short_hex(&root), "received proposal");
                    entry.insert(root);
                }
            }
            self.gossip_vote(vote).await;
        }
        let mut roots: Vec<Digest> = proposals.into_values().collect();
        roots.sort();
        Ok(roots)
    }

    /// Waits until the block of every leader can be reassembled.
    async fn collect_blocks(
        &mut self,
        round: Round,
        leaders: &[PublicKey],
        own: Vec<BlockChunk>,
    ) -> Result<(Vec<Block>, Vec<Digest>), Error> {
        let queue = self.demux.chunk_queue(round)?;
        let deadline = self.deadline();
        let mut receiver = BlockReceiver::new(round, leaders.len(), self.node.layout());
        for chunk in own {
            receiver.add_chunk(chunk)?;
        }
        while !receiver.received_all() {
            let chunk = Self::next(&queue, round, Phase::Block, deadline).await?;
            if !leaders.contains(&chunk.issuer) {
                self.fault(round, &chunk.issuer, Fault::NotLeader);
                continue;
            }
            if !chunk.verify_signature(&self.namespace) {
                self.fault(round, &chunk.issuer, Fault::InvalidSignature);
                continue;
            }
            if !chunk.verify_proof() {
                self.fault(round, &chunk.issuer, Fault::InvalidProof);
                continue;
            }
            match receiver.add_chunk(chunk.clone()) {
                Ok(true) => self.gossip_chunk(chunk).await,
                Ok(false) => {}
                Err(Error::InvalidChunk { reason, .. }) => {
                    debug!(round, reason, "invalid chunk");
                    self.fault(round, &chunk.issuer, Fault::Malformed);
                }
                Err(err) => return Err(err),
            }
        }
        receiver.blocks()
    }

    /// Broadcasts an `Echo` vote over `roots` and waits for a quorum of matching echoes.
    async fn collect_echoes(&mut self, round: Round, roots: &[Digest]) -> Result<Vec<Vote>, Error> {
        let echo = Vote::sign(
            &self.signer,
            &self.namespace,
            Tag::Echo,
            round,
            roots.to_vec(),
            AcceptProof::default(),
        );
        let mut echoes: BTreeMap<PublicKey, Vote> = BTreeMap::new();
        echoes.insert(self.public_key.clone(), echo.clone());
        self.broadcast(echo).await;

        let queue = self.demux.vote_queue(round, Tag::Echo)?;
        let deadline = self.deadline();
        let quorum = self.node.quorum();
        while echoes.len() < quorum {
            let vote = Self::next(&queue, round, Phase::Echo, deadline).await?;
            if !self.check_vote(round, &vote, roots) {
                continue;
            }
            if !vote.proof.is_empty() {
                self.fault(round, &vote.issuer, Fault::Malformed);
                continue;
            }
            if echoes.contains_key(&vote.issuer) {
                continue;
            }
            echoes.insert(vote.issuer.clone(), vote.clone());
            self.gossip_vote(vote).await;
        }
        Ok(echoes.into_values().collect())
    }

    /// Broadcasts an `Accept` vote certified by `echoes` and waits for a quorum of
    /// certified accepts.
    async fn collect_accepts(
        &mut self,
        round: Round,
        roots: &[Digest],
        echoes: Vec<Vote>,
    ) -> Result<(), Error> {
        let accept = Vote::sign(
            &self.signer,
            &self.namespace,
            Tag::Accept,
            round,
            roots.to_vec(),
            AcceptProof::new(echoes),
        );
        self.broadcast(accept).await;

        let queue = self.demux.vote_queue(round, Tag::Accept)?;
        let deadline = self.deadline();
        let quorum = self.node.quorum();
        let mut accepts: HashSet<PublicKey> = HashSet::new();
        accepts.insert(self.public_key.clone());
        while accepts.len() < quorum {
            let vote = Self::next(&queue, round, Phase::Accept, deadline).await?;
            if !self.check_vote(round, &vote, roots) {
                continue;
            }
            if !self.verify_certificate(round, &vote.proof, roots) {
                self.fault(round, &vote.issuer, Fault::InvalidCertificate);
                continue;
            }
            if !accepts.insert(vote.issuer.clone()) {
                continue;
            }
            self.gossip_vote(vote).await;
        }
        Ok(())
    }

    /// Returns true if `vote` is signed by a participant and references `roots`, reporting
    /// a fault otherwise.
    fn check_vote(&mut self, round: Round, vote: &Vote, roots: &[Digest]) -> bool {
        if self.participants.binary_search(&vote.issuer).is_err() {
            self.fault(round, &vote.issuer, Fault::NotParticipant);
            return false;
        }
        if !vote.verify(&self.namespace) {
            self.fault(round, &vote.issuer, Fault::InvalidSignature);
            return false;
        }
        if vote.block_hashes != roots {
            self.fault(round, &vote.issuer, Fault::Mismatch);
            return false;
        }
        true
    }

    /// Returns true if `proof` holds a quorum of valid echoes over `roots` from distinct
    /// participants.
    fn verify_certificate(&self, round: Round, proof: &AcceptProof, roots: &[Digest]) -> bool {
        if proof.echo_votes.len() < self.node.quorum() {
            return false;
        }
        let mut signers = HashSet::with_capacity(proof.echo_votes.len());
        proof.echo_votes.iter().all(|echo| {
            echo.tag == Tag::Echo
                && echo.round == round
                && echo.block_hashes == roots
                && echo.proof.is_empty()
                && self.participants.binary_search(&echo.issuer).is_ok()
                && signers.insert(&echo.issuer)
                && echo.verify(&self.namespace)
        })
    }

    /// Sends a locally created vote to peers (it is counted locally without being enqueued).
    async fn broadcast(&mut self, vote: Vote) {
        self.relay.forward_vote(vote).await;
    }

    /// Forwards a valid vote received from another participant.
    async fn gossip_vote(&mut self, vote: Vote) {
        if vote.issuer != self.public_key {
            self.relay.forward_vote(vote).await;
        }
    }

    /// Forwards a valid chunk received from another participant.
    async fn gossip_chunk(&mut self, chunk: BlockChunk) {
        if chunk.issuer != self.public_key {
            self.relay.forward_chunk(chunk).await;
        }
    }

    fn deadline(&self) -> Option<Instant> {
        self.phase_timeout.map(|timeout| Instant::now() + timeout)
    }

    async fn next<T>(
        queue: &Queue<T>,
        round: Round,
        phase: Phase,
        deadline: Option<Instant>,
    ) -> Result<T, Error> {
        let item = match deadline {
            Some(deadline) => timeout_at(deadline, queue.recv())
                .await
                .map_err(|_| Error::Timeout { round, phase })?,
            None => queue.recv().await,
        };
        item.ok_or(Error::Closed(round))
    }

    fn fault(&mut self, round: Round, issuer: &PublicKey, fault: Fault) {
        warn!(round, %issuer, fault = fault.as_str(), "dropping message");
        self.reporter.report(Activity::Fault {
            round,
            issuer: issuer.clone(),
            fault,
        });
    }

    fn phase(&mut self, round: Round, phase: Phase, start: Instant) {
        let elapsed = start.elapsed();
        info!(
            round,
            node = %self.public_key,
            %phase,
            elapsed_ms = elapsed.as_millis() as u64,
            "stats"
        );
        self.reporter.report(Activity::Phase {
            round,
            phase,
            elapsed,
        });
    }
}

fn join(roots: &[Digest]) -> String {
    roots
        .iter()
        .map(|root| short_hex(root))
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        election::Shuffle,
        mocks::{Collector, Network, Relay as MockRelay},
    };
    use bytes::Bytes;
    use rapidchain_cryptography::{hash, PrivateKeyExt};

    const NAMESPACE: &[u8] = b"_ENGINE";

    fn node() -> NodeConfig {
        NodeConfig {
            node_count: 4,
            gossip_fanout: 3,
            leader_count: 1,
            block_size: 64,
            block_chunk_count: 4,
            erasure: None,
        }
    }

    fn config(
        seed: u64,
        participants: Vec<PublicKey>,
        node: NodeConfig,
    ) -> Config<Shuffle, MockRelay, Collector> {
        let signer = PrivateKey::from_seed(seed);
        let public_key = signer.public_key();
        Config {
            signer,
            participants: participants.clone(),
            node,
            namespace: NAMESPACE.to_vec(),
            demux: Arc::new(Demultiplexer::default()),
            relay: MockRelay::new(public_key, participants, Network::default()),
            reporter: Collector::default(),
            elector: Shuffle,
            phase_timeout: None,
        }
    }

    fn participants() -> Vec<PublicKey> {
        (0..4)
            .map(|seed| PrivateKey::from_seed(seed).public_key())
            .collect()
    }

    #[test]
    fn test_new() {
        let participants = participants();
        let engine = Engine::new(config(0, participants.clone(), node())).unwrap();
        assert_eq!(engine.leaders(1).len(), 1);

        // Exactly one participant leads each round.
        let leaders = participants
            .iter()
            .enumerate()
            .filter(|(seed, _)| {
                Engine::new(config(*seed as u64, participants.clone(), node()))
                    .unwrap()
                    .is_leader(1)
            })
            .count();
        assert_eq!(leaders, 1);
    }

    #[test]
    fn test_new_invalid() {
        let participants = participants();
        assert!(matches!(
            Engine::new(config(9, participants.clone(), node())),
            Err(Error::InvalidConfig("signer is not a participant"))
        ));
        assert!(matches!(
            Engine::new(config(0, participants[..3].to_vec(), node())),
            Err(Error::InvalidConfig(_))
        ));
        let mut invalid = node();
        invalid.leader_count = 0;
        assert!(matches!(
            Engine::new(config(0, participants, invalid)),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[tokio::test]
    async fn test_propose_requires_leadership() {
        let participants = participants();
        let follower = participants
            .iter()
            .enumerate()
            .map(|(seed, _)| Engine::new(config(seed as u64, participants.clone(), node())).unwrap())
            .find(|engine| !engine.is_leader(1))
            .unwrap();
        let mut follower = follower;
        let block = Block::new(
            bytes::Bytes::from_static(b"node"),
            bytes::Bytes::new(),
            1,
            bytes::Bytes::new(),
        );
        assert!(matches!(
            follower.propose(1, block.clone(), &[]).await,
            Err(Error::InvalidProposal { round: 1, reason: "not a leader" })
        ));
        assert!(matches!(
            follower.propose(2, block, &[]).await,
            Err(Error::InvalidProposal { round: 2, .. })
        ));
    }

    #[tokio::test]
    async fn test_round_must_advance() {
        let mut engine = Engine::new(config(0, participants(), node())).unwrap();
        assert!(matches!(
            engine.decide(2, &[]).await,
            Err(Error::InvalidRoundTransition { current: 0, round: 2 })
        ));
    }

    #[tokio::test]
    async fn test_timeout() {
        let mut config = config(0, participants(), node());
        config.phase_timeout = Some(Duration::from_millis(50));
        let collector = config.reporter.clone();
        let mut engine = Engine::new(config).unwrap();

        // No leader ever proposes.
        assert!(matches!(
            engine.decide(1, &[]).await,
            Err(Error::Timeout { round: 1, phase: Phase::Propose })
        ));
        assert!(collector.decided().is_empty());
    }

    fn signer(seed: u64) -> PrivateKey {
        PrivateKey::from_seed(seed)
    }

    fn leader_block(leader: &PrivateKey) -> Block {
        Block::new(
            Bytes::from(leader.public_key().to_string()),
            Bytes::new(),
            1,
            Bytes::from(vec![3u8; 64]),
        )
    }

    /// Enqueues the proposal and signed chunks of `leader` for round 1.
    async fn deliver_block(demux: &Demultiplexer, leader: &PrivateKey) -> Digest {
        let (mut chunks, root) = chunk(&leader.public_key(), &leader_block(leader), 4).unwrap();
        for chunk in &mut chunks {
            chunk.sign(leader, NAMESPACE);
        }
        let proposal = Vote::sign(
            leader,
            NAMESPACE,
            Tag::Propose,
            1,
            vec![root],
            AcceptProof::default(),
        );
        demux.enqueue_vote(proposal).await;
        for chunk in chunks {
            demux.enqueue_chunk(chunk).await;
        }
        root
    }

    fn echo(seed: u64, root: Digest) -> Vote {
        Vote::sign(
            &signer(seed),
            NAMESPACE,
            Tag::Echo,
            1,
            vec![root],
            AcceptProof::default(),
        )
    }

    fn accept(seed: u64, root: Digest, echoes: Vec<Vote>) -> Vote {
        Vote::sign(
            &signer(seed),
            NAMESPACE,
            Tag::Accept,
            1,
            vec![root],
            AcceptProof::new(echoes),
        )
    }

    /// Swaps the issuer of `vote`, invalidating its signature.
    fn forged(mut vote: Vote, seed: u64) -> Vote {
        vote.issuer = signer(seed).public_key();
        vote
    }

    struct Follower {
        engine: Engine<Shuffle, MockRelay, Collector>,
        demux: Arc<Demultiplexer>,
        collector: Collector,
        leader: u64,
        others: Vec<u64>,
    }

    /// Returns an engine that does not lead round 1 (of 4 participants, quorum 3).
    fn follower() -> Follower {
        let participants = participants();
        let leader = (0..4)
            .find(|seed| {
                Engine::new(config(*seed, participants.clone(), node()))
                    .unwrap()
                    .is_leader(1)
            })
            .unwrap();
        let me = (leader + 1) % 4;
        let mut config = config(me, participants, node());
        config.phase_timeout = Some(Duration::from_millis(300));
        let demux = config.demux.clone();
        let collector = config.reporter.clone();
        Follower {
            engine: Engine::new(config).unwrap(),
            demux,
            collector,
            leader,
            others: (0..4).filter(|seed| *seed != me).collect(),
        }
    }

    fn faults(collector: &Collector) -> Vec<Fault> {
        collector
            .faults()
            .into_iter()
            .map(|(_, _, fault)| fault)
            .collect()
    }

    #[tokio::test]
    async fn test_propose_with_full_chunk_queue() {
        let node = NodeConfig {
            node_count: 3,
            gossip_fanout: 2,
            leader_count: 3,
            block_size: 64,
            block_chunk_count: 4,
            erasure: None,
        };
        let participants: Vec<PublicKey> = (0..3).map(|seed| signer(seed).public_key()).collect();
        let mut config = config(0, participants, node);
        config.demux = Arc::new(Demultiplexer::new(4));
        config.phase_timeout = Some(Duration::from_millis(200));
        let demux = config.demux.clone();
        let mut engine = Engine::new(config).unwrap();
        assert!(engine.is_leader(1));

        // Another leader's chunks fill the queue before this leader proposes
        let other = signer(1);
        let (mut chunks, _) = chunk(&other.public_key(), &leader_block(&other), 4).unwrap();
        for chunk in &mut chunks {
            chunk.sign(&other, NAMESPACE);
            demux.enqueue_chunk(chunk.clone()).await;
        }
        assert_eq!(demux.chunk_queue(1).unwrap().len(), 4);

        let result = tokio::time::timeout(
            Duration::from_secs(5),
            engine.propose(1, leader_block(&signer(0)), &[]),
        )
        .await
        .expect("propose must not wait on its own queue");
        assert!(matches!(
            result,
            Err(Error::Timeout { round: 1, phase: Phase::Propose })
        ));
    }

    #[tokio::test]
    async fn test_single_participant_with_small_queue() {
        let node = NodeConfig {
            node_count: 1,
            gossip_fanout: 0,
            leader_count: 1,
            block_size: 64,
            block_chunk_count: 4,
            erasure: None,
        };
        let mut config = config(0, vec![signer(0).public_key()], node);
        config.demux = Arc::new(Demultiplexer::new(1));
        let mut engine = Engine::new(config).unwrap();
        let block = leader_block(&signer(0));
        let decided = tokio::time::timeout(
            Duration::from_secs(5),
            engine.propose(1, block.clone(), &[]),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(decided, vec![block]);
    }

    #[tokio::test]
    async fn test_echo_quorum_ignores_invalid_votes() {
        let Follower {
            mut engine,
            demux,
            collector,
            leader,
            others,
        } = follower();
        let root = deliver_block(&demux, &signer(leader)).await;

        // Over another root
        let mismatched = Vote::sign(
            &signer(others[0]),
            NAMESPACE,
            Tag::Echo,
            1,
            vec![hash(b"other")],
            AcceptProof::default(),
        );
        demux.enqueue_vote(mismatched).await;
        demux.enqueue_vote(forged(echo(9, root), others[1])).await;
        demux.enqueue_vote(echo(9, root)).await;

        // With our own, one short of quorum
        demux.enqueue_vote(echo(others[2], root)).await;

        assert!(matches!(
            engine.decide(1, &[]).await,
            Err(Error::Timeout { round: 1, phase: Phase::Echo })
        ));
        let faults = faults(&collector);
        assert!(faults.contains(&Fault::Mismatch));
        assert!(faults.contains(&Fault::InvalidSignature));
        assert!(faults.contains(&Fault::NotParticipant));
        assert!(collector.decided().is_empty());
    }

    /// Runs round 1 on a follower that receives an echo quorum, a set of invalid
    /// accepts, and `valid` accepts from other participants.
    async fn accepts(valid: usize) -> (Result<Vec<Block>, Error>, Collector) {
        let Follower {
            mut engine,
            demux,
            collector,
            leader,
            others,
        } = follower();
        let root = deliver_block(&demux, &signer(leader)).await;
        demux.enqueue_vote(echo(others[0], root)).await;
        demux.enqueue_vote(echo(others[1], root)).await;

        let certificate: Vec<Vote> = others.iter().map(|seed| echo(*seed, root)).collect();
        let short = accept(others[0], root, certificate[..2].to_vec());
        let repeated = accept(others[1], root, vec![certificate[0].clone(); 3]);
        let mut with_forgery = certificate.clone();
        with_forgery[2] = forged(echo(9, root), others[2]);
        let with_forgery = accept(others[2], root, with_forgery);
        let outsider = accept(9, root, certificate.clone());
        let unsigned = forged(accept(9, root, certificate.clone()), others[0]);
        for vote in [short, repeated, with_forgery, outsider, unsigned] {
            demux.enqueue_vote(vote).await;
        }
        for seed in others.iter().take(valid) {
            demux.enqueue_vote(accept(*seed, root, certificate.clone())).await;
        }

        let result = engine.decide(1, &[]).await;
        (result, collector)
    }

    #[tokio::test]
    async fn test_accept_quorum_ignores_invalid_certificates() {
        // With our own, one short of quorum
        let (result, collector) = accepts(1).await;
        assert!(matches!(
            result,
            Err(Error::Timeout { round: 1, phase: Phase::Accept })
        ));
        let faults = faults(&collector);
        assert_eq!(
            faults
                .iter()
                .filter(|fault| **fault == Fault::InvalidCertificate)
                .count(),
            3
        );
        assert!(faults.contains(&Fault::NotParticipant));
        assert!(faults.contains(&Fault::InvalidSignature));
        assert!(collector.decided().is_empty());
    }

    #[tokio::test]
    async fn test_accept_quorum_reached() {
        let (result, collector) = accepts(2).await;
        let blocks = result.unwrap();
        assert_eq!(blocks.len(), 1);
        assert_eq!(collector.decided().len(), 1);
        assert!(faults(&collector).contains(&Fault::InvalidCertificate));
    }
}
