//! Drive a set of in-memory participants through consecutive rounds.

use crate::{metrics::Metrics, Config, Error};
use bytes::Bytes;
use rand::{rngs::StdRng, seq::SliceRandom, RngCore, SeedableRng};
use rapidchain_consensus::{
    demux::Demultiplexer,
    election::Shuffle,
    mocks::{Network, Relay},
    types::{digest_blocks, Block, Round},
    Engine,
};
use rapidchain_cryptography::{
    ed25519::{PrivateKey, PublicKey},
    PrivateKeyExt, Signer,
};
use rapidchain_utils::short_hex;
use std::{sync::Arc, time::Instant};
use tracing::{debug, info};

type SimulatedEngine = Engine<Shuffle, Relay, Metrics>;

/// Returns the block every chain starts from.
pub fn genesis() -> Block {
    Block::new(
        Bytes::from_static(b"initial block"),
        Bytes::new(),
        0,
        Bytes::from_static(b"hello world"),
    )
}

/// Creates a block of random payload sized so that all leaders of a round together
/// propose about `block_size` bytes.
pub fn create_block(
    rng: &mut impl RngCore,
    block_size: usize,
    leader_count: u32,
    issuer: &PublicKey,
    round: Round,
    prev_hash: &Bytes,
) -> Block {
    let mut payload = vec![0u8; block_size.div_ceil(leader_count.max(1) as usize)];
    rng.fill_bytes(&mut payload);
    Block::new(
        Bytes::from(issuer.to_string()),
        prev_hash.clone(),
        round,
        Bytes::from(payload),
    )
}

/// Selects `fanout` distinct gossip peers for `participants[index]`.
///
/// The next participant (wrapping) is always selected so that the gossip graph is
/// strongly connected. The remaining peers are drawn at random.
pub fn gossip_peers(
    rng: &mut impl RngCore,
    participants: &[PublicKey],
    index: usize,
    fanout: usize,
) -> Vec<PublicKey> {
    let n = participants.len();
    if n <= 1 || fanout == 0 {
        return Vec::new();
    }
    let next = (index + 1) % n;
    let mut peers = vec![participants[next].clone()];
    let others: Vec<&PublicKey> = participants
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != index && *i != next)
        .map(|(_, peer)| peer)
        .collect();
    peers.extend(
        others
            .choose_multiple(rng, fanout.min(n - 1) - 1)
            .map(|peer| (*peer).clone()),
    );
    peers
}

/// Checks that every round of `chain` extends the one before it (starting from `genesis`).
pub fn verify_chain(genesis: &Block, chain: &[Vec<Block>]) -> Result<(), Error> {
    let mut prev = digest_blocks(std::slice::from_ref(genesis));
    for (i, blocks) in chain.iter().enumerate() {
        let round = i as Round + 1;
        if blocks.is_empty() {
            return Err(Error::BrokenChain {
                round,
                reason: "no blocks",
            });
        }
        for block in blocks {
            if block.round != round {
                return Err(Error::BrokenChain {
                    round,
                    reason: "block from another round",
                });
            }
            if block.prev_block_hash.as_ref() != &prev[..] {
                return Err(Error::BrokenChain {
                    round,
                    reason: "block does not extend previous round",
                });
            }
        }
        prev = digest_blocks(blocks);
    }
    Ok(())
}

/// A simulation of `node_count` participants connected by an in-memory network.
pub struct Simulation {
    config: Config,
    rng: StdRng,
    engines: Vec<SimulatedEngine>,
}

impl Simulation {
    /// Creates every participant and its gossip peers.
    pub fn new(config: Config, metrics: Metrics) -> Result<Self, Error> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let signers: Vec<PrivateKey> = (0..config.node.node_count)
            .map(|_| PrivateKey::from_rng(&mut rng))
            .collect();
        let participants: Vec<PublicKey> =
            signers.iter().map(|signer| signer.public_key()).collect();

        let network = Network::default();
        let mut engines = Vec::with_capacity(signers.len());
        for (index, signer) in signers.into_iter().enumerate() {
            let public_key = signer.public_key();
            let demux = Arc::new(Demultiplexer::new(config.queue_capacity));
            network.register(public_key.clone(), demux.clone());
            let peers = gossip_peers(
                &mut rng,
                &participants,
                index,
                config.node.gossip_fanout as usize,
            );
            debug!(
                participant = %public_key,
                peers = peers.len(),
                "selected gossip peers"
            );
            let relay = Relay::new(public_key, peers, network.clone());
            engines.push(Engine::new(rapidchain_consensus::Config {
                signer,
                participants: participants.clone(),
                node: config.node.clone(),
                namespace: config.namespace.as_bytes().to_vec(),
                demux,
                relay,
                reporter: metrics.clone(),
                elector: Shuffle,
                phase_timeout: config.phase_timeout(),
            })?);
        }
        Ok(Self {
            config,
            rng,
            engines,
        })
    }

    /// Runs every configured round and returns the blocks decided in each.
    pub async fn run(mut self) -> Result<Vec<Vec<Block>>, Error> {
        let genesis = genesis();
        let mut prev = Bytes::copy_from_slice(&digest_blocks(std::slice::from_ref(&genesis)));
        let mut chain = Vec::with_capacity(self.config.rounds as usize);
        for round in 1..=self.config.rounds {
            let start = Instant::now();
            let decided = self.round(round, &prev).await?;
            prev = Bytes::copy_from_slice(&digest_blocks(&decided));
            info!(
                round,
                blocks = decided.len(),
                hash = %short_hex(&prev),
                elapsed = ?start.elapsed(),
                "decided round"
            );
            chain.push(decided);
        }
        verify_chain(&genesis, &chain)?;
        Ok(chain)
    }

    async fn round(&mut self, round: Round, prev: &Bytes) -> Result<Vec<Block>, Error> {
        let node = &self.config.node;
        let mut handles = Vec::with_capacity(self.engines.len());
        for mut engine in self.engines.drain(..) {
            let block = engine.is_leader(round).then(|| {
                create_block(
                    &mut self.rng,
                    node.block_size,
                    node.leader_count,
                    engine.public_key(),
                    round,
                    prev,
                )
            });
            let prev = prev.clone();
            handles.push(tokio::spawn(async move {
                let result = match block {
                    Some(block) => engine.propose(round, block, &prev).await,
                    None => engine.decide(round, &prev).await,
                };
                (engine, result)
            }));
        }

        let mut decided: Option<Vec<Block>> = None;
        let mut failure = None;
        for handle in handles {
            let (engine, result) = handle.await?;
            self.engines.push(engine);
            match result {
                Ok(blocks) => match &decided {
                    None => decided = Some(blocks),
                    Some(expected) if *expected != blocks => {
                        failure.get_or_insert(Error::Diverged(round));
                    }
                    Some(_) => {}
                },
                Err(err) => {
                    failure.get_or_insert(err.into());
                }
            }
        }
        if let Some(err) = failure {
            return Err(err);
        }
        decided.ok_or(Error::Diverged(round))
    }
}
