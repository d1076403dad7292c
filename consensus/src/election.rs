//! Select the leaders of a round.

use crate::types::Round;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};
use rapidchain_cryptography::ed25519::PublicKey;

/// Deterministically selects the leaders of a round.
///
/// Every participant must compute the same leaders from the same inputs.
pub trait Elector: Clone + Send + Sync + 'static {
    /// Returns `count` distinct leaders of `round` chosen among `participants`
    /// (sorted and deduplicated).
    fn leaders(&self, round: Round, participants: &[PublicKey], count: usize) -> Vec<PublicKey>;
}

/// Shuffles the participants with an RNG seeded by the round and takes the first `count`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Shuffle;

impl Elector for Shuffle {
    fn leaders(&self, round: Round, participants: &[PublicKey], count: usize) -> Vec<PublicKey> {
        let mut rng = StdRng::seed_from_u64(round);
        let mut shuffled = participants.to_vec();
        shuffled.shuffle(&mut rng);
        shuffled.truncate(count);
        shuffled
    }
}

/// Rotates through the participants, starting at `round mod n`.
#[derive(Clone, Copy, Debug, Default)]
pub struct RoundRobin;

impl Elector for RoundRobin {
    fn leaders(&self, round: Round, participants: &[PublicKey], count: usize) -> Vec<PublicKey> {
        if participants.is_empty() {
            return Vec::new();
        }
        let start = (round % participants.len() as u64) as usize;
        participants
            .iter()
            .cycle()
            .skip(start)
            .take(count.min(participants.len()))
            .cloned()
            .collect()
    }
}
