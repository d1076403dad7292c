//! Prometheus metrics recorded from engine activity.

use prometheus_client::{
    encoding::{text::encode, EncodeLabelSet},
    metrics::{counter::Counter, family::Family, histogram::Histogram},
    registry::Registry,
};
use rapidchain_consensus::{
    types::{Activity, Phase},
    Reporter,
};
use std::sync::{Arc, Mutex};

/// Buckets (in seconds) of the phase duration histograms.
const PHASE_BUCKETS: [f64; 12] = [
    0.001, 0.002, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0,
];

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct PhaseLabel {
    pub phase: String,
}

impl PhaseLabel {
    pub fn new(phase: Phase) -> Self {
        Self {
            phase: phase.as_str().to_string(),
        }
    }
}

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct FaultLabel {
    pub fault: String,
}

fn phase_histogram() -> Histogram {
    Histogram::new(PHASE_BUCKETS.into_iter())
}

/// [Reporter] that records activity into a shared [Registry].
///
/// Clones share the same metrics, so every participant of a simulation can hold one.
#[derive(Clone)]
pub struct Metrics {
    registry: Arc<Mutex<Registry>>,

    /// Time from the start of a round until the end of each phase
    pub phase_duration: Family<PhaseLabel, Histogram, fn() -> Histogram>,
    /// Number of faults observed by kind
    pub faults: Family<FaultLabel, Counter>,
    /// Number of rounds decided (summed over participants)
    pub decided: Counter,
    /// Number of blocks decided (summed over participants)
    pub blocks: Counter,
}

impl Metrics {
    /// Creates and registers a new set of metrics.
    pub fn init() -> Self {
        let mut registry = Registry::with_prefix("rapidchain");
        let phase_duration: Family<PhaseLabel, Histogram, fn() -> Histogram> =
            Family::new_with_constructor(phase_histogram);
        registry.register(
            "phase_duration",
            "Time from the start of a round until the end of each phase",
            phase_duration.clone(),
        );
        let faults = Family::<FaultLabel, Counter>::default();
        registry.register(
            "faults",
            "Number of faults observed by kind",
            faults.clone(),
        );
        let decided = Counter::default();
        registry.register("decided", "Number of rounds decided", decided.clone());
        let blocks = Counter::default();
        registry.register("blocks", "Number of blocks decided", blocks.clone());

        Self {
            registry: Arc::new(Mutex::new(registry)),
            phase_duration,
            faults,
            decided,
            blocks,
        }
    }

    /// Encodes the registry in the Prometheus text format.
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        let registry = self.registry.lock().unwrap();
        if encode(&mut buffer, &registry).is_err() {
            buffer.clear();
        }
        buffer
    }
}

impl Reporter for Metrics {
    type Activity = Activity;

    fn report(&mut self, activity: Activity) {
        match activity {
            Activity::Phase { phase, elapsed, .. } => {
                self.phase_duration
                    .get_or_create(&PhaseLabel::new(phase))
                    .observe(elapsed.as_secs_f64());
            }
            Activity::Fault { fault, .. } => {
                self.faults
                    .get_or_create(&FaultLabel {
                        fault: fault.as_str().to_string(),
                    })
                    .inc();
            }
            Activity::Decided { roots, .. } => {
                self.decided.inc();
                self.blocks.inc_by(roots.len() as u64);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rapidchain_consensus::types::Fault;
    use rapidchain_cryptography::{ed25519::PrivateKey, PrivateKeyExt, Signer};
    use std::time::Duration;

    #[test]
    fn test_report() {
        let metrics = Metrics::init();
        let mut reporter = metrics.clone();
        reporter.report(Activity::Phase {
            round: 1,
            phase: Phase::Echo,
            elapsed: Duration::from_millis(3),
        });
        reporter.report(Activity::Fault {
            round: 1,
            issuer: PrivateKey::from_seed(0).public_key(),
            fault: Fault::InvalidSignature,
        });
        reporter.report(Activity::Decided {
            round: 1,
            roots: Vec::new(),
        });

        assert_eq!(metrics.decided.get(), 1);
        assert_eq!(metrics.blocks.get(), 0);
        let encoded = metrics.encode();
        assert!(encoded.contains("rapidchain_phase_duration"));
        assert!(encoded.contains(&format!("phase=\"{}\"", Phase::Echo.as_str())));
        assert!(encoded.contains(&format!(
            "fault=\"{}\"",
            Fault::InvalidSignature.as_str()
        )));
        assert!(encoded.contains("rapidchain_decided_total 1"));
    }
}
