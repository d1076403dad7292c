use crate::Error;
use rapidchain_consensus::NodeConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default capacity of every per-round inbound queue.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Default namespace of every signature produced during a simulation.
pub const DEFAULT_NAMESPACE: &str = "_RAPIDCHAIN";

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

/// Configuration of a simulation run, loaded from YAML.
///
/// ```yaml
/// rounds: 10
/// seed: 0
/// phase_timeout_ms: 10000
/// node:
///   node_count: 16
///   gossip_fanout: 4
///   leader_count: 4
///   block_size: 65536
///   block_chunk_count: 16
///   erasure:
///     data_chunks: 4
///     parity_chunks: 2
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Number of rounds to run (after genesis).
    pub rounds: u64,

    /// Seed for keys, gossip peers, and payloads.
    #[serde(default)]
    pub seed: u64,

    /// Parameters shared by every participant.
    pub node: NodeConfig,

    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Waits for each phase forever when unset.
    #[serde(default)]
    pub phase_timeout_ms: Option<u64>,

    #[serde(default = "default_namespace")]
    pub namespace: String,
}

impl Config {
    /// Parses a YAML configuration.
    pub fn from_yaml(yaml: &str) -> Result<Self, Error> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Returns an error if the simulation cannot be run.
    pub fn validate(&self) -> Result<(), Error> {
        self.node.validate()?;
        if self.rounds == 0 {
            return Err(Error::InvalidConfig("rounds must be at least 1"));
        }
        if self.node.node_count > 1 && self.node.gossip_fanout >= self.node.node_count {
            return Err(Error::InvalidConfig(
                "gossip_fanout must be less than node_count",
            ));
        }

        // Chunks of every leader may arrive before the first one is consumed
        let chunks = self
            .node
            .total_chunks()
            .and_then(|total| total.checked_mul(self.node.leader_count))
            .ok_or(Error::InvalidConfig("too many chunks"))?;
        if self.queue_capacity < chunks as usize {
            return Err(Error::InvalidConfig(
                "queue_capacity must hold every chunk of a round",
            ));
        }
        Ok(())
    }

    pub fn phase_timeout(&self) -> Option<Duration> {
        self.phase_timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rapidchain_consensus::config::Erasure;

    const YAML: &str = r#"
rounds: 3
seed: 7
phase_timeout_ms: 500
node:
  node_count: 8
  gossip_fanout: 3
  leader_count: 2
  block_size: 4096
  block_chunk_count: 8
  erasure:
    data_chunks: 4
    parity_chunks: 2
"#;

    #[test]
    fn test_parse() {
        let config = Config::from_yaml(YAML).unwrap();
        config.validate().unwrap();
        assert_eq!(config.rounds, 3);
        assert_eq!(config.seed, 7);
        assert_eq!(config.queue_capacity, DEFAULT_QUEUE_CAPACITY);
        assert_eq!(config.namespace, DEFAULT_NAMESPACE);
        assert_eq!(config.phase_timeout(), Some(Duration::from_millis(500)));
        assert_eq!(
            config.node.erasure,
            Some(Erasure {
                data_chunks: 4,
                parity_chunks: 2
            })
        );
        assert_eq!(config.node.total_chunks(), Some(12));
    }

    #[test]
    fn test_missing_field() {
        assert!(matches!(
            Config::from_yaml("rounds: 1"),
            Err(Error::Yaml(_))
        ));
    }

    #[test]
    fn test_invalid() {
        let mut config = Config::from_yaml(YAML).unwrap();
        config.rounds = 0;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        let mut config = Config::from_yaml(YAML).unwrap();
        config.node.gossip_fanout = 8;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));

        // 2 leaders with 12 chunks each
        let mut config = Config::from_yaml(YAML).unwrap();
        config.queue_capacity = 23;
        assert!(matches!(config.validate(), Err(Error::InvalidConfig(_))));
        config.queue_capacity = 24;
        config.validate().unwrap();

        let mut config = Config::from_yaml(YAML).unwrap();
        config.node.leader_count = 9;
        assert!(matches!(config.validate(), Err(Error::Consensus(_))));
    }
}
