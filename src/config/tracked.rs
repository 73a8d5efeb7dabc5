use serde::{Deserialize, Serialize};

/// One `[[repositories]]` entry.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct TrackedRepository {
    pub owner: String,
    pub name: String,
    #[serde(default)]
    pub topics: Vec<String>,
}

impl TrackedRepository {
    pub fn full_name(&self) -> String {
        format!("{}/{}", self.owner, self.name)
    }
}

/// Topic search settings used by `Registrar::discover`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscoveryConfig {
    /// TOML: `discovery.topics`. Default: empty (discovery disabled).
    #[serde(default)]
    pub topics: Vec<String>,

    /// TOML: `discovery.star_threshold`. Default: `1000`.
    #[serde(default = "default_star_threshold")]
    pub star_threshold: u64,

    /// TOML: `discovery.new_limit_per_topic`. Default: `50`.
    #[serde(default = "default_new_limit_per_topic")]
    pub new_limit_per_topic: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            topics: Vec::new(),
            star_threshold: default_star_threshold(),
            new_limit_per_topic: default_new_limit_per_topic(),
        }
    }
}

fn default_star_threshold() -> u64 {
    1_000
}

fn default_new_limit_per_topic() -> usize {
    50
}
