use serde::Deserialize;

/// Sampling breadth used for every capability session
pub const DEFAULT_TOP_K: u32 = 40;

/// Version announced in the ready event
pub const DEFAULT_BRIDGE_VERSION: &str = "1.0.0";

/// Page-side responder settings
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResponderConfig {
    /// Top-k sampling passed to every session
    #[serde(default = "default_top_k")]
    pub top_k: u32,
    /// Version string carried by the ready announcement
    #[serde(default = "default_version")]
    pub version: String,
}

impl Default for ResponderConfig {
    fn default() -> Self {
        Self {
            top_k: DEFAULT_TOP_K,
            version: default_version(),
        }
    }
}

const fn default_top_k() -> u32 {
    DEFAULT_TOP_K
}

fn default_version() -> String {
    DEFAULT_BRIDGE_VERSION.to_owned()
}
