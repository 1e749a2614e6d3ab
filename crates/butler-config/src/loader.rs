use std::path::Path;

use crate::Config;

/// Highest sampling temperature accepted by the page-side capability
const MAX_TEMPERATURE: f64 = 2.0;

impl Config {
    /// Load configuration from a TOML file
    ///
    /// Reads the file, expands `{{ env.VAR }}` placeholders, then
    /// deserializes and validates the result.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, environment variable
    /// expansion fails, TOML parsing fails, or validation fails
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

        let config = Self::parse(&raw)?;
        tracing::debug!(path = %path.display(), "loaded bridge configuration");

        Ok(config)
    }

    /// Load from `path` when it exists, otherwise fall back to defaults
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be loaded
    pub fn load_or_default(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Ok(Self::default())
        }
    }

    /// Parse configuration from TOML text
    ///
    /// # Errors
    ///
    /// Returns an error if expansion, parsing or validation fails
    pub fn parse(raw: &str) -> anyhow::Result<Self> {
        let expanded =
            crate::env::expand_env(raw).map_err(|e| anyhow::anyhow!("config variable expansion failed: {e}"))?;

        let config: Self = toml::from_str(&expanded).map_err(|e| anyhow::anyhow!("failed to parse config: {e}"))?;

        config.validate()?;

        Ok(config)
    }

    /// Validate that the configuration is internally consistent
    ///
    /// # Errors
    ///
    /// Returns an error if a timeout, temperature, sampling or telemetry value
    /// is out of range
    pub fn validate(&self) -> anyhow::Result<()> {
        self.validate_requester()?;
        self.validate_responder()?;
        self.validate_telemetry()?;
        Ok(())
    }

    fn validate_requester(&self) -> anyhow::Result<()> {
        if self.requester.request_timeout.is_zero() {
            anyhow::bail!("requester.request_timeout must be greater than 0");
        }

        if !(0.0..=MAX_TEMPERATURE).contains(&self.requester.temperature) {
            anyhow::bail!(
                "requester.temperature must be between 0.0 and {MAX_TEMPERATURE}, got {}",
                self.requester.temperature
            );
        }

        Ok(())
    }

    fn validate_responder(&self) -> anyhow::Result<()> {
        if self.responder.top_k == 0 {
            anyhow::bail!("responder.top_k must be greater than 0");
        }

        if self.responder.version.trim().is_empty() {
            anyhow::bail!("responder.version must not be empty");
        }

        Ok(())
    }

    fn validate_telemetry(&self) -> anyhow::Result<()> {
        let Some(ref telemetry) = self.telemetry else {
            return Ok(());
        };

        if !(0.0..=1.0).contains(&telemetry.sampling_rate) {
            anyhow::bail!("telemetry.sampling_rate must be between 0.0 and 1.0");
        }

        Ok(())
    }
}
