//! Replica configuration
//!
//! Loaded from TOML or built in code. Every field has a default, so an empty
//! document is a valid configuration.

use crate::errors::{Result, SyncError};
use crate::token::{RandomTokenSource, SeededTokenSource, SequentialTokenSource, TokenSource};
use crate::wire::WireFormat;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How a replica mints mutation tokens
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenStrategy {
    /// Uniform random 64-bit tokens
    #[default]
    Random,
    /// Replica id prefix plus a per-replica counter
    Sequential,
    /// Deterministic stream from `seed`
    Seeded,
}

/// Configuration for a replica map and its transport session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncMapConfig {
    /// Token generation strategy
    pub tokens: TokenStrategy,
    /// Replica id for `Sequential` tokens; random when unset
    pub replica_id: Option<u16>,
    /// Seed for `Seeded` tokens
    pub seed: Option<u64>,
    /// Encoding for transport frames
    pub wire_format: WireFormat,
    /// Capacity of the inbound frame channel
    pub inbound_buffer: usize,
}

impl Default for SyncMapConfig {
    fn default() -> Self {
        Self {
            tokens: TokenStrategy::Random,
            replica_id: None,
            seed: None,
            wire_format: WireFormat::Json,
            inbound_buffer: 256,
        }
    }
}

impl SyncMapConfig {
    /// Deterministic configuration for tests and simulation
    pub fn for_testing(seed: u64) -> Self {
        Self {
            tokens: TokenStrategy::Seeded,
            seed: Some(seed),
            ..Self::default()
        }
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| SyncError::config(format!("Failed to read config file: {e}")))?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), tokens = ?config.tokens, "Loaded replica config");
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.inbound_buffer == 0 {
            tracing::warn!("Rejecting config: inbound_buffer is zero");
            return Err(SyncError::config("inbound_buffer must be greater than zero"));
        }
        if self.tokens == TokenStrategy::Seeded && self.seed.is_none() {
            tracing::warn!("Rejecting config: seeded token strategy without a seed");
            return Err(SyncError::config("seeded token strategy requires a seed"));
        }
        if self.tokens != TokenStrategy::Sequential && self.replica_id.is_some() {
            tracing::debug!(tokens = ?self.tokens, "replica_id is ignored by this token strategy");
        }
        Ok(())
    }

    /// Build the token source this configuration selects
    pub fn token_source(&self) -> Result<Box<dyn TokenSource>> {
        self.validate()?;
        let source: Box<dyn TokenSource> = match self.tokens {
            TokenStrategy::Random => Box::new(RandomTokenSource::new()),
            TokenStrategy::Sequential => Box::new(match self.replica_id {
                Some(id) => SequentialTokenSource::new(id),
                None => SequentialTokenSource::with_random_replica(),
            }),
            TokenStrategy::Seeded => match self.seed {
                Some(seed) => Box::new(SeededTokenSource::new(seed)),
                None => return Err(SyncError::config("seeded token strategy requires a seed")),
            },
        };
        Ok(source)
    }
}
