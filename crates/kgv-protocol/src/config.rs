// Copyright (c) Silence Laboratories Pte. Ltd. All Rights Reserved.
// This software is licensed under the Silence Laboratories License Agreement.

//! Session configuration, read from a TOML file.
//!
//! ```toml
//! [session]
//! key_bits = 2048
//!
//! [phases]
//! psi = true
//! entropy = true
//! statistics = true
//! oblivious_transfer = true
//!
//! [psi]
//! fpp = 0.01
//!
//! [entropy]
//! kinds = ["DESC", "SUBJECT"]
//!
//! [transfer]
//! k = 3
//! strategy = { range = { parts = 5 } }
//! ```

use std::{fs, io, path::Path};

use kgv_blind_sig::{DIGEST_BITS, KEY_BITS};
use kgv_graph::{analyzer::EntropyKind, partition::Strategy};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config: {0}")]
    Io(#[from] io::Error),

    #[error("cannot parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("cannot write config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KgvConfig {
    pub session: SessionConfig,
    pub phases: PhaseFlags,
    pub psi: PsiConfig,
    pub entropy: EntropyConfig,
    pub transfer: TransferConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// RSA modulus size of the Seller's session key.
    pub key_bits: usize,
    /// Fixed RNG seed for reproducible runs.
    pub seed: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            key_bits: KEY_BITS,
            seed: None,
        }
    }
}

/// Which phases this party wants. A phase runs only if both parties
/// want it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PhaseFlags {
    pub key_exchange: bool,
    pub psi: bool,
    /// Covers both entropy signatures and entropy.
    pub entropy: bool,
    pub statistics: bool,
    pub oblivious_transfer: bool,
    pub final_exchange: bool,
}

impl Default for PhaseFlags {
    fn default() -> Self {
        Self {
            key_exchange: true,
            psi: true,
            entropy: true,
            statistics: true,
            oblivious_transfer: true,
            final_exchange: true,
        }
    }
}

impl PhaseFlags {
    /// Key exchange is needed as soon as anything uses the key.
    pub fn needs_key(&self) -> bool {
        self.key_exchange
            || self.psi
            || self.entropy
            || self.oblivious_transfer
            || self.final_exchange
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PsiConfig {
    /// False positive probability of the Seller's Bloom filter.
    pub fpp: f64,
}

impl Default for PsiConfig {
    fn default() -> Self {
        Self { fpp: 0.01 }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntropyConfig {
    pub kinds: Vec<EntropyKind>,
}

impl Default for EntropyConfig {
    fn default() -> Self {
        Self {
            kinds: EntropyKind::ALL.to_vec(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Seller: most parts the Buyer may take. Buyer: parts to take.
    pub k: usize,
    /// Seller only.
    pub strategy: Strategy,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            k: 3,
            strategy: Strategy::default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is not set.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

impl KgvConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: KgvConfig = toml::from_str(text)?;
        config.validate()?;

        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let fpp = self.psi.fpp;
        if !(fpp > 0.0 && fpp <= 1.0) {
            return Err(ConfigError::Invalid(format!(
                "psi.fpp must be in (0, 1], got {fpp}"
            )));
        }

        if self.transfer.k == 0 {
            return Err(ConfigError::Invalid("transfer.k must be at least 1".into()));
        }

        if self.session.key_bits <= DIGEST_BITS {
            return Err(ConfigError::Invalid(format!(
                "session.key_bits must exceed {DIGEST_BITS}"
            )));
        }

        if let Strategy::Range { parts: 0 } = self.transfer.strategy {
            return Err(ConfigError::Invalid(
                "transfer.strategy range needs at least one part".into(),
            ));
        }

        Ok(())
    }

    /// Seeded generator if a seed is configured, OS entropy otherwise.
    pub fn rng(&self) -> ChaCha20Rng {
        match self.session.seed {
            Some(seed) => ChaCha20Rng::seed_from_u64(seed),
            None => ChaCha20Rng::from_entropy(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = KgvConfig::default();
        config.validate().unwrap();
        assert_eq!(config.session.key_bits, 2048);
        assert_eq!(config.entropy.kinds.len(), 9);
    }

    #[test]
    fn default_config_survives_toml() {
        let config = KgvConfig::default();
        let text = config.to_toml().unwrap();

        assert_eq!(KgvConfig::from_toml(&text).unwrap(), config);
    }

    #[test]
    fn partial_file() {
        let config = KgvConfig::from_toml(
            r#"
            [phases]
            oblivious_transfer = false

            [entropy]
            kinds = ["DESC", "LITERAL"]

            [transfer]
            k = 2
            strategy = "subject"
            "#,
        )
        .unwrap();

        assert!(!config.phases.oblivious_transfer);
        assert!(config.phases.psi);
        assert_eq!(
            config.entropy.kinds,
            vec![EntropyKind::Desc, EntropyKind::Literal]
        );
        assert_eq!(config.transfer.strategy, Strategy::Subject);
        assert_eq!(config.psi.fpp, 0.01);
    }

    #[test]
    fn invalid_values_are_rejected() {
        for text in [
            "[psi]\nfpp = 0.0",
            "[psi]\nfpp = 1.5",
            "[transfer]\nk = 0",
            "[session]\nkey_bits = 512",
            "[transfer]\nstrategy = { range = { parts = 0 } }",
        ] {
            assert!(
                matches!(KgvConfig::from_toml(text), Err(ConfigError::Invalid(_))),
                "{text}"
            );
        }

        assert!(matches!(
            KgvConfig::from_toml("[entropy]\nkinds = [\"NOPE\"]"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn key_is_needed_by_dependent_phases() {
        let flags = PhaseFlags {
            key_exchange: false,
            psi: false,
            entropy: false,
            statistics: true,
            oblivious_transfer: false,
            final_exchange: false,
        };
        assert!(!flags.needs_key());

        let flags = PhaseFlags {
            psi: true,
            ..flags
        };
        assert!(flags.needs_key());
    }
}
