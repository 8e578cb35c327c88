//! Content key derivation.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::core::StageKind;
use crate::errors::PipelineError;
use crate::strategies::StrategyIdentity;

/// Version of the key and blob layout. Bumping it orphans every cached entry.
pub const CACHE_FORMAT_VERSION: u32 = 1;

/// Length of a key in hex characters.
const KEY_LEN: usize = 64;

/// Hashes a JSON value to a lowercase SHA-256 hex string.
///
/// Object keys are emitted in sorted order, so equal values always hash
/// equally regardless of how they were built.
#[must_use]
pub fn digest_json(value: &serde_json::Value) -> String {
    let json = serde_json::to_string(value).unwrap_or_default();
    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    hex::encode(hasher.finalize())
}

/// Deterministic identity of a computation.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentKey(String);

impl ContentKey {
    /// Parses a key from its hex form.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfiguration` unless `hex` is 64 lowercase hex digits.
    pub fn from_hex(hex: &str) -> Result<Self, PipelineError> {
        let valid = hex.len() == KEY_LEN
            && hex
                .bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        if !valid {
            return Err(PipelineError::invalid_configuration(format!(
                "'{hex}' is not a content key"
            )));
        }
        Ok(Self(hex.to_string()))
    }

    /// The full hex digest.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for logs.
    #[must_use]
    pub fn short(&self) -> &str {
        &self.0[..12]
    }
}

impl fmt::Debug for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentKey({})", self.short())
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builds a [`ContentKey`] from a stage, a strategy identity and inputs.
///
/// Inputs are hashed in the order they are added.
#[derive(Debug, Clone)]
pub struct KeyBuilder {
    stage: StageKind,
    strategy: Option<StrategyIdentity>,
    inputs: Vec<serde_json::Value>,
}

impl KeyBuilder {
    /// Starts a key for `stage`.
    #[must_use]
    pub fn new(stage: StageKind) -> Self {
        Self {
            stage,
            strategy: None,
            inputs: Vec::new(),
        }
    }

    /// Sets the strategy identity.
    #[must_use]
    pub fn strategy(mut self, identity: &StrategyIdentity) -> Self {
        self.strategy = Some(identity.clone());
        self
    }

    /// Adds an upstream key.
    #[must_use]
    pub fn input_key(mut self, key: &ContentKey) -> Self {
        self.inputs.push(serde_json::json!({ "key": key.as_str() }));
        self
    }

    /// Adds a labelled input value.
    #[must_use]
    pub fn input_value(mut self, label: &str, value: impl Serialize) -> Self {
        let value = serde_json::to_value(value).unwrap_or(serde_json::Value::Null);
        let mut entry = serde_json::Map::new();
        entry.insert(label.to_string(), value);
        self.inputs.push(serde_json::Value::Object(entry));
        self
    }

    /// Hashes everything added so far.
    #[must_use]
    pub fn build(&self) -> ContentKey {
        let (name, version, params) = match self.strategy {
            Some(ref id) => (id.name.as_str(), id.version, id.params.clone()),
            None => ("", 0, serde_json::Value::Null),
        };

        let document = serde_json::json!({
            "format": CACHE_FORMAT_VERSION,
            "stage": self.stage.as_str(),
            "strategy": name,
            "version": version,
            "params": params,
            "inputs": self.inputs,
        });

        ContentKey(digest_json(&document))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn identity(version: u32, width: u64) -> StrategyIdentity {
        StrategyIdentity::new("centered", version).with_params(serde_json::json!({ "w": width }))
    }

    #[test]
    fn test_same_inputs_same_key() {
        let a = KeyBuilder::new(StageKind::Region)
            .strategy(&identity(1, 500))
            .input_value("features", "abc")
            .build();
        let b = KeyBuilder::new(StageKind::Region)
            .strategy(&identity(1, 500))
            .input_value("features", "abc")
            .build();

        assert_eq!(a, b);
        assert_eq!(a.as_str().len(), 64);
    }

    #[test]
    fn test_version_changes_key() {
        let v1 = KeyBuilder::new(StageKind::Region).strategy(&identity(1, 500)).build();
        let v2 = KeyBuilder::new(StageKind::Region).strategy(&identity(2, 500)).build();
        assert_ne!(v1, v2);
    }

    #[test]
    fn test_params_and_inputs_change_key() {
        let base = KeyBuilder::new(StageKind::Smoothing).strategy(&identity(1, 500));
        let k1 = base.clone().input_value("track", "a").build();
        let k2 = base.clone().input_value("track", "b").build();
        let k3 = KeyBuilder::new(StageKind::Smoothing)
            .strategy(&identity(1, 501))
            .input_value("track", "a")
            .build();

        assert_ne!(k1, k2);
        assert_ne!(k1, k3);
    }

    #[test]
    fn test_stage_changes_key() {
        let a = KeyBuilder::new(StageKind::Normalization).build();
        let b = KeyBuilder::new(StageKind::Ordering).build();
        assert_ne!(a, b);
    }

    #[test]
    fn test_input_order_matters() {
        let up1 = KeyBuilder::new(StageKind::Smoothing).input_value("track", "a").build();
        let up2 = KeyBuilder::new(StageKind::Smoothing).input_value("track", "b").build();

        let ab = KeyBuilder::new(StageKind::Normalization)
            .input_key(&up1)
            .input_key(&up2)
            .build();
        let ba = KeyBuilder::new(StageKind::Normalization)
            .input_key(&up2)
            .input_key(&up1)
            .build();
        assert_ne!(ab, ba);
    }

    #[test]
    fn test_from_hex() {
        let key = KeyBuilder::new(StageKind::Region).build();
        assert_eq!(ContentKey::from_hex(key.as_str()).unwrap(), key);
        assert!(ContentKey::from_hex("xyz").is_err());
        assert!(ContentKey::from_hex(&"A".repeat(64)).is_err());
    }

    #[test]
    fn test_digest_json_ignores_construction_order() {
        let mut a = serde_json::Map::new();
        a.insert("x".into(), 1.into());
        a.insert("y".into(), 2.into());
        let mut b = serde_json::Map::new();
        b.insert("y".into(), 2.into());
        b.insert("x".into(), 1.into());

        assert_eq!(
            digest_json(&serde_json::Value::Object(a)),
            digest_json(&serde_json::Value::Object(b))
        );
    }
}
