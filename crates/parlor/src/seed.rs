//! Seed manifests: channels to create when a store is first brought up.
//!
//! A manifest is a JSON object keyed by channel name:
//!
//! ```json
//! {
//!   "general": { "address": "general", "name": "general", "description": "" },
//!   "random": { "address": "random", "name": "random" }
//! }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use parlor_core::ChannelInfo;

use crate::error::Result;

/// Channel metadata keyed by channel name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SeedManifest(BTreeMap<String, ChannelInfo>);

impl SeedManifest {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Channels in name order.
    pub fn channels(&self) -> impl Iterator<Item = &ChannelInfo> {
        self.0.values()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ParlorError;

    #[test]
    fn test_parse_manifest() {
        let manifest = SeedManifest::from_json(
            r#"{
                "random": {"address": "random", "name": "random"},
                "general": {"address": "general", "name": "general", "owner": "ops"}
            }"#,
        )
        .unwrap();

        assert_eq!(manifest.len(), 2);
        let names: Vec<&str> = manifest.channels().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["general", "random"]);
        assert_eq!(manifest.channels().next().unwrap().owner, "ops");
    }

    #[test]
    fn test_invalid_manifest() {
        let err = SeedManifest::from_json("[1, 2]").unwrap_err();
        assert!(matches!(err, ParlorError::Manifest(_)));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = SeedManifest::from_path(dir.path().join("absent.json")).unwrap_err();
        assert!(matches!(err, ParlorError::Io(_)));
    }
}
