//! Store configuration.

use std::path::{Path, PathBuf};

use parlor_core::PeerId;
use parlor_replica::ReplicaConfig;

/// Configuration for a [`crate::ChatStore`] opened on disk.
#[derive(Debug, Clone)]
pub struct ParlorConfig {
    /// Root directory. Each peer gets its own subdirectory.
    pub data_dir: PathBuf,
    /// Log and registry tuning.
    pub replica: ReplicaConfig,
    /// Channels to create on open, if any.
    pub seed_manifest: Option<PathBuf>,
}

impl ParlorConfig {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            replica: ReplicaConfig::default(),
            seed_manifest: None,
        }
    }

    /// `<data_dir>/<peer-id-hex>`
    pub fn peer_dir(&self, peer: &PeerId) -> PathBuf {
        self.data_dir.join(peer.to_hex())
    }

    /// `<data_dir>/<peer-id-hex>/parlor.db`
    pub fn database_path(&self, peer: &PeerId) -> PathBuf {
        self.peer_dir(peer).join("parlor.db")
    }
}

impl Default for ParlorConfig {
    fn default() -> Self {
        Self::new(Path::new("parlor-data"))
    }
}
