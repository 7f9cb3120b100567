use std::collections::BTreeMap;
use std::path::Path;

use mc_error::{CoreError, CoreResult};

/// Accelerates seeking into a video container by remembering each frame id's
/// byte offset within the demuxed sample stream (spec §4.1: "use it to
/// accelerate seek — random access into the container using byte offsets
/// keyed by frame id").
///
/// Built once (lazily, on first miss) by demuxing the container and recording
/// each sample's offset, then persisted alongside the source video so future
/// reads skip the linear decode fallback.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct VideoManifest {
    /// frame id -> byte offset of that frame's sample within the container.
    offsets: BTreeMap<i64, u64>,
}

impl VideoManifest {
    pub fn new(offsets: BTreeMap<i64, u64>) -> Self {
        Self { offsets }
    }

    pub fn byte_offset(&self, frame_id: i64) -> Option<u64> {
        self.offsets.get(&frame_id).copied()
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn load(path: &Path) -> CoreResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        serde_json::from_str(&contents)
            .map_err(|e| CoreError::storage(format!("malformed video manifest: {e}")))
    }

    pub fn save(&self, path: &Path) -> CoreResult<()> {
        let json = serde_json::to_string(self)
            .map_err(|e| CoreError::storage(format!("failed to serialize video manifest: {e}")))?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("video_manifest.json");

        let manifest = VideoManifest::new([(0, 32), (1, 4096), (2, 9001)].into_iter().collect());
        manifest.save(&path).unwrap();

        let loaded = VideoManifest::load(&path).unwrap();
        assert_eq!(loaded.byte_offset(1), Some(4096));
        assert_eq!(loaded.byte_offset(99), None);
        assert_eq!(loaded.len(), 3);
    }
}
