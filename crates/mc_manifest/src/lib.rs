//! Random-access manifest index over a per-dataset manifest file.
//!
//! Maps frame ids to storage locations and optional per-file checksums
//! (image manifests), or to byte seek offsets within a video container
//! (video manifests). Direct port of the role CVAT's `ImageManifestManager`
//! and `VideoManifestManager` play in `cache.py`/`frame_provider.py`: open
//! once, index by frame id, tolerate "doesn't exist yet" as a normal state
//! the caller falls back from.

mod image_manifest;
mod video_manifest;

pub use image_manifest::{FileImageManifestReader, ManifestEntry};
pub use video_manifest::VideoManifest;

use mc_error::CoreResult;

/// `ManifestReader.open(path)`: `.iterate_frames(ids) -> [{name, extension, checksum?}]`,
/// `len()`, index by position (spec §6).
pub trait ManifestReader: Send + Sync {
    /// Entries for the requested frame ids, in the order requested.
    fn iterate_frames(&self, frame_ids: &[i64]) -> CoreResult<Vec<ManifestEntry>>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entry at manifest position `index` (0-based, not a frame id).
    fn at(&self, index: usize) -> Option<&ManifestEntry>;
}
