use std::collections::BTreeMap;
use std::path::Path;

use mc_error::{CoreError, CoreResult};

use crate::ManifestReader;

/// One entry of an image-set manifest: `{name, extension, checksum?}` (spec §4.1).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct ManifestEntry {
    pub frame_id: i64,
    pub name: String,
    pub extension: String,
    pub checksum: Option<String>,
}

/// On-disk representation: a JSON array of [`ManifestEntry`], in frame order.
/// Equivalent in role to CVAT's `ImageManifestManager` JSONL file, but a
/// single JSON document since we always load it wholesale before indexing.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct ManifestFile {
    entries: Vec<ManifestEntry>,
}

/// A manifest loaded from a JSON file on disk (or object storage, once
/// downloaded locally — see `mc_media_reader`'s cloud backend).
pub struct FileImageManifestReader {
    by_position: Vec<ManifestEntry>,
    by_frame_id: BTreeMap<i64, usize>,
}

impl FileImageManifestReader {
    pub fn open(path: &Path) -> CoreResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json(&contents)
    }

    pub fn from_json(contents: &str) -> CoreResult<Self> {
        let file: ManifestFile = serde_json::from_str(contents)
            .map_err(|e| CoreError::storage(format!("malformed manifest: {e}")))?;

        let mut by_frame_id = BTreeMap::new();
        for (position, entry) in file.entries.iter().enumerate() {
            by_frame_id.insert(entry.frame_id, position);
        }

        Ok(Self {
            by_position: file.entries,
            by_frame_id,
        })
    }

    pub fn write(path: &Path, entries: &[ManifestEntry]) -> CoreResult<()> {
        let file = ManifestFile {
            entries: entries.to_vec(),
        };
        let json = serde_json::to_string(&file)
            .map_err(|e| CoreError::storage(format!("failed to serialize manifest: {e}")))?;
        std::fs::write(path, json)?;
        Ok(())
    }
}

impl ManifestReader for FileImageManifestReader {
    fn iterate_frames(&self, frame_ids: &[i64]) -> CoreResult<Vec<ManifestEntry>> {
        let mut out = Vec::with_capacity(frame_ids.len());
        for &frame_id in frame_ids {
            let position = self.by_frame_id.get(&frame_id).ok_or_else(|| {
                CoreError::not_found(format!("frame {frame_id} absent from manifest"))
            })?;
            out.push(self.by_position[*position].clone());
        }
        Ok(out)
    }

    fn len(&self) -> usize {
        self.by_position.len()
    }

    fn at(&self, index: usize) -> Option<&ManifestEntry> {
        self.by_position.get(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_entries() -> Vec<ManifestEntry> {
        vec![
            ManifestEntry {
                frame_id: 0,
                name: "frame_000000".into(),
                extension: ".jpg".into(),
                checksum: Some("abc123".into()),
            },
            ManifestEntry {
                frame_id: 1,
                name: "frame_000001".into(),
                extension: ".jpg".into(),
                checksum: None,
            },
        ]
    }

    #[test]
    fn round_trips_through_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        FileImageManifestReader::write(&path, &sample_entries()).unwrap();

        let reader = FileImageManifestReader::open(&path).unwrap();
        assert_eq!(reader.len(), 2);
        let found = reader.iterate_frames(&[1, 0]).unwrap();
        assert_eq!(found[0].frame_id, 1);
        assert_eq!(found[1].frame_id, 0);
    }

    #[test]
    fn missing_frame_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("manifest.json");
        FileImageManifestReader::write(&path, &sample_entries()).unwrap();

        let reader = FileImageManifestReader::open(&path).unwrap();
        assert!(matches!(
            reader.iterate_frames(&[99]),
            Err(CoreError::NotFound(_))
        ));
    }
}
