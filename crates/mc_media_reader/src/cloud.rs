use std::sync::Arc;

use md5::{Digest, Md5};

use mc_error::{warn_integrity_mismatch, CoreResult};
use mc_manifest::ManifestReader;
use mc_types::BlobStore;

use crate::{require_non_decreasing, FrameBody, MediaReader, RawFrame};

/// Images in a remote blob store, indexed through a [`ManifestReader`] for
/// names and checksums.
///
/// Downloads the whole requested span into a scoped [`tempfile::TempDir`]
/// before yielding anything — the directory (and everything in it) is
/// released on every exit path, including panics unwound through it, once
/// this reader is dropped.
pub struct CloudImageReader {
    blob_store: Arc<dyn BlobStore>,
    manifest: Arc<dyn ManifestReader>,
}

impl CloudImageReader {
    pub fn new(blob_store: Arc<dyn BlobStore>, manifest: Arc<dyn ManifestReader>) -> Self {
        Self {
            blob_store,
            manifest,
        }
    }
}

impl MediaReader for CloudImageReader {
    fn iterate<'a>(
        &'a self,
        frame_ids: &[i64],
    ) -> CoreResult<Box<dyn Iterator<Item = CoreResult<RawFrame>> + 'a>> {
        require_non_decreasing(frame_ids)?;

        let entries = self.manifest.iterate_frames(frame_ids)?;

        let staging = tempfile::tempdir().map_err(mc_error::CoreError::from)?;
        let names: Vec<String> = entries
            .iter()
            .map(|e| format!("{}{}", e.name, e.extension))
            .collect();
        self.blob_store.bulk_download(&names, staging.path())?;

        // Parallel preload: read every file off disk and verify its checksum
        // up front, so the lazy sequence below only ever yields bytes
        // already known good (or already warned about).
        let bodies: Vec<CoreResult<(Vec<u8>, Option<String>)>> = {
            use rayon::prelude::*;
            entries
                .par_iter()
                .map(|entry| {
                    let path = staging.path().join(format!("{}{}", entry.name, entry.extension));
                    let bytes = std::fs::read(&path).map_err(mc_error::CoreError::from)?;

                    if let Some(expected) = &entry.checksum {
                        let mut hasher = Md5::new();
                        hasher.update(&bytes);
                        let actual = hex_digest(&hasher.finalize());
                        if &actual != expected {
                            warn_integrity_mismatch(&format!(
                                "checksum mismatch for {}: expected {expected}, got {actual}",
                                entry.name
                            ));
                        }
                    }

                    Ok((bytes, entry.checksum.clone()))
                })
                .collect()
        };

        Ok(Box::new(entries.into_iter().zip(bodies).map(
            |(entry, body)| {
                let (bytes, checksum) = body?;
                Ok(RawFrame {
                    frame_id: entry.frame_id,
                    body: FrameBody::EncodedImage(bytes),
                    source_name: format!("{}{}", entry.name, entry.extension),
                    checksum,
                })
            },
        )))
    }
}

fn hex_digest(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::time::SystemTime;

    use mc_manifest::ManifestEntry;

    use super::*;

    struct FixtureBlobStore;

    impl BlobStore for FixtureBlobStore {
        fn bulk_download(&self, names: &[String], dest_dir: &Path) -> CoreResult<()> {
            for name in names {
                std::fs::write(dest_dir.join(name), format!("bytes-of-{name}"))
                    .map_err(mc_error::CoreError::from)?;
            }
            Ok(())
        }

        fn download_one(&self, name: &str) -> CoreResult<Vec<u8>> {
            Ok(format!("bytes-of-{name}").into_bytes())
        }

        fn last_modified(&self, _name: &str) -> CoreResult<SystemTime> {
            Ok(SystemTime::now())
        }
    }

    struct FixtureManifest(Vec<ManifestEntry>);

    impl ManifestReader for FixtureManifest {
        fn iterate_frames(&self, frame_ids: &[i64]) -> CoreResult<Vec<ManifestEntry>> {
            Ok(frame_ids
                .iter()
                .map(|id| self.0.iter().find(|e| e.frame_id == *id).unwrap().clone())
                .collect())
        }

        fn len(&self) -> usize {
            self.0.len()
        }

        fn at(&self, index: usize) -> Option<&ManifestEntry> {
            self.0.get(index)
        }
    }

    fn entry(frame_id: i64, checksum: Option<&str>) -> ManifestEntry {
        ManifestEntry {
            frame_id,
            name: format!("frame_{frame_id:06}"),
            extension: ".jpg".to_owned(),
            checksum: checksum.map(str::to_owned),
        }
    }

    #[test]
    fn downloads_and_yields_with_matching_checksum() {
        let manifest = FixtureManifest(vec![entry(0, None)]);
        let reader = CloudImageReader::new(Arc::new(FixtureBlobStore), Arc::new(manifest));

        let frames: Vec<RawFrame> = reader
            .iterate(&[0])
            .unwrap()
            .collect::<CoreResult<Vec<_>>>()
            .unwrap();

        assert_eq!(frames.len(), 1);
        match &frames[0].body {
            FrameBody::EncodedImage(bytes) => {
                assert_eq!(bytes, b"bytes-of-frame_000000.jpg")
            }
            FrameBody::Video(_) => panic!("expected an encoded image"),
        }
    }

    #[test]
    fn mismatched_checksum_still_yields_the_frame() {
        let manifest = FixtureManifest(vec![entry(0, Some("deadbeef"))]);
        let reader = CloudImageReader::new(Arc::new(FixtureBlobStore), Arc::new(manifest));

        let frames: Vec<RawFrame> = reader
            .iterate(&[0])
            .unwrap()
            .collect::<CoreResult<Vec<_>>>()
            .unwrap();

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].checksum.as_deref(), Some("deadbeef"));
    }
}
