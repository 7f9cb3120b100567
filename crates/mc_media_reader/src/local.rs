use std::sync::Arc;

use mc_error::CoreResult;
use mc_types::ImageRepository;

use crate::{require_non_decreasing, FrameBody, MediaReader, RawFrame};

/// Images on a local filesystem path (or a network share mounted as one),
/// indexed through the externally supplied [`ImageRepository`].
///
/// Mirrors CVAT's `_read_raw_images` cursor loop: query the repository for
/// the `[min, max]` span of the request, then walk both the sorted request
/// list and the repository's answer in lockstep so every requested id either
/// resolves to a path or fails loudly.
pub struct LocalImageReader {
    task_id: i64,
    repository: Arc<dyn ImageRepository>,
}

impl LocalImageReader {
    pub fn new(task_id: i64, repository: Arc<dyn ImageRepository>) -> Self {
        Self {
            task_id,
            repository,
        }
    }
}

impl MediaReader for LocalImageReader {
    fn iterate<'a>(
        &'a self,
        frame_ids: &[i64],
    ) -> CoreResult<Box<dyn Iterator<Item = CoreResult<RawFrame>> + 'a>> {
        require_non_decreasing(frame_ids)?;

        let Some((&lo, &hi)) = frame_ids.iter().min().zip(frame_ids.iter().max()) else {
            return Ok(Box::new(std::iter::empty()));
        };

        let records = self.repository.list(self.task_id, lo..=hi)?;
        let by_id: std::collections::BTreeMap<i64, String> = records.into_iter().collect();

        // 2D tasks decode nothing at this layer — only bytes are read here,
        // decoding is the chunk writer's job — so the only parallelism worth
        // spending is the filesystem read itself, via rayon below.
        let frame_ids = frame_ids.to_vec();
        let bodies: Vec<CoreResult<Vec<u8>>> = {
            use rayon::prelude::*;
            frame_ids
                .par_iter()
                .map(|frame_id| {
                    let path = by_id.get(frame_id).ok_or_else(|| {
                        mc_error::CoreError::not_found(format!(
                            "no image record for frame {frame_id} in task {}",
                            self.task_id
                        ))
                    })?;
                    std::fs::read(path).map_err(mc_error::CoreError::from)
                })
                .collect()
        };

        let names = frame_ids
            .iter()
            .map(|frame_id| by_id.get(frame_id).cloned().unwrap_or_default())
            .collect::<Vec<_>>();

        Ok(Box::new(
            frame_ids
                .into_iter()
                .zip(names)
                .zip(bodies)
                .map(|((frame_id, source_name), bytes)| {
                    let bytes = bytes?;
                    Ok(RawFrame {
                        frame_id,
                        body: FrameBody::EncodedImage(bytes),
                        source_name,
                        checksum: None,
                    })
                }),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mc_error::CoreError;

    struct FixtureRepository {
        dir: tempfile::TempDir,
        known_ids: Vec<i64>,
    }

    impl ImageRepository for FixtureRepository {
        fn list(
            &self,
            _task_id: i64,
            frame_range: std::ops::RangeInclusive<i64>,
        ) -> CoreResult<Vec<(i64, String)>> {
            Ok(frame_range
                .filter(|id| self.known_ids.contains(id))
                .map(|id| {
                    let path = self.dir.path().join(format!("frame_{id}.jpg"));
                    (id, path.to_string_lossy().into_owned())
                })
                .collect())
        }
    }

    #[test]
    fn yields_frames_in_requested_order() {
        let dir = tempfile::tempdir().unwrap();
        for id in 0..3 {
            std::fs::write(dir.path().join(format!("frame_{id}.jpg")), [id as u8; 4]).unwrap();
        }
        let repository = Arc::new(FixtureRepository {
            dir,
            known_ids: vec![0, 1, 2],
        });
        let reader = LocalImageReader::new(1, repository);

        let frames: Vec<RawFrame> = reader
            .iterate(&[0, 1, 2])
            .unwrap()
            .collect::<CoreResult<Vec<_>>>()
            .unwrap();

        assert_eq!(frames.len(), 3);
        assert_eq!(frames[0].frame_id, 0);
        assert_eq!(frames[1].frame_id, 1);
        assert_eq!(frames[2].frame_id, 2);
        match &frames[1].body {
            FrameBody::EncodedImage(bytes) => assert_eq!(bytes, &[1u8; 4]),
            FrameBody::Video(_) => panic!("expected an encoded image"),
        }
    }

    #[test]
    fn non_monotonic_frame_ids_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let repository = Arc::new(FixtureRepository {
            dir,
            known_ids: vec![0, 1, 2],
        });
        let reader = LocalImageReader::new(1, repository);

        let result = reader.iterate(&[2, 0, 1]);
        assert!(matches!(result, Err(CoreError::InvalidArgument(_))));
    }

    #[test]
    fn missing_record_surfaces_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let repository = Arc::new(FixtureRepository {
            dir,
            known_ids: vec![],
        });
        let reader = LocalImageReader::new(1, repository);

        let result: CoreResult<Vec<_>> = reader.iterate(&[5]).unwrap().collect();
        assert!(matches!(result, Err(CoreError::NotFound(_))));
    }
}
