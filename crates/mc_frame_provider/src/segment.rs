//! `SegmentFrameProvider`: reads one segment's own chunks and frames,
//! independent of anything a joined task-level chunk needs.

use std::path::PathBuf;
use std::sync::Arc;

use mc_cache::{DataWithMime, MediaCache, MediaSources};
use mc_error::{CoreError, CoreResult};
use mc_types::{ContextImageRepository, Quality, Segment, Task};

use crate::loader::{BufferChunkLoader, FileChunkLoader, ResidentChunkLoader};
use crate::{convert_frame, DataWithMeta, FrameData, FrameOutputType, FrameProvider};

/// How this segment's two quality tiers' chunks are produced — mirrors the
/// `storage_method` branch in `SegmentFrameProvider.__init__`. Chunk
/// previews and context images always go through the cache regardless of
/// which variant this is (same as the original, which instantiates
/// `MediaCache()` unconditionally in both of those methods).
#[derive(Clone)]
pub enum ChunkStorage {
    Cache {
        cache: Arc<MediaCache>,
        sources: MediaSources,
    },
    FileSystem {
        /// `(chunk_number, quality) -> path`. Precomputed-chunk file layout
        /// is application-specific, so the caller supplies it.
        chunk_path: Arc<dyn Fn(i64, Quality) -> CoreResult<PathBuf> + Send + Sync>,
        /// Previews and context images still need to be produced somehow
        /// even when chunks themselves live on disk.
        cache: Arc<MediaCache>,
        sources: MediaSources,
    },
}

impl ChunkStorage {
    fn cache_and_sources(&self) -> (&Arc<MediaCache>, &MediaSources) {
        match self {
            Self::Cache { cache, sources } => (cache, sources),
            Self::FileSystem { cache, sources, .. } => (cache, sources),
        }
    }
}

pub struct SegmentFrameProvider {
    task: Arc<Task>,
    segment: Arc<Segment>,
    storage: ChunkStorage,
    context_images: Arc<dyn ContextImageRepository>,
    compressed: ResidentChunkLoader,
    original: ResidentChunkLoader,
}

impl SegmentFrameProvider {
    pub fn new(
        task: Arc<Task>,
        segment: Arc<Segment>,
        storage: ChunkStorage,
        context_images: Arc<dyn ContextImageRepository>,
        ffmpeg_path: Option<String>,
    ) -> Self {
        let (compressed_loader, original_loader): (Box<dyn crate::ChunkLoader>, Box<dyn crate::ChunkLoader>) =
            match &storage {
                ChunkStorage::Cache { cache, sources } => {
                    let (task_c, segment_c, cache_c, sources_c) =
                        (task.clone(), segment.clone(), cache.clone(), sources.clone());
                    let (task_o, segment_o, cache_o, sources_o) =
                        (task.clone(), segment.clone(), cache.clone(), sources.clone());
                    (
                        Box::new(BufferChunkLoader::new(task.compressed_chunk_type, move |chunk_idx| {
                            cache_c.get_segment_chunk(&task_c, &segment_c, chunk_idx, Quality::Compressed, &sources_c)
                        })),
                        Box::new(BufferChunkLoader::new(task.original_chunk_type, move |chunk_idx| {
                            cache_o.get_segment_chunk(&task_o, &segment_o, chunk_idx, Quality::Original, &sources_o)
                        })),
                    )
                }
                ChunkStorage::FileSystem { chunk_path, .. } => {
                    let (path_c, path_o) = (chunk_path.clone(), chunk_path.clone());
                    (
                        Box::new(FileChunkLoader::new(task.compressed_chunk_type, move |chunk_idx| {
                            path_c(chunk_idx, Quality::Compressed)
                        })),
                        Box::new(FileChunkLoader::new(task.original_chunk_type, move |chunk_idx| {
                            path_o(chunk_idx, Quality::Original)
                        })),
                    )
                }
            };

        Self {
            task,
            segment,
            storage,
            context_images,
            compressed: ResidentChunkLoader::new(compressed_loader, ffmpeg_path.clone()),
            original: ResidentChunkLoader::new(original_loader, ffmpeg_path),
        }
    }

    pub fn unload(&mut self) {
        self.compressed.unload();
        self.original.unload();
    }

    pub fn len(&self) -> i64 {
        self.segment.frame_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn loader_mut(&mut self, quality: Quality) -> &mut ResidentChunkLoader {
        match quality {
            Quality::Compressed => &mut self.compressed,
            Quality::Original => &mut self.original,
        }
    }

    /// `BUFFER`-converted bytes of one frame, without the `DataWithMeta`
    /// wrapper — what a task-level joined chunk needs from each contributing
    /// segment (spec §4.5 `TaskFrameProvider.get_chunk`, multi-segment path).
    pub(crate) fn get_frame_buffer_bytes(&mut self, frame_number: i64, quality: Quality) -> CoreResult<Vec<u8>> {
        let (_, chunk_number, frame_offset) = self.segment.validate_frame_number(frame_number, self.task.chunk_size)?;
        let loader = self.loader_mut(quality);
        let chunk = loader.load(chunk_number)?;
        let (body, _name) = chunk.frame_at(frame_offset as usize)?;
        crate::frame_to_buffer_bytes(&body)
    }
}

impl FrameProvider for SegmentFrameProvider {
    fn validate_frame_number(&self, frame_number: i64) -> CoreResult<i64> {
        self.segment
            .validate_frame_number(frame_number, self.task.chunk_size)
            .map(|(frame, _, _)| frame)
    }

    fn validate_chunk_number(&self, chunk_number: i64) -> CoreResult<i64> {
        self.segment.validate_chunk_number(chunk_number, self.task.chunk_size)
    }

    fn get_chunk_number(&self, frame_number: i64) -> i64 {
        self.segment.get_chunk_number(frame_number, self.task.chunk_size)
    }

    fn get_preview(&self) -> CoreResult<DataWithMeta<Vec<u8>>> {
        let (cache, sources) = self.storage.cache_and_sources();
        let (bytes, mime) = cache.get_or_set_segment_preview(&self.task, &self.segment, sources)?;
        Ok(DataWithMeta::new(bytes, mime))
    }

    fn get_chunk(&mut self, chunk_number: i64, quality: Quality) -> CoreResult<DataWithMeta<Vec<u8>>> {
        let chunk_number = self.validate_chunk_number(chunk_number)?;
        let (bytes, mime): DataWithMime = self.loader_mut(quality).read_chunk_bytes(chunk_number)?;
        Ok(DataWithMeta::new(bytes, mime))
    }

    fn get_frame(
        &mut self,
        frame_number: i64,
        quality: Quality,
        out_type: FrameOutputType,
    ) -> CoreResult<DataWithMeta<FrameData>> {
        let (_, chunk_number, frame_offset) =
            self.segment.validate_frame_number(frame_number, self.task.chunk_size)?;
        let loader = self.loader_mut(quality);
        let chunk = loader.load(chunk_number)?;
        let (body, frame_name) = chunk.frame_at(frame_offset as usize)?;

        let is_video = matches!(body, mc_media_reader::FrameBody::Video(_));
        let mime = if is_video {
            "image/png".to_owned()
        } else {
            mime_guess2::from_path(&frame_name).first_or_octet_stream().to_string()
        };

        let data = convert_frame(body, out_type)?;
        Ok(DataWithMeta::new(data, mime))
    }

    fn get_frame_context_images(&self, frame_number: i64) -> CoreResult<Option<DataWithMeta<Vec<u8>>>> {
        let (cache, _) = self.storage.cache_and_sources();
        let result = match &self.storage {
            ChunkStorage::Cache { .. } => {
                cache.get_frame_context_images(self.task.id, frame_number, self.context_images.as_ref())?
            }
            ChunkStorage::FileSystem { .. } => prepare_context_images_uncached(
                self.task.id,
                frame_number,
                self.context_images.as_ref(),
            )?,
        };
        Ok(result.map(|(bytes, mime)| DataWithMeta::new(bytes, mime.unwrap_or_else(|| "application/zip".to_owned()))))
    }

    fn iterate_frames(
        &mut self,
        start_frame: Option<i64>,
        stop_frame: Option<i64>,
        quality: Quality,
        out_type: FrameOutputType,
    ) -> CoreResult<Vec<DataWithMeta<FrameData>>> {
        iterate_frames_over(self, start_frame, stop_frame, quality, out_type)
    }
}

/// `FILESYSTEM`-storage-method context images: the same archive build as the
/// cache producer, just never written to the backend — `prepare_context_images`.
fn prepare_context_images_uncached(
    data_id: i64,
    frame_number: i64,
    repository: &dyn ContextImageRepository,
) -> CoreResult<Option<(Vec<u8>, Option<String>)>> {
    let Some(related_paths) = repository.related_file_paths(data_id, frame_number)? else {
        return Ok(None);
    };
    if related_paths.is_empty() {
        return Ok(Some((Vec::new(), None)));
    }
    let (bytes, mime) = mc_cache::build_context_image_archive(&related_paths)
        .map_err(|e| CoreError::storage(format!("failed to prepare context images: {e}")))?;
    Ok(Some((bytes, Some(mime))))
}

/// Shared by every [`FrameProvider::iterate_frames`] impl in this crate:
/// eagerly walks `[start, stop]` task-frame ids and calls `get_frame` on
/// each, matching the original generator's loop body.
pub(crate) fn iterate_frames_over<P: FrameProvider + ?Sized>(
    provider: &mut P,
    start_frame: Option<i64>,
    stop_frame: Option<i64>,
    quality: Quality,
    out_type: FrameOutputType,
) -> CoreResult<Vec<DataWithMeta<FrameData>>> {
    let start = start_frame.unwrap_or(0);
    let mut out = Vec::new();
    let mut frame = start;
    loop {
        match provider.get_frame(frame, quality, out_type) {
            Ok(data) => out.push(data),
            Err(CoreError::InvalidArgument(_)) if stop_frame.is_none() => break,
            Err(err) => return Err(err),
        }
        frame += 1;
        if let Some(stop) = stop_frame {
            if frame > stop {
                break;
            }
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A provider whose valid frame ids are exactly `0..len`, for exercising
    /// `iterate_frames_over`'s stop conditions without any real media.
    struct BoundedProvider {
        len: i64,
    }

    impl FrameProvider for BoundedProvider {
        fn validate_frame_number(&self, frame_number: i64) -> CoreResult<i64> {
            if (0..self.len).contains(&frame_number) {
                Ok(frame_number)
            } else {
                Err(CoreError::invalid_argument(format!("frame {frame_number} out of range")))
            }
        }

        fn validate_chunk_number(&self, chunk_number: i64) -> CoreResult<i64> {
            Ok(chunk_number)
        }

        fn get_chunk_number(&self, frame_number: i64) -> i64 {
            frame_number
        }

        fn get_preview(&self) -> CoreResult<DataWithMeta<Vec<u8>>> {
            unimplemented!("not exercised by these tests")
        }

        fn get_chunk(&mut self, _chunk_number: i64, _quality: Quality) -> CoreResult<DataWithMeta<Vec<u8>>> {
            unimplemented!("not exercised by these tests")
        }

        fn get_frame(
            &mut self,
            frame_number: i64,
            _quality: Quality,
            _out_type: FrameOutputType,
        ) -> CoreResult<DataWithMeta<FrameData>> {
            self.validate_frame_number(frame_number)?;
            Ok(DataWithMeta::new(FrameData::Buffer(vec![frame_number as u8]), "application/octet-stream"))
        }

        fn get_frame_context_images(&self, _frame_number: i64) -> CoreResult<Option<DataWithMeta<Vec<u8>>>> {
            Ok(None)
        }

        fn iterate_frames(
            &mut self,
            start_frame: Option<i64>,
            stop_frame: Option<i64>,
            quality: Quality,
            out_type: FrameOutputType,
        ) -> CoreResult<Vec<DataWithMeta<FrameData>>> {
            iterate_frames_over(self, start_frame, stop_frame, quality, out_type)
        }
    }

    #[test]
    fn iterate_frames_with_no_stop_runs_through_the_last_valid_frame() {
        let mut provider = BoundedProvider { len: 3 };
        let frames = provider.iterate_frames(None, None, Quality::Compressed, FrameOutputType::Buffer).unwrap();
        assert_eq!(frames.len(), 3);
    }

    #[test]
    fn iterate_frames_with_explicit_stop_propagates_out_of_range_errors() {
        let mut provider = BoundedProvider { len: 3 };
        let result = provider.iterate_frames(Some(0), Some(5), Quality::Compressed, FrameOutputType::Buffer);
        assert!(result.is_err(), "an explicit stop past the last valid frame must error, not silently truncate");
    }

    #[test]
    fn iterate_frames_respects_start_frame() {
        let mut provider = BoundedProvider { len: 3 };
        let frames = provider.iterate_frames(Some(1), Some(2), Quality::Compressed, FrameOutputType::Buffer).unwrap();
        assert_eq!(frames.len(), 2);
    }
}
