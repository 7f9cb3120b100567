//! `JobFrameProvider`: a thin wrapper over the job's own segment — a job's
//! frame universe is exactly its segment's, so this delegates every
//! operation straight through.

use std::sync::Arc;

use mc_error::CoreResult;
use mc_types::{ContextImageRepository, Quality, Segment, Task};

use crate::segment::{ChunkStorage, SegmentFrameProvider};
use crate::{DataWithMeta, FrameData, FrameOutputType, FrameProvider};

pub struct JobFrameProvider {
    inner: SegmentFrameProvider,
}

impl JobFrameProvider {
    pub fn new(
        task: Arc<Task>,
        segment: Arc<Segment>,
        storage: ChunkStorage,
        context_images: Arc<dyn ContextImageRepository>,
        ffmpeg_path: Option<String>,
    ) -> Self {
        Self {
            inner: SegmentFrameProvider::new(task, segment, storage, context_images, ffmpeg_path),
        }
    }
}

impl FrameProvider for JobFrameProvider {
    fn validate_frame_number(&self, frame_number: i64) -> CoreResult<i64> {
        self.inner.validate_frame_number(frame_number)
    }

    fn validate_chunk_number(&self, chunk_number: i64) -> CoreResult<i64> {
        self.inner.validate_chunk_number(chunk_number)
    }

    fn get_chunk_number(&self, frame_number: i64) -> i64 {
        self.inner.get_chunk_number(frame_number)
    }

    fn get_preview(&self) -> CoreResult<DataWithMeta<Vec<u8>>> {
        self.inner.get_preview()
    }

    fn get_chunk(&mut self, chunk_number: i64, quality: Quality) -> CoreResult<DataWithMeta<Vec<u8>>> {
        self.inner.get_chunk(chunk_number, quality)
    }

    fn get_frame(
        &mut self,
        frame_number: i64,
        quality: Quality,
        out_type: FrameOutputType,
    ) -> CoreResult<DataWithMeta<FrameData>> {
        self.inner.get_frame(frame_number, quality, out_type)
    }

    fn get_frame_context_images(&self, frame_number: i64) -> CoreResult<Option<DataWithMeta<Vec<u8>>>> {
        self.inner.get_frame_context_images(frame_number)
    }

    fn iterate_frames(
        &mut self,
        start_frame: Option<i64>,
        stop_frame: Option<i64>,
        quality: Quality,
        out_type: FrameOutputType,
    ) -> CoreResult<Vec<DataWithMeta<FrameData>>> {
        self.inner.iterate_frames(start_frame, stop_frame, quality, out_type)
    }
}
