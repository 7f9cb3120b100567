//! Public facade over the `mc_*` workspace: the surface a consuming service
//! is meant to depend on directly, everything else being an implementation
//! detail of how chunks get produced and cached.
//!
//! Mirrors the `rerun`/`re_sdk` pattern of a thin top crate re-exporting the
//! workspace's pieces under one name, rather than making callers depend on
//! half a dozen `mc_*` crates individually.

pub mod setup;

pub use mc_cache::{DataWithMime, InMemoryCache, KVCache, MediaCache, MediaSources};
pub use mc_chunk_writer::{select_writer, ChunkWriter, WriterFrame, WriterOptions};
pub use mc_error::{CoreError, CoreResult, ResultExt};
pub use mc_frame_provider::{
    make_frame_provider, ChunkStorage, DataWithMeta, FrameData, FrameOutputType, FrameProvider, FrameSource,
    JobFrameProvider, SegmentFrameProvider, TaskFrameProvider,
};
pub use mc_manifest::{FileImageManifestReader, ManifestEntry, ManifestReader, VideoManifest};
pub use mc_media_reader::{make_media_reader, DecodedFrame, FrameBody, MediaReader, RawFrame};
pub use mc_types::{
    BlobStore, ChunkType, CloudProvider, CloudStorageBinding, ContextImageRepository, Credentials, Dimension,
    ImageRepository, Job, JobQueue, JobRepository, MediaCoreConfig, Quality, Segment, SegmentKind, SegmentRepository,
    StorageBackend, StorageMethod, Task, TaskRepository,
};
