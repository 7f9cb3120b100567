//! Data model for the media chunking and frame-serving core.
//!
//! This crate only holds plain data and the narrow traits the core is
//! consumed through (spec §3, §6); it knows nothing about decoding, encoding
//! or caching.

mod cloud;
mod config;
mod job;
mod repository;
mod segment;
mod task;

pub use cloud::{CloudProvider, CloudStorageBinding, Credentials, ManifestDescriptor};
pub use config::MediaCoreConfig;
pub use job::Job;
pub use repository::{
    BlobStore, ContextImageRepository, ImageRepository, JobQueue, JobRepository,
    SegmentRepository, TaskRepository,
};
pub use segment::{Segment, SegmentKind};
pub use task::{div_ceil, ChunkType, Dimension, ImageDescriptor, Quality, StorageBackend, StorageMethod, Task, VideoDescriptor};
