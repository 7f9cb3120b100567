//! A JSON-described task used to exercise [`media_core`] without a database
//! or cloud storage behind it — enough to drive `get-chunk`/`get-frame` by
//! hand while developing against this crate.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use serde::Deserialize;

use media_core::{
    ChunkType, ContextImageRepository, CoreResult, Dimension, ImageRepository, Segment, SegmentKind,
    SegmentRepository, StorageBackend, StorageMethod, Task, TaskRepository,
};

#[derive(Deserialize)]
pub struct FixtureFile {
    task: FixtureTask,
    segments: Vec<FixtureSegment>,
}

#[derive(Deserialize)]
struct FixtureTask {
    id: i64,
    start_frame: i64,
    stop_frame: i64,
    frame_step: i64,
    chunk_size: i64,
    dimension: FixtureDimension,
    chunk_type: FixtureChunkType,
    image_quality: u8,
    /// Directory of already-ordered image files, one per valid frame id.
    images_dir: Option<PathBuf>,
}

#[derive(Deserialize)]
enum FixtureDimension {
    #[serde(rename = "2d")]
    Dim2D,
    #[serde(rename = "3d")]
    Dim3D,
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum FixtureChunkType {
    Video,
    Imageset,
}

#[derive(Deserialize)]
struct FixtureSegment {
    id: i64,
    kind: FixtureSegmentKind,
    frame_ids: Vec<i64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum FixtureSegmentKind {
    Range,
    SpecificFrames,
}

pub struct Fixture {
    pub task: Arc<Task>,
    pub tasks: Arc<dyn TaskRepository>,
    pub segments: Arc<dyn SegmentRepository>,
    pub images: Arc<dyn ImageRepository>,
    pub context_images: Arc<dyn ContextImageRepository>,
}

pub fn load(path: &std::path::Path) -> Result<Fixture> {
    let bytes = std::fs::read(path).with_context(|| format!("reading fixture {}", path.display()))?;
    let file: FixtureFile = serde_json::from_slice(&bytes).with_context(|| "parsing fixture JSON")?;

    let chunk_type = match file.task.chunk_type {
        FixtureChunkType::Video => ChunkType::Video,
        FixtureChunkType::Imageset => ChunkType::Imageset,
    };
    let dimension = match file.task.dimension {
        FixtureDimension::Dim2D => Dimension::Dim2D,
        FixtureDimension::Dim3D => Dimension::Dim3D,
    };

    let task = Arc::new(Task {
        id: file.task.id,
        start_frame: file.task.start_frame,
        stop_frame: file.task.stop_frame,
        frame_step: file.task.frame_step,
        chunk_size: file.task.chunk_size,
        dimension,
        storage: StorageBackend::Local,
        storage_method: StorageMethod::Cache,
        original_chunk_type: chunk_type,
        compressed_chunk_type: chunk_type,
        image_quality: file.task.image_quality,
        video: None,
        manifest_path: None,
    });

    let segments: Vec<Arc<Segment>> = file
        .segments
        .into_iter()
        .map(|s| {
            Arc::new(Segment {
                id: s.id,
                task_id: task.id,
                kind: match s.kind {
                    FixtureSegmentKind::Range => SegmentKind::Range,
                    FixtureSegmentKind::SpecificFrames => SegmentKind::SpecificFrames,
                },
                frame_set: s.frame_ids.into_iter().collect::<BTreeSet<i64>>(),
                start_frame: task.start_frame,
            })
        })
        .collect();

    let images_dir = file.task.images_dir.unwrap_or_else(|| PathBuf::from("."));

    Ok(Fixture {
        tasks: Arc::new(StaticTaskRepository(task.clone())),
        segments: Arc::new(StaticSegmentRepository(segments)),
        images: Arc::new(DirectoryImageRepository { dir: images_dir }),
        context_images: Arc::new(NoContextImages),
        task,
    })
}

struct StaticTaskRepository(Arc<Task>);

impl TaskRepository for StaticTaskRepository {
    fn get(&self, task_id: i64) -> CoreResult<Arc<Task>> {
        if task_id == self.0.id {
            Ok(self.0.clone())
        } else {
            Err(media_core::CoreError::not_found(format!("no such task {task_id}")))
        }
    }
}

struct StaticSegmentRepository(Vec<Arc<Segment>>);

impl SegmentRepository for StaticSegmentRepository {
    fn for_task(&self, task_id: i64) -> CoreResult<Vec<Arc<Segment>>> {
        Ok(self.0.iter().filter(|s| s.task_id == task_id).cloned().collect())
    }

    fn get(&self, segment_id: i64) -> CoreResult<Arc<Segment>> {
        self.0
            .iter()
            .find(|s| s.id == segment_id)
            .cloned()
            .ok_or_else(|| media_core::CoreError::not_found(format!("no such segment {segment_id}")))
    }
}

/// Lists a directory's files in sorted order and assigns them to frame ids
/// `0, 1, 2, ...` — the simplest possible stand-in for a real image table.
struct DirectoryImageRepository {
    dir: PathBuf,
}

impl ImageRepository for DirectoryImageRepository {
    fn list(&self, _task_id: i64, frame_range: std::ops::RangeInclusive<i64>) -> CoreResult<Vec<(i64, String)>> {
        let mut entries: Vec<String> = std::fs::read_dir(&self.dir)
            .map_err(media_core::CoreError::from)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path().to_string_lossy().into_owned())
            .collect();
        entries.sort();

        Ok(entries
            .into_iter()
            .enumerate()
            .map(|(frame_id, path)| (frame_id as i64, path))
            .filter(|(frame_id, _)| frame_range.contains(frame_id))
            .collect())
    }
}

struct NoContextImages;

impl ContextImageRepository for NoContextImages {
    fn related_file_paths(&self, _data_id: i64, _frame_number: i64) -> CoreResult<Option<Vec<PathBuf>>> {
        Ok(None)
    }
}
