use std::path::PathBuf;
use std::process::Command;

use ffmpeg_sidecar::command::FfmpegCommand;
use ffmpeg_sidecar::event::FfmpegEvent;

use mc_error::{CoreError, CoreResult};
use mc_manifest::VideoManifest;
use mc_types::VideoDescriptor;

use crate::{require_non_decreasing, DecodedFrame, FrameBody, MediaReader, RawFrame};

/// Decodes frames out of a single container file, accelerated by a
/// byte-offset manifest when one exists; falls back to one linear decode
/// pass when it doesn't, and leaves a freshly built manifest behind for next
/// time (spec §4.1: "best-effort manifest creation afterward").
pub struct VideoReader {
    video: VideoDescriptor,
    manifest_path: Option<PathBuf>,
    ffmpeg_path: Option<String>,
}

impl VideoReader {
    pub fn new(
        video: VideoDescriptor,
        manifest_path: Option<String>,
        ffmpeg_path: Option<String>,
    ) -> Self {
        Self {
            video,
            manifest_path: manifest_path.map(PathBuf::from),
            ffmpeg_path,
        }
    }

    fn load_manifest(&self) -> Option<VideoManifest> {
        let path = self.manifest_path.as_ref()?;
        match VideoManifest::load(path) {
            Ok(manifest) if !manifest.is_empty() => Some(manifest),
            Ok(_) => None,
            Err(err) => {
                tracing::warn!("video manifest at {} unreadable: {err}", path.display());
                None
            }
        }
    }

    fn ffmpeg_command(&self) -> FfmpegCommand {
        let mut cmd = match &self.ffmpeg_path {
            Some(path) => FfmpegCommand::new_with_path(path),
            None => FfmpegCommand::new(),
        };
        cmd.hide_banner();
        cmd
    }

    /// Random-access single-frame decode, using the manifest's byte offset to
    /// skip straight to the frame's sample instead of decoding everything
    /// before it.
    fn decode_at_offset(&self, byte_offset: u64) -> CoreResult<DecodedFrame> {
        let mut cmd = self.ffmpeg_command();
        cmd.args(["-skip_initial_bytes", &byte_offset.to_string()])
            .input(&self.video.path)
            .args(["-vframes", "1"])
            .rawvideo();

        let mut child = cmd
            .spawn()
            .map_err(|e| self.decode_error(format!("failed to spawn ffmpeg: {e}")))?;

        for event in child
            .iter()
            .map_err(|e| self.decode_error(format!("ffmpeg event stream failed: {e}")))?
        {
            if let FfmpegEvent::OutputFrame(frame) = event {
                return Ok(DecodedFrame {
                    width: frame.width,
                    height: frame.height,
                    bgr: frame.data,
                });
            }
        }

        Err(self.decode_error("ffmpeg produced no frame at the requested offset"))
    }

    /// Linear decode of the whole container, used when no usable manifest
    /// exists yet. Returns frames paired with their 0-based decode order,
    /// since that's the only byte-offset-free ordering we have.
    fn decode_linear(&self) -> CoreResult<Vec<DecodedFrame>> {
        let mut cmd = self.ffmpeg_command();
        cmd.input(&self.video.path).rawvideo();

        let mut child = cmd
            .spawn()
            .map_err(|e| self.decode_error(format!("failed to spawn ffmpeg: {e}")))?;

        let mut frames = Vec::new();
        for event in child
            .iter()
            .map_err(|e| self.decode_error(format!("ffmpeg event stream failed: {e}")))?
        {
            if let FfmpegEvent::OutputFrame(frame) = event {
                frames.push(DecodedFrame {
                    width: frame.width,
                    height: frame.height,
                    bgr: frame.data,
                });
            }
        }
        Ok(frames)
    }

    /// Probes per-frame byte offsets with `ffprobe` and persists them, so
    /// later reads of this same file skip straight to `decode_at_offset`.
    fn build_and_save_manifest(&self) {
        let Some(manifest_path) = &self.manifest_path else {
            return;
        };
        match probe_packet_offsets(&self.video.path) {
            Ok(offsets) if !offsets.is_empty() => {
                let manifest = VideoManifest::new(offsets);
                if let Err(err) = manifest.save(manifest_path) {
                    tracing::warn!(
                        "failed to persist video manifest at {}: {err}",
                        manifest_path.display()
                    );
                }
            }
            Ok(_) => tracing::warn!("ffprobe returned no packets for {}", self.video.path),
            Err(err) => tracing::warn!("failed to probe {}: {err}", self.video.path),
        }
    }

    fn decode_error(&self, message: impl Into<String>) -> CoreError {
        CoreError::MediaDecodeError {
            source_name: self.video.path.clone(),
            message: message.into(),
        }
    }
}

impl MediaReader for VideoReader {
    fn iterate<'a>(
        &'a self,
        frame_ids: &[i64],
    ) -> CoreResult<Box<dyn Iterator<Item = CoreResult<RawFrame>> + 'a>> {
        require_non_decreasing(frame_ids)?;

        let frame_ids: Vec<i64> = frame_ids.to_vec();

        if let Some(manifest) = self.load_manifest() {
            if frame_ids.iter().all(|id| manifest.byte_offset(*id).is_some()) {
                let source_name = self.video.path.clone();
                return Ok(Box::new(frame_ids.into_iter().map(move |frame_id| {
                    let offset = manifest.byte_offset(frame_id).expect("checked above");
                    let frame = self.decode_at_offset(offset)?;
                    Ok(RawFrame {
                        frame_id,
                        body: FrameBody::Video(frame),
                        source_name: source_name.clone(),
                        checksum: None,
                    })
                })));
            }
        }

        let decoded = self.decode_linear()?;
        self.build_and_save_manifest();

        let source_name = self.video.path.clone();
        // Decode order equals frame id for a single-video task: the
        // container has no gaps of its own, so position `n` in the linear
        // pass is frame `n`.
        let by_id: std::collections::BTreeMap<i64, DecodedFrame> = decoded
            .into_iter()
            .enumerate()
            .map(|(position, frame)| (position as i64, frame))
            .collect();

        Ok(Box::new(frame_ids.into_iter().map(move |frame_id| {
            let frame = by_id
                .get(&frame_id)
                .cloned()
                .ok_or_else(|| self.decode_error(format!("frame {frame_id} not decoded")))?;
            Ok(RawFrame {
                frame_id,
                body: FrameBody::Video(frame),
                source_name: source_name.clone(),
                checksum: None,
            })
        })))
    }
}

/// Shells to `ffprobe -show_packets` and returns each packet's decode-order
/// position paired with its byte offset (`pos`) in the container.
fn probe_packet_offsets(path: &str) -> CoreResult<std::collections::BTreeMap<i64, u64>> {
    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-select_streams",
            "v:0",
            "-show_entries",
            "packet=pos",
            "-of",
            "json",
        ])
        .arg(path)
        .output()
        .map_err(|e| CoreError::storage(format!("failed to run ffprobe: {e}")))?;

    if !output.status.success() {
        return Err(CoreError::storage(format!(
            "ffprobe exited with {}",
            output.status
        )));
    }

    #[derive(serde::Deserialize)]
    struct Packet {
        pos: String,
    }
    #[derive(serde::Deserialize)]
    struct Probe {
        packets: Vec<Packet>,
    }

    let probe: Probe = serde_json::from_slice(&output.stdout)
        .map_err(|e| CoreError::storage(format!("malformed ffprobe output: {e}")))?;

    let mut offsets = std::collections::BTreeMap::new();
    for (frame_id, packet) in probe.packets.into_iter().enumerate() {
        let offset: u64 = packet
            .pos
            .parse()
            .map_err(|e| CoreError::storage(format!("non-numeric packet pos: {e}")))?;
        offsets.insert(frame_id as i64, offset);
    }
    Ok(offsets)
}
