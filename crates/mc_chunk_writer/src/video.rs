use std::io::Write;

use ffmpeg_sidecar::command::FfmpegCommand;

use mc_error::{CoreError, CoreResult};

use crate::{decode_to_bgr, ChunkWriter, WriterFrame, WriterOptions};

/// Re-muxes decoded frames into an MP4 container at effectively lossless
/// quality (`-qp 0`) — the closest a pixel-level writer can get to "preserve
/// the original bytes" once the Media Reader has already decoded them.
pub struct VideoOriginalWriter;

impl ChunkWriter for VideoOriginalWriter {
    fn write(
        &self,
        frames: &mut dyn Iterator<Item = WriterFrame>,
        sink: &mut dyn Write,
        options: &WriterOptions,
    ) -> CoreResult<()> {
        encode(frames, sink, options, &["-qp", "0"])
    }

    fn mime(&self) -> &'static str {
        "video/mp4"
    }
}

/// Re-encodes frames into an MP4 container at a `CRF` derived from the
/// task's `image_quality`.
pub struct VideoCompressedWriter;

impl ChunkWriter for VideoCompressedWriter {
    fn write(
        &self,
        frames: &mut dyn Iterator<Item = WriterFrame>,
        sink: &mut dyn Write,
        options: &WriterOptions,
    ) -> CoreResult<()> {
        let crf = (((100 - options.image_quality as i32) * 51) / 100).clamp(0, 51);
        encode(frames, sink, options, &["-crf", &crf.to_string()])
    }

    fn mime(&self) -> &'static str {
        "video/mp4"
    }
}

fn encode(
    frames: &mut dyn Iterator<Item = WriterFrame>,
    sink: &mut dyn Write,
    options: &WriterOptions,
    quality_args: &[&str],
) -> CoreResult<()> {
    if options.dimension == mc_types::Dimension::Dim3D {
        return Err(CoreError::ChunkWriteError(
            "video writer does not support 3D point-cloud chunks".to_owned(),
        ));
    }

    let raw_path = tempfile::NamedTempFile::new().map_err(CoreError::from)?;
    let out_path = tempfile::Builder::new()
        .suffix(".mp4")
        .tempfile()
        .map_err(CoreError::from)?;

    let mut width = 0u32;
    let mut height = 0u32;
    {
        let mut raw = std::io::BufWriter::new(raw_path.reopen().map_err(CoreError::from)?);
        for frame in frames {
            let decoded = decode_to_bgr(&frame.raw)?;
            if width == 0 {
                width = decoded.width;
                height = decoded.height;
            }
            raw.write_all(&decoded.bgr).map_err(CoreError::from)?;
        }
        raw.flush().map_err(CoreError::from)?;
    }

    if width == 0 {
        return Err(CoreError::ChunkWriteError(
            "no frames were written to the chunk".to_owned(),
        ));
    }

    let mut cmd = FfmpegCommand::new();
    cmd.args(["-f", "rawvideo", "-pix_fmt", "bgr24"])
        .args(["-s", &format!("{width}x{height}")])
        .input(raw_path.path().to_string_lossy())
        .args(["-c:v", "libx264"])
        .args(quality_args)
        .overwrite()
        .output(out_path.path().to_string_lossy());

    let mut child = cmd
        .spawn()
        .map_err(|e| CoreError::ChunkWriteError(format!("failed to spawn ffmpeg: {e}")))?;
    let status = child
        .wait()
        .map_err(|e| CoreError::ChunkWriteError(format!("ffmpeg wait failed: {e}")))?;
    if !status.success() {
        return Err(CoreError::ChunkWriteError(format!(
            "ffmpeg exited with {status}"
        )));
    }

    let encoded = std::fs::read(out_path.path()).map_err(CoreError::from)?;
    sink.write_all(&encoded).map_err(CoreError::from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mc_media_reader::{DecodedFrame, FrameBody, RawFrame};
    use mc_types::Dimension;

    fn ffmpeg_available() -> bool {
        std::process::Command::new("ffmpeg")
            .arg("-version")
            .output()
            .is_ok_and(|o| o.status.success())
    }

    fn video_frame(frame_id: i64) -> WriterFrame {
        WriterFrame {
            position: frame_id as usize,
            raw: RawFrame {
                frame_id,
                body: FrameBody::Video(DecodedFrame {
                    width: 4,
                    height: 4,
                    bgr: vec![frame_id as u8; 4 * 4 * 3],
                }),
                source_name: "source.mp4".to_owned(),
                checksum: None,
            },
        }
    }

    #[test]
    fn compressed_writer_produces_an_mp4_when_ffmpeg_is_available() {
        if !ffmpeg_available() {
            eprintln!("skipping: ffmpeg not found on PATH");
            return;
        }

        let frames = vec![video_frame(0), video_frame(1), video_frame(2)];
        let mut sink = Vec::new();
        VideoCompressedWriter
            .write(
                &mut frames.into_iter(),
                &mut sink,
                &WriterOptions {
                    dimension: Dimension::Dim2D,
                    image_quality: 70,
                },
            )
            .unwrap();

        assert!(!sink.is_empty());
    }

    #[test]
    fn compressed_writer_accepts_an_already_encoded_image_frame() {
        if !ffmpeg_available() {
            eprintln!("skipping: ffmpeg not found on PATH");
            return;
        }

        let mut png = Vec::new();
        image::RgbImage::from_pixel(4, 4, image::Rgb([5, 6, 7]))
            .write_to(&mut std::io::Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();

        let frames = vec![WriterFrame {
            position: 0,
            raw: RawFrame {
                frame_id: 0,
                body: FrameBody::EncodedImage(png),
                source_name: "joined_frame_0.png".to_owned(),
                checksum: None,
            },
        }];
        let mut sink = Vec::new();
        VideoCompressedWriter
            .write(
                &mut frames.into_iter(),
                &mut sink,
                &WriterOptions {
                    dimension: Dimension::Dim2D,
                    image_quality: 70,
                },
            )
            .unwrap();

        assert!(!sink.is_empty());
    }

    #[test]
    fn rejects_3d_dimension() {
        let frames = vec![video_frame(0)];
        let mut sink = Vec::new();
        let result = VideoOriginalWriter.write(
            &mut frames.into_iter(),
            &mut sink,
            &WriterOptions {
                dimension: Dimension::Dim3D,
                image_quality: 70,
            },
        );
        assert!(matches!(result, Err(CoreError::ChunkWriteError(_))));
    }
}
