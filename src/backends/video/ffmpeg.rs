//! FFmpeg-based video backend implementation

use super::{
    frame::validate_dimensions, ClipInfo, FrameWriter, VideoBackend, WriterSettings,
};
use crate::error::{Result, TranslateError};
use ffmpeg_next as ffmpeg;
use image::RgbImage;
use std::ops::ControlFlow;
use std::path::Path;
use std::sync::OnceLock;

/// FFmpeg-based video backend
#[derive(Debug, Default, Clone, Copy)]
pub struct FFmpegBackend;

impl FFmpegBackend {
    /// Create a new FFmpeg backend, initializing the library once per process
    pub fn new() -> Result<Self> {
        ensure_initialized()?;
        Ok(Self)
    }
}

fn ensure_initialized() -> Result<()> {
    static INIT: OnceLock<std::result::Result<(), String>> = OnceLock::new();
    INIT.get_or_init(|| ffmpeg::init().map_err(|e| e.to_string()))
        .clone()
        .map_err(|e| TranslateError::processing(format!("Failed to initialize FFmpeg: {e}")))
}

/// An opened input with its best video stream and decoder
struct OpenClip {
    input: ffmpeg::format::context::Input,
    stream_index: usize,
    decoder: ffmpeg::decoder::Video,
    fps: f64,
    declared_frames: i64,
}

fn open_clip(path: &Path) -> Result<OpenClip> {
    ensure_initialized()?;
    if !path.is_file() {
        return Err(TranslateError::clip_unreadable(path, "file not found"));
    }

    let input = ffmpeg::format::input(path)
        .map_err(|e| TranslateError::clip_unreadable(path, format!("cannot open container: {e}")))?;

    let (stream_index, fps, declared_frames, parameters) = {
        let stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or_else(|| TranslateError::clip_unreadable(path, "no video stream"))?;
        let mut fps = f64::from(stream.avg_frame_rate());
        if !fps.is_finite() || fps <= 0.0 {
            fps = f64::from(stream.rate());
        }
        (stream.index(), fps, stream.frames(), stream.parameters())
    };

    let decoder = ffmpeg::codec::context::Context::from_parameters(parameters)
        .and_then(|ctx| ctx.decoder().video())
        .map_err(|e| TranslateError::clip_unreadable(path, format!("cannot create decoder: {e}")))?;

    validate_dimensions(decoder.width(), decoder.height())
        .map_err(|reason| TranslateError::clip_unreadable(path, reason))?;

    Ok(OpenClip {
        input,
        stream_index,
        decoder,
        fps: if fps.is_finite() && fps > 0.0 { fps } else { 0.0 },
        declared_frames,
    })
}

/// Lazily created RGB24 converter for one decoder
#[derive(Default)]
struct RgbConverter {
    scaler: Option<ffmpeg::software::scaling::Context>,
}

impl RgbConverter {
    fn convert(&mut self, frame: &ffmpeg::frame::Video) -> Result<RgbImage> {
        let (width, height) = (frame.width(), frame.height());
        if self.scaler.is_none() {
            let scaler = ffmpeg::software::scaling::Context::get(
                frame.format(),
                width,
                height,
                ffmpeg::format::Pixel::RGB24,
                width,
                height,
                ffmpeg::software::scaling::Flags::BILINEAR,
            )
            .map_err(|e| TranslateError::processing(format!("Failed to create scaler: {e}")))?;
            self.scaler = Some(scaler);
        }
        let scaler = self
            .scaler
            .as_mut()
            .ok_or_else(|| TranslateError::internal("RGB scaler missing"))?;

        let mut rgb = ffmpeg::frame::Video::empty();
        scaler
            .run(frame, &mut rgb)
            .map_err(|e| TranslateError::processing(format!("Failed to convert frame: {e}")))?;

        // Copy row by row, dropping the line padding FFmpeg adds
        let row_bytes = width as usize * 3;
        let stride = rgb.stride(0);
        let data = rgb.data(0);
        let mut buffer = Vec::with_capacity(row_bytes * height as usize);
        for y in 0..height as usize {
            let row = data
                .get(y * stride..y * stride + row_bytes)
                .ok_or_else(|| TranslateError::processing("Converted frame shorter than expected"))?;
            buffer.extend_from_slice(row);
        }

        RgbImage::from_raw(width, height, buffer)
            .ok_or_else(|| TranslateError::processing("Failed to create RGB image from frame data"))
    }
}

type FrameVisitor<'a> =
    dyn FnMut(usize, &ffmpeg::frame::Video) -> Result<ControlFlow<()>> + 'a;

fn drain_decoder(
    decoder: &mut ffmpeg::decoder::Video,
    decoded: &mut ffmpeg::frame::Video,
    count: &mut usize,
    visit: &mut FrameVisitor<'_>,
) -> Result<ControlFlow<()>> {
    while decoder.receive_frame(decoded).is_ok() {
        let flow = visit(*count, decoded)?;
        *count += 1;
        if flow.is_break() {
            return Ok(ControlFlow::Break(()));
        }
    }
    Ok(ControlFlow::Continue(()))
}

/// Decode `clip` in presentation order until EOF or until `visit` breaks
fn decode_clip(clip: &mut OpenClip, path: &Path, visit: &mut FrameVisitor<'_>) -> Result<usize> {
    let mut decoded = ffmpeg::frame::Video::empty();
    let mut count = 0usize;

    for (stream, packet) in clip.input.packets() {
        if stream.index() != clip.stream_index {
            continue;
        }
        if let Err(e) = clip.decoder.send_packet(&packet) {
            log::warn!("Skipping undecodable packet in {}: {}", path.display(), e);
            continue;
        }
        if drain_decoder(&mut clip.decoder, &mut decoded, &mut count, visit)?.is_break() {
            return Ok(count);
        }
    }

    if clip.decoder.send_eof().is_ok() {
        drain_decoder(&mut clip.decoder, &mut decoded, &mut count, visit)?;
    }

    Ok(count)
}

impl VideoBackend for FFmpegBackend {
    fn probe(&self, path: &Path) -> Result<ClipInfo> {
        let mut clip = open_clip(path)?;
        let (width, height, fps) = (clip.decoder.width(), clip.decoder.height(), clip.fps);

        let frame_count = match usize::try_from(clip.declared_frames) {
            Ok(declared) if declared > 0 => declared,
            // Container does not declare a frame count; count by decoding
            _ => decode_clip(&mut clip, path, &mut |_, _| Ok(ControlFlow::Continue(())))?,
        };

        if frame_count == 0 {
            return Err(TranslateError::clip_unreadable(path, "clip has zero frames"));
        }

        log::debug!(
            "Probed {}: {} frames, {:.2} fps, {}x{}",
            path.display(),
            frame_count,
            fps,
            width,
            height
        );

        Ok(ClipInfo {
            frame_count,
            fps,
            width,
            height,
        })
    }

    fn read_frames(&self, path: &Path, indices: &[usize]) -> Result<Vec<RgbImage>> {
        let mut clip = open_clip(path)?;
        let mut converter = RgbConverter::default();
        let mut frames: Vec<RgbImage> = Vec::with_capacity(indices.len());
        let mut next = 0usize;

        let decoded = decode_clip(&mut clip, path, &mut |position, raw| {
            let mut converted: Option<RgbImage> = None;
            while indices.get(next) == Some(&position) {
                if converted.is_none() {
                    converted = Some(converter.convert(raw)?);
                }
                if let Some(image) = &converted {
                    frames.push(image.clone());
                }
                next += 1;
            }
            if next == indices.len() {
                return Ok(ControlFlow::Break(()));
            }
            Ok(ControlFlow::Continue(()))
        })?;

        if decoded == 0 {
            return Err(TranslateError::clip_unreadable(path, "clip has zero frames"));
        }

        // Declared counts can overshoot what actually decodes; repeat the
        // last sampled frame for the indices past the end
        if frames.len() < indices.len() {
            let last = frames
                .last()
                .cloned()
                .ok_or_else(|| TranslateError::clip_unreadable(path, "no requested frame decoded"))?;
            log::debug!(
                "{} decoded {} frames, padding {} requested frames with the last sampled one",
                path.display(),
                decoded,
                indices.len() - frames.len()
            );
            frames.resize(indices.len(), last);
        }

        Ok(frames)
    }

    fn for_each_frame(
        &self,
        path: &Path,
        visit: &mut dyn FnMut(RgbImage) -> Result<()>,
    ) -> Result<usize> {
        let mut clip = open_clip(path)?;
        let mut converter = RgbConverter::default();

        decode_clip(&mut clip, path, &mut |_, raw| {
            visit(converter.convert(raw)?)?;
            Ok(ControlFlow::Continue(()))
        })
    }

    fn create_writer(
        &self,
        output_path: &Path,
        settings: &WriterSettings,
    ) -> Result<Box<dyn FrameWriter>> {
        ensure_initialized()?;
        Ok(Box::new(FFmpegFrameWriter::create(output_path, settings)?))
    }
}

/// Encoder and muxer for one output clip
pub struct FFmpegFrameWriter {
    output: ffmpeg::format::context::Output,
    encoder: ffmpeg::encoder::video::Encoder,
    scaler: ffmpeg::software::scaling::Context,
    stream_index: usize,
    encoder_time_base: ffmpeg::Rational,
    stream_time_base: ffmpeg::Rational,
    width: u32,
    height: u32,
    next_pts: i64,
}

impl FFmpegFrameWriter {
    /// Open `output_path` for writing with the configured codec
    ///
    /// Falls back to the built-in MPEG-4 encoder when the configured one is
    /// not compiled into the linked FFmpeg.
    pub fn create(output_path: &Path, settings: &WriterSettings) -> Result<Self> {
        let (width, height) = (settings.width, settings.height);
        validate_dimensions(width, height).map_err(TranslateError::invalid_config)?;

        let mut output = ffmpeg::format::output(output_path).map_err(|e| {
            TranslateError::processing(format!(
                "Failed to create output '{}': {e}",
                output_path.display()
            ))
        })?;

        let requested = settings.encoding.codec;
        let (codec, use_preset) = match ffmpeg::encoder::find_by_name(requested.ffmpeg_name()) {
            Some(codec) => (codec, requested.supports_preset()),
            None => {
                log::warn!(
                    "Encoder '{}' not available, falling back to mpeg4",
                    requested.ffmpeg_name()
                );
                let codec = ffmpeg::encoder::find(ffmpeg::codec::Id::MPEG4).ok_or_else(|| {
                    TranslateError::processing("No usable video encoder found in FFmpeg")
                })?;
                (codec, false)
            },
        };

        let frame_rate = frame_rate_rational(settings.fps);
        let time_base = frame_rate.invert();
        let global_header = output
            .format()
            .flags()
            .contains(ffmpeg::format::Flags::GLOBAL_HEADER);

        let stream_index = {
            let stream = output
                .add_stream(codec)
                .map_err(|e| TranslateError::processing(format!("Failed to add stream: {e}")))?;
            stream.index()
        };

        let mut encoder = ffmpeg::codec::context::Context::new_with_codec(codec)
            .encoder()
            .video()
            .map_err(|e| TranslateError::processing(format!("Failed to create encoder: {e}")))?;
        encoder.set_width(width);
        encoder.set_height(height);
        encoder.set_format(ffmpeg::format::Pixel::YUV420P);
        encoder.set_time_base(time_base);
        encoder.set_frame_rate(Some(frame_rate));
        if let Some(kbps) = settings.encoding.bitrate {
            encoder.set_bit_rate(kbps as usize * 1000);
        }
        if global_header {
            encoder.set_flags(ffmpeg::codec::Flags::GLOBAL_HEADER);
        }

        let mut options = ffmpeg::Dictionary::new();
        if use_preset {
            options.set("preset", settings.encoding.preset.ffmpeg_preset());
        }
        let encoder = encoder
            .open_as_with(codec, options)
            .map_err(|e| TranslateError::processing(format!("Failed to open encoder: {e}")))?;

        if let Some(mut stream) = output.stream_mut(stream_index) {
            stream.set_parameters(&encoder);
            stream.set_time_base(time_base);
        }

        output
            .write_header()
            .map_err(|e| TranslateError::processing(format!("Failed to write header: {e}")))?;

        // The muxer may pick its own stream time base while writing the header
        let stream_time_base = output
            .stream(stream_index)
            .map_or(time_base, |stream| stream.time_base());

        let scaler = ffmpeg::software::scaling::Context::get(
            ffmpeg::format::Pixel::RGB24,
            width,
            height,
            ffmpeg::format::Pixel::YUV420P,
            width,
            height,
            ffmpeg::software::scaling::Flags::BILINEAR,
        )
        .map_err(|e| TranslateError::processing(format!("Failed to create scaler: {e}")))?;

        log::debug!(
            "Opened {} for writing: {}x{} @ {:.2} fps",
            output_path.display(),
            width,
            height,
            settings.fps
        );

        Ok(Self {
            output,
            encoder,
            scaler,
            stream_index,
            encoder_time_base: time_base,
            stream_time_base,
            width,
            height,
            next_pts: 0,
        })
    }

    fn write_pending_packets(&mut self) -> Result<()> {
        let mut packet = ffmpeg::Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.stream_index);
            packet.rescale_ts(self.encoder_time_base, self.stream_time_base);
            packet
                .write_interleaved(&mut self.output)
                .map_err(|e| TranslateError::processing(format!("Failed to write packet: {e}")))?;
        }
        Ok(())
    }
}

impl FrameWriter for FFmpegFrameWriter {
    fn write_frame(&mut self, frame: &RgbImage) -> Result<()> {
        if frame.dimensions() != (self.width, self.height) {
            return Err(TranslateError::processing(format!(
                "Frame is {}x{}, writer expects {}x{}",
                frame.width(),
                frame.height(),
                self.width,
                self.height
            )));
        }

        let mut rgb = ffmpeg::frame::Video::new(ffmpeg::format::Pixel::RGB24, self.width, self.height);
        let row_bytes = self.width as usize * 3;
        let stride = rgb.stride(0);
        let data = rgb.data_mut(0);
        for (y, row) in frame.as_raw().chunks_exact(row_bytes).enumerate() {
            data.get_mut(y * stride..y * stride + row_bytes)
                .ok_or_else(|| TranslateError::processing("Frame buffer smaller than expected"))?
                .copy_from_slice(row);
        }

        let mut yuv = ffmpeg::frame::Video::empty();
        self.scaler
            .run(&rgb, &mut yuv)
            .map_err(|e| TranslateError::processing(format!("Failed to convert frame: {e}")))?;
        yuv.set_pts(Some(self.next_pts));
        self.next_pts += 1;

        self.encoder
            .send_frame(&yuv)
            .map_err(|e| TranslateError::processing(format!("Failed to encode frame: {e}")))?;
        self.write_pending_packets()
    }

    fn finish(mut self: Box<Self>) -> Result<u64> {
        self.encoder
            .send_eof()
            .map_err(|e| TranslateError::processing(format!("Failed to flush encoder: {e}")))?;
        self.write_pending_packets()?;
        self.output
            .write_trailer()
            .map_err(|e| TranslateError::processing(format!("Failed to write trailer: {e}")))?;
        Ok(u64::try_from(self.next_pts).unwrap_or_default())
    }
}

/// Rational frame rate with a small denominator, as MPEG-4 limits time bases to 16 bits
fn frame_rate_rational(fps: f64) -> ffmpeg::Rational {
    let millis = (fps * 1000.0).round().clamp(1.0, 1_000_000.0) as i32;
    let divisor = gcd(millis, 1000);
    ffmpeg::Rational::new(millis / divisor, 1000 / divisor)
}

fn gcd(mut a: i32, mut b: i32) -> i32 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a.abs().max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_rate_rational() {
        assert_eq!(frame_rate_rational(30.0), ffmpeg::Rational::new(30, 1));
        assert_eq!(frame_rate_rational(29.97), ffmpeg::Rational::new(2997, 100));
        assert_eq!(frame_rate_rational(25.0).invert(), ffmpeg::Rational::new(1, 25));
    }

    #[test]
    fn test_missing_clip_is_unreadable() {
        let backend = FFmpegBackend::new().unwrap();
        let err = backend.probe(Path::new("/nonexistent/clip.mov")).unwrap_err();
        assert!(matches!(err, TranslateError::ClipUnreadable { .. }));
    }

    #[test]
    fn test_garbage_clip_is_unreadable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.mp4");
        std::fs::write(&path, b"definitely not a video").unwrap();

        let backend = FFmpegBackend::new().unwrap();
        let err = backend.probe(&path).unwrap_err();
        assert!(matches!(err, TranslateError::ClipUnreadable { .. }));
        assert!(backend.read_frames(&path, &[0]).is_err());
    }

    #[test]
    fn test_indices_past_the_end_repeat_last_sampled_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.mp4");
        let backend = FFmpegBackend::new().unwrap();

        let settings = WriterSettings {
            width: 32,
            height: 32,
            fps: 25.0,
            encoding: crate::backends::video::VideoEncodingConfig::default(),
        };
        let mut writer = backend.create_writer(&path, &settings).unwrap();
        for value in [0u8, 120, 240] {
            writer
                .write_frame(&RgbImage::from_pixel(32, 32, image::Rgb([value, value, value])))
                .unwrap();
        }
        assert_eq!(writer.finish().unwrap(), 3);

        let frames = backend.read_frames(&path, &[0, 2, 5, 9]).unwrap();
        assert_eq!(frames.len(), 4);
        assert_eq!(frames[2], frames[1]);
        assert_eq!(frames[3], frames[1]);
        assert_ne!(frames[0], frames[1]);
    }
}
