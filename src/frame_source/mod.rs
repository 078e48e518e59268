//! Frame acquisition from the camera device
//!
//! ## Responsibilities
//!
//! - Abstract the camera behind a lazy, infinite, non-restartable frame
//!   sequence
//! - ffmpeg-based MJPEG capture from V4L2 devices and RTSP URLs
//! - HTTP snapshot-URL polling as the network fallback
//!
//! `Ok(None)` from a source is terminal: the capture device has ended the
//! stream and the pipeline shuts down.

use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use image::RgbImage;
use std::collections::VecDeque;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{ChildStdout, Command};

/// A single captured frame. Owned by the pipeline iteration that captured
/// it and dropped after processing.
pub struct Frame {
    pub image: RgbImage,
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self {
            image,
            captured_at: Utc::now(),
        }
    }
}

/// Camera abstraction: produces frames until the device ends the stream.
#[async_trait]
pub trait FrameSource: Send {
    /// Next frame, or `None` when the stream has ended.
    async fn next_frame(&mut self) -> Result<Option<Frame>>;
}

/// Open the configured video source.
///
/// http(s) URLs are polled as snapshot endpoints; everything else
/// (V4L2 devices, RTSP URLs) goes through ffmpeg.
pub fn open_source(source: &str, fps: u32) -> Result<Box<dyn FrameSource>> {
    if source.starts_with("http://") || source.starts_with("https://") {
        Ok(Box::new(HttpFrameSource::new(source.to_string(), fps)?))
    } else {
        Ok(Box::new(FfmpegFrameSource::spawn(source, fps)?))
    }
}

/// MJPEG capture via an ffmpeg subprocess.
///
/// ffmpeg reads the device/URL and emits one JPEG per frame on stdout;
/// frames are split on the SOI/EOI markers. A frame that fails to decode
/// is skipped with a warning.
pub struct FfmpegFrameSource {
    _child: tokio::process::Child,
    stdout: ChildStdout,
    buf: Vec<u8>,
}

/// Upper bound on buffered stdout before the stream is declared broken.
const MAX_BUFFER_BYTES: usize = 8 * 1024 * 1024;

impl FfmpegFrameSource {
    /// Spawn ffmpeg against the given source.
    pub fn spawn(source: &str, fps: u32) -> Result<Self> {
        let mut cmd = Command::new("ffmpeg");
        cmd.arg("-loglevel").arg("error");
        if source.starts_with("rtsp://") {
            cmd.arg("-rtsp_transport").arg("tcp");
        } else if source.starts_with("/dev/") {
            cmd.arg("-f").arg("v4l2");
        }
        cmd.arg("-i")
            .arg(source)
            .arg("-vf")
            .arg(format!("fps={}", fps.max(1)))
            .arg("-f")
            .arg("image2pipe")
            .arg("-vcodec")
            .arg("mjpeg")
            .arg("-")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::Capture(format!("failed to spawn ffmpeg: {}", e)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Capture("ffmpeg stdout not captured".to_string()))?;

        tracing::info!(source = %source, fps = fps, "ffmpeg frame source started");

        Ok(Self {
            _child: child,
            stdout,
            buf: Vec::with_capacity(256 * 1024),
        })
    }
}

#[async_trait]
impl FrameSource for FfmpegFrameSource {
    async fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            if let Some(jpeg) = split_jpeg(&mut self.buf) {
                match image::load_from_memory(&jpeg) {
                    Ok(img) => return Ok(Some(Frame::new(img.to_rgb8()))),
                    Err(e) => {
                        tracing::warn!(error = %e, bytes = jpeg.len(), "Skipping corrupt MJPEG frame");
                        continue;
                    }
                }
            }

            if self.buf.len() > MAX_BUFFER_BYTES {
                return Err(Error::Capture(
                    "no frame markers in ffmpeg output".to_string(),
                ));
            }

            let mut chunk = [0u8; 64 * 1024];
            let n = self.stdout.read(&mut chunk).await?;
            if n == 0 {
                tracing::warn!("ffmpeg stream ended");
                return Ok(None);
            }
            self.buf.extend_from_slice(&chunk[..n]);
        }
    }
}

/// Pull the first complete JPEG (SOI..EOI) out of the buffer, discarding
/// any leading garbage.
fn split_jpeg(buf: &mut Vec<u8>) -> Option<Vec<u8>> {
    let soi = find_marker(buf, [0xFF, 0xD8])?;
    if soi > 0 {
        buf.drain(..soi);
    }
    let eoi = find_marker(&buf[2..], [0xFF, 0xD9])? + 2;
    Some(buf.drain(..eoi + 2).collect())
}

fn find_marker(buf: &[u8], marker: [u8; 2]) -> Option<usize> {
    buf.windows(2).position(|w| w == marker)
}

/// Consecutive snapshot failures tolerated before the source gives up.
const MAX_SNAPSHOT_FAILURES: u32 = 5;

/// Snapshot-URL polling source for cameras that expose an HTTP still
/// endpoint instead of a stream.
pub struct HttpFrameSource {
    client: reqwest::Client,
    url: String,
    interval: tokio::time::Interval,
    consecutive_failures: u32,
}

impl HttpFrameSource {
    pub fn new(url: String, fps: u32) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        let period = Duration::from_millis((1000 / u64::from(fps.max(1))).max(1));

        Ok(Self {
            client,
            url,
            interval: tokio::time::interval(period),
            consecutive_failures: 0,
        })
    }

    async fn fetch(&self) -> Result<Frame> {
        let resp = self.client.get(&self.url).send().await?;
        if !resp.status().is_success() {
            return Err(Error::Capture(format!(
                "snapshot URL returned {}",
                resp.status()
            )));
        }
        let bytes = resp.bytes().await?;
        let img = image::load_from_memory(&bytes)?;
        Ok(Frame::new(img.to_rgb8()))
    }
}

#[async_trait]
impl FrameSource for HttpFrameSource {
    async fn next_frame(&mut self) -> Result<Option<Frame>> {
        loop {
            self.interval.tick().await;

            match self.fetch().await {
                Ok(frame) => {
                    self.consecutive_failures = 0;
                    return Ok(Some(frame));
                }
                Err(e) => {
                    self.consecutive_failures += 1;
                    tracing::warn!(
                        url = %self.url,
                        error = %e,
                        failures = self.consecutive_failures,
                        "Snapshot fetch failed"
                    );
                    if self.consecutive_failures >= MAX_SNAPSHOT_FAILURES {
                        return Err(Error::Capture(format!(
                            "snapshot URL failed {} times in a row",
                            self.consecutive_failures
                        )));
                    }
                }
            }
        }
    }
}

/// Deterministic source yielding a fixed sequence of frames, then ending
/// the stream. Used by tests and bench harnesses.
pub struct ScriptedFrames {
    frames: VecDeque<Frame>,
}

impl ScriptedFrames {
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames: frames.into(),
        }
    }
}

#[async_trait]
impl FrameSource for ScriptedFrames {
    async fn next_frame(&mut self) -> Result<Option<Frame>> {
        Ok(self.frames.pop_front())
    }
}
