use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, trace, warn};

use tomecast_core::TranscodeVariant;

use super::cache::{CacheLayout, SEGMENT_PATTERN};
use super::transcoder::{ProgressSink, TranscodeError, Transcoder};

const STDERR_TAIL_LINES: usize = 20;

/// Encoder settings for one variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioProfile {
    pub bitrate_kbps: u32,
    /// Channel layouts ffmpeg may pick from, closest match wins.
    pub channel_layouts: &'static str,
}

impl AudioProfile {
    pub fn for_variant(variant: TranscodeVariant) -> Self {
        match variant {
            TranscodeVariant::Stereo => Self {
                bitrate_kbps: 128,
                channel_layouts: "stereo",
            },
            TranscodeVariant::Spatial => Self {
                bitrate_kbps: 384,
                channel_layouts: "5.1|5.0|quad|stereo|mono",
            },
        }
    }
}

/// Runs the system ffmpeg binary to produce AAC HLS output.
#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    ffmpeg_path: String,
    ffprobe_path: String,
    segment_seconds: u32,
}

impl FfmpegTranscoder {
    pub fn new(
        ffmpeg_path: impl Into<String>,
        ffprobe_path: impl Into<String>,
        segment_seconds: u32,
    ) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
            segment_seconds: segment_seconds.max(1),
        }
    }

    pub fn build_command(
        &self,
        source: &Path,
        variant: TranscodeVariant,
        output_dir: &Path,
    ) -> Command {
        let profile = AudioProfile::for_variant(variant);
        let mut cmd = Command::new(&self.ffmpeg_path);

        cmd.arg("-hide_banner")
            .arg("-nostdin")
            .arg("-nostats")
            .arg("-y")
            .arg("-i")
            .arg(source)
            .args(["-map", "0:a:0", "-vn"])
            .args(["-c:a", "aac", "-profile:a", "aac_low"])
            .arg("-b:a")
            .arg(format!("{}k", profile.bitrate_kbps))
            .arg("-af")
            .arg(format!("aformat=channel_layouts={}", profile.channel_layouts))
            .args(["-f", "hls"])
            .arg("-hls_time")
            .arg(self.segment_seconds.to_string())
            .args(["-hls_playlist_type", "vod"])
            .args(["-hls_segment_type", "mpegts"])
            .arg("-hls_segment_filename")
            .arg(output_dir.join(SEGMENT_PATTERN))
            .args(["-progress", "pipe:1"])
            .arg(CacheLayout::manifest_path(output_dir));

        cmd
    }

    /// Source duration in seconds, if ffprobe can tell.
    async fn probe_duration(&self, source: &Path) -> Option<f64> {
        let output = Command::new(&self.ffprobe_path)
            .args(["-v", "error"])
            .args(["-show_entries", "format=duration"])
            .args(["-of", "default=noprint_wrappers=1:nokey=1"])
            .arg(source)
            .stdin(Stdio::null())
            .output()
            .await;

        match output {
            Ok(output) if output.status.success() => {
                parse_probe_duration(&String::from_utf8_lossy(&output.stdout))
            }
            Ok(output) => {
                debug!(status = ?output.status, "ffprobe could not read duration");
                None
            }
            Err(err) => {
                warn!(error = %err, path = %self.ffprobe_path, "failed to run ffprobe");
                None
            }
        }
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn transcode(
        &self,
        source: &Path,
        variant: TranscodeVariant,
        output_dir: &Path,
        progress: ProgressSink,
    ) -> Result<(), TranscodeError> {
        let duration = self.probe_duration(source).await;
        let mut cmd = self.build_command(source, variant, output_dir);
        debug!(command = ?cmd, "starting ffmpeg");

        let mut child = cmd
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(TranscodeError::Spawn)?;

        let stderr_task = child
            .stderr
            .take()
            .map(|stderr| tokio::spawn(collect_tail(stderr, STDERR_TAIL_LINES)));

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next_line().await? {
                match parse_progress_line(&line) {
                    Some(ProgressEvent::OutTime(elapsed)) => {
                        if let Some(percent) = percent_of(elapsed, duration) {
                            trace!(percent, "ffmpeg progress");
                            progress.report(percent);
                        }
                    }
                    Some(ProgressEvent::End) => progress.report(100),
                    None => {}
                }
            }
        }

        let status = child.wait().await?;
        let stderr = match stderr_task {
            Some(task) => task.await.unwrap_or_default(),
            None => String::new(),
        };

        if !status.success() {
            return Err(TranscodeError::Exit {
                code: status.code(),
                stderr,
            });
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProgressEvent {
    OutTime(Duration),
    End,
}

/// Parse one `key=value` line of `-progress` output.
pub fn parse_progress_line(line: &str) -> Option<ProgressEvent> {
    let (key, value) = line.trim().split_once('=')?;
    let value = value.trim();
    match key.trim() {
        // ffmpeg writes microseconds under both keys.
        "out_time_us" | "out_time_ms" => value
            .parse::<u64>()
            .ok()
            .map(|us| ProgressEvent::OutTime(Duration::from_micros(us))),
        "out_time" => parse_time_to_seconds(value)
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            .map(ProgressEvent::OutTime),
        "progress" if value == "end" => Some(ProgressEvent::End),
        _ => None,
    }
}

/// `HH:MM:SS.micro` to seconds.
fn parse_time_to_seconds(time_str: &str) -> Option<f64> {
    let parts: Vec<&str> = time_str.split(':').collect();
    if parts.len() == 3 {
        let hours = parts[0].parse::<f64>().ok()?;
        let minutes = parts[1].parse::<f64>().ok()?;
        let seconds = parts[2].parse::<f64>().ok()?;
        Some(hours * 3600.0 + minutes * 60.0 + seconds)
    } else {
        None
    }
}

fn parse_probe_duration(output: &str) -> Option<f64> {
    output
        .lines()
        .find_map(|line| line.trim().parse::<f64>().ok())
        .filter(|secs| secs.is_finite() && *secs > 0.0)
}

fn percent_of(elapsed: Duration, total_secs: Option<f64>) -> Option<u8> {
    let total = total_secs?;
    let ratio = (elapsed.as_secs_f64() / total).clamp(0.0, 1.0);
    Some((ratio * 100.0).floor() as u8)
}

async fn collect_tail<R: AsyncRead + Unpin>(reader: R, max_lines: usize) -> String {
    let mut tail = VecDeque::with_capacity(max_lines);
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if tail.len() == max_lines {
            tail.pop_front();
        }
        tail.push_back(line);
    }
    tail.into_iter().collect::<Vec<_>>().join("\n")
}
