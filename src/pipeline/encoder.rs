//! External encoder invocation. Every command is built as a typed argument
//! vector and spawned directly, never through a shell.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::process::Command;
use tracing::debug;

use super::error::{ProcessingError, ProcessingResult};
use super::ladder::Variant;

pub const PLAYLIST_NAME: &str = "playlist.m3u8";
pub const SEGMENT_PATTERN: &str = "segment_%03d.ts";
pub const SEGMENT_SECONDS: u32 = 4;
pub const GOP_SIZE: u32 = 48;
pub const AUDIO_BITRATE_KBPS: u32 = 128;
const AUDIO_SAMPLE_RATE: u32 = 48_000;

// Radius scales with the frame so the placeholder is equally unreadable at any size
const BLUR_FILTER: &str =
    "boxblur=luma_radius=min(w\\,h)/8:luma_power=4:chroma_radius=min(cw\\,ch)/8:chroma_power=4";

const STDERR_TAIL_LINES: usize = 20;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SourceInfo {
    pub width: u32,
    pub height: u32,
    pub duration_seconds: Option<f64>,
}

#[async_trait]
pub trait MediaEncoder: Send + Sync {
    /// Inspect the source. Fails with `Input` when it has no usable video stream.
    async fn probe(&self, source: &Path) -> ProcessingResult<SourceInfo>;

    /// Encode one rendition into `variant_dir` as an HLS playlist plus segments.
    async fn encode_variant(
        &self,
        source: &Path,
        variant: &Variant,
        variant_dir: &Path,
    ) -> ProcessingResult<()>;

    /// Write the frame at `at_seconds` as a JPEG.
    async fn extract_frame(&self, source: &Path, at_seconds: f64, output: &Path)
        -> ProcessingResult<()>;

    /// Write a heavily blurred copy of `input`.
    async fn blur_image(&self, input: &Path, output: &Path) -> ProcessingResult<()>;
}

/// Arguments for one HLS rendition.
#[derive(Debug, Clone, PartialEq)]
pub struct HlsEncodeArgs {
    pub source: PathBuf,
    pub variant_dir: PathBuf,
    pub width: u32,
    pub height: u32,
    pub video_bitrate_kbps: u32,
    pub gop_size: u32,
    pub segment_seconds: u32,
    pub audio_bitrate_kbps: u32,
}

impl HlsEncodeArgs {
    pub fn for_variant(source: &Path, variant: &Variant, variant_dir: &Path) -> Self {
        Self {
            source: source.to_path_buf(),
            variant_dir: variant_dir.to_path_buf(),
            width: variant.width,
            height: variant.height,
            video_bitrate_kbps: variant.video_bitrate_kbps,
            gop_size: GOP_SIZE,
            segment_seconds: SEGMENT_SECONDS,
            audio_bitrate_kbps: AUDIO_BITRATE_KBPS,
        }
    }

    pub fn to_args(&self) -> Vec<OsString> {
        let bitrate = format!("{}k", self.video_bitrate_kbps);
        let mut args = common_args();

        args.push("-i".into());
        args.push(self.source.clone().into_os_string());

        push_all(&mut args, &["-vf", &format!("scale={}:{}", self.width, self.height)]);
        push_all(
            &mut args,
            &["-c:v", "libx264", "-profile:v", "main", "-preset", "veryfast", "-pix_fmt", "yuv420p"],
        );
        // Fixed GOP without scene-cut keyframes keeps segment boundaries identical across variants
        push_all(
            &mut args,
            &[
                "-g",
                &self.gop_size.to_string(),
                "-keyint_min",
                &self.gop_size.to_string(),
                "-sc_threshold",
                "0",
            ],
        );
        push_all(
            &mut args,
            &[
                "-b:v",
                &bitrate,
                "-maxrate",
                &bitrate,
                "-bufsize",
                &format!("{}k", self.video_bitrate_kbps * 2),
            ],
        );
        push_all(
            &mut args,
            &[
                "-c:a",
                "aac",
                "-ar",
                &AUDIO_SAMPLE_RATE.to_string(),
                "-b:a",
                &format!("{}k", self.audio_bitrate_kbps),
            ],
        );
        push_all(
            &mut args,
            &[
                "-f",
                "hls",
                "-hls_time",
                &self.segment_seconds.to_string(),
                "-hls_playlist_type",
                "vod",
                "-hls_segment_filename",
            ],
        );
        args.push(self.variant_dir.join(SEGMENT_PATTERN).into_os_string());
        args.push(self.variant_dir.join(PLAYLIST_NAME).into_os_string());

        args
    }
}

fn common_args() -> Vec<OsString> {
    ["-hide_banner", "-nostdin", "-y", "-loglevel", "error"]
        .iter()
        .map(OsString::from)
        .collect()
}

fn push_all(args: &mut Vec<OsString>, values: &[&str]) {
    args.extend(values.iter().map(OsString::from));
}

pub fn frame_args(source: &Path, at_seconds: f64, output: &Path) -> Vec<OsString> {
    let mut args = common_args();
    push_all(&mut args, &["-ss", &format!("{:.3}", at_seconds.max(0.0))]);
    args.push("-i".into());
    args.push(source.as_os_str().to_owned());
    push_all(&mut args, &["-frames:v", "1", "-q:v", "2"]);
    args.push(output.as_os_str().to_owned());
    args
}

pub fn blur_args(input: &Path, output: &Path) -> Vec<OsString> {
    let mut args = common_args();
    args.push("-i".into());
    args.push(input.as_os_str().to_owned());
    push_all(&mut args, &["-vf", BLUR_FILTER, "-q:v", "2"]);
    args.push(output.as_os_str().to_owned());
    args
}

pub fn probe_args(source: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();
    push_all(
        &mut args,
        &[
            "-v",
            "error",
            "-select_streams",
            "v:0",
            "-show_entries",
            "stream=width,height:format=duration",
            "-of",
            "json",
        ],
    );
    args.push(source.as_os_str().to_owned());
    args
}

pub fn parse_probe(stdout: &[u8]) -> ProcessingResult<SourceInfo> {
    let probe: serde_json::Value = serde_json::from_slice(stdout)
        .map_err(|e| ProcessingError::input(format!("unreadable probe output: {}", e)))?;

    let stream = probe["streams"]
        .get(0)
        .ok_or_else(|| ProcessingError::input("source has no video stream"))?;

    let width = stream["width"].as_u64().unwrap_or(0) as u32;
    let height = stream["height"].as_u64().unwrap_or(0) as u32;
    if width == 0 || height == 0 {
        return Err(ProcessingError::input("source video stream has no dimensions"));
    }

    let duration_seconds = probe["format"]["duration"]
        .as_str()
        .and_then(|d| d.parse::<f64>().ok());

    Ok(SourceInfo {
        width,
        height,
        duration_seconds,
    })
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Runs ffmpeg/ffprobe as child processes. Children are killed if the job's
/// future is dropped, so a timed-out job leaves no encoder behind.
#[derive(Debug, Clone)]
pub struct FfmpegEncoder {
    ffmpeg_path: PathBuf,
    ffprobe_path: PathBuf,
}

impl FfmpegEncoder {
    pub fn new(ffmpeg_path: impl Into<PathBuf>, ffprobe_path: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg_path: ffmpeg_path.into(),
            ffprobe_path: ffprobe_path.into(),
        }
    }

    /// Resolve both binaries on `PATH` (or as given) before any job is accepted.
    pub fn locate(ffmpeg: &str, ffprobe: &str) -> Result<Self> {
        let ffmpeg_path = which::which(ffmpeg).with_context(|| format!("ffmpeg not found: '{}'", ffmpeg))?;
        let ffprobe_path =
            which::which(ffprobe).with_context(|| format!("ffprobe not found: '{}'", ffprobe))?;
        Ok(Self::new(ffmpeg_path, ffprobe_path))
    }

    async fn run(&self, program: &Path, args: Vec<OsString>, label: &str) -> ProcessingResult<Output> {
        debug!(program = %program.display(), label = %label, args = ?args, "Spawning encoder process");

        Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                ProcessingError::encode(
                    label,
                    format!("failed to spawn {}: {}", program.display(), e),
                    None,
                )
            })
    }

    async fn run_ffmpeg(&self, args: Vec<OsString>, label: &str) -> ProcessingResult<()> {
        let output = self.run(&self.ffmpeg_path, args, label).await?;
        if !output.status.success() {
            return Err(ProcessingError::encode(
                label,
                format!("ffmpeg exited with {}", output.status),
                Some(stderr_tail(&output.stderr)),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl MediaEncoder for FfmpegEncoder {
    async fn probe(&self, source: &Path) -> ProcessingResult<SourceInfo> {
        let output = self.run(&self.ffprobe_path, probe_args(source), "probe").await?;
        if !output.status.success() {
            return Err(ProcessingError::input(format!(
                "source could not be probed: {}",
                stderr_tail(&output.stderr)
            )));
        }
        parse_probe(&output.stdout)
    }

    async fn encode_variant(
        &self,
        source: &Path,
        variant: &Variant,
        variant_dir: &Path,
    ) -> ProcessingResult<()> {
        let args = HlsEncodeArgs::for_variant(source, variant, variant_dir).to_args();
        self.run_ffmpeg(args, &variant.label).await
    }

    async fn extract_frame(
        &self,
        source: &Path,
        at_seconds: f64,
        output: &Path,
    ) -> ProcessingResult<()> {
        self.run_ffmpeg(frame_args(source, at_seconds, output), "poster").await
    }

    async fn blur_image(&self, input: &Path, output: &Path) -> ProcessingResult<()> {
        self.run_ffmpeg(blur_args(input, output), "blur").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    fn value_after(args: &[String], flag: &str) -> String {
        let pos = args.iter().position(|a| a == flag).unwrap();
        args[pos + 1].clone()
    }

    #[test]
    fn test_hls_args_for_720p() {
        let variant = Variant::new("720p", 1280, 720, 2800);
        let args = HlsEncodeArgs::for_variant(
            Path::new("/staging/src.mp4"),
            &variant,
            Path::new("/staging/job/2"),
        )
        .to_args();
        let args = strings(&args);

        assert_eq!(value_after(&args, "-i"), "/staging/src.mp4");
        assert_eq!(value_after(&args, "-vf"), "scale=1280:720");
        assert_eq!(value_after(&args, "-g"), "48");
        assert_eq!(value_after(&args, "-keyint_min"), "48");
        assert_eq!(value_after(&args, "-sc_threshold"), "0");
        assert_eq!(value_after(&args, "-b:v"), "2800k");
        assert_eq!(value_after(&args, "-maxrate"), "2800k");
        assert_eq!(value_after(&args, "-bufsize"), "5600k");
        assert_eq!(value_after(&args, "-b:a"), "128k");
        assert_eq!(value_after(&args, "-hls_time"), "4");
        assert_eq!(
            value_after(&args, "-hls_segment_filename"),
            "/staging/job/2/segment_%03d.ts"
        );
        assert_eq!(args.last().unwrap(), "/staging/job/2/playlist.m3u8");
    }

    #[test]
    fn test_paths_are_single_arguments() {
        let variant = Variant::new("360p", 640, 360, 800);
        let source = Path::new("/staging/my upload; rm -rf.mp4");
        let args = strings(&HlsEncodeArgs::for_variant(source, &variant, Path::new("/out/0")).to_args());
        assert!(args.contains(&"/staging/my upload; rm -rf.mp4".to_string()));
    }

    #[test]
    fn test_frame_and_blur_args() {
        let args = strings(&frame_args(Path::new("/s.mp4"), 1.0, Path::new("/o/thumb.jpg")));
        assert_eq!(value_after(&args, "-ss"), "1.000");
        assert_eq!(value_after(&args, "-frames:v"), "1");

        let args = strings(&blur_args(Path::new("/o/thumb.jpg"), Path::new("/o/blur.jpg")));
        assert!(value_after(&args, "-vf").starts_with("boxblur="));
        assert_eq!(args.last().unwrap(), "/o/blur.jpg");
    }

    #[test]
    fn test_parse_probe() {
        let info = parse_probe(
            br#"{"programs":[],"streams":[{"width":1280,"height":720}],"format":{"duration":"10.000000"}}"#,
        )
        .unwrap();
        assert_eq!(info.width, 1280);
        assert_eq!(info.height, 720);
        assert_eq!(info.duration_seconds, Some(10.0));

        let err = parse_probe(br#"{"streams":[],"format":{}}"#).unwrap_err();
        assert_eq!(err.kind(), "input");

        assert!(parse_probe(b"garbage").is_err());
    }

    #[test]
    fn test_stderr_tail_keeps_last_lines() {
        let stderr: String = (0..50).map(|i| format!("line {}\n", i)).collect();
        let tail = stderr_tail(stderr.as_bytes());
        assert!(tail.starts_with("line 30"));
        assert!(tail.ends_with("line 49"));
    }
}
