//! ffmpeg/ffprobe front-end.
//!
//! Decoding uploads and encoding stems is delegated entirely to the ffmpeg
//! command-line tools. The [`Transcoder`] trait is the seam the pipeline
//! talks to, so tests can swap in a file-copying double.

use std::{
    ffi::{OsStr, OsString},
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;

use crate::{
    error::{Result, StemError},
    io::process::{run_tool, tool_available},
    types::{AudioInfo, OutputFormat},
};

/// Decodes, probes and encodes audio files.
pub trait Transcoder: Send + Sync {
    fn probe(&self, input: &Path) -> Result<AudioInfo>;

    /// Decode `input` to float32 PCM WAV at `output`. Identical inputs must
    /// produce identical bytes.
    fn normalize(&self, input: &Path, output: &Path) -> Result<()>;

    /// Encode a WAV stem into `format`.
    fn encode(&self, input_wav: &Path, output: &Path, format: OutputFormat) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct FfmpegTranscoder {
    ffmpeg: PathBuf,
    ffprobe: PathBuf,
}

impl Default for FfmpegTranscoder {
    fn default() -> Self {
        Self::new("ffmpeg", "ffprobe")
    }
}

impl FfmpegTranscoder {
    pub fn new(ffmpeg: impl Into<PathBuf>, ffprobe: impl Into<PathBuf>) -> Self {
        Self {
            ffmpeg: ffmpeg.into(),
            ffprobe: ffprobe.into(),
        }
    }

    /// Both ffmpeg and ffprobe run.
    pub fn is_available(&self) -> bool {
        tool_available(self.ffmpeg.as_os_str(), "-version")
            && tool_available(self.ffprobe.as_os_str(), "-version")
    }

    fn ffmpeg(&self, args: Vec<OsString>, what: &str) -> Result<()> {
        let out = run_tool(self.ffmpeg.as_os_str(), args)?;
        if !out.success {
            return Err(StemError::Codec(format!(
                "ffmpeg {what} failed: {}",
                out.failure_message()
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    #[serde(default)]
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    sample_rate: Option<String>,
    channels: Option<u16>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
    format_long_name: Option<String>,
}

fn parse_probe(json: &str) -> Result<AudioInfo> {
    let probe: ProbeOutput = serde_json::from_str(json)?;
    let stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("audio"));
    let format = probe.format.as_ref();

    Ok(AudioInfo {
        duration_secs: format
            .and_then(|f| f.duration.as_deref())
            .and_then(|d| d.parse().ok()),
        sample_rate: stream
            .and_then(|s| s.sample_rate.as_deref())
            .and_then(|r| r.parse().ok()),
        channels: stream.and_then(|s| s.channels),
        format: format.and_then(|f| f.format_long_name.clone()),
    })
}

fn os(args: &[&str]) -> Vec<OsString> {
    args.iter().map(OsString::from).collect()
}

impl Transcoder for FfmpegTranscoder {
    fn probe(&self, input: &Path) -> Result<AudioInfo> {
        let mut args = os(&[
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ]);
        args.push(input.as_os_str().to_owned());

        let out = run_tool(self.ffprobe.as_os_str(), args)?;
        if !out.success {
            return Err(StemError::Codec(format!(
                "ffprobe failed: {}",
                out.failure_message()
            )));
        }
        parse_probe(&out.stdout)
    }

    fn normalize(&self, input: &Path, output: &Path) -> Result<()> {
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut args = os(&["-y", "-i"]);
        args.push(input.as_os_str().to_owned());
        args.extend(os(&[
            "-vn",
            "-acodec",
            "pcm_f32le",
            "-map_metadata",
            "-1",
            "-bitexact",
        ]));
        args.push(output.as_os_str().to_owned());
        self.ffmpeg(args, "conversion")
    }

    fn encode(&self, input_wav: &Path, output: &Path, format: OutputFormat) -> Result<()> {
        if let Some(parent) = output.parent() {
            fs::create_dir_all(parent)?;
        }
        if format == OutputFormat::Wav {
            fs::copy(input_wav, output)?;
            return Ok(());
        }

        let mut args = os(&["-y", "-i"]);
        args.push(input_wav.as_os_str().to_owned());
        args.push(OsStr::new("-vn").to_owned());
        match format {
            OutputFormat::Mp3 => args.extend(os(&["-codec:a", "libmp3lame", "-b:a", "320k"])),
            OutputFormat::Flac => args.extend(os(&["-codec:a", "flac"])),
            OutputFormat::Wav => unreachable!(),
        }
        args.push(output.as_os_str().to_owned());
        self.ffmpeg(args, "export")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_probe_picks_first_audio_stream() {
        let json = r#"{
            "streams": [
                {"codec_type": "video", "width": 600},
                {"codec_type": "audio", "sample_rate": "44100", "channels": 2}
            ],
            "format": {"duration": "30.000000", "format_long_name": "WAV / WAVE (Waveform Audio)"}
        }"#;
        let info = parse_probe(json).unwrap();
        assert_eq!(info.sample_rate, Some(44100));
        assert_eq!(info.channels, Some(2));
        assert_eq!(info.duration_secs, Some(30.0));
        assert_eq!(info.format.as_deref(), Some("WAV / WAVE (Waveform Audio)"));
    }

    #[test]
    fn parse_probe_tolerates_missing_fields() {
        let info = parse_probe("{}").unwrap();
        assert_eq!(info, AudioInfo::default());
    }

    #[test]
    fn missing_ffmpeg_is_reported_as_dependency() {
        let t = FfmpegTranscoder::new("/nonexistent/ffmpeg", "/nonexistent/ffprobe");
        assert!(!t.is_available());
        let err = t
            .normalize(Path::new("in.mp3"), Path::new("out.wav"))
            .unwrap_err();
        assert!(matches!(err, StemError::MissingDependency { .. }));
    }
}
