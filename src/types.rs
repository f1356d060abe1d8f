use std::{fmt, path::Path, path::PathBuf, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::{Result, StemError};

/// Upload extensions the normalizer accepts.
pub const SUPPORTED_INPUT_EXTENSIONS: [&str; 4] = ["mp3", "wav", "m4a", "flac"];

#[derive(Clone, Debug)]
pub struct AudioData {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
    pub channels: u16,
}

/// Metadata reported by ffprobe. Every field is optional because containers
/// are free to omit them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct AudioInfo {
    pub duration_secs: Option<f64>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    pub format: Option<String>,
}

/// An uploaded file. Immutable once ingested.
#[derive(Clone, Debug)]
pub struct AudioAsset {
    name: String,
    bytes: Vec<u8>,
    info: Option<AudioInfo>,
}

impl AudioAsset {
    /// Wraps uploaded bytes, rejecting file types the normalizer does not accept.
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Result<Self> {
        let name = sanitize_file_name(&name.into())?;
        let ext = Path::new(&name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();
        if !SUPPORTED_INPUT_EXTENSIONS.contains(&ext.as_str()) {
            return Err(StemError::UnsupportedFormat(if ext.is_empty() {
                name
            } else {
                ext
            }));
        }
        if bytes.is_empty() {
            return Err(StemError::InvalidInput(format!("{name} is empty")));
        }
        Ok(Self {
            name,
            bytes,
            info: None,
        })
    }

    pub fn with_info(mut self, info: AudioInfo) -> Self {
        self.info = Some(info);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn info(&self) -> Option<&AudioInfo> {
        self.info.as_ref()
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Strips any directory components so an uploaded name can be joined to a
/// working directory safely.
pub fn sanitize_file_name(name: &str) -> Result<String> {
    let base = name
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim();
    if base.is_empty() || base == "." || base == ".." {
        return Err(StemError::InvalidInput(format!("bad file name `{name}`")));
    }
    Ok(base.to_string())
}

/// Quality/speed tier chosen by the user.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Preset {
    Fast,
    Balanced,
    Best,
}

impl Preset {
    pub const ALL: [Preset; 3] = [Preset::Fast, Preset::Balanced, Preset::Best];

    pub fn as_str(self) -> &'static str {
        match self {
            Preset::Fast => "fast",
            Preset::Balanced => "balanced",
            Preset::Best => "best",
        }
    }
}

impl Default for Preset {
    fn default() -> Self {
        Preset::Balanced
    }
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Preset {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fast" => Ok(Preset::Fast),
            "balanced" => Ok(Preset::Balanced),
            "best" => Ok(Preset::Best),
            other => Err(format!(
                "unknown preset `{other}` (expected fast, balanced or best)"
            )),
        }
    }
}

/// Which stems the user asked for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StemsMode {
    /// Vocals removed; a single `instrumental` stem.
    Instrumental,
    /// `vocals` + `accompaniment`.
    TwoStems,
    /// `vocals`, `drums`, `bass`, `other`.
    FourStems,
}

impl StemsMode {
    pub fn as_str(self) -> &'static str {
        match self {
            StemsMode::Instrumental => "instrumental",
            StemsMode::TwoStems => "two_stems",
            StemsMode::FourStems => "four_stems",
        }
    }

    /// Stem names in output order.
    pub fn stem_names(self) -> &'static [&'static str] {
        match self {
            StemsMode::Instrumental => &["instrumental"],
            StemsMode::TwoStems => &["vocals", "accompaniment"],
            StemsMode::FourStems => &["vocals", "drums", "bass", "other"],
        }
    }

    /// The engine is asked for a vocals/non-vocals split.
    pub fn is_vocal_split(self) -> bool {
        !matches!(self, StemsMode::FourStems)
    }
}

impl Default for StemsMode {
    fn default() -> Self {
        StemsMode::Instrumental
    }
}

impl fmt::Display for StemsMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for StemsMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "instrumental" | "1" => Ok(StemsMode::Instrumental),
            "two_stems" | "two" | "2" => Ok(StemsMode::TwoStems),
            "four_stems" | "four" | "4" => Ok(StemsMode::FourStems),
            other => Err(format!(
                "unknown stems mode `{other}` (expected instrumental, two_stems or four_stems)"
            )),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Wav,
    Mp3,
    Flac,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Wav => "wav",
            OutputFormat::Mp3 => "mp3",
            OutputFormat::Flac => "flac",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            OutputFormat::Wav => "audio/wav",
            OutputFormat::Mp3 => "audio/mpeg",
            OutputFormat::Flac => "audio/flac",
        }
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Wav
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.extension())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "wav" => Ok(OutputFormat::Wav),
            "mp3" => Ok(OutputFormat::Mp3),
            "flac" => Ok(OutputFormat::Flac),
            other => Err(format!(
                "unsupported output format `{other}` (expected wav, mp3 or flac)"
            )),
        }
    }
}

/// The external separation tool that produced a result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EngineKind {
    Demucs,
    Spleeter,
}

impl fmt::Display for EngineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(match self {
            EngineKind::Demucs => "Demucs",
            EngineKind::Spleeter => "Spleeter",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Cuda,
}

impl Device {
    pub fn as_str(self) -> &'static str {
        match self {
            Device::Cpu => "cpu",
            Device::Cuda => "cuda",
        }
    }
}

/// Options for one run of the pipeline.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SplitOptions {
    pub preset: Preset,
    pub stems: StemsMode,
    pub output_format: OutputFormat,
    pub use_gpu: bool,
    pub residual_suppression: bool,
}

impl SplitOptions {
    pub fn request(&self) -> SeparationRequest {
        SeparationRequest {
            preset: self.preset,
            stems: self.stems,
            use_gpu: self.use_gpu,
            residual_suppression: self.residual_suppression,
        }
    }
}

/// Parameters that, together with the normalized audio, identify a cache
/// entry. Field order is the serialization order and must stay stable.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeparationRequest {
    pub preset: Preset,
    pub stems: StemsMode,
    pub use_gpu: bool,
    pub residual_suppression: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Stem {
    pub name: String,
    pub path: PathBuf,
}

/// Ordered stems plus the log captured while producing them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SeparationResult {
    pub engine: EngineKind,
    pub model: String,
    pub stems: Vec<Stem>,
    pub log: String,
}

impl SeparationResult {
    pub fn stem(&self, name: &str) -> Option<&Stem> {
        self.stems.iter().find(|s| s.name == name)
    }
}

/// Encoded stems ready for download.
#[derive(Clone, Debug, Serialize)]
pub struct Package {
    pub format: OutputFormat,
    pub files: Vec<Stem>,
    pub archive: Option<PathBuf>,
}

#[derive(Clone, Debug, Serialize)]
pub struct SplitResult {
    pub fingerprint: String,
    pub cache_hit: bool,
    pub options: SplitOptions,
    pub separation: SeparationResult,
    pub package: Package,
}
