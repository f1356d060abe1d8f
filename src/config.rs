use std::{
    env,
    net::SocketAddr,
    path::{Path, PathBuf},
};

use crate::{
    error::{Result, StemError},
    io::paths::{results_cache_dir, runs_dir},
};

pub const DEFAULT_ADDR: &str = "127.0.0.1:8501";

/// Runtime configuration. Every field can be set from an
/// `EVERYINSTRUMENT_*` environment variable; command-line flags override.
#[derive(Debug, Clone)]
pub struct Config {
    pub cache_dir: PathBuf,
    pub runs_dir: PathBuf,
    /// Python interpreter with the `demucs` package installed.
    pub python: PathBuf,
    pub spleeter: PathBuf,
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub listen_addr: SocketAddr,
    /// Run directories kept when the server starts.
    pub keep_runs: usize,
}

fn var_path(name: &str) -> Option<PathBuf> {
    env::var_os(name).filter(|v| !v.is_empty()).map(PathBuf::from)
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let cache_dir = match var_path("EVERYINSTRUMENT_CACHE_DIR") {
            Some(p) => p,
            None => results_cache_dir()?,
        };
        let listen_addr = env::var("EVERYINSTRUMENT_ADDR")
            .unwrap_or_else(|_| DEFAULT_ADDR.to_string())
            .parse()
            .map_err(|e| StemError::InvalidInput(format!("EVERYINSTRUMENT_ADDR: {e}")))?;

        Ok(Self {
            cache_dir,
            runs_dir: var_path("EVERYINSTRUMENT_RUNS_DIR").unwrap_or_else(runs_dir),
            python: var_path("EVERYINSTRUMENT_PYTHON").unwrap_or_else(default_python),
            spleeter: var_path("EVERYINSTRUMENT_SPLEETER").unwrap_or_else(|| "spleeter".into()),
            ffmpeg: var_path("EVERYINSTRUMENT_FFMPEG").unwrap_or_else(|| "ffmpeg".into()),
            ffprobe: var_path("EVERYINSTRUMENT_FFPROBE").unwrap_or_else(|| "ffprobe".into()),
            listen_addr,
            keep_runs: 4,
        })
    }

    /// Configuration rooted at `base`, used by tests and one-off runs.
    pub fn with_root(base: &Path) -> Self {
        Self {
            cache_dir: base.join("cache"),
            runs_dir: base.join("runs"),
            python: default_python(),
            spleeter: "spleeter".into(),
            ffmpeg: "ffmpeg".into(),
            ffprobe: "ffprobe".into(),
            listen_addr: SocketAddr::from(([127, 0, 0, 1], 8501)),
            keep_runs: 4,
        }
    }
}

/// `python` if it is on PATH, otherwise `python3`.
fn default_python() -> PathBuf {
    let found = env::var_os("PATH")
        .map(|paths| {
            env::split_paths(&paths).any(|dir| {
                dir.join("python").is_file() || dir.join("python.exe").is_file()
            })
        })
        .unwrap_or(false);
    if found {
        "python".into()
    } else {
        "python3".into()
    }
}
