//! External separation engines.
//!
//! Each engine runs a pretrained model as a subprocess against a normalized
//! WAV file and maps the files it writes to named stems. The models are
//! opaque: all this module knows is the command line and the output layout.

use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
};

use crate::{
    error::{Result, StemError},
    io::process::run_tool,
    model::registry::FALLBACK_MODEL,
    types::{Device, EngineKind, Stem, StemsMode},
};

/// One invocation of an engine.
#[derive(Debug, Clone, Copy)]
pub struct SeparationJob<'a> {
    pub input_wav: &'a Path,
    /// Scratch directory owned by this engine for this job.
    pub work_dir: &'a Path,
    pub model: &'a str,
    pub stems: StemsMode,
    pub device: Device,
}

/// Stems an engine produced, named as in [`StemsMode::stem_names`], plus the
/// tool's captured output.
#[derive(Debug, Clone)]
pub struct EngineOutput {
    pub stems: Vec<Stem>,
    /// Present for vocal splits even when the mode only returns the
    /// instrumental, so residual suppression can use it.
    pub vocals: Option<PathBuf>,
    pub log: String,
}

pub trait SeparationEngine: Send + Sync {
    fn kind(&self) -> EngineKind;

    /// Model this engine runs for `requested`. Engines with a single fixed
    /// model ignore the argument.
    fn model_for<'a>(&self, requested: &'a str) -> &'a str {
        requested
    }

    fn separate(&self, job: &SeparationJob<'_>) -> Result<EngineOutput>;
}

fn engine_error(kind: EngineKind, message: impl Into<String>) -> StemError {
    StemError::Engine {
        engine: kind.to_string(),
        message: message.into(),
    }
}

/// Finds the first directory named `name` under `root`, breadth first.
fn find_dir(root: &Path, name: &str) -> Option<PathBuf> {
    let mut queue = vec![root.to_path_buf()];
    while !queue.is_empty() {
        let mut next = Vec::new();
        for dir in queue {
            let Ok(entries) = fs::read_dir(&dir) else {
                continue;
            };
            let mut children: Vec<PathBuf> = entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| p.is_dir())
                .collect();
            children.sort();
            if let Some(hit) = children
                .iter()
                .find(|p| p.file_name().and_then(|n| n.to_str()) == Some(name))
            {
                return Some(hit.clone());
            }
            next.extend(children);
        }
        queue = next;
    }
    None
}

fn track_name(input: &Path) -> String {
    input
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("input")
        .to_string()
}

/// Maps the files of a vocals/non-vocals split onto the requested mode.
fn map_vocal_split(
    kind: EngineKind,
    stem_dir: &Path,
    stems: StemsMode,
    log: String,
) -> Result<EngineOutput> {
    let vocals = stem_dir.join("vocals.wav");
    let rest = ["no_vocals.wav", "accompaniment.wav"]
        .iter()
        .map(|f| stem_dir.join(f))
        .find(|p| p.exists());

    let rest = match rest {
        Some(r) if vocals.exists() => r,
        _ => return Err(engine_error(kind, "expected two-stem outputs missing")),
    };

    let stems = match stems {
        StemsMode::Instrumental => vec![Stem {
            name: "instrumental".into(),
            path: rest,
        }],
        _ => vec![
            Stem {
                name: "vocals".into(),
                path: vocals.clone(),
            },
            Stem {
                name: "accompaniment".into(),
                path: rest,
            },
        ],
    };
    Ok(EngineOutput {
        stems,
        vocals: Some(vocals),
        log,
    })
}

/// `python -m demucs.separate`.
#[derive(Debug, Clone)]
pub struct DemucsEngine {
    python: PathBuf,
}

impl DemucsEngine {
    pub fn new(python: impl Into<PathBuf>) -> Self {
        Self {
            python: python.into(),
        }
    }

    fn args(&self, job: &SeparationJob<'_>) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-m".into(),
            "demucs.separate".into(),
            "-n".into(),
            job.model.into(),
            "-o".into(),
            job.work_dir.as_os_str().to_owned(),
        ];
        if job.stems.is_vocal_split() {
            args.push("--two-stems".into());
            args.push("vocals".into());
        }
        args.push("-d".into());
        args.push(job.device.as_str().into());
        args.push(job.input_wav.as_os_str().to_owned());
        args
    }
}

impl SeparationEngine for DemucsEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Demucs
    }

    fn separate(&self, job: &SeparationJob<'_>) -> Result<EngineOutput> {
        fs::create_dir_all(job.work_dir)?;
        let out = run_tool(self.python.as_os_str(), self.args(job))?;
        if !out.success {
            return Err(engine_error(self.kind(), out.failure_message()));
        }
        let log = out.combined();

        let stem_dir = find_dir(job.work_dir, &track_name(job.input_wav))
            .ok_or_else(|| engine_error(self.kind(), "Demucs output not found"))?;

        if job.stems.is_vocal_split() {
            return map_vocal_split(self.kind(), &stem_dir, job.stems, log);
        }

        let mut stems = Vec::with_capacity(4);
        for name in StemsMode::FourStems.stem_names() {
            let path = stem_dir.join(format!("{name}.wav"));
            if !path.exists() {
                return Err(engine_error(self.kind(), format!("missing stem {name}")));
            }
            stems.push(Stem {
                name: (*name).to_string(),
                path,
            });
        }
        let vocals = stems.first().map(|s| s.path.clone());
        Ok(EngineOutput { stems, vocals, log })
    }
}

/// `spleeter separate -p spleeter:2stems`. Only supports vocal splits.
#[derive(Debug, Clone)]
pub struct SpleeterEngine {
    program: PathBuf,
}

impl SpleeterEngine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl SeparationEngine for SpleeterEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Spleeter
    }

    fn model_for<'a>(&self, _requested: &'a str) -> &'a str {
        FALLBACK_MODEL
    }

    fn separate(&self, job: &SeparationJob<'_>) -> Result<EngineOutput> {
        if !job.stems.is_vocal_split() {
            return Err(engine_error(self.kind(), "only two-stem separation is supported"));
        }
        fs::create_dir_all(job.work_dir)?;
        let args: Vec<OsString> = vec![
            "separate".into(),
            "-o".into(),
            job.work_dir.as_os_str().to_owned(),
            "-p".into(),
            FALLBACK_MODEL.into(),
            job.input_wav.as_os_str().to_owned(),
        ];
        let out = run_tool(self.program.as_os_str(), args)?;
        if !out.success {
            return Err(engine_error(self.kind(), out.failure_message()));
        }
        let stem_dir = job.work_dir.join(track_name(job.input_wav));
        map_vocal_split(self.kind(), &stem_dir, job.stems, out.combined())
            .map_err(|_| engine_error(self.kind(), "Spleeter output missing"))
    }
}

/// Asks the model runtime whether torch can see a CUDA device.
pub fn cuda_available(python: &Path) -> bool {
    match run_tool(
        python.as_os_str(),
        ["-c", "import torch; print(torch.cuda.is_available())"],
    ) {
        Ok(out) => out.success && out.stdout.trim() == "True",
        Err(_) => false,
    }
}
