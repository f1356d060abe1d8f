use std::path::Path;

use crate::{
    core::{
        audio::{suppress_residuals, RESIDUAL_STRENGTH},
        engine::{EngineOutput, SeparationEngine, SeparationJob},
    },
    error::{Result, StemError},
    io::progress::{emit_split_progress, SplitProgress},
    types::{Device, EngineKind, SeparationResult, Stem, StemsMode},
};

/// Line-oriented log shared between the engines of one request.
#[derive(Default)]
struct RunLog(Vec<String>);

impl RunLog {
    fn push(&mut self, line: impl Into<String>) {
        let line = line.into();
        log::debug!("{line}");
        emit_split_progress(SplitProgress::Log(line.clone()));
        self.0.push(line);
    }

    fn push_output(&mut self, output: &str) {
        if !output.trim().is_empty() {
            self.0.push(output.trim_end().to_string());
        }
    }

    fn finish(self) -> String {
        self.0.join("\n")
    }
}

/// Inputs for one separation, already normalized and resolved.
#[derive(Debug, Clone, Copy)]
pub struct Invocation<'a> {
    pub input_wav: &'a Path,
    pub work_dir: &'a Path,
    pub model: &'a str,
    pub stems: StemsMode,
    pub device: Device,
    pub residual_suppression: bool,
}

/// Runs the primary engine and, for two-stem requests only, the fallback.
pub struct Invoker {
    primary: Box<dyn SeparationEngine>,
    fallback: Option<Box<dyn SeparationEngine>>,
}

impl Invoker {
    pub fn new(
        primary: Box<dyn SeparationEngine>,
        fallback: Option<Box<dyn SeparationEngine>>,
    ) -> Self {
        Self { primary, fallback }
    }

    pub fn run(&self, inv: &Invocation<'_>) -> Result<SeparationResult> {
        let mut log = RunLog::default();
        let file_name = inv
            .input_wav
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let primary = self.primary.as_ref();
        let primary_model = primary.model_for(inv.model);
        log.push(format!(
            "Running {} ({primary_model}) on {file_name}",
            primary.kind()
        ));
        let attempt = primary.separate(&SeparationJob {
            input_wav: inv.input_wav,
            work_dir: &inv.work_dir.join(engine_dir(primary)),
            model: primary_model,
            stems: inv.stems,
            device: inv.device,
        });

        let (engine, model, output) = match attempt {
            Ok(out) => (primary, primary_model, out),
            Err(primary_err) => {
                log.push(failure_line(primary.kind(), &primary_err));
                let fallback = match (&self.fallback, inv.stems) {
                    (Some(f), StemsMode::TwoStems) => f.as_ref(),
                    _ => {
                        return Err(StemError::Separation { log: log.finish() });
                    }
                };

                let fallback_model = fallback.model_for(inv.model);
                log.push(format!("Falling back to {} 2-stems", fallback.kind()));
                let out = fallback
                    .separate(&SeparationJob {
                        input_wav: inv.input_wav,
                        work_dir: &inv.work_dir.join(engine_dir(fallback)),
                        model: fallback_model,
                        stems: inv.stems,
                        device: inv.device,
                    })
                    .map_err(|e| {
                        log.push(failure_line(fallback.kind(), &e));
                        StemError::Separation {
                            log: std::mem::take(&mut log).finish(),
                        }
                    })?;
                (fallback, fallback_model, out)
            }
        };

        log.push_output(&output.log);
        let stems = self.post_process(inv, output, &mut log)?;

        Ok(SeparationResult {
            engine: engine.kind(),
            model: model.to_string(),
            stems,
            log: log.finish(),
        })
    }

    fn post_process(
        &self,
        inv: &Invocation<'_>,
        output: EngineOutput,
        log: &mut RunLog,
    ) -> Result<Vec<Stem>> {
        let mut stems = output.stems;
        if !inv.residual_suppression {
            return Ok(stems);
        }
        let Some(vocals) = output.vocals else {
            return Ok(stems);
        };
        let Some(idx) = stems
            .iter()
            .position(|s| s.name == "instrumental" || s.name == "accompaniment")
        else {
            return Ok(stems);
        };
        let rest = &mut stems[idx];

        let cleaned = inv
            .work_dir
            .join("post")
            .join(format!("{}_clean.wav", rest.name));
        suppress_residuals(&rest.path, &vocals, &cleaned, RESIDUAL_STRENGTH)?;
        rest.path = cleaned;
        log.push("Applied light residual suppression");
        Ok(stems)
    }
}

fn failure_line(kind: EngineKind, err: &StemError) -> String {
    match err {
        StemError::Engine { .. } => err.to_string(),
        other => format!("{kind} failed: {other}"),
    }
}

fn engine_dir(engine: &dyn SeparationEngine) -> &'static str {
    match engine.kind() {
        EngineKind::Demucs => "demucs",
        EngineKind::Spleeter => "spleeter",
    }
}
