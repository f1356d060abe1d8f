#![allow(dead_code)]

use std::{
    f32::consts::PI,
    fs,
    path::Path,
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use everyinstrument::{
    core::audio::write_audio, AudioData, AudioInfo, EngineKind, EngineOutput, OutputFormat,
    Result, SeparationEngine, SeparationJob, Stem, StemError, StemsMode, Transcoder,
};

pub const SR: u32 = 44_100;

pub fn tone(freq: f32, amp: f32, frames: usize) -> AudioData {
    let mut samples = Vec::with_capacity(frames * 2);
    for i in 0..frames {
        let t = i as f32 / SR as f32;
        let s = (2.0 * PI * freq * t).sin() * amp;
        samples.push(s);
        samples.push(s);
    }
    AudioData {
        samples,
        sample_rate: SR,
        channels: 2,
    }
}

pub fn write_tone(path: &Path, freq: f32, amp: f32, frames: usize) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    write_audio(path, &tone(freq, amp, frames)).unwrap();
}

/// Stands in for ffmpeg: normalizing and encoding are plain copies.
pub struct CopyTranscoder;

impl Transcoder for CopyTranscoder {
    fn probe(&self, input: &Path) -> Result<AudioInfo> {
        let r = hound::WavReader::open(input).map_err(|e| StemError::Codec(e.to_string()))?;
        let spec = r.spec();
        Ok(AudioInfo {
            duration_secs: Some(r.duration() as f64 / spec.sample_rate as f64),
            sample_rate: Some(spec.sample_rate),
            channels: Some(spec.channels),
            format: Some("WAV".into()),
        })
    }

    fn normalize(&self, input: &Path, output: &Path) -> Result<()> {
        fs::copy(input, output)?;
        Ok(())
    }

    fn encode(&self, input_wav: &Path, output: &Path, _format: OutputFormat) -> Result<()> {
        fs::create_dir_all(output.parent().unwrap())?;
        fs::copy(input_wav, output)?;
        Ok(())
    }
}

/// A fake engine that writes tone stems, or fails, and counts its calls.
#[derive(Clone)]
pub struct ScriptedEngine {
    pub kind: EngineKind,
    pub fail: bool,
    pub calls: Arc<AtomicUsize>,
}

impl ScriptedEngine {
    pub fn ok(kind: EngineKind) -> Self {
        Self {
            kind,
            fail: false,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(kind: EngineKind) -> Self {
        Self {
            fail: true,
            ..Self::ok(kind)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SeparationEngine for ScriptedEngine {
    fn kind(&self) -> EngineKind {
        self.kind
    }

    fn separate(&self, job: &SeparationJob<'_>) -> Result<EngineOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(StemError::Engine {
                engine: self.kind.to_string(),
                message: "model weights not found".into(),
            });
        }

        let dir = job.work_dir.join("input");
        let vocals = dir.join("vocals.wav");
        write_tone(&vocals, 440.0, 0.5, 4410);

        let stems = match job.stems {
            StemsMode::FourStems => ["vocals", "drums", "bass", "other"]
                .iter()
                .enumerate()
                .map(|(i, name)| {
                    let path = dir.join(format!("{name}.wav"));
                    if *name != "vocals" {
                        write_tone(&path, 110.0 * (i as f32 + 1.0), 0.3, 4410);
                    }
                    Stem {
                        name: (*name).to_string(),
                        path,
                    }
                })
                .collect(),
            mode => {
                let rest = dir.join("no_vocals.wav");
                write_tone(&rest, 220.0, 0.5, 4410);
                let mut stems = Vec::new();
                if mode == StemsMode::TwoStems {
                    stems.push(Stem {
                        name: "vocals".into(),
                        path: vocals.clone(),
                    });
                }
                stems.push(Stem {
                    name: mode.stem_names().last().unwrap().to_string(),
                    path: rest,
                });
                stems
            }
        };

        Ok(EngineOutput {
            stems,
            vocals: Some(vocals),
            log: format!("{} wrote stems for {}", self.kind, job.model),
        })
    }
}
