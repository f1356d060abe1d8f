use std::{
    fs,
    path::{Path, PathBuf},
    sync::OnceLock,
};

use tempfile::TempDir;

use crate::{
    cache::DiskCache,
    config::Config,
    core::{
        engine::{cuda_available, DemucsEngine, SpleeterEngine},
        invoker::{Invocation, Invoker},
        packager::package_stems,
    },
    error::{Result, StemError},
    io::{
        crypto::fingerprint_file,
        ffmpeg::{FfmpegTranscoder, Transcoder},
        progress::{emit_split_progress, SplitProgress},
    },
    model::registry::resolve_model,
    types::{AudioAsset, Device, OutputFormat, Package, SeparationResult, SplitOptions, SplitResult},
};

/// A separation that has been looked up in, or added to, the cache.
#[derive(Debug, Clone)]
pub struct Separation {
    pub fingerprint: String,
    pub cache_hit: bool,
    pub result: SeparationResult,
}

/// The whole pipeline: normalize, fingerprint, cache, separate, package.
pub struct Separator {
    transcoder: Box<dyn Transcoder>,
    invoker: Invoker,
    cache: DiskCache,
    python: Option<PathBuf>,
    cuda: OnceLock<bool>,
}

impl Separator {
    pub fn new(transcoder: Box<dyn Transcoder>, invoker: Invoker, cache: DiskCache) -> Self {
        Self {
            transcoder,
            invoker,
            cache,
            python: None,
            cuda: OnceLock::new(),
        }
    }

    /// ffmpeg, Demucs with Spleeter fallback, and the configured cache dir.
    pub fn from_config(cfg: &Config) -> Self {
        let invoker = Invoker::new(
            Box::new(DemucsEngine::new(&cfg.python)),
            Some(Box::new(SpleeterEngine::new(&cfg.spleeter))),
        );
        let mut sep = Self::new(
            Box::new(FfmpegTranscoder::new(&cfg.ffmpeg, &cfg.ffprobe)),
            invoker,
            DiskCache::new(&cfg.cache_dir),
        );
        sep.python = Some(cfg.python.clone());
        sep
    }

    /// Pins GPU availability instead of asking the python runtime.
    pub fn with_cuda_available(self, available: bool) -> Self {
        let _ = self.cuda.set(available);
        self
    }

    pub fn cache(&self) -> &DiskCache {
        &self.cache
    }

    pub fn cuda_available(&self) -> bool {
        *self.cuda.get_or_init(|| match &self.python {
            Some(python) => cuda_available(python),
            None => false,
        })
    }

    fn device(&self, use_gpu: bool) -> Device {
        if use_gpu && self.cuda_available() {
            Device::Cuda
        } else {
            Device::Cpu
        }
    }

    fn scratch(&self) -> Result<TempDir> {
        Ok(tempfile::Builder::new()
            .prefix("everyinstrument_")
            .tempdir()?)
    }

    /// Wraps an upload and attaches its metadata. A file ffprobe cannot read
    /// is still accepted; the normalizer decides whether it is usable.
    pub fn ingest(&self, name: &str, bytes: Vec<u8>) -> Result<AudioAsset> {
        let asset = AudioAsset::new(name, bytes)?;
        let tmp = self.scratch()?;
        let path = tmp.path().join(asset.name());
        fs::write(&path, asset.bytes())?;
        match self.transcoder.probe(&path) {
            Ok(info) => Ok(asset.with_info(info)),
            Err(e @ StemError::MissingDependency { .. }) => Err(e),
            Err(e) => {
                log::warn!("Could not read audio metadata for {}: {e}", asset.name());
                Ok(asset)
            }
        }
    }

    /// Normalizes `asset` and returns the cached separation for it, running
    /// the engines on a miss.
    pub fn separate(&self, asset: &AudioAsset, opts: &SplitOptions) -> Result<Separation> {
        let tmp = self.scratch()?;
        // The upload keeps its own directory so its name can never collide
        // with the normalized file.
        let upload_dir = tmp.path().join("upload");
        fs::create_dir_all(&upload_dir)?;
        let upload = upload_dir.join(asset.name());
        fs::write(&upload, asset.bytes())?;

        emit_split_progress(SplitProgress::Stage("normalize"));
        let input_wav = tmp.path().join("input.wav");
        self.transcoder.normalize(&upload, &input_wav)?;

        emit_split_progress(SplitProgress::Stage("cache_lookup"));
        let request = opts.request();
        let fingerprint = fingerprint_file(&input_wav, &request)?;

        let (result, cache_hit) = self.cache.get_or_compute(&fingerprint, &request, || {
            emit_split_progress(SplitProgress::Stage("separate"));
            let work_dir = tmp.path().join("separation");
            self.invoker.run(&Invocation {
                input_wav: &input_wav,
                work_dir: &work_dir,
                model: resolve_model(opts.preset),
                stems: opts.stems,
                device: self.device(opts.use_gpu),
                residual_suppression: opts.residual_suppression,
            })
        })?;

        if cache_hit {
            log::info!("cache hit {fingerprint}");
            emit_split_progress(SplitProgress::CacheHit {
                fingerprint: fingerprint.clone(),
            });
        } else {
            log::info!(
                "separated {} with {} into {} stems",
                asset.name(),
                result.engine,
                result.stems.len()
            );
        }

        Ok(Separation {
            fingerprint,
            cache_hit,
            result,
        })
    }

    pub fn package(
        &self,
        separation: &Separation,
        format: OutputFormat,
        exports_dir: &Path,
    ) -> Result<Package> {
        emit_split_progress(SplitProgress::Stage("package"));
        package_stems(
            self.transcoder.as_ref(),
            &separation.result.stems,
            format,
            exports_dir,
        )
    }

    /// Separates and packages into `exports_dir`.
    pub fn process(
        &self,
        asset: &AudioAsset,
        opts: &SplitOptions,
        exports_dir: &Path,
    ) -> Result<SplitResult> {
        let separation = self.separate(asset, opts)?;
        let package = self.package(&separation, opts.output_format, exports_dir)?;
        emit_split_progress(SplitProgress::Finished);

        Ok(SplitResult {
            fingerprint: separation.fingerprint,
            cache_hit: separation.cache_hit,
            options: opts.clone(),
            separation: separation.result,
            package,
        })
    }

    /// Reads `input` from disk and runs [`Separator::process`].
    pub fn split_file(
        &self,
        input: &Path,
        opts: &SplitOptions,
        exports_dir: &Path,
    ) -> Result<SplitResult> {
        let bytes =
            fs::read(input).map_err(|e| anyhow::anyhow!("Failed to read {}: {e}", input.display()))?;
        let name = input
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StemError::InvalidInput(format!("bad path {}", input.display())))?;
        let asset = AudioAsset::new(name, bytes)?;
        self.process(&asset, opts, exports_dir)
    }
}
