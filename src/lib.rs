//! # everyinstrument
//!
//! Vocal removal and stem splitting around external separation models.
//! Uploads are normalized with ffmpeg, separated by Demucs (Spleeter as the
//! two-stem fallback), cached on disk by content fingerprint, and packaged
//! for download.

pub mod cache;
pub mod config;
pub mod core;
pub mod error;
pub mod io;
pub mod model;
pub mod server;
pub mod types;

pub use crate::{
    cache::DiskCache,
    config::Config,
    core::{
        engine::{DemucsEngine, EngineOutput, SeparationEngine, SeparationJob, SpleeterEngine},
        invoker::{Invocation, Invoker},
        packager::package_stems,
        splitter::{Separation, Separator},
    },
    error::{Result, StemError},
    io::{
        ffmpeg::{FfmpegTranscoder, Transcoder},
        progress::{set_split_progress_callback, SplitProgress},
    },
    model::registry::{presets, resolve_model},
    types::{
        AudioAsset, AudioData, AudioInfo, Device, EngineKind, OutputFormat, Package, Preset,
        SeparationRequest, SeparationResult, SplitOptions, SplitResult, Stem, StemsMode,
    },
};
