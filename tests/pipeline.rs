mod common;

use std::{
    fs,
    sync::{Arc, Mutex},
};

use common::{CopyTranscoder, ScriptedEngine};
use everyinstrument::{
    set_split_progress_callback, AudioAsset, DiskCache, EngineKind, Invoker, OutputFormat, Preset,
    Separator, SplitOptions, SplitProgress, StemError, StemsMode,
};
use tempfile::tempdir;

struct Rig {
    _tmp: tempfile::TempDir,
    root: std::path::PathBuf,
    demucs: ScriptedEngine,
    spleeter: ScriptedEngine,
    separator: Separator,
}

fn rig(demucs: ScriptedEngine) -> Rig {
    let tmp = tempdir().unwrap();
    let root = tmp.path().to_path_buf();
    let spleeter = ScriptedEngine::ok(EngineKind::Spleeter);
    let separator = Separator::new(
        Box::new(CopyTranscoder),
        Invoker::new(Box::new(demucs.clone()), Some(Box::new(spleeter.clone()))),
        DiskCache::new(root.join("cache")),
    )
    .with_cuda_available(false);
    Rig {
        _tmp: tmp,
        root,
        demucs,
        spleeter,
        separator,
    }
}

fn upload(seconds: usize) -> AudioAsset {
    let tmp = tempdir().unwrap();
    let path = tmp.path().join("song.wav");
    common::write_tone(&path, 440.0, 0.3, common::SR as usize * seconds);
    AudioAsset::new("song.wav", fs::read(&path).unwrap()).unwrap()
}

fn two_stems() -> SplitOptions {
    SplitOptions {
        preset: Preset::Balanced,
        stems: StemsMode::TwoStems,
        output_format: OutputFormat::Wav,
        use_gpu: false,
        residual_suppression: false,
    }
}

#[test]
fn thirty_second_two_stem_run_is_zipped_then_cached() {
    let rig = rig(ScriptedEngine::ok(EngineKind::Demucs));
    let asset = upload(30);

    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    set_split_progress_callback(move |p| {
        if let SplitProgress::CacheHit { fingerprint } = p {
            sink.lock().unwrap().push(fingerprint);
        }
    });

    let first = rig
        .separator
        .process(&asset, &two_stems(), &rig.root.join("run1"))
        .unwrap();
    assert!(!first.cache_hit);
    assert_eq!(first.separation.engine, EngineKind::Demucs);
    assert_eq!(first.separation.model, "htdemucs");
    let files: Vec<_> = first
        .package
        .files
        .iter()
        .map(|f| f.path.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(files, ["vocals.wav", "accompaniment.wav"]);
    assert_eq!(first.package.archive, Some(rig.root.join("run1").join("stems.zip")));
    assert_eq!(rig.demucs.calls(), 1);

    let second = rig
        .separator
        .process(&asset, &two_stems(), &rig.root.join("run2"))
        .unwrap();
    assert!(second.cache_hit);
    assert_eq!(second.fingerprint, first.fingerprint);
    assert_eq!(rig.demucs.calls(), 1, "cache hit must not invoke the model");
    assert_eq!(rig.spleeter.calls(), 0);
    for (a, b) in first.package.files.iter().zip(&second.package.files) {
        assert_eq!(fs::read(&a.path).unwrap(), fs::read(&b.path).unwrap());
    }
    assert!(events.lock().unwrap().contains(&first.fingerprint));
}

#[test]
fn changing_a_request_parameter_recomputes() {
    let rig = rig(ScriptedEngine::ok(EngineKind::Demucs));
    let asset = upload(1);

    let a = rig.separator.separate(&asset, &two_stems()).unwrap();
    let b = rig
        .separator
        .separate(
            &asset,
            &SplitOptions {
                residual_suppression: true,
                ..two_stems()
            },
        )
        .unwrap();
    assert_ne!(a.fingerprint, b.fingerprint);
    assert!(!b.cache_hit);
    assert_eq!(rig.demucs.calls(), 2);

    // Output format is not part of the key.
    let c = rig
        .separator
        .separate(
            &asset,
            &SplitOptions {
                output_format: OutputFormat::Mp3,
                ..two_stems()
            },
        )
        .unwrap();
    assert!(c.cache_hit);
    assert_eq!(c.fingerprint, a.fingerprint);
}

#[test]
fn instrumental_only_yields_one_file_and_no_archive() {
    let rig = rig(ScriptedEngine::ok(EngineKind::Demucs));
    let out = rig.root.join("out");
    let res = rig
        .separator
        .process(
            &upload(1),
            &SplitOptions {
                stems: StemsMode::Instrumental,
                ..two_stems()
            },
            &out,
        )
        .unwrap();
    assert_eq!(res.package.files.len(), 1);
    assert_eq!(res.package.files[0].path, out.join("instrumental.wav"));
    assert!(res.package.archive.is_none());
}

#[test]
fn fallback_result_is_cached_too() {
    let rig = rig(ScriptedEngine::failing(EngineKind::Demucs));
    let asset = upload(1);

    let first = rig.separator.separate(&asset, &two_stems()).unwrap();
    assert_eq!(first.result.engine, EngineKind::Spleeter);
    let second = rig.separator.separate(&asset, &two_stems()).unwrap();
    assert!(second.cache_hit);
    assert_eq!(second.result.engine, EngineKind::Spleeter);
    assert_eq!(rig.demucs.calls(), 1);
    assert_eq!(rig.spleeter.calls(), 1);
}

#[test]
fn failed_four_stem_run_is_not_cached() {
    let rig = rig(ScriptedEngine::failing(EngineKind::Demucs));
    let asset = upload(1);
    let opts = SplitOptions {
        stems: StemsMode::FourStems,
        ..two_stems()
    };

    for _ in 0..2 {
        let err = rig.separator.separate(&asset, &opts).unwrap_err();
        assert!(matches!(err, StemError::Separation { .. }));
    }
    assert_eq!(rig.demucs.calls(), 2);
    assert_eq!(rig.spleeter.calls(), 0);
}

#[test]
fn ingest_attaches_probe_metadata() {
    let rig = rig(ScriptedEngine::ok(EngineKind::Demucs));
    let asset = upload(2);
    let ingested = rig
        .separator
        .ingest(asset.name(), asset.bytes().to_vec())
        .unwrap();
    let info = ingested.info().expect("metadata");
    assert_eq!(info.sample_rate, Some(common::SR));
    assert_eq!(info.channels, Some(2));
    assert!((info.duration_secs.unwrap() - 2.0).abs() < 1e-6);
}

#[test]
fn ingest_keeps_unreadable_uploads_without_metadata() {
    let rig = rig(ScriptedEngine::ok(EngineKind::Demucs));
    let asset = rig
        .separator
        .ingest("broken.mp3", b"not really audio".to_vec())
        .unwrap();
    assert!(asset.info().is_none());

    assert!(matches!(
        rig.separator.ingest("notes.txt", b"hello".to_vec()),
        Err(StemError::UnsupportedFormat(_))
    ));
}

#[test]
fn uploads_named_like_the_normalized_file_are_kept_apart() {
    let rig = rig(ScriptedEngine::ok(EngineKind::Demucs));
    let tmp = tempdir().unwrap();
    let song = |freq: f32| {
        let path = tmp.path().join(format!("{freq}.wav"));
        common::write_tone(&path, freq, 0.3, common::SR as usize);
        AudioAsset::new("input.wav", fs::read(&path).unwrap()).unwrap()
    };

    let a = rig.separator.separate(&song(440.0), &two_stems()).unwrap();
    let b = rig.separator.separate(&song(550.0), &two_stems()).unwrap();
    assert_ne!(a.fingerprint, b.fingerprint);
    assert!(!b.cache_hit);
    assert_eq!(rig.demucs.calls(), 2);
}
