mod common;

use common::ScriptedEngine;
use everyinstrument::{
    Device, EngineKind, Invocation, Invoker, Result, SeparationResult, StemError, StemsMode,
};
use tempfile::{tempdir, TempDir};

fn invoker(primary: &ScriptedEngine, fallback: &ScriptedEngine) -> Invoker {
    Invoker::new(Box::new(primary.clone()), Some(Box::new(fallback.clone())))
}

fn run(inv: &Invoker, stems: StemsMode, residual: bool) -> (TempDir, Result<SeparationResult>) {
    let tmp = tempdir().unwrap();
    let input = tmp.path().join("input.wav");
    common::write_tone(&input, 330.0, 0.5, 4410);
    let work = tmp.path().join("separation");
    let res = inv.run(&Invocation {
        input_wav: &input,
        work_dir: &work,
        model: "htdemucs",
        stems,
        device: Device::Cpu,
        residual_suppression: residual,
    });
    (tmp, res)
}

#[test]
fn primary_success_never_touches_fallback() {
    let demucs = ScriptedEngine::ok(EngineKind::Demucs);
    let spleeter = ScriptedEngine::ok(EngineKind::Spleeter);
    let (_tmp, res) = run(&invoker(&demucs, &spleeter), StemsMode::TwoStems, false);
    let res = res.unwrap();

    assert_eq!(res.engine, EngineKind::Demucs);
    assert_eq!(res.model, "htdemucs");
    let names: Vec<_> = res.stems.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["vocals", "accompaniment"]);
    assert_eq!(demucs.calls(), 1);
    assert_eq!(spleeter.calls(), 0);
    assert!(res.log.starts_with("Running Demucs (htdemucs) on input.wav"));
}

#[test]
fn two_stem_failure_falls_back() {
    let demucs = ScriptedEngine::failing(EngineKind::Demucs);
    let spleeter = ScriptedEngine::ok(EngineKind::Spleeter);
    let (_tmp, res) = run(&invoker(&demucs, &spleeter), StemsMode::TwoStems, false);
    let res = res.unwrap();

    assert_eq!(res.engine, EngineKind::Spleeter);
    assert_eq!(demucs.calls(), 1);
    assert_eq!(spleeter.calls(), 1);
    assert!(res.log.contains("Demucs failed"));
    assert!(res.log.contains("Falling back to Spleeter 2-stems"));
    assert_eq!(res.stems.len(), 2);
}

#[test]
fn four_stem_failure_is_terminal() {
    let demucs = ScriptedEngine::failing(EngineKind::Demucs);
    let spleeter = ScriptedEngine::ok(EngineKind::Spleeter);
    let (_tmp, err) = run(&invoker(&demucs, &spleeter), StemsMode::FourStems, false);
    let err = err.unwrap_err();

    assert_eq!(spleeter.calls(), 0);
    match err {
        StemError::Separation { log } => {
            assert!(log.contains("model weights not found"));
            assert!(!log.contains("Falling back"));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn instrumental_failure_is_terminal() {
    let demucs = ScriptedEngine::failing(EngineKind::Demucs);
    let spleeter = ScriptedEngine::ok(EngineKind::Spleeter);
    let (_tmp, err) = run(&invoker(&demucs, &spleeter), StemsMode::Instrumental, false);
    let err = err.unwrap_err();

    assert!(matches!(err, StemError::Separation { .. }));
    assert_eq!(spleeter.calls(), 0);
}

#[test]
fn both_engines_failing_reports_the_whole_log() {
    let demucs = ScriptedEngine::failing(EngineKind::Demucs);
    let spleeter = ScriptedEngine::failing(EngineKind::Spleeter);
    let (_tmp, err) = run(&invoker(&demucs, &spleeter), StemsMode::TwoStems, false);
    let err = err.unwrap_err();

    let StemError::Separation { log } = err else {
        panic!("expected a separation error");
    };
    assert!(log.contains("Demucs failed"));
    assert!(log.contains("Falling back"));
    assert!(log.contains("Spleeter failed"));
    assert_eq!(spleeter.calls(), 1);
}

#[test]
fn no_fallback_configured_is_terminal() {
    let demucs = ScriptedEngine::failing(EngineKind::Demucs);
    let inv = Invoker::new(Box::new(demucs.clone()), None);
    assert!(run(&inv, StemsMode::TwoStems, false).1.is_err());
}

#[test]
fn residual_suppression_replaces_the_instrumental() {
    let demucs = ScriptedEngine::ok(EngineKind::Demucs);
    let spleeter = ScriptedEngine::ok(EngineKind::Spleeter);
    let (_tmp, res) = run(&invoker(&demucs, &spleeter), StemsMode::Instrumental, true);
    let res = res.unwrap();

    assert_eq!(res.stems.len(), 1);
    assert_eq!(res.stems[0].name, "instrumental");
    assert!(res.stems[0].path.ends_with("post/instrumental_clean.wav"));
    assert!(res.stems[0].path.exists());
    assert!(res.log.contains("Applied light residual suppression"));
}

#[test]
fn residual_suppression_skips_four_stems() {
    let demucs = ScriptedEngine::ok(EngineKind::Demucs);
    let spleeter = ScriptedEngine::ok(EngineKind::Spleeter);
    let (_tmp, res) = run(&invoker(&demucs, &spleeter), StemsMode::FourStems, true);
    let res = res.unwrap();

    assert_eq!(res.stems.len(), 4);
    assert!(!res.log.contains("residual"));
}
