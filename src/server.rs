//! Local HTTP front-end.
//!
//! Serves a bare upload form and a small JSON API over the [`Separator`].
//! Separations are serialized: a second request waits for the first.

use std::{net::SocketAddr, path::PathBuf, sync::Arc};

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, State},
    http::{header, StatusCode},
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use tokio::sync::Mutex;

use crate::{
    config::Config,
    core::splitter::Separator,
    error::StemError,
    io::{crypto::is_fingerprint, ffmpeg::FfmpegTranscoder, paths::prune_runs},
    model::registry::presets,
    types::{sanitize_file_name, OutputFormat, SplitOptions},
};

/// Uploads above this are refused before they reach the pipeline.
pub const MAX_UPLOAD_BYTES: usize = 200 * 1024 * 1024;

const INDEX_HTML: &str = r#"<!doctype html>
<html>
<head><meta charset="utf-8"><title>EveryInstrument - Vocal Remover</title></head>
<body>
<h1>EveryInstrument: High-Quality Vocal Remover</h1>
<p>Upload a song, pick quality, and download instrumentals or stems.</p>
<form method="post" action="/api/separate" enctype="multipart/form-data">
  <p><input type="file" name="file" accept=".mp3,.wav,.m4a,.flac" required></p>
  <p>Quality <select name="preset"><option>balanced</option><option>best</option><option>fast</option></select>
     Format <select name="format"><option>wav</option><option>mp3</option><option>flac</option></select></p>
  <p><label><input type="radio" name="stems" value="instrumental" checked> Instrumental only</label>
     <label><input type="radio" name="stems" value="two_stems"> Vocals + accompaniment</label>
     <label><input type="radio" name="stems" value="four_stems"> Vocals, drums, bass, other</label></p>
  <p><label><input type="checkbox" name="gpu" value="true"> Use GPU if available</label>
     <label><input type="checkbox" name="residual" value="true"> Light vocal residual suppression</label></p>
  <p><button type="submit">Run separation</button></p>
</form>
</body>
</html>
"#;

#[derive(Clone)]
struct AppState {
    cfg: Arc<Config>,
    separator: Arc<Separator>,
    gate: Arc<Mutex<()>>,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

impl From<StemError> for ApiError {
    fn from(e: StemError) -> Self {
        let status = match &e {
            e if e.is_input_error() => StatusCode::BAD_REQUEST,
            StemError::MissingDependency { .. } => StatusCode::FAILED_DEPENDENCY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, e.to_string())
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        Self::bad_request(format!("bad upload: {e}"))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            log::error!("{}", self.message);
        }
        (
            self.status,
            Json(json!({ "ok": false, "error": self.message })),
        )
            .into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

pub fn router(cfg: Config, separator: Separator) -> Router {
    let state = AppState {
        cfg: Arc::new(cfg),
        separator: Arc::new(separator),
        gate: Arc::new(Mutex::new(())),
    };

    Router::new()
        .route("/", get(index))
        .route("/api/status", get(status))
        .route("/api/probe", post(probe))
        .route("/api/separate", post(separate))
        .route("/api/runs/:run/:file", get(download))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
}

pub async fn run_server(cfg: Config, separator: Separator) -> crate::error::Result<()> {
    let addr: SocketAddr = cfg.listen_addr;

    match prune_runs(&cfg.runs_dir, cfg.keep_runs) {
        Ok(0) => {}
        Ok(n) => log::info!("pruned {n} old run directories"),
        Err(e) => log::warn!("could not prune {}: {e}", cfg.runs_dir.display()),
    }

    let app = router(cfg, separator);
    log::info!("listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

// GET /

async fn index() -> Html<&'static str> {
    Html(INDEX_HTML)
}

// GET /api/status

async fn status(State(st): State<AppState>) -> ApiResult<Json<Value>> {
    let cfg = st.cfg.clone();
    let separator = st.separator.clone();
    let (ffmpeg, cuda) = tokio::task::spawn_blocking(move || {
        let ffmpeg = FfmpegTranscoder::new(&cfg.ffmpeg, &cfg.ffprobe).is_available();
        (ffmpeg, separator.cuda_available())
    })
    .await
    .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(json!({
        "ok": true,
        "version": env!("CARGO_PKG_VERSION"),
        "ffmpeg": ffmpeg,
        "cuda": cuda,
        "presets": presets(),
        "cache_dir": st.separator.cache().root(),
        "max_upload_bytes": MAX_UPLOAD_BYTES,
    })))
}

// POST /api/probe

async fn probe(State(st): State<AppState>, multipart: Multipart) -> ApiResult<Json<Value>> {
    let form = read_form(multipart).await?;
    let (name, bytes) = form.file.ok_or_else(|| ApiError::bad_request("missing `file`"))?;
    let separator = st.separator.clone();

    let asset = tokio::task::spawn_blocking(move || separator.ingest(&name, bytes))
        .await
        .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))??;

    Ok(Json(json!({
        "ok": true,
        "name": asset.name(),
        "size_bytes": asset.size(),
        "info": asset.info(),
    })))
}

// POST /api/separate

async fn separate(State(st): State<AppState>, multipart: Multipart) -> ApiResult<Json<Value>> {
    let form = read_form(multipart).await?;
    let (name, bytes) = form.file.ok_or_else(|| ApiError::bad_request("missing `file`"))?;
    let opts = form.options;

    let _turn = st.gate.lock().await;

    let separator = st.separator.clone();
    let runs_dir = st.cfg.runs_dir.clone();
    let job_opts = opts.clone();
    let (separation, package) = tokio::task::spawn_blocking(move || {
        let asset = separator.ingest(&name, bytes)?;
        let separation = separator.separate(&asset, &job_opts)?;
        let exports = runs_dir.join(run_id(&separation.fingerprint, job_opts.output_format));
        let package = separator.package(&separation, job_opts.output_format, &exports)?;
        Ok::<_, StemError>((separation, package))
    })
    .await
    .map_err(|e| ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))??;

    let run = run_id(&separation.fingerprint, opts.output_format);
    let stems: Vec<Value> = package
        .files
        .iter()
        .map(|f| json!({ "name": f.name, "url": download_url(&run, &f.path) }))
        .collect();

    Ok(Json(json!({
        "ok": true,
        "fingerprint": separation.fingerprint,
        "cache_hit": separation.cache_hit,
        "engine": separation.result.engine,
        "model": separation.result.model,
        "options": opts,
        "stems": stems,
        "archive": package.archive.as_ref().map(|a| download_url(&run, a)),
        "log": separation.result.log,
    })))
}

/// Run directory for one separation exported in one format:
/// `<fingerprint>-<ext>`.
fn run_id(fingerprint: &str, format: OutputFormat) -> String {
    format!("{fingerprint}-{}", format.extension())
}

fn is_run_id(run: &str) -> bool {
    match run.split_once('-') {
        Some((fp, ext)) => is_fingerprint(fp) && ext.parse::<OutputFormat>().is_ok(),
        None => false,
    }
}

fn download_url(run: &str, path: &std::path::Path) -> String {
    let file = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    format!("/api/runs/{run}/{file}")
}

// GET /api/runs/:run/:file

async fn download(
    State(st): State<AppState>,
    Path((run, file)): Path<(String, String)>,
) -> ApiResult<Response> {
    let path = export_path(&st.cfg.runs_dir, &run, &file)?;
    let bytes = tokio::fs::read(&path)
        .await
        .map_err(|_| ApiError::new(StatusCode::NOT_FOUND, format!("{file} not found")))?;

    let content_type = content_type_for(&file);
    let disposition = format!("attachment; filename=\"{file}\"");
    Ok((
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    )
        .into_response())
}

fn export_path(runs_dir: &std::path::Path, run: &str, file: &str) -> ApiResult<PathBuf> {
    if !is_run_id(run) {
        return Err(ApiError::bad_request("bad run id"));
    }
    let clean = sanitize_file_name(file)?;
    if clean != file {
        return Err(ApiError::bad_request("bad file name"));
    }
    Ok(runs_dir.join(run).join(clean))
}

fn content_type_for(file: &str) -> &'static str {
    let ext = file.rsplit('.').next().unwrap_or_default();
    if ext.eq_ignore_ascii_case("zip") {
        return "application/zip";
    }
    ext.parse::<OutputFormat>()
        .map(OutputFormat::mime_type)
        .unwrap_or("application/octet-stream")
}

#[derive(Default)]
struct UploadForm {
    file: Option<(String, Vec<u8>)>,
    options: SplitOptions,
}

fn parse_field<T: std::str::FromStr<Err = String>>(value: &str) -> ApiResult<T> {
    value.parse().map_err(ApiError::bad_request)
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "on" | "yes"
    )
}

async fn read_form(mut multipart: Multipart) -> ApiResult<UploadForm> {
    let mut form = UploadForm::default();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        if name == "file" {
            let file_name = field.file_name().unwrap_or("upload").to_string();
            let data = field.bytes().await?;
            form.file = Some((file_name, data.to_vec()));
            continue;
        }
        let value = field.text().await?;
        match name.as_str() {
            "preset" | "quality" => form.options.preset = parse_field(&value)?,
            "stems" => form.options.stems = parse_field(&value)?,
            "format" | "output_format" => form.options.output_format = parse_field(&value)?,
            "gpu" | "use_gpu" => form.options.use_gpu = parse_flag(&value),
            "residual" | "residual_suppression" => {
                form.options.residual_suppression = parse_flag(&value)
            }
            other => log::debug!("ignoring form field `{other}`"),
        }
    }
    Ok(form)
}
