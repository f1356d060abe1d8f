use std::sync::{Mutex, OnceLock};

/// Pipeline progress as reported to the registered callback.
#[derive(Debug, Clone)]
pub enum SplitProgress {
    /// One of `normalize`, `cache_lookup`, `separate`, `package`.
    Stage(&'static str),
    /// The request was served from the disk cache.
    CacheHit { fingerprint: String },
    /// A log line from the separation engines.
    Log(String),
    Finished,
}

type ProgressCb = Box<dyn Fn(SplitProgress) + Send + 'static>;

static SPLIT_PROGRESS_CB: OnceLock<Mutex<Option<ProgressCb>>> = OnceLock::new();

/// Registers the process-wide progress callback, replacing any previous one.
pub fn set_split_progress_callback(cb: impl Fn(SplitProgress) + Send + 'static) {
    let slot = SPLIT_PROGRESS_CB.get_or_init(|| Mutex::new(None));
    if let Ok(mut g) = slot.lock() {
        *g = Some(Box::new(cb));
    }
}

pub fn emit_split_progress(progress: SplitProgress) {
    if let Some(m) = SPLIT_PROGRESS_CB.get() {
        if let Ok(g) = m.lock() {
            if let Some(cb) = &*g {
                cb(progress);
            }
        }
    }
}
