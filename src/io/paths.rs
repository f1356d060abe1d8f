use crate::error::{Result, StemError};
use directories::ProjectDirs;
use std::{fs, path::Path, path::PathBuf, time::SystemTime};

fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from("dev", "EveryInstrument", "everyinstrument")
        .ok_or(StemError::CacheDirUnavailable)
}

/// Where separation results are cached.
pub fn results_cache_dir() -> Result<PathBuf> {
    let mut p = PathBuf::from(project_dirs()?.cache_dir());
    p.push("separations");
    Ok(p)
}

/// Where per-request exports are written before download.
pub fn runs_dir() -> PathBuf {
    std::env::temp_dir().join("everyinstrument_runs")
}

/// Removes all but the `keep_last` most recently modified directories under
/// `base`. Returns how many were removed.
pub fn prune_runs(base: &Path, keep_last: usize) -> Result<usize> {
    if !base.exists() {
        return Ok(0);
    }
    let mut dirs: Vec<(SystemTime, PathBuf)> = Vec::new();
    for entry in fs::read_dir(base)? {
        let entry = entry?;
        let meta = entry.metadata()?;
        if meta.is_dir() {
            let mtime = meta.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            dirs.push((mtime, entry.path()));
        }
    }
    dirs.sort_by(|a, b| b.0.cmp(&a.0));

    let mut removed = 0;
    for (_, stale) in dirs.into_iter().skip(keep_last) {
        match fs::remove_dir_all(&stale) {
            Ok(()) => removed += 1,
            Err(e) => log::warn!("could not remove {}: {e}", stale.display()),
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn prune_keeps_newest() {
        let tmp = tempfile::tempdir().unwrap();
        for name in ["a", "b", "c"] {
            fs::create_dir(tmp.path().join(name)).unwrap();
            std::thread::sleep(Duration::from_millis(20));
        }
        fs::write(tmp.path().join("loose.txt"), b"x").unwrap();

        assert_eq!(prune_runs(tmp.path(), 2).unwrap(), 1);
        assert!(!tmp.path().join("a").exists());
        assert!(tmp.path().join("b").exists());
        assert!(tmp.path().join("c").exists());
        assert!(tmp.path().join("loose.txt").exists());
    }

    #[test]
    fn prune_missing_dir_is_noop() {
        let tmp = tempfile::tempdir().unwrap();
        assert_eq!(prune_runs(&tmp.path().join("nope"), 1).unwrap(), 0);
    }
}
