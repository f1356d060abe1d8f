use std::{
    fs::{self, File},
    io::{BufWriter, Write},
    path::Path,
};

use zip::{write::SimpleFileOptions, CompressionMethod, ZipWriter};

use crate::{
    error::Result,
    io::ffmpeg::Transcoder,
    types::{OutputFormat, Package, Stem},
};

pub const ARCHIVE_NAME: &str = "stems.zip";

/// Encodes every stem into `exports_dir` as `<name>.<ext>`, and zips them
/// when there is more than one.
pub fn package_stems(
    transcoder: &dyn Transcoder,
    stems: &[Stem],
    format: OutputFormat,
    exports_dir: &Path,
) -> Result<Package> {
    fs::create_dir_all(exports_dir)?;
    let stale = exports_dir.join(ARCHIVE_NAME);
    if stale.exists() {
        fs::remove_file(&stale)?;
    }

    let mut files = Vec::with_capacity(stems.len());
    for stem in stems {
        let target = exports_dir.join(format!("{}.{}", stem.name, format.extension()));
        transcoder.encode(&stem.path, &target, format)?;
        files.push(Stem {
            name: stem.name.clone(),
            path: target,
        });
    }

    let archive = if files.len() > 1 {
        let path = exports_dir.join(ARCHIVE_NAME);
        write_archive(&files, &path)?;
        Some(path)
    } else {
        None
    };

    Ok(Package {
        format,
        files,
        archive,
    })
}

fn write_archive(files: &[Stem], dest: &Path) -> Result<()> {
    let mut zip = ZipWriter::new(BufWriter::new(File::create(dest)?));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for file in files {
        let name = file
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.name.clone());
        zip.start_file(name, options)?;
        zip.write_all(&fs::read(&file.path)?)?;
    }

    zip.finish()?.flush()?;
    Ok(())
}
