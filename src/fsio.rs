//! Small filesystem helpers shared by the store and the memory snapshot log.

use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

/// Extension of every file that belongs to the dataset.
pub(crate) const DATA_EXTENSION: &str = "json";

/// Write `bytes` to `path` atomically.
///
/// The temp file lives in the target directory so the final rename never
/// crosses filesystems.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Read a file, mapping "missing" to `None`.
pub(crate) fn read_optional(path: &Path) -> io::Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(bytes) => Ok(Some(bytes)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

/// True for regular `*.json` files that are not hidden.
pub(crate) fn is_data_file(path: &Path) -> bool {
    let visible = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| !n.starts_with('.'));
    visible && path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(DATA_EXTENSION)
}

/// Read every data file in `dir` into a name → bytes image.
pub(crate) fn read_image(dir: &Path) -> io::Result<BTreeMap<String, Vec<u8>>> {
    let mut image = BTreeMap::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if !is_data_file(&path) {
            continue;
        }
        if let Some(name) = path.file_name().and_then(|n| n.to_str()) {
            image.insert(name.to_string(), fs::read(&path)?);
        }
    }
    Ok(image)
}

/// Make the data files in `dir` match `image` exactly.
///
/// Every file is attempted even after a failure; the first error is
/// returned once all of them have been tried.
pub(crate) fn write_image(dir: &Path, image: &BTreeMap<String, Vec<u8>>) -> io::Result<()> {
    let mut first_error = None;
    let mut note = |result: io::Result<()>| {
        if let Err(e) = result {
            first_error.get_or_insert(e);
        }
    };

    for entry in fs::read_dir(dir)? {
        let path = match entry {
            Ok(entry) => entry.path(),
            Err(e) => {
                note(Err(e));
                continue;
            }
        };
        if !is_data_file(&path) {
            continue;
        }
        let keep = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| image.contains_key(n));
        if !keep {
            note(fs::remove_file(&path));
        }
    }

    for (name, bytes) in image {
        let path = dir.join(name);
        note(restore_file(&path, bytes));
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn restore_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if read_optional(path)?.as_deref() == Some(bytes) {
        return Ok(());
    }
    write_atomic(path, bytes)
}
