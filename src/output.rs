//! Atomic output writing.
//!
//! The writer is invoked exactly once per output file with a complete byte
//! buffer. It writes through a temp file in the destination directory and
//! persists by rename, so an abort anywhere in the pipeline leaves no
//! partial output behind.

use std::io::Write;
use std::path::Path;

use thiserror::Error;

/// Suffix marking the generator's own output files. The loader and the
/// directive scanner skip files carrying it.
pub const GENERATED_SUFFIX: &str = ".gen.go";

/// Errors while writing an output file.
#[derive(Debug, Error)]
#[error("failed to write {path}: {cause}")]
pub struct WriteError {
    pub path: String,
    #[source]
    pub cause: std::io::Error,
}

/// Write `contents` to `path` atomically.
pub fn write_file(path: &Path, contents: &[u8]) -> Result<(), WriteError> {
    let to_err = |cause: std::io::Error| WriteError {
        path: path.display().to_string(),
        cause,
    };
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    let mut tmp = match dir {
        Some(dir) => tempfile::NamedTempFile::new_in(dir),
        None => tempfile::NamedTempFile::new(),
    }
    .map_err(to_err)?;
    tmp.write_all(contents).map_err(to_err)?;
    tmp.persist(path).map_err(|err| to_err(err.error))?;
    tracing::info!(path = %path.display(), bytes = contents.len(), "wrote output");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn writes_and_replaces() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.gen.go");
        write_file(&path, b"package a\n").expect("first write");
        write_file(&path, b"package b\n").expect("second write");
        assert_eq!(fs::read_to_string(&path).expect("read"), "package b\n");
    }

    #[test]
    fn leaves_no_temp_files_behind() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("out.gen.go");
        write_file(&path, b"package a\n").expect("write");
        let entries: Vec<_> = fs::read_dir(dir.path())
            .expect("read dir")
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(entries, vec!["out.gen.go".to_string()]);
    }
}
