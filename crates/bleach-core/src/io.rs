use crate::error::Result;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Create the parent directories of `path` and return the parent.
fn prepare_parent(path: &Path) -> Result<&Path> {
    match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            std::fs::create_dir_all(parent)?;
            Ok(parent)
        }
        None => Ok(Path::new(".")),
    }
}

/// Replace `path` with `data` in one rename, so a crash never leaves a
/// half-written session or config behind.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let mut staged = NamedTempFile::new_in(prepare_parent(path)?)?;
    staged.write_all(data)?;
    staged.persist(path).map_err(|e| e.error)?;
    Ok(())
}

/// Open `path` for appending, creating it if needed.
pub fn open_append(path: &Path) -> Result<File> {
    prepare_parent(path)?;
    Ok(OpenOptions::new().create(true).append(true).open(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn atomic_write_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("session.json");
        atomic_write(&path, b"{}").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "{}");
    }

    #[test]
    fn atomic_write_replaces_existing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("bleach.yaml");
        atomic_write(&path, b"old").unwrap();
        atomic_write(&path, b"new").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
    }

    #[test]
    fn atomic_write_creates_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/c/session.json");
        atomic_write(&path, b"data").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn open_append_keeps_existing_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("archive/follows.csv");
        {
            let mut f = open_append(&path).unwrap();
            f.write_all(b"1,\"a\",a\n").unwrap();
        }
        {
            let mut f = open_append(&path).unwrap();
            f.write_all(b"2,\"b\",b\n").unwrap();
        }
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "1,\"a\",a\n2,\"b\",b\n"
        );
    }
}
