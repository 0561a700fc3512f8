//! Crash-safe file persistence shared by the config and state stores.

use std::io::Write;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

/// Write `data` to `path` atomically: a temp file in the same directory is
/// written, fsynced, chmodded to 0600 and renamed over the target. A partial
/// temp file is unlinked on any failure and never becomes the real file.
pub(crate) fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    let mut tmp = tempfile::NamedTempFile::new_in(dir.unwrap_or(Path::new(".")))?;

    tmp.write_all(data)?;
    tmp.as_file().sync_all()?;

    let mut perms = tmp.as_file().metadata()?.permissions();
    perms.set_mode(0o600);
    tmp.as_file().set_permissions(perms)?;

    // Rename within the same directory so readers never observe a partial file.
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_write_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");

        atomic_write(&path, b"first").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"first");

        atomic_write(&path, b"second").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"second");

        // No temp file debris left behind.
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("data.json")]);
    }

    #[test]
    fn test_atomic_write_sets_mode() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("secret.yml");
        atomic_write(&path, b"keys").unwrap();

        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_failed_write_leaves_original_intact() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cfg.yml");
        atomic_write(&path, b"original").unwrap();

        // Writing into a missing directory fails before any rename happens.
        let bad = dir.path().join("missing").join("cfg.yml");
        assert!(atomic_write(&bad, b"update").is_err());

        assert_eq!(std::fs::read(&path).unwrap(), b"original");
    }
}
