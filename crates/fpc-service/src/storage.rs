//! Storage directory validation.

use std::fs;
use std::path::{Path, PathBuf};

use fpc_core::{Error, Result, constants::TEMP_DB_SUFFIX};
use nix::unistd::{AccessFlags, access};

/// Check that `storage` names a writable directory and return the database
/// path inside it.
///
/// # Errors
///
/// Returns `Error::InvalidStoragePath` when the path is empty, at least
/// `max_len` bytes long, or not a writable directory.
///
/// # Examples
///
/// ```
/// use fpc_service::storage::database_path;
///
/// let dir = std::env::temp_dir();
/// let db = database_path(dir.to_str().unwrap(), "user.db", 4096).unwrap();
/// assert!(db.ends_with("user.db"));
/// assert!(database_path("", "user.db", 4096).is_err());
/// ```
pub fn database_path(storage: &str, file_name: &str, max_len: usize) -> Result<PathBuf> {
    if storage.is_empty() || storage.len() >= max_len {
        return Err(Error::InvalidStoragePath(format!(
            "bad path length {}",
            storage.len()
        )));
    }

    let metadata = fs::metadata(storage)
        .map_err(|e| Error::InvalidStoragePath(format!("{storage}: {e}")))?;
    if !metadata.is_dir() {
        return Err(Error::InvalidStoragePath(format!(
            "{storage} is not a directory"
        )));
    }
    access(storage, AccessFlags::W_OK)
        .map_err(|e| Error::InvalidStoragePath(format!("{storage} is not writable: {e}")))?;

    Ok(Path::new(storage).join(file_name))
}

/// Staging file the trustlet writes before it is renamed over `db_path`.
pub fn staging_path(db_path: &Path) -> PathBuf {
    let mut staging = db_path.as_os_str().to_owned();
    staging.push(TEMP_DB_SUFFIX);
    PathBuf::from(staging)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_valid_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = database_path(dir.path().to_str().unwrap(), "user.db", 4096).unwrap();
        assert_eq!(path, dir.path().join("user.db"));
    }

    #[rstest]
    #[case("")]
    #[case("/nonexistent/fingerprint")]
    fn test_rejected_paths(#[case] storage: &str) {
        assert!(matches!(
            database_path(storage, "user.db", 4096),
            Err(Error::InvalidStoragePath(_))
        ));
    }

    #[test]
    fn test_rejects_long_path() {
        let long = "/".repeat(4096);
        assert!(database_path(&long, "user.db", 4096).is_err());
    }

    #[test]
    fn test_rejects_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(database_path(file.path().to_str().unwrap(), "user.db", 4096).is_err());
    }

    #[test]
    fn test_write_access_matches_actual_write() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o555)).unwrap();

        // Privileged users may still write, so compare against a real write.
        let accepted = database_path(dir.path().to_str().unwrap(), "user.db", 4096).is_ok();
        let writable = fs::write(dir.path().join("user.db"), b"x").is_ok();
        fs::set_permissions(dir.path(), fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(accepted, writable);
    }

    #[test]
    fn test_staging_path() {
        assert_eq!(
            staging_path(Path::new("/data/fpc/user.db")),
            PathBuf::from("/data/fpc/user.db.tmp")
        );
    }
}
