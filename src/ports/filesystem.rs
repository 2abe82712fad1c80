//! Filesystem port for the shared task directory.

use std::io;
use std::path::Path;

/// Provides access to the shared store directory.
///
/// Rename is the only operation assumed atomic on the target filesystem;
/// `create_new` must fail rather than overwrite when the path exists.
pub trait FileSystem: Send + Sync {
    /// Reads the entire contents of a file as a UTF-8 string.
    ///
    /// # Errors
    ///
    /// Returns an `io::ErrorKind::NotFound` error if the file does not
    /// exist, or another error if it cannot be read.
    fn read_to_string(&self, path: &Path) -> io::Result<String>;

    /// Writes the given contents to a file, creating parent directories and
    /// overwriting any existing file.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails (permissions, disk full, etc.).
    fn write(&self, path: &Path, contents: &str) -> io::Result<()>;

    /// Creates a file only if nothing exists at `path`.
    ///
    /// Returns `Ok(false)` when the path is already taken. Readers must
    /// never observe the file with partial contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be created for another reason.
    fn create_new(&self, path: &Path, contents: &str) -> io::Result<bool>;

    /// Atomically moves `from` onto `to`, replacing `to` if it exists.
    ///
    /// # Errors
    ///
    /// Returns an error if `from` does not exist or the rename fails.
    fn rename(&self, from: &Path, to: &Path) -> io::Result<()>;

    /// Removes a file. Returns `Ok(false)` if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be removed.
    fn remove(&self, path: &Path) -> io::Result<bool>;

    /// Returns `true` if the path exists.
    fn exists(&self, path: &Path) -> bool;

    /// Lists the entry names in a directory, sorted.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is not a directory or cannot be read.
    fn list_dir(&self, path: &Path) -> io::Result<Vec<String>>;
}
