//! Filesystem abstraction used by the copy engine.
//!
//! Paths are virtual, `/`-separated and rooted: every implementation treats
//! `/` as the root of the tree it exposes (the working tree of a clone, or an
//! in-memory tree). [`clean`] is the single normalization point.

use std::io::{self, Read, Write};

mod memory;
mod os;

pub use memory::MemFs;
pub use os::OsFs;

/// Default permission bits for directories created without a source mode.
pub const DEFAULT_DIR_MODE: u32 = 0o755;
/// Default permission bits for regular files.
pub const DEFAULT_FILE_MODE: u32 = 0o644;

/// Kind of a filesystem entry as seen without following symlinks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Dir,
    File,
    Symlink,
}

/// Result of a `stat` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileInfo {
    pub kind: EntryKind,
    pub mode: u32,
}

impl FileInfo {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Dir
    }
}

/// One entry returned by [`Filesystem::read_dir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub kind: EntryKind,
    pub mode: u32,
}

/// Minimal filesystem surface needed to copy trees between repositories.
pub trait Filesystem: Send + Sync {
    /// Returns information about `path`, following symlinks.
    fn stat(&self, path: &str) -> io::Result<FileInfo>;

    /// Lists the entries of a directory. Entry kinds are not followed, so
    /// symlinks are reported as [`EntryKind::Symlink`].
    fn read_dir(&self, path: &str) -> io::Result<Vec<DirEntry>>;

    /// Creates `path` and all missing ancestors. Existing directories are fine.
    fn mkdir_all(&self, path: &str, mode: u32) -> io::Result<()>;

    /// Opens a regular file for reading.
    fn open(&self, path: &str) -> io::Result<Box<dyn Read + '_>>;

    /// Creates or truncates a regular file, creating missing parent directories.
    fn create(&self, path: &str) -> io::Result<Box<dyn Write + '_>>;

    fn read(&self, path: &str) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.open(path)?.read_to_end(&mut buf)?;
        Ok(buf)
    }

    fn write(&self, path: &str, data: &[u8]) -> io::Result<()> {
        let mut out = self.create(path)?;
        out.write_all(data)?;
        out.flush()
    }

    /// Reports whether `path` exists. `NotFound` is translated to `false`,
    /// any other failure is returned.
    fn exists(&self, path: &str) -> io::Result<bool> {
        match self.stat(path) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Lexically normalizes a virtual path.
///
/// The result is always absolute: an empty input yields `/`, `.` segments and
/// repeated separators are dropped, and `..` never climbs above the root.
/// Applying `clean` to its own output returns it unchanged.
pub fn clean(path: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            s => parts.push(s),
        }
    }
    format!("/{}", parts.join("/"))
}

/// Joins a child name onto a cleaned directory path.
pub fn join(dir: &str, name: &str) -> String {
    clean(&format!("{dir}/{name}"))
}

/// Splits a cleaned path into its parent directory and base name.
pub(crate) fn split(path: &str) -> (String, String) {
    let cleaned = clean(path);
    match cleaned.rfind('/') {
        Some(0) => ("/".to_string(), cleaned[1..].to_string()),
        Some(idx) => (cleaned[..idx].to_string(), cleaned[idx + 1..].to_string()),
        None => ("/".to_string(), cleaned),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_normalizes_to_rooted_paths() {
        assert_eq!(clean(""), "/");
        assert_eq!(clean("."), "/");
        assert_eq!(clean("skeleton"), "/skeleton");
        assert_eq!(clean("/skeleton/"), "/skeleton");
        assert_eq!(clean("a//b/./c"), "/a/b/c");
        assert_eq!(clean("a/b/../c"), "/a/c");
        assert_eq!(clean("../../etc"), "/etc");
    }

    #[test]
    fn test_clean_is_idempotent() {
        for p in ["", "/", "a/../..//b/", "./x/y/./z/..", "\\win\\style", "/already/clean"] {
            let once = clean(p);
            assert_eq!(clean(&once), once, "input {p:?}");
        }
    }

    #[test]
    fn test_join_and_split() {
        assert_eq!(join("/", "a.txt"), "/a.txt");
        assert_eq!(join("/skeleton", "dir"), "/skeleton/dir");
        assert_eq!(split("/a.txt"), ("/".to_string(), "a.txt".to_string()));
        assert_eq!(split("/a/b/c"), ("/a/b".to_string(), "c".to_string()));
    }
}
