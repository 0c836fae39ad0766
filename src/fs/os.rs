use std::fs;
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use super::{clean, DirEntry, EntryKind, FileInfo, Filesystem, DEFAULT_DIR_MODE};

/// A [`Filesystem`] rooted at a directory on disk.
///
/// Virtual paths are cleaned before being joined to the root, so `..` can not
/// escape it. Writes refuse to go through a symlink below the root, so a link
/// in the tree can not redirect them elsewhere on disk.
#[derive(Debug, Clone)]
pub struct OsFs {
    root: PathBuf,
}

impl OsFs {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        let cleaned = clean(path);
        let relative = cleaned.trim_start_matches('/');
        if relative.is_empty() {
            self.root.clone()
        } else {
            self.root.join(relative)
        }
    }

    /// Resolves `path` for writing, failing when an existing component under
    /// the root is a symlink.
    fn resolve_for_write(&self, path: &str) -> io::Result<PathBuf> {
        let target = self.resolve(path);
        let mut current = self.root.clone();
        for segment in clean(path).split('/').filter(|s| !s.is_empty()) {
            current.push(segment);
            match fs::symlink_metadata(&current) {
                Ok(meta) if meta.file_type().is_symlink() => {
                    return Err(io::Error::new(
                        io::ErrorKind::PermissionDenied,
                        format!("refusing to write through symlink '{}'", current.display()),
                    ));
                }
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => break,
                Err(e) => return Err(e),
            }
        }
        Ok(target)
    }
}

fn kind_of(file_type: fs::FileType) -> EntryKind {
    if file_type.is_symlink() {
        EntryKind::Symlink
    } else if file_type.is_dir() {
        EntryKind::Dir
    } else {
        EntryKind::File
    }
}

#[cfg(unix)]
fn mode_of(meta: &fs::Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn mode_of(meta: &fs::Metadata) -> u32 {
    if meta.is_dir() {
        DEFAULT_DIR_MODE
    } else {
        super::DEFAULT_FILE_MODE
    }
}

#[cfg(unix)]
fn create_dirs(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(mode).create(path)
}

#[cfg(not(unix))]
fn create_dirs(path: &Path, _mode: u32) -> io::Result<()> {
    fs::DirBuilder::new().recursive(true).create(path)
}

impl Filesystem for OsFs {
    fn stat(&self, path: &str) -> io::Result<FileInfo> {
        let meta = fs::metadata(self.resolve(path))?;
        Ok(FileInfo {
            kind: kind_of(meta.file_type()),
            mode: mode_of(&meta),
        })
    }

    fn read_dir(&self, path: &str) -> io::Result<Vec<DirEntry>> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(self.resolve(path))? {
            let entry = entry?;
            // DirEntry::metadata does not traverse symlinks.
            let meta = entry.metadata()?;
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                kind: kind_of(meta.file_type()),
                mode: mode_of(&meta),
            });
        }
        Ok(entries)
    }

    fn mkdir_all(&self, path: &str, mode: u32) -> io::Result<()> {
        let target = self.resolve_for_write(path)?;
        if target.is_dir() {
            return Ok(());
        }
        create_dirs(&target, if mode == 0 { DEFAULT_DIR_MODE } else { mode })
    }

    fn open(&self, path: &str) -> io::Result<Box<dyn Read + '_>> {
        Ok(Box::new(fs::File::open(self.resolve(path))?))
    }

    fn create(&self, path: &str) -> io::Result<Box<dyn Write + '_>> {
        let target = self.resolve_for_write(path)?;
        if let Some(parent) = target.parent() {
            create_dirs(parent, DEFAULT_DIR_MODE)?;
        }
        Ok(Box::new(BufWriter::new(fs::File::create(target)?)))
    }
}
