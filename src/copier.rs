//! Directory tree copy between two filesystems.
//!
//! The source subtree is listed once into a [`TreeSnapshot`], then replayed
//! into the destination: directories are created with their source mode,
//! symlinks are skipped, and each regular file is either copied verbatim or
//! rendered through the configured [`TemplateRenderer`].

use log::debug;
use std::io::Write;

use crate::error::{Error, Result};
use crate::fs::{self, EntryKind, Filesystem};
use crate::ignore::IgnoreSet;
use crate::renderer::{RenderContext, TemplateRenderer};

/// One entry discovered while walking a source tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathEntry {
    /// Path relative to the snapshot root, without a leading `/`.
    pub relative: String,
    pub is_dir: bool,
    pub is_symlink: bool,
    pub mode: u32,
}

/// Owned listing of a directory subtree, parents always before children.
#[derive(Debug, Clone)]
pub struct TreeSnapshot {
    root: String,
    root_mode: u32,
    entries: Vec<PathEntry>,
}

impl TreeSnapshot {
    /// Walks `root` in `fs` once.
    ///
    /// # Errors
    /// * `Error::SourceMissing` if `root` can not be stat'ed
    /// * `Error::NotADirectory` if `root` is not a directory
    pub fn capture(fs: &dyn Filesystem, root: &str) -> Result<Self> {
        let root = fs::clean(root);
        let info = fs.stat(&root).map_err(|source| Error::SourceMissing {
            path: root.clone(),
            source,
        })?;
        if !info.is_dir() {
            return Err(Error::NotADirectory { path: root });
        }

        let mut entries = Vec::new();
        let mut pending = vec![String::new()];
        while let Some(relative_dir) = pending.pop() {
            let dir = fs::join(&root, &relative_dir);
            let mut listing = fs.read_dir(&dir).map_err(|e| Error::io(dir.as_str(), e))?;
            listing.sort_by(|a, b| b.name.cmp(&a.name));
            for entry in listing {
                let relative = if relative_dir.is_empty() {
                    entry.name.clone()
                } else {
                    format!("{}/{}", relative_dir, entry.name)
                };
                if entry.kind == EntryKind::Dir {
                    pending.push(relative.clone());
                }
                entries.push(PathEntry {
                    relative,
                    is_dir: entry.kind == EntryKind::Dir,
                    is_symlink: entry.kind == EntryKind::Symlink,
                    mode: entry.mode,
                });
            }
        }

        Ok(Self {
            root,
            root_mode: info.mode,
            entries,
        })
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    pub fn entries(&self) -> &[PathEntry] {
        &self.entries
    }
}

/// Template rendering configuration for a copy job.
#[derive(Clone, Copy)]
pub struct Rendering<'a> {
    pub renderer: &'a dyn TemplateRenderer,
    pub context: &'a RenderContext,
}

/// A single copy from one filesystem into another.
pub struct CopyJob<'a> {
    from: &'a dyn Filesystem,
    to: &'a dyn Filesystem,
    rendering: Option<Rendering<'a>>,
    ignore: IgnoreSet,
}

impl<'a> CopyJob<'a> {
    /// Creates a job that copies every file verbatim.
    pub fn new(from: &'a dyn Filesystem, to: &'a dyn Filesystem) -> Self {
        Self {
            from,
            to,
            rendering: None,
            ignore: IgnoreSet::Disabled,
        }
    }

    /// Renders files not matched by the ignore set.
    pub fn with_rendering(mut self, renderer: &'a dyn TemplateRenderer, context: &'a RenderContext) -> Self {
        self.rendering = Some(Rendering { renderer, context });
        self
    }

    pub fn with_ignore(mut self, ignore: IgnoreSet) -> Self {
        self.ignore = ignore;
        self
    }

    pub fn ignore(&self) -> &IgnoreSet {
        &self.ignore
    }

    /// Recursively copies `src` from the source filesystem into `dst`.
    ///
    /// `dst` may already exist: files are merged into it and same-named files
    /// are overwritten. Empty paths default to `/`.
    ///
    /// # Errors
    /// * `Error::SourceMissing` / `Error::NotADirectory` for a bad `src`
    /// * `Error::Io` for any read or write failure
    /// * `Error::TemplateSyntaxError` / `Error::TemplateExecutionError` from rendering
    ///
    /// The first failure aborts the copy; the destination may be left
    /// partially written.
    pub fn copy_dir(&self, src: &str, dst: &str) -> Result<()> {
        let snapshot = TreeSnapshot::capture(self.from, src)?;
        let dst = fs::clean(dst);

        self.to
            .mkdir_all(&dst, snapshot.root_mode)
            .map_err(|e| Error::io(dst.as_str(), e))?;

        for entry in snapshot.entries() {
            let src_path = fs::join(snapshot.root(), &entry.relative);
            let dst_path = fs::join(&dst, &entry.relative);

            if entry.is_symlink {
                debug!("Skipping symlink {}", src_path);
            } else if entry.is_dir {
                self.to
                    .mkdir_all(&dst_path, entry.mode)
                    .map_err(|e| Error::io(dst_path.as_str(), e))?;
            } else {
                self.copy_file(&src_path, &dst_path)?;
            }
        }
        Ok(())
    }

    fn copy_file(&self, src_path: &str, dst_path: &str) -> Result<()> {
        let content = self.from.read(src_path).map_err(|e| Error::io(src_path, e))?;

        let rendering = match self.rendering {
            Some(rendering) if !self.ignore.excluded(src_path) => Some(rendering),
            Some(_) => {
                debug!("Copying ignored file {} verbatim", src_path);
                None
            }
            None => None,
        };

        match rendering {
            Some(rendering) if std::str::from_utf8(&content).is_ok() => {
                debug!("Rendering {} into {}", src_path, dst_path);
                let mut out = self.to.create(dst_path).map_err(|e| Error::io(dst_path, e))?;
                rendering
                    .renderer
                    .render(&mut content.as_slice(), rendering.context, &mut out)?;
                out.flush().map_err(|e| Error::io(dst_path, e))
            }
            _ => {
                debug!("Copying {} into {}", src_path, dst_path);
                write_bytes(self.to, &content, dst_path)
            }
        }
    }

    /// Writes a literal blob into the destination filesystem.
    pub fn write_bytes(&self, data: &[u8], filename: &str) -> Result<()> {
        write_bytes(self.to, data, filename)
    }
}

/// Writes `data` to `filename`, creating missing parent directories.
pub fn write_bytes(fs: &dyn Filesystem, data: &[u8], filename: &str) -> Result<()> {
    fs.write(filename, data).map_err(|e| Error::io(filename, e))
}
