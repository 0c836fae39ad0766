//! File and directory ignore pattern handling for source skeletons.
//! This module processes `.krateoignore` files: paths matching a pattern are
//! still copied, but byte-for-byte, without template rendering.

use crate::constants::IGNORE_FILE;
use crate::fs::Filesystem;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use log::{debug, warn};

/// A compiled set of gitignore-style patterns.
///
/// `Disabled` is what you get when no ignore file could be read; it behaves
/// exactly like an empty pattern list but lets callers tell the two apart.
#[derive(Debug, Clone, Default)]
pub enum IgnoreSet {
    #[default]
    Disabled,
    Patterns(Gitignore),
}

impl IgnoreSet {
    /// Compiles pattern lines with gitignore precedence: later lines override
    /// earlier ones and `!pattern` re-includes.
    ///
    /// # Notes
    /// - Blank lines and `#` comments are skipped
    /// - Invalid patterns are logged and skipped, they never fail the build
    pub fn compile<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = GitignoreBuilder::new("");
        for line in lines {
            let line = line.as_ref();
            if let Err(e) = builder.add_line(None, line) {
                warn!("Skipping invalid ignore pattern '{}': {}", line, e);
            }
        }
        match builder.build() {
            Ok(matcher) => IgnoreSet::Patterns(matcher),
            Err(e) => {
                warn!("Ignore patterns could not be compiled: {}", e);
                IgnoreSet::Disabled
            }
        }
    }

    /// Reads the ignore file at the root of `fs`, best-effort.
    ///
    /// # Returns
    /// * `IgnoreSet::Disabled` if the file is missing or unreadable
    pub fn load(fs: &dyn Filesystem) -> Self {
        Self::load_from(fs, IGNORE_FILE)
    }

    /// Like [`IgnoreSet::load`] with an explicit file path.
    pub fn load_from(fs: &dyn Filesystem, path: &str) -> Self {
        match fs.read(path) {
            Ok(bytes) => {
                let contents = String::from_utf8_lossy(&bytes);
                debug!("Loaded ignore file '{}'", path);
                IgnoreSet::compile(contents.lines())
            }
            Err(e) => {
                debug!("Ignore file '{}' not loaded: {}", path, e);
                IgnoreSet::Disabled
            }
        }
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self, IgnoreSet::Disabled)
    }

    /// Tests a source path. Paths are interpreted relative to the root of
    /// the source tree; a leading `/` is ignored.
    pub fn excluded(&self, path: &str) -> bool {
        let matcher = match self {
            IgnoreSet::Disabled => return false,
            IgnoreSet::Patterns(matcher) => matcher,
        };
        let relative = path.trim_start_matches('/');
        if relative.is_empty() {
            return false;
        }
        matcher.matched_path_or_any_parents(relative, false).is_ignore()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::MemFs;

    #[test]
    fn test_basename_pattern_matches_at_any_depth() {
        let set = IgnoreSet::compile(["a.txt"]);
        assert!(set.excluded("/skeleton/a.txt"));
        assert!(set.excluded("a.txt"));
        assert!(!set.excluded("/skeleton/b.txt"));
    }

    #[test]
    fn test_later_patterns_override_earlier() {
        let set = IgnoreSet::compile(["*.yaml", "!values.yaml"]);
        assert!(set.excluded("/chart/deployment.yaml"));
        assert!(!set.excluded("/chart/values.yaml"));

        let set = IgnoreSet::compile(["!values.yaml", "*.yaml"]);
        assert!(set.excluded("/chart/values.yaml"));
    }

    #[test]
    fn test_directory_pattern_excludes_contents() {
        let set = IgnoreSet::compile(["# static assets", "", "assets/"]);
        assert!(set.excluded("/skeleton/assets/logo.svg"));
        assert!(!set.excluded("/skeleton/assets.txt"));
    }

    #[test]
    fn test_missing_file_is_disabled() {
        let fs = MemFs::new();
        let set = IgnoreSet::load(&fs);
        assert!(set.is_disabled());
        assert!(!set.excluded("/anything"));

        let empty = IgnoreSet::compile(Vec::<String>::new());
        assert!(!empty.is_disabled());
        assert!(!empty.excluded("/anything"));
    }

    #[test]
    fn test_load_reads_root_ignore_file() {
        let fs = MemFs::new();
        fs.write("/.krateoignore", b"*.tpl\n").unwrap();
        let set = IgnoreSet::load(&fs);
        assert!(!set.is_disabled());
        assert!(set.excluded("/skeleton/raw.tpl"));
    }
}
