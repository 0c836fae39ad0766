use std::collections::BTreeMap;
use std::io::{self, Cursor, Read, Write};
use std::sync::{Mutex, MutexGuard};

use super::{clean, split, DirEntry, EntryKind, FileInfo, Filesystem, DEFAULT_DIR_MODE, DEFAULT_FILE_MODE};

const MAX_SYMLINK_HOPS: usize = 16;

#[derive(Debug, Clone)]
enum MemNode {
    Dir { mode: u32 },
    File { data: Vec<u8>, mode: u32 },
    Symlink { target: String },
}

/// An in-memory [`Filesystem`], keyed by cleaned absolute paths.
#[derive(Debug)]
pub struct MemFs {
    nodes: Mutex<BTreeMap<String, MemNode>>,
}

impl Default for MemFs {
    fn default() -> Self {
        MemFs::new()
    }
}

fn not_found(path: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("{path}: file does not exist"))
}

fn not_a_directory(path: &str) -> io::Error {
    io::Error::new(io::ErrorKind::Other, format!("{path}: not a directory"))
}

impl MemFs {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), MemNode::Dir { mode: DEFAULT_DIR_MODE });
        Self {
            nodes: Mutex::new(nodes),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, MemNode>> {
        // Nodes are only ever inserted, so a poisoned map is still usable.
        self.nodes.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Creates a symlink at `link` pointing to `target`. Relative targets are
    /// resolved against the link's parent directory.
    pub fn symlink(&self, target: &str, link: &str) -> io::Result<()> {
        let link = clean(link);
        let (parent, _) = split(&link);
        let mut nodes = self.lock();
        mkdir_locked(&mut nodes, &parent, DEFAULT_DIR_MODE)?;
        nodes.insert(
            link,
            MemNode::Symlink {
                target: target.to_string(),
            },
        );
        Ok(())
    }

    /// Returns every regular file path currently stored, sorted.
    pub fn files(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter(|(_, node)| matches!(node, MemNode::File { .. }))
            .map(|(path, _)| path.clone())
            .collect()
    }

    fn resolve(nodes: &BTreeMap<String, MemNode>, path: &str) -> io::Result<(String, MemNode)> {
        let mut current = clean(path);
        for _ in 0..MAX_SYMLINK_HOPS {
            match nodes.get(&current) {
                None => return Err(not_found(&current)),
                Some(MemNode::Symlink { target }) => {
                    current = if target.starts_with('/') {
                        clean(target)
                    } else {
                        let (parent, _) = split(&current);
                        clean(&format!("{parent}/{target}"))
                    };
                }
                Some(node) => return Ok((current, node.clone())),
            }
        }
        Err(io::Error::new(
            io::ErrorKind::Other,
            format!("{path}: too many levels of symbolic links"),
        ))
    }
}

fn mkdir_locked(nodes: &mut BTreeMap<String, MemNode>, path: &str, mode: u32) -> io::Result<()> {
    let cleaned = clean(path);
    let mut current = String::new();
    for segment in cleaned.split('/').filter(|s| !s.is_empty()) {
        current.push('/');
        current.push_str(segment);
        match nodes.get(&current) {
            Some(MemNode::Dir { .. }) => {}
            Some(_) => return Err(not_a_directory(&current)),
            None => {
                nodes.insert(current.clone(), MemNode::Dir { mode });
            }
        }
    }
    Ok(())
}

/// Buffers writes and stores them into the owning [`MemFs`] on flush and drop.
struct MemFileWriter<'a> {
    fs: &'a MemFs,
    path: String,
    buf: Vec<u8>,
}

impl MemFileWriter<'_> {
    fn store(&self) {
        let mut nodes = self.fs.lock();
        let mode = match nodes.get(&self.path) {
            Some(MemNode::File { mode, .. }) => *mode,
            _ => DEFAULT_FILE_MODE,
        };
        nodes.insert(
            self.path.clone(),
            MemNode::File {
                data: self.buf.clone(),
                mode,
            },
        );
    }
}

impl Write for MemFileWriter<'_> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.store();
        Ok(())
    }
}

impl Drop for MemFileWriter<'_> {
    fn drop(&mut self) {
        self.store();
    }
}

impl Filesystem for MemFs {
    fn stat(&self, path: &str) -> io::Result<FileInfo> {
        let nodes = self.lock();
        let (_, node) = Self::resolve(&nodes, path)?;
        Ok(match node {
            MemNode::Dir { mode } => FileInfo {
                kind: EntryKind::Dir,
                mode,
            },
            MemNode::File { mode, .. } => FileInfo {
                kind: EntryKind::File,
                mode,
            },
            MemNode::Symlink { .. } => unreachable!("resolve follows symlinks"),
        })
    }

    fn read_dir(&self, path: &str) -> io::Result<Vec<DirEntry>> {
        let nodes = self.lock();
        let (dir, node) = Self::resolve(&nodes, path)?;
        if !matches!(node, MemNode::Dir { .. }) {
            return Err(not_a_directory(&dir));
        }
        let prefix = if dir == "/" { "/".to_string() } else { format!("{dir}/") };
        let entries = nodes
            .range(prefix.clone()..)
            .take_while(|(key, _)| key.starts_with(&prefix))
            .filter(|(key, _)| key.len() > prefix.len() && !key[prefix.len()..].contains('/'))
            .map(|(key, node)| {
                let (kind, mode) = match node {
                    MemNode::Dir { mode } => (EntryKind::Dir, *mode),
                    MemNode::File { mode, .. } => (EntryKind::File, *mode),
                    MemNode::Symlink { .. } => (EntryKind::Symlink, 0o777),
                };
                DirEntry {
                    name: key[prefix.len()..].to_string(),
                    kind,
                    mode,
                }
            })
            .collect();
        Ok(entries)
    }

    fn mkdir_all(&self, path: &str, mode: u32) -> io::Result<()> {
        let mode = if mode == 0 { DEFAULT_DIR_MODE } else { mode };
        mkdir_locked(&mut self.lock(), path, mode)
    }

    fn open(&self, path: &str) -> io::Result<Box<dyn Read + '_>> {
        let nodes = self.lock();
        match Self::resolve(&nodes, path)? {
            (_, MemNode::File { data, .. }) => Ok(Box::new(Cursor::new(data))),
            (resolved, _) => Err(io::Error::new(
                io::ErrorKind::Other,
                format!("{resolved}: is a directory"),
            )),
        }
    }

    fn create(&self, path: &str) -> io::Result<Box<dyn Write + '_>> {
        let path = clean(path);
        {
            let mut nodes = self.lock();
            if let Some(MemNode::Dir { .. }) = nodes.get(&path) {
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("{path}: is a directory"),
                ));
            }
            let (parent, _) = split(&path);
            mkdir_locked(&mut nodes, &parent, DEFAULT_DIR_MODE)?;
        }
        let writer = MemFileWriter {
            fs: self,
            path,
            buf: Vec::new(),
        };
        // Truncate immediately, like O_TRUNC.
        writer.store();
        Ok(Box::new(writer))
    }
}
