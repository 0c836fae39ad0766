//! Shared fixtures: local bare repositories standing in for git remotes and
//! a tiny HTTP server standing in for REST services.
#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::thread;

use git2::{Index, IndexEntry, IndexTime, Oid, Repository, Signature};

/// Creates an empty bare repository whose HEAD points at `head_branch`.
pub fn bare_repo(dir: &Path, name: &str, head_branch: &str) -> PathBuf {
    let path = dir.join(format!("{name}.git"));
    let repo = Repository::init_bare(&path).unwrap();
    repo.set_head(&format!("refs/heads/{head_branch}")).unwrap();
    path
}

/// Commits `files` on top of `branch` in the bare repository at `path`.
/// Files of the parent commit are kept.
pub fn commit_files(path: &Path, branch: &str, files: &[(&str, &str)]) -> Oid {
    let repo = Repository::open_bare(path).unwrap();
    let refname = format!("refs/heads/{branch}");
    let parent = repo
        .find_reference(&refname)
        .ok()
        .map(|r| r.peel_to_commit().unwrap());

    let mut index = Index::new().unwrap();
    if let Some(parent) = &parent {
        index.read_tree(&parent.tree().unwrap()).unwrap();
    }
    for (file, content) in files {
        let id = repo.blob(content.as_bytes()).unwrap();
        index
            .add(&IndexEntry {
                ctime: IndexTime::new(0, 0),
                mtime: IndexTime::new(0, 0),
                dev: 0,
                ino: 0,
                mode: 0o100644,
                uid: 0,
                gid: 0,
                file_size: content.len() as u32,
                id,
                flags: file.len().min(0xfff) as u16,
                flags_extended: 0,
                path: file.as_bytes().to_vec(),
            })
            .unwrap();
    }
    let tree = repo.find_tree(index.write_tree_to(&repo).unwrap()).unwrap();
    let signature = Signature::now("fixture", "fixture@example.com").unwrap();
    let parents: Vec<_> = parent.iter().collect();
    repo.commit(Some(&refname), &signature, &signature, "fixture commit", &tree, &parents)
        .unwrap()
}

/// Creates a lightweight tag on the tip of `branch`.
pub fn tag_branch(path: &Path, branch: &str, tag: &str) -> Oid {
    let repo = Repository::open_bare(path).unwrap();
    let commit = repo
        .find_reference(&format!("refs/heads/{branch}"))
        .unwrap()
        .peel_to_commit()
        .unwrap();
    repo.tag_lightweight(tag, commit.as_object(), false).unwrap();
    commit.id()
}

pub fn read_head(path: &Path, branch: &str) -> Oid {
    let repo = Repository::open_bare(path).unwrap();
    let id = repo
        .find_reference(&format!("refs/heads/{branch}"))
        .unwrap()
        .peel_to_commit()
        .unwrap()
        .id();
    id
}

/// Resolves `refs/tags/<tag>` to the commit it points at.
pub fn tag_target(path: &Path, tag: &str) -> Option<Oid> {
    let repo = Repository::open_bare(path).unwrap();
    let reference = repo.find_reference(&format!("refs/tags/{tag}")).ok()?;
    let id = reference.peel_to_commit().unwrap().id();
    Some(id)
}

pub fn file_url(path: &Path) -> String {
    format!("file://{}", path.display())
}

/// Reads a file from `branch` of a bare repository without checking it out.
pub fn read_blob(path: &Path, branch: &str, file: &str) -> Option<String> {
    let repo = Repository::open_bare(path).unwrap();
    let commit = repo
        .find_reference(&format!("refs/heads/{branch}"))
        .ok()?
        .peel_to_commit()
        .unwrap();
    let entry = commit.tree().unwrap().get_path(Path::new(file)).ok()?;
    let blob = repo.find_blob(entry.id()).unwrap();
    Some(String::from_utf8_lossy(blob.content()).into_owned())
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub body: String,
}

/// Canned responses keyed by `"METHOD /path"`; anything else gets a 404.
pub struct StubServer {
    pub base_url: String,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl StubServer {
    pub fn start(routes: &[(&str, u16, &str)]) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let base_url = format!("http://{}", listener.local_addr().unwrap());
        let routes: HashMap<String, (u16, String)> = routes
            .iter()
            .map(|(route, status, body)| (route.to_string(), (*status, body.to_string())))
            .collect();
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = Arc::clone(&requests);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else { continue };
                handle(stream, &routes, &recorded);
            }
        });

        Self { base_url, requests }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }
}

fn handle(
    stream: TcpStream,
    routes: &HashMap<String, (u16, String)>,
    recorded: &Mutex<Vec<RecordedRequest>>,
) {
    let mut reader = BufReader::new(stream);
    let mut request_line = String::new();
    if reader.read_line(&mut request_line).is_err() {
        return;
    }
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let mut headers = HashMap::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line).unwrap_or(0) == 0 || line == "\r\n" {
            break;
        }
        if let Some((name, value)) = line.trim_end().split_once(':') {
            headers.insert(name.trim().to_ascii_lowercase(), value.trim().to_string());
        }
    }
    let length: usize = headers
        .get("content-length")
        .and_then(|v| v.parse().ok())
        .unwrap_or(0);
    let mut body = vec![0; length];
    let _ = reader.read_exact(&mut body);

    let (status, response) = routes
        .get(&format!("{method} {path}"))
        .cloned()
        .unwrap_or((404, r#"{"message": "Not Found"}"#.to_string()));
    recorded.lock().unwrap().push(RecordedRequest {
        method,
        path,
        headers,
        body: String::from_utf8_lossy(&body).into_owned(),
    });

    let reason = match status {
        200 => "OK",
        201 => "Created",
        404 => "Not Found",
        422 => "Unprocessable Entity",
        _ => "Status",
    };
    let mut stream = reader.into_inner();
    let _ = write!(
        stream,
        "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{response}",
        response.len()
    );
    let _ = stream.flush();
}
