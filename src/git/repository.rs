use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{BranchType, Commit, Direction, ErrorCode, FetchOptions, IndexAddOption, ObjectType, PushOptions, Repository, Signature};
use log::{debug, info};
use tempfile::TempDir;

use super::transport::{CallbackState, TransportOptions};
use crate::constants::{COMMIT_AUTHOR_EMAIL, COMMIT_AUTHOR_NAME, DEFAULT_REMOTE};
use crate::error::{CloneErrorKind, Error, Result};
use crate::fs::{Filesystem, OsFs};

/// One cloned repository.
///
/// The object store and the working tree live in two separate temporary
/// directories, so the working tree exposed by [`RepoHandle::fs`] contains
/// only tracked content. Both are removed when the handle is dropped.
pub struct RepoHandle {
    url: String,
    repo: Repository,
    fs: OsFs,
    transport: TransportOptions,
    _git_dir: TempDir,
    _work_dir: TempDir,
}

impl std::fmt::Debug for RepoHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepoHandle")
            .field("url", &self.url)
            .field("workdir", &self.fs.root())
            .finish()
    }
}

fn scratch_dir(prefix: &str) -> Result<TempDir> {
    tempfile::Builder::new()
        .prefix(prefix)
        .tempdir()
        .map_err(|e| Error::io(std::env::temp_dir().display().to_string(), e))
}

fn force_checkout() -> CheckoutBuilder<'static> {
    let mut checkout = CheckoutBuilder::new();
    checkout.force();
    checkout
}

impl RepoHandle {
    /// Clones `url` and checks out the remote's default branch.
    ///
    /// # Errors
    /// * `Error::CloneFailed` classified by [`CloneErrorKind`]; a remote
    ///   without any commit is `EmptyRemoteRepository`
    /// * `Error::Cancelled` if the transport's token fired
    pub fn clone(url: &str, transport: &TransportOptions) -> Result<Self> {
        transport.cancel.check()?;
        debug!("Cloning repository '{}'", url);

        let git_dir = scratch_dir("provider-git-objects-")?;
        let work_dir = scratch_dir("provider-git-worktree-")?;

        let state = CallbackState::default();
        let mut fetch = FetchOptions::new();
        fetch.remote_callbacks(transport.callbacks(&state));

        let repo = RepoBuilder::new()
            .bare(true)
            .fetch_options(fetch)
            .clone(url, git_dir.path())
            .map_err(|e| transport.clone_error(url, e, &state))?;

        if repo.is_empty()? {
            return Err(Error::CloneFailed {
                url: url.to_string(),
                kind: CloneErrorKind::EmptyRemoteRepository,
                source: None,
            });
        }

        repo.set_workdir(work_dir.path(), false)?;
        repo.checkout_head(Some(&mut force_checkout()))?;

        Ok(Self {
            url: url.to_string(),
            fs: OsFs::new(work_dir.path()),
            repo,
            transport: transport.clone(),
            _git_dir: git_dir,
            _work_dir: work_dir,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// The checked-out working tree.
    pub fn fs(&self) -> &OsFs {
        &self.fs
    }

    /// Reports whether `path` exists in the working tree.
    pub fn exists(&self, path: &str) -> Result<bool> {
        self.fs.exists(path).map_err(|e| Error::io(path, e))
    }

    fn head_commit(&self) -> std::result::Result<Option<Commit<'_>>, git2::Error> {
        match self.repo.head() {
            Ok(head) => head.peel_to_commit().map(Some),
            Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn signature(&self) -> std::result::Result<Signature<'static>, git2::Error> {
        Signature::now(COMMIT_AUTHOR_NAME, COMMIT_AUTHOR_EMAIL)
    }

    /// Points HEAD at `refs/heads/<name>` and checks it out.
    ///
    /// A missing local branch starts from the remote-tracking branch of the
    /// same name, or from the current HEAD commit when the remote has none.
    pub fn branch(&self, name: &str) -> Result<()> {
        let refname = format!("refs/heads/{name}");

        if self.repo.find_reference(&refname).is_err() {
            let tracking = format!("refs/remotes/{DEFAULT_REMOTE}/{name}");
            let start = match self.repo.find_reference(&tracking) {
                Ok(reference) => Some(reference.peel_to_commit()?),
                Err(_) => self.head_commit()?,
            };
            if let Some(commit) = start {
                debug!("Creating branch '{}' at {}", name, commit.id());
                self.repo.branch(name, &commit, false)?;
            }
        }

        self.repo.set_head(&refname)?;
        if self.head_commit()?.is_some() {
            self.repo.checkout_head(Some(&mut force_checkout()))?;
        }
        Ok(())
    }

    /// Stages everything under `path` and commits it on HEAD.
    ///
    /// `.`, `/` and the empty path stage the whole working tree.
    ///
    /// # Returns
    /// * The new commit id as lowercase hex
    pub fn commit(&self, path: &str, message: &str) -> Result<String> {
        let pathspec = match path.trim_matches('/') {
            "" | "." => "*".to_string(),
            p => p.to_string(),
        };

        let commit = || -> std::result::Result<git2::Oid, git2::Error> {
            let mut index = self.repo.index()?;
            index.add_all([pathspec.as_str()], IndexAddOption::DEFAULT, None)?;
            index.update_all([pathspec.as_str()], None)?;
            index.write()?;

            let tree = self.repo.find_tree(index.write_tree()?)?;
            let signature = self.signature()?;
            let parent = self.head_commit()?;
            let parents: Vec<&Commit<'_>> = parent.iter().collect();
            self.repo
                .commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)
        };

        let oid = commit().map_err(Error::CommitFailed)?;
        info!("Committed {} on {}", oid, self.url);
        Ok(oid.to_string())
    }

    /// Pushes to `remote_name`.
    ///
    /// With an empty `branch` every local branch is pushed without force.
    /// Otherwise `refs/heads/<branch>` is created at HEAD when missing and
    /// force-pushed, so repeated calls succeed.
    pub fn push(&self, remote_name: &str, branch: &str) -> Result<()> {
        let refspecs = if branch.is_empty() {
            let mut refspecs = Vec::new();
            for entry in self.repo.branches(Some(BranchType::Local))? {
                let (local, _) = entry?;
                if let Some(name) = local.get().name() {
                    refspecs.push(format!("{name}:{name}"));
                }
            }
            refspecs
        } else {
            let refname = format!("refs/heads/{branch}");
            if self.repo.find_reference(&refname).is_err() {
                let head = self.repo.head()?.peel_to_commit()?;
                self.repo
                    .reference(&refname, head.id(), false, "provider-git: branch for push")?;
            }
            vec![format!("+{refname}:{refname}")]
        };

        self.push_refspecs(remote_name, &refspecs)
    }

    fn push_refspecs(&self, remote_name: &str, refspecs: &[String]) -> Result<()> {
        self.transport.cancel.check()?;
        if refspecs.is_empty() {
            debug!("Nothing to push to '{}'", remote_name);
            return Ok(());
        }
        debug!("Pushing {:?} to '{}'", refspecs, remote_name);

        let mut remote = self.repo.find_remote(remote_name)?;
        let state = CallbackState::default();
        let mut options = PushOptions::new();
        options.remote_callbacks(self.transport.callbacks(&state));

        remote.push(refspecs, Some(&mut options)).map_err(|source| {
            if self.transport.cancel.is_cancelled() {
                Error::Cancelled
            } else {
                Error::PushFailed {
                    remote: remote_name.to_string(),
                    source,
                }
            }
        })?;

        match state.take_rejection() {
            Some((reference, message)) => Err(Error::PushRejected { reference, message }),
            None => Ok(()),
        }
    }

    /// Creates an annotated tag named `tag` at HEAD.
    ///
    /// # Returns
    /// * `false` without touching anything if the tag already exists
    pub fn create_tag(&self, tag: &str) -> Result<bool> {
        if self.repo.tag_names(None)?.iter().flatten().any(|name| name == tag) {
            debug!("Tag '{}' already exists", tag);
            return Ok(false);
        }

        let target = self.repo.head()?.peel(ObjectType::Commit)?;
        let signature = self.signature()?;
        self.repo.tag(tag, &target, &signature, tag, false)?;
        info!("Created tag '{}' on {}", tag, self.url);
        Ok(true)
    }

    /// Pushes every local tag to `origin`. Tags the remote already has are
    /// a no-op.
    pub fn push_tags(&self) -> Result<()> {
        let refspecs: Vec<String> = self
            .repo
            .tag_names(None)?
            .iter()
            .flatten()
            .map(|tag| format!("refs/tags/{tag}:refs/tags/{tag}"))
            .collect();
        self.push_refspecs(DEFAULT_REMOTE, &refspecs)
    }

    /// Fetches `origin` and fast-forwards the current branch.
    ///
    /// # Errors
    /// * `Error::Git` if the branch has diverged from its upstream
    pub fn pull(&self) -> Result<()> {
        self.transport.cancel.check()?;

        let state = CallbackState::default();
        let mut options = FetchOptions::new();
        options.remote_callbacks(self.transport.callbacks(&state));
        self.repo
            .find_remote(DEFAULT_REMOTE)?
            .fetch(&[] as &[&str], Some(&mut options), None)
            .map_err(|e| self.transport.clone_error(&self.url, e, &state))?;

        let head = self.repo.find_reference("HEAD")?;
        let refname = head
            .symbolic_target()
            .ok_or_else(|| git2::Error::from_str("HEAD is detached"))?
            .to_string();
        let Some(branch) = refname.strip_prefix("refs/heads/") else {
            return Err(git2::Error::from_str("HEAD does not point at a branch").into());
        };

        let tracking = format!("refs/remotes/{DEFAULT_REMOTE}/{branch}");
        let upstream = match self.repo.find_reference(&tracking) {
            Ok(reference) => reference,
            Err(_) => {
                debug!("Branch '{}' has no upstream, nothing to pull", branch);
                return Ok(());
            }
        };
        let fetched = self.repo.reference_to_annotated_commit(&upstream)?;
        let (analysis, _) = self.repo.merge_analysis(&[&fetched])?;

        if analysis.is_up_to_date() {
            debug!("'{}' already up to date", branch);
            return Ok(());
        }
        if !(analysis.is_fast_forward() || analysis.is_unborn()) {
            return Err(git2::Error::from_str("local branch has diverged from its upstream").into());
        }

        self.repo
            .reference(&refname, fetched.id(), true, "provider-git: fast-forward")?;
        self.repo.set_head(&refname)?;
        self.repo.checkout_head(Some(&mut force_checkout()))?;
        info!("Fast-forwarded '{}' to {}", branch, fetched.id());
        Ok(())
    }
}

/// Lists the tag names advertised by the remote at `url` without cloning it.
pub fn list_remote_tags(url: &str, transport: &TransportOptions) -> Result<Vec<String>> {
    transport.cancel.check()?;

    let mut remote = git2::Remote::create_detached(url)?;
    let state = CallbackState::default();
    let connection = remote
        .connect_auth(Direction::Fetch, Some(transport.callbacks(&state)), None)
        .map_err(|e| transport.clone_error(url, e, &state))?;

    let mut tags: Vec<String> = connection
        .list()?
        .iter()
        .filter_map(|head| head.name().strip_prefix("refs/tags/"))
        .map(|name| name.trim_end_matches("^{}").to_string())
        .collect();
    tags.sort();
    tags.dedup();
    Ok(tags)
}
