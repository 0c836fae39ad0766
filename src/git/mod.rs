//! Git access for the copy workflow: clone, branch, commit, push and tag,
//! built on libgit2.

mod repository;
mod transport;

pub use repository::{list_remote_tags, RepoHandle};
pub use transport::{Credential, TransportOptions};
