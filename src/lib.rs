//! ostcore - ostree object core
//!
//! canonical encoding, validation and checksumming of the objects of an
//! ostree-style content-addressed filesystem store, plus the static delta
//! format used to ship them.
//!
//! # Core concepts
//!
//! - **File**: a header (ownership, mode, xattrs, symlink target) framed
//!   together with the file's content
//! - **DirTree**: the sorted children of one directory
//! - **DirMeta**: ownership, mode and xattrs of a directory
//! - **Commit**: a root dirtree/dirmeta pair with parent, subject and body
//! - **Static delta**: a superblock plus parts whose op streams rebuild a
//!   declared list of objects
//!
//! # Checksum
//!
//! object checksum = SHA256(canonical bytes)
//!
//! where a file object's canonical bytes are
//! `u32 BE header length | 4 zero bytes | header | content`.
//!
//! # Example usage
//!
//! ```no_run
//! use ostcore::{ObjectStore, Repo, RepoMode};
//! use ostcore::object::FileHeader;
//! use ostcore::types::{FileInfo, XattrSet};
//! use std::path::Path;
//!
//! let repo = Repo::init(Path::new("/path/to/repo"), RepoMode::ArchiveZ2).unwrap();
//!
//! let header = FileHeader::new(FileInfo::regular(0, 0, 0o644, 5), XattrSet::new());
//! let checksum = repo.write_file(&header, b"hello", None).unwrap();
//! println!("{}", checksum);
//! ```

mod cancel;
mod checksum;
mod config;
mod error;
mod refs;
mod repo;
mod store;

pub mod delta;
pub mod fs;
pub mod object;
pub mod types;
pub mod validate;
pub mod variant;

pub use cancel::Cancellable;
pub use checksum::{validate_checksum_string, Checksum, Hasher};
pub use config::{Config, CoreConfig, DeltaConfig, RepoMode};
pub use error::{Error, ErrorKind, Result};
pub use object::{FileHeader, Object};
pub use refs::{parse_refspec, validate_rev, Refspec};
pub use repo::{Repo, RepoLock};
pub use store::{MemoryStore, ObjectStore};
pub use types::{Commit, DirMeta, DirTree, ObjectName, ObjectType, XattrSet};
