mod commit;
mod dirmeta;
mod dirtree;
mod file;
pub mod mode;
mod object;
mod xattr;

pub use commit::Commit;
pub use dirmeta::DirMeta;
pub use dirtree::{DirTree, DirTreeDir, DirTreeFile};
pub use file::{FileInfo, FileType};
pub use object::{relative_object_path, ObjectName, ObjectType};
pub use xattr::{canonicalize_name_list, Xattr, XattrSet};
