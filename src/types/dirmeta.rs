use crate::types::{mode, XattrSet};

/// ownership and permissions of one directory
///
/// content-addressed separately from the directory's children so a
/// permission change does not rehash the child list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirMeta {
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
    pub xattrs: XattrSet,
}

impl DirMeta {
    /// `perms` are the permission bits; the directory type bit is added
    pub fn new(uid: u32, gid: u32, perms: u32) -> Self {
        Self {
            uid,
            gid,
            mode: mode::S_IFDIR | mode::permissions(perms),
            xattrs: XattrSet::new(),
        }
    }

    pub fn with_xattrs(mut self, xattrs: XattrSet) -> Self {
        self.xattrs = xattrs;
        self
    }
}
