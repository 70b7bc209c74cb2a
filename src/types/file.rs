use crate::types::mode;

/// what kind of filesystem entry a mode describes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Regular,
    Directory,
    Symlink,
    /// devices, fifos, sockets: never stored as objects
    Special,
}

impl FileType {
    pub fn from_mode(mode: u32) -> Self {
        if mode::is_reg(mode) {
            FileType::Regular
        } else if mode::is_dir(mode) {
            FileType::Directory
        } else if mode::is_lnk(mode) {
            FileType::Symlink
        } else {
            FileType::Special
        }
    }
}

/// metadata of a file object or of an entry about to be materialized
///
/// `size` is the content length for regular files and zero otherwise.
/// `symlink_target` is empty unless `mode` describes a symlink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
    pub rdev: u32,
    pub size: u64,
    pub symlink_target: String,
}

impl FileInfo {
    /// regular file; `perms` are the permission bits only
    pub fn regular(uid: u32, gid: u32, perms: u32, size: u64) -> Self {
        Self {
            uid,
            gid,
            mode: mode::S_IFREG | mode::permissions(perms),
            rdev: 0,
            size,
            symlink_target: String::new(),
        }
    }

    pub fn symlink(uid: u32, gid: u32, target: impl Into<String>) -> Self {
        Self {
            uid,
            gid,
            mode: mode::S_IFLNK | 0o777,
            rdev: 0,
            size: 0,
            symlink_target: target.into(),
        }
    }

    pub fn directory(uid: u32, gid: u32, perms: u32) -> Self {
        Self {
            uid,
            gid,
            mode: mode::S_IFDIR | mode::permissions(perms),
            rdev: 0,
            size: 0,
            symlink_target: String::new(),
        }
    }

    pub fn file_type(&self) -> FileType {
        FileType::from_mode(self.mode)
    }

    pub fn is_regular(&self) -> bool {
        self.file_type() == FileType::Regular
    }

    pub fn is_symlink(&self) -> bool {
        self.file_type() == FileType::Symlink
    }

    pub fn is_dir(&self) -> bool {
        self.file_type() == FileType::Directory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructors_set_type_bits() {
        assert!(FileInfo::regular(0, 0, 0o644, 5).is_regular());
        assert!(FileInfo::symlink(0, 0, "/x").is_symlink());
        assert!(FileInfo::directory(0, 0, 0o755).is_dir());
    }

    #[test]
    fn test_regular_masks_type_bits_from_perms() {
        let info = FileInfo::regular(0, 0, mode::S_IFDIR | 0o644, 0);
        assert_eq!(info.mode, mode::S_IFREG | 0o644);
    }

    #[test]
    fn test_special_types() {
        assert_eq!(FileType::from_mode(mode::S_IFSOCK | 0o644), FileType::Special);
        assert_eq!(FileType::from_mode(mode::S_IFCHR), FileType::Special);
        assert_eq!(FileType::from_mode(mode::S_IFIFO), FileType::Special);
    }
}
