//! structural checks for untrusted object bytes
//!
//! these never look at other objects: a dirtree naming a missing child is
//! still structurally valid.

use crate::checksum::Checksum;
use crate::error::{Error, Result};
use crate::object::unwrap_content;
use crate::types::{mode, Commit, DirMeta, DirTree, ObjectType};

/// object type byte must be in `1..=4`
pub fn validate_objtype(objtype: u8) -> Result<ObjectType> {
    ObjectType::try_from(objtype)
}

/// binary checksum must be exactly 32 bytes
pub fn validate_csum_len(bytes: &[u8]) -> Result<Checksum> {
    Checksum::from_slice(bytes)
}

/// a single path component
pub fn validate_filename(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\0') {
        return Err(Error::InvalidFilename(name.to_string()));
    }
    Ok(())
}

fn validate_mode_bits(mode: u32) -> Result<()> {
    if mode & !mode::ALLOWED_BITS != 0 {
        return Err(Error::InvalidMode {
            mode,
            reason: "unknown mode bits",
        });
    }
    Ok(())
}

/// file objects are regular files or symlinks
pub fn validate_file_mode(mode: u32) -> Result<()> {
    if !(mode::is_reg(mode) || mode::is_lnk(mode)) {
        return Err(Error::InvalidMode {
            mode,
            reason: "file objects must be regular files or symlinks",
        });
    }
    validate_mode_bits(mode)
}

pub fn validate_dirmeta_mode(mode: u32) -> Result<()> {
    if !mode::is_dir(mode) {
        return Err(Error::InvalidMode {
            mode,
            reason: "dirmeta mode is not a directory",
        });
    }
    validate_mode_bits(mode)
}

pub fn validate_commit(data: &[u8]) -> Result<Commit> {
    Commit::from_bytes(data)
}

pub fn validate_dirtree(data: &[u8]) -> Result<DirTree> {
    DirTree::from_bytes(data)
}

pub fn validate_dirmeta(data: &[u8]) -> Result<DirMeta> {
    let meta = DirMeta::from_bytes(data)?;
    validate_dirmeta_mode(meta.mode)?;
    Ok(meta)
}

/// check the bytes of any object kind
///
/// file objects are given as their uncompressed content stream.
pub fn validate_metadata(objtype: ObjectType, data: &[u8]) -> Result<()> {
    match objtype {
        ObjectType::File => unwrap_content(data, false).map(|_| ()),
        ObjectType::DirTree => validate_dirtree(data).map(|_| ()),
        ObjectType::DirMeta => validate_dirmeta(data).map(|_| ()),
        ObjectType::Commit => validate_commit(data).map(|_| ()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::{wrap_content, FileHeader};
    use crate::types::{FileInfo, XattrSet};
    use crate::variant::Value;

    #[test]
    fn test_filenames() {
        for good in ["a", "...", ".hidden", "with space", "ünïcode"] {
            assert!(validate_filename(good).is_ok(), "{:?}", good);
        }
        for bad in ["", ".", "..", "a/b", "/", "nul\0"] {
            assert!(
                matches!(validate_filename(bad), Err(Error::InvalidFilename(_))),
                "{:?}",
                bad
            );
        }
    }

    #[test]
    fn test_objtype_range() {
        assert_eq!(validate_objtype(4).unwrap(), ObjectType::Commit);
        assert!(validate_objtype(0).is_err());
        assert!(validate_objtype(5).is_err());
    }

    #[test]
    fn test_csum_len() {
        assert!(validate_csum_len(&[0; 32]).is_ok());
        assert!(matches!(
            validate_csum_len(&[0; 16]),
            Err(Error::InvalidChecksumLength(16))
        ));
    }

    #[test]
    fn test_modes() {
        assert!(validate_file_mode(mode::S_IFREG | 0o4755).is_ok());
        assert!(validate_file_mode(mode::S_IFLNK | 0o777).is_ok());
        assert!(validate_file_mode(mode::S_IFSOCK | 0o644).is_err());
        assert!(validate_file_mode(mode::S_IFDIR | 0o755).is_err());
        assert!(validate_file_mode(0o1_000_000 | mode::S_IFREG).is_err());

        assert!(validate_dirmeta_mode(mode::S_IFDIR | 0o1777).is_ok());
        assert!(validate_dirmeta_mode(mode::S_IFREG | 0o644).is_err());
    }

    #[test]
    fn test_dirmeta_with_regular_mode_rejected() {
        let mut meta = DirMeta::new(0, 0, 0o755);
        meta.mode = mode::S_IFREG | 0o644;
        assert!(matches!(
            validate_dirmeta(&meta.to_bytes()),
            Err(Error::InvalidMode { .. })
        ));
        assert!(validate_metadata(ObjectType::DirMeta, &DirMeta::new(0, 0, 0o755).to_bytes()).is_ok());
    }

    #[test]
    fn test_commit_with_short_parent_rejected() {
        let commit = Commit::new(Checksum::digest(b"t"), Checksum::digest(b"m"), "s", 0);
        let mut value = commit.to_value();
        if let Value::Tuple(fields) = &mut value {
            fields[1] = Value::Bytes(vec![1; 16]);
        }
        assert!(validate_commit(&value.to_bytes()).is_err());
        assert!(validate_metadata(ObjectType::Commit, &commit.to_bytes()).is_ok());
    }

    #[test]
    fn test_file_stream() {
        let h = FileHeader::new(FileInfo::regular(0, 0, 0o644, 1), XattrSet::new());
        assert!(validate_metadata(ObjectType::File, &wrap_content(&h.encode(), b"x").unwrap()).is_ok());
        assert!(validate_metadata(ObjectType::File, b"garbage").is_err());
    }

    #[test]
    fn test_wrong_kind_rejected() {
        let meta = DirMeta::new(0, 0, 0o755).to_bytes();
        assert!(validate_metadata(ObjectType::Commit, &meta).is_err());
    }
}
