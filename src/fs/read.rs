use std::ffi::OsStr;
use std::fs::{self, File};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::MetadataExt;
use std::path::Path;

use nix::libc;
use tracing::warn;

use crate::cancel::{self, Cancellable};
use crate::checksum::Checksum;
use crate::error::{Error, IoResultExt, Result};
use crate::object::{file_checksum, FileHeader};
use crate::types::{mode, DirMeta, FileInfo, FileType, ObjectType, Xattr, XattrSet};
use crate::validate::validate_metadata;

/// read all extended attributes of a path without following symlinks
///
/// a filesystem without xattr support yields an empty set.
pub fn read_xattrs(path: &Path) -> Result<XattrSet> {
    let names = match xattr::list(path) {
        Ok(iter) => iter.collect::<Vec<_>>(),
        Err(e) => {
            if e.raw_os_error() == Some(libc::ENOTSUP)
                || e.raw_os_error() == Some(libc::EOPNOTSUPP)
                || e.raw_os_error() == Some(libc::ENODATA)
            {
                return Ok(XattrSet::new());
            }
            return Err(Error::Xattr {
                path: path.to_path_buf(),
                name: "<list>".to_string(),
                source: e,
            });
        }
    };

    let mut xattrs = Vec::with_capacity(names.len());
    for name in names {
        match xattr::get(path, &name) {
            Ok(Some(value)) => xattrs.push(Xattr::new(name.as_bytes(), value)),
            // removed between list and get
            Ok(None) => {}
            Err(e) if e.raw_os_error() == Some(libc::ENODATA) => {}
            Err(e) => {
                return Err(Error::Xattr {
                    path: path.to_path_buf(),
                    name: name.to_string_lossy().into_owned(),
                    source: e,
                })
            }
        }
    }

    XattrSet::canonicalize(xattrs)
}

impl FileInfo {
    /// build from `lstat` of a path; symlinks are not followed
    pub fn from_path(path: &Path) -> Result<Self> {
        let meta = fs::symlink_metadata(path).with_path(path)?;
        let file_mode = meta.mode();
        let mut info = FileInfo {
            uid: meta.uid(),
            gid: meta.gid(),
            mode: file_mode,
            rdev: 0,
            size: 0,
            symlink_target: String::new(),
        };
        match FileType::from_mode(file_mode) {
            FileType::Regular => info.size = meta.len(),
            FileType::Symlink => info.symlink_target = read_symlink_target(path)?,
            FileType::Directory => {}
            FileType::Special => info.rdev = meta.rdev() as u32,
        }
        Ok(info)
    }
}

/// read symlink target; it must be valid utf-8 to be stored
pub fn read_symlink_target(path: &Path) -> Result<String> {
    let target = fs::read_link(path).with_path(path)?;
    target
        .into_os_string()
        .into_string()
        .map_err(|t| Error::InvalidFilename(t.to_string_lossy().into_owned()))
}

/// checksum an on-disk entry as an object of the given kind
///
/// files are hashed as their content stream and directories as their
/// dirmeta; dirtree and commit objects are read as serialized bytes.
pub fn checksum_file(
    path: &Path,
    objtype: ObjectType,
    cancel: Option<&Cancellable>,
) -> Result<Checksum> {
    cancel::check(cancel)?;
    match objtype {
        ObjectType::File => {
            let info = FileInfo::from_path(path)?;
            let xattrs = read_xattrs(path)?;
            match info.file_type() {
                FileType::Regular => {
                    let file = File::open(path).with_path(path)?;
                    file_checksum(&FileHeader::new(info, xattrs), file).with_path(path)
                }
                FileType::Symlink => {
                    file_checksum(&FileHeader::new(info, xattrs), std::io::empty()).with_path(path)
                }
                _ => Err(Error::InvalidMode {
                    mode: info.mode,
                    reason: "only regular files and symlinks are file objects",
                }),
            }
        }
        ObjectType::DirMeta => {
            let info = FileInfo::from_path(path)?;
            if !info.is_dir() {
                return Err(Error::InvalidMode {
                    mode: info.mode,
                    reason: "dirmeta checksum of a non-directory",
                });
            }
            let meta = DirMeta {
                uid: info.uid,
                gid: info.gid,
                mode: mode::S_IFDIR | mode::permissions(info.mode),
                xattrs: read_xattrs(path)?,
            };
            Ok(meta.checksum())
        }
        ObjectType::DirTree | ObjectType::Commit => {
            let data = fs::read(path).with_path(path)?;
            if let Err(e) = validate_metadata(objtype, &data) {
                warn!(path = %path.display(), %objtype, error = %e, "checksumming invalid object");
            }
            Ok(Checksum::digest(&data))
        }
    }
}

pub(crate) fn xattr_name(name: &[u8]) -> &OsStr {
    OsStr::from_bytes(name)
}
