use std::fs::{self, DirBuilder, File, OpenOptions, Permissions};
use std::io::{self, Read};
use std::os::unix::fs::{fchown, lchown, symlink, DirBuilderExt, OpenOptionsExt, PermissionsExt};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use xattr::FileExt;

use crate::cancel::{self, Cancellable};
use crate::error::{Error, IoResultExt, Result};
use crate::fs::read::xattr_name;
use crate::types::{mode, FileInfo, FileType, XattrSet};

/// attempts made before giving up on finding an unused name
pub const MAX_NAME_ATTEMPTS: u32 = 128;

/// mode used when no metadata is given
pub const DEFAULT_FILE_MODE: u32 = mode::S_IFREG | 0o664;

/// source of candidate names for `materialize_with_unique_name_using`
pub trait NameSource {
    fn next_name(&mut self) -> String;
}

/// random names from uuid v4
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidNames;

impl NameSource for UuidNames {
    fn next_name(&mut self) -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }
}

fn current_ids() -> (u32, u32) {
    (
        nix::unistd::getuid().as_raw(),
        nix::unistd::getgid().as_raw(),
    )
}

/// ownership changes are skipped when they would be no-ops, so that
/// unprivileged callers can materialize their own files
fn needs_chown(uid: u32, gid: u32) -> bool {
    let (current_uid, current_gid) = current_ids();
    uid != current_uid || gid != current_gid
}

/// create `dest` from metadata, xattrs and content
///
/// without `info` a regular file with mode 0664 owned by the caller is
/// created. regular files are created exclusively, so an existing `dest`
/// fails with an `AlreadyExists` io error and is left untouched. if a later
/// step fails the new file or symlink is unlinked again; a new directory
/// is kept.
pub fn materialize(
    dest: &Path,
    info: Option<&FileInfo>,
    xattrs: Option<&XattrSet>,
    content: Option<&mut dyn Read>,
    cancel: Option<&Cancellable>,
) -> Result<()> {
    cancel::check(cancel)?;

    let default_info;
    let info = match info {
        Some(info) => info,
        None => {
            let (uid, gid) = current_ids();
            default_info = FileInfo {
                uid,
                gid,
                mode: DEFAULT_FILE_MODE,
                rdev: 0,
                size: 0,
                symlink_target: String::new(),
            };
            &default_info
        }
    };
    let perms = mode::permissions(info.mode);

    match info.file_type() {
        FileType::Directory => {
            DirBuilder::new().mode(perms).create(dest).with_path(dest)?;
            finish_directory(dest, info, xattrs)
        }
        FileType::Regular => {
            let file = OpenOptions::new()
                .write(true)
                .create_new(true)
                .mode(perms)
                .open(dest)
                .with_path(dest)?;
            let res = finish_regular(dest, file, info, xattrs, content, cancel);
            cleanup_on_error(dest, res)
        }
        FileType::Symlink => {
            symlink(&info.symlink_target, dest).with_path(dest)?;
            let res = finish_symlink(dest, info, xattrs);
            cleanup_on_error(dest, res)
        }
        FileType::Special => Err(Error::InvalidMode {
            mode: info.mode,
            reason: "only directories, regular files and symlinks can be materialized",
        }),
    }
}

fn finish_directory(dest: &Path, info: &FileInfo, xattrs: Option<&XattrSet>) -> Result<()> {
    if needs_chown(info.uid, info.gid) {
        lchown(dest, Some(info.uid), Some(info.gid)).with_path(dest)?;
    }
    // mkdir is subject to the umask
    fs::set_permissions(dest, Permissions::from_mode(mode::permissions(info.mode)))
        .with_path(dest)?;
    set_xattrs_no_follow(dest, xattrs)
}

fn finish_regular(
    dest: &Path,
    mut file: File,
    info: &FileInfo,
    xattrs: Option<&XattrSet>,
    content: Option<&mut dyn Read>,
    cancel: Option<&Cancellable>,
) -> Result<()> {
    if needs_chown(info.uid, info.gid) {
        fchown(&file, Some(info.uid), Some(info.gid)).with_path(dest)?;
    }

    if let Some(content) = content {
        cancel::check(cancel)?;
        io::copy(content, &mut file).with_path(dest)?;
    }

    if let Some(xattrs) = xattrs {
        for x in xattrs {
            file.set_xattr(xattr_name(&x.name), &x.value)
                .map_err(|source| Error::Xattr {
                    path: dest.to_path_buf(),
                    name: String::from_utf8_lossy(&x.name).into_owned(),
                    source,
                })?;
        }
    }

    // chown clears setuid/setgid and create is subject to the umask
    file.set_permissions(Permissions::from_mode(mode::permissions(info.mode)))
        .with_path(dest)?;
    Ok(())
}

fn finish_symlink(dest: &Path, info: &FileInfo, xattrs: Option<&XattrSet>) -> Result<()> {
    if needs_chown(info.uid, info.gid) {
        lchown(dest, Some(info.uid), Some(info.gid)).with_path(dest)?;
    }
    set_xattrs_no_follow(dest, xattrs)
}

/// `xattr::set` is the l-variant and never follows symlinks
fn set_xattrs_no_follow(path: &Path, xattrs: Option<&XattrSet>) -> Result<()> {
    let Some(xattrs) = xattrs else {
        return Ok(());
    };
    for x in xattrs {
        xattr::set(path, xattr_name(&x.name), &x.value).map_err(|source| Error::Xattr {
            path: path.to_path_buf(),
            name: String::from_utf8_lossy(&x.name).into_owned(),
            source,
        })?;
    }
    Ok(())
}

fn cleanup_on_error(dest: &Path, res: Result<()>) -> Result<()> {
    if res.is_err() {
        if let Err(e) = fs::remove_file(dest) {
            warn!(path = %dest.display(), error = %e, "failed to remove partial file");
        }
    }
    res
}

/// materialize under a fresh random name `<prefix><random><suffix>` in `dir`
pub fn materialize_with_unique_name(
    dir: &Path,
    prefix: &str,
    suffix: &str,
    info: Option<&FileInfo>,
    xattrs: Option<&XattrSet>,
    content: Option<&mut dyn Read>,
    cancel: Option<&Cancellable>,
) -> Result<PathBuf> {
    materialize_with_unique_name_using(
        &mut UuidNames,
        dir,
        prefix,
        suffix,
        info,
        xattrs,
        content,
        cancel,
    )
}

/// like `materialize_with_unique_name` with a caller-provided name source
///
/// only a collision with an existing entry triggers another attempt; any
/// other failure is returned immediately.
#[allow(clippy::too_many_arguments)]
pub fn materialize_with_unique_name_using(
    names: &mut dyn NameSource,
    dir: &Path,
    prefix: &str,
    suffix: &str,
    info: Option<&FileInfo>,
    xattrs: Option<&XattrSet>,
    mut content: Option<&mut dyn Read>,
    cancel: Option<&Cancellable>,
) -> Result<PathBuf> {
    for attempt in 0..MAX_NAME_ATTEMPTS {
        cancel::check(cancel)?;
        let path = dir.join(format!("{}{}{}", prefix, names.next_name(), suffix));
        let attempt_content = content.as_mut().map(|r| &mut **r as &mut dyn Read);
        match materialize(&path, info, xattrs, attempt_content, cancel) {
            Ok(()) => return Ok(path),
            Err(e) if e.is_already_exists() => {
                debug!(path = %path.display(), attempt, "name taken, retrying");
            }
            Err(e) => return Err(e),
        }
    }
    Err(Error::TempNameExhausted {
        attempts: MAX_NAME_ATTEMPTS,
    })
}

/// create a private (0700) directory with a unique name in `dir`
pub fn create_temp_dir(dir: &Path, prefix: &str) -> Result<PathBuf> {
    let (uid, gid) = current_ids();
    let info = FileInfo::directory(uid, gid, 0o700);
    materialize_with_unique_name(dir, prefix, "", Some(&info), None, None, None)
}

/// sync a directory to disk
pub fn fsync_dir(path: &Path) -> Result<()> {
    let dir = File::open(path).with_path(path)?;
    dir.sync_all().with_path(path)?;
    Ok(())
}
