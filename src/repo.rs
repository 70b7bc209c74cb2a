use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

use nix::fcntl::{Flock, FlockArg};
use tracing::{debug, warn};

use crate::cancel::Cancellable;
use crate::checksum::Checksum;
use crate::config::{Config, RepoMode};
use crate::delta::{apply_part, have_all_objects, PartBuilder, PartMeta};
use crate::error::{Error, IoResultExt, Result};
use crate::fs::{fsync_dir, materialize_with_unique_name, read_xattrs};
use crate::object::{unwrap_content_to_vec, write_compressed_content_stream, FileHeader};
use crate::store::{content_checksum, metadata_checksum, verify_checksum, ObjectStore};
use crate::types::{relative_object_path, FileInfo, FileType, ObjectName, ObjectType};

const TMP_PREFIX: &str = "tmpobject-";

/// a loose-object repository
///
/// every object lives in its own file under `objects/`, named by checksum.
/// writes land in `tmp/` first and are renamed into place.
#[derive(Debug)]
pub struct Repo {
    path: PathBuf,
    config: Config,
}

impl Repo {
    /// initialize a new repository at the given path
    pub fn init(path: &Path, mode: RepoMode) -> Result<Self> {
        let config_path = path.join("config");
        if config_path.exists() {
            return Err(Error::RepoExists(path.to_path_buf()));
        }

        fs::create_dir_all(path.join("objects")).with_path(path)?;
        fs::create_dir_all(path.join("tmp")).with_path(path)?;

        let config = Config::new(mode);
        config.save(&config_path)?;

        Ok(Self {
            path: path.to_path_buf(),
            config,
        })
    }

    /// open an existing repository
    pub fn open(path: &Path) -> Result<Self> {
        let config_path = path.join("config");
        if !config_path.exists() {
            return Err(Error::NoRepo(path.to_path_buf()));
        }

        let config = Config::load(&config_path)?;

        Ok(Self {
            path: path.to_path_buf(),
            config,
        })
    }

    /// repository root path
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// repository configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn mode(&self) -> RepoMode {
        self.config.core.mode
    }

    pub fn config_path(&self) -> PathBuf {
        self.path.join("config")
    }

    pub fn objects_path(&self) -> PathBuf {
        self.path.join("objects")
    }

    /// path to tmp directory (for atomic writes)
    pub fn tmp_path(&self) -> PathBuf {
        self.path.join("tmp")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.path.join(".lock")
    }

    /// where an object is (or would be) stored
    pub fn object_path(&self, checksum: &Checksum, objtype: ObjectType) -> PathBuf {
        self.path.join(relative_object_path(
            checksum,
            objtype,
            self.mode().is_compressed(),
        ))
    }

    /// acquire exclusive lock on repository
    /// returns a guard that releases the lock on drop
    pub fn lock(&self) -> Result<RepoLock> {
        let lock_path = self.lock_path();
        let file = File::create(&lock_path).with_path(&lock_path)?;

        let flock = Flock::lock(file, FlockArg::LockExclusiveNonblock)
            .map_err(|_| Error::LockContention)?;

        Ok(RepoLock { _flock: flock })
    }

    /// try to acquire exclusive lock, returning None if already locked
    pub fn try_lock(&self) -> Result<Option<RepoLock>> {
        let lock_path = self.lock_path();
        let file = File::create(&lock_path).with_path(&lock_path)?;

        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(flock) => Ok(Some(RepoLock { _flock: flock })),
            Err((_, nix::errno::Errno::EWOULDBLOCK)) => Ok(None),
            Err(_) => Err(Error::LockContention),
        }
    }

    /// validate and execute one on-wire delta part under the repository lock
    pub fn apply_delta_part(
        &self,
        meta: &PartMeta,
        data: &[u8],
        cancel: Option<&Cancellable>,
    ) -> Result<Vec<Checksum>> {
        let _lock = self.lock()?;
        if have_all_objects(self, meta)? {
            debug!(part = %meta.checksum, "all objects present, skipping part");
            return Ok(meta.objects.iter().map(|(_, c)| *c).collect());
        }
        apply_part(self, meta, data, self.config.delta.max_part_size, cancel)
    }

    /// finish a part with the configured compression
    pub fn finish_delta_part(&self, builder: PartBuilder) -> Result<(Vec<u8>, PartMeta)> {
        builder.finish(self.config.delta.compression)
    }

    /// stage `content` in tmp/ with the header's metadata and move it to `dest`
    fn install(
        &self,
        dest: &Path,
        header: Option<&FileHeader>,
        content: Option<&mut dyn Read>,
    ) -> Result<()> {
        let tmp = materialize_with_unique_name(
            &self.tmp_path(),
            TMP_PREFIX,
            "",
            header.map(|h| &h.info),
            header.map(|h| &h.xattrs),
            content,
            None,
        )?;

        let parent = dest
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.objects_path());
        let res = fs::create_dir_all(&parent)
            .with_path(&parent)
            .and_then(|_| fs::rename(&tmp, dest).with_path(dest));
        if res.is_err() {
            if let Err(e) = fs::remove_file(&tmp) {
                warn!(path = %tmp.display(), error = %e, "failed to remove staged object");
            }
        }
        res?;
        fsync_dir(&parent)
    }

    fn read_object(&self, name: ObjectName) -> Result<Vec<u8>> {
        let path = self.object_path(&name.checksum, name.objtype);
        fs::read(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::ObjectNotFound(name.to_string())
            } else {
                Error::Io { path, source: e }
            }
        })
    }
}

impl ObjectStore for Repo {
    fn has_object(&self, objtype: ObjectType, checksum: &Checksum) -> Result<bool> {
        let path = self.object_path(checksum, objtype);
        match fs::symlink_metadata(&path) {
            Ok(_) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(Error::Io { path, source: e }),
        }
    }

    fn load_metadata(&self, objtype: ObjectType, checksum: &Checksum) -> Result<Vec<u8>> {
        let data = self.read_object(ObjectName::new(*checksum, objtype))?;

        // verify checksum
        let actual = Checksum::digest(&data);
        if actual != *checksum {
            return Err(Error::CorruptObject {
                expected: *checksum,
                actual,
            });
        }
        Ok(data)
    }

    fn load_file(&self, checksum: &Checksum) -> Result<(FileHeader, Vec<u8>)> {
        let name = ObjectName::new(*checksum, ObjectType::File);
        match self.mode() {
            RepoMode::ArchiveZ2 => unwrap_content_to_vec(&self.read_object(name)?, true),
            RepoMode::Bare => {
                let path = self.object_path(checksum, ObjectType::File);
                let info = match FileInfo::from_path(&path) {
                    Err(Error::Io { source, .. })
                        if source.kind() == std::io::ErrorKind::NotFound =>
                    {
                        return Err(Error::ObjectNotFound(name.to_string()))
                    }
                    other => other?,
                };
                let content = match info.file_type() {
                    FileType::Regular => fs::read(&path).with_path(&path)?,
                    _ => Vec::new(),
                };
                let xattrs = read_xattrs(&path)?;
                Ok((FileHeader::new(info, xattrs), content))
            }
        }
    }

    fn write_metadata(
        &self,
        objtype: ObjectType,
        data: &[u8],
        expected: Option<&Checksum>,
    ) -> Result<Checksum> {
        let checksum = verify_checksum(expected, metadata_checksum(objtype, data)?)?;
        let dest = self.object_path(&checksum, objtype);
        if dest.exists() {
            return Ok(checksum);
        }

        let (uid, gid) = (
            nix::unistd::getuid().as_raw(),
            nix::unistd::getgid().as_raw(),
        );
        let info = FileInfo::regular(uid, gid, 0o644, 0);
        let header = FileHeader::new(info, Default::default());
        let mut content = data;
        self.install(&dest, Some(&header), Some(&mut content))?;

        debug!(object = %ObjectName::new(checksum, objtype), "wrote metadata object");
        Ok(checksum)
    }

    fn write_file(
        &self,
        header: &FileHeader,
        content: &[u8],
        expected: Option<&Checksum>,
    ) -> Result<Checksum> {
        let checksum = verify_checksum(expected, content_checksum(header, content)?)?;
        let dest = self.object_path(&checksum, ObjectType::File);
        if dest.symlink_metadata().is_ok() {
            return Ok(checksum);
        }

        match self.mode() {
            RepoMode::Bare => {
                let mut reader = content;
                let content: Option<&mut dyn Read> = if header.info.is_regular() {
                    Some(&mut reader)
                } else {
                    None
                };
                self.install(&dest, Some(header), content)?;
            }
            RepoMode::ArchiveZ2 => {
                let mut stream = Vec::new();
                write_compressed_content_stream(&mut stream, header, content)
                    .with_path(&dest)?;
                self.install(&dest, None, Some(&mut stream.as_slice()))?;
            }
        }

        debug!(object = %ObjectName::new(checksum, ObjectType::File), "wrote file object");
        Ok(checksum)
    }
}

/// guard that holds repository lock until dropped
#[derive(Debug)]
pub struct RepoLock {
    _flock: Flock<File>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::PartCompression;
    use crate::object::Object;
    use crate::types::{Commit, DirMeta, DirTree, DirTreeFile, XattrSet};
    use tempfile::tempdir;

    fn current_ids() -> (u32, u32) {
        (
            nix::unistd::getuid().as_raw(),
            nix::unistd::getgid().as_raw(),
        )
    }

    #[test]
    fn test_repo_init() {
        let dir = tempdir().unwrap();
        let repo_path = dir.path().join("test-repo");

        let repo = Repo::init(&repo_path, RepoMode::Bare).unwrap();

        assert!(repo_path.join("objects").is_dir());
        assert!(repo_path.join("tmp").is_dir());
        assert!(repo_path.join("config").is_file());
        assert_eq!(repo.mode(), RepoMode::Bare);
    }

    #[test]
    fn test_repo_init_already_exists() {
        let dir = tempdir().unwrap();
        let repo_path = dir.path().join("test-repo");

        Repo::init(&repo_path, RepoMode::Bare).unwrap();
        let result = Repo::init(&repo_path, RepoMode::Bare);

        assert!(matches!(result, Err(Error::RepoExists(_))));
    }

    #[test]
    fn test_repo_open() {
        let dir = tempdir().unwrap();
        let repo_path = dir.path().join("test-repo");

        Repo::init(&repo_path, RepoMode::ArchiveZ2).unwrap();
        let repo = Repo::open(&repo_path).unwrap();

        assert_eq!(repo.path(), repo_path);
        assert_eq!(repo.mode(), RepoMode::ArchiveZ2);
    }

    #[test]
    fn test_repo_open_not_found() {
        let dir = tempdir().unwrap();
        let result = Repo::open(&dir.path().join("nonexistent"));
        assert!(matches!(result, Err(Error::NoRepo(_))));
    }

    #[test]
    fn test_object_paths() {
        let dir = tempdir().unwrap();
        let bare = Repo::init(&dir.path().join("bare"), RepoMode::Bare).unwrap();
        let archive = Repo::init(&dir.path().join("archive"), RepoMode::ArchiveZ2).unwrap();
        let c = Checksum::digest(b"x");
        let (d, rest) = c.to_path_components();

        assert_eq!(
            bare.object_path(&c, ObjectType::File),
            dir.path().join(format!("bare/objects/{}/{}.file", d, rest))
        );
        assert_eq!(
            archive.object_path(&c, ObjectType::File),
            dir.path().join(format!("archive/objects/{}/{}.filez", d, rest))
        );
        assert_eq!(
            archive.object_path(&c, ObjectType::DirTree),
            dir.path().join(format!("archive/objects/{}/{}.dirtree", d, rest))
        );
    }

    #[test]
    fn test_metadata_objects() {
        let dir = tempdir().unwrap();
        let repo = Repo::init(&dir.path().join("repo"), RepoMode::Bare).unwrap();

        let meta = DirMeta::new(0, 0, 0o755);
        let meta_c = repo.write_object(&Object::DirMeta(meta.clone()), None).unwrap();
        let tree = DirTree::new(
            vec![DirTreeFile {
                name: "f".into(),
                checksum: Checksum::digest(b"f"),
            }],
            vec![],
        )
        .unwrap();
        let tree_c = repo.write_object(&Object::DirTree(tree.clone()), None).unwrap();
        let commit = Commit::new(tree_c, meta_c, "snapshot", 1);
        let commit_c = repo.write_object(&Object::Commit(commit.clone()), None).unwrap();

        assert_eq!(repo.load_object(ObjectType::DirMeta, &meta_c).unwrap(), Object::DirMeta(meta));
        assert_eq!(repo.load_object(ObjectType::DirTree, &tree_c).unwrap(), Object::DirTree(tree));
        assert_eq!(
            repo.load_object(ObjectType::Commit, &commit_c).unwrap(),
            Object::Commit(commit)
        );
        assert!(repo.has_object(ObjectType::Commit, &commit_c).unwrap());

        // staging area is cleaned up by the renames
        assert_eq!(fs::read_dir(repo.tmp_path()).unwrap().count(), 0);
    }

    #[test]
    fn test_write_is_idempotent() {
        let dir = tempdir().unwrap();
        let repo = Repo::init(&dir.path().join("repo"), RepoMode::Bare).unwrap();
        let bytes = DirMeta::new(0, 0, 0o700).to_bytes();
        let a = repo.write_metadata(ObjectType::DirMeta, &bytes, None).unwrap();
        let b = repo.write_metadata(ObjectType::DirMeta, &bytes, None).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_corrupt_metadata_detected() {
        let dir = tempdir().unwrap();
        let repo = Repo::init(&dir.path().join("repo"), RepoMode::Bare).unwrap();
        let c = repo
            .write_metadata(ObjectType::DirMeta, &DirMeta::new(0, 0, 0o755).to_bytes(), None)
            .unwrap();

        let path = repo.object_path(&c, ObjectType::DirMeta);
        fs::write(&path, DirMeta::new(0, 0, 0o700).to_bytes()).unwrap();

        assert!(matches!(
            repo.load_metadata(ObjectType::DirMeta, &c),
            Err(Error::CorruptObject { .. })
        ));
    }

    #[test]
    fn test_missing_object() {
        let dir = tempdir().unwrap();
        let repo = Repo::init(&dir.path().join("repo"), RepoMode::Bare).unwrap();
        let c = Checksum::digest(b"absent");
        assert!(!repo.has_object(ObjectType::File, &c).unwrap());
        assert!(matches!(repo.load_file(&c), Err(Error::ObjectNotFound(_))));
        assert!(matches!(
            repo.load_metadata(ObjectType::Commit, &c),
            Err(Error::ObjectNotFound(_))
        ));
    }

    #[test]
    fn test_file_objects_both_modes() {
        let (uid, gid) = current_ids();
        for mode in [RepoMode::Bare, RepoMode::ArchiveZ2] {
            let dir = tempdir().unwrap();
            let repo = Repo::init(&dir.path().join("repo"), mode).unwrap();

            let header = FileHeader::new(FileInfo::regular(uid, gid, 0o644, 11), XattrSet::new());
            let c = repo.write_file(&header, b"hello world", None).unwrap();
            let (back, content) = repo.load_file(&c).unwrap();
            assert_eq!(content, b"hello world");
            assert_eq!(back.info.mode, header.info.mode);
            assert_eq!(back.info.size, 11);

            let link = FileHeader::new(FileInfo::symlink(uid, gid, "hello"), XattrSet::new());
            let lc = repo.write_file(&link, b"", None).unwrap();
            let (back, content) = repo.load_file(&lc).unwrap();
            assert!(content.is_empty());
            assert_eq!(back.info.symlink_target, "hello");
        }
    }

    #[test]
    fn test_write_file_expected_mismatch() {
        let dir = tempdir().unwrap();
        let repo = Repo::init(&dir.path().join("repo"), RepoMode::ArchiveZ2).unwrap();
        let (uid, gid) = current_ids();
        let header = FileHeader::new(FileInfo::regular(uid, gid, 0o644, 1), XattrSet::new());
        let err = repo
            .write_file(&header, b"x", Some(&Checksum::digest(b"other")))
            .unwrap_err();
        assert!(matches!(err, Error::CorruptObject { .. }));
        assert_eq!(fs::read_dir(repo.objects_path()).unwrap().count(), 0);
    }

    #[test]
    fn test_repo_lock() {
        let dir = tempdir().unwrap();
        let repo = Repo::init(&dir.path().join("test-repo"), RepoMode::Bare).unwrap();

        let lock = repo.lock().unwrap();
        assert!(repo.try_lock().unwrap().is_none());
        drop(lock);
        assert!(repo.try_lock().unwrap().is_some());
    }

    #[test]
    fn test_apply_delta_part() {
        let dir = tempdir().unwrap();
        let repo = Repo::init(&dir.path().join("repo"), RepoMode::ArchiveZ2).unwrap();
        let (uid, gid) = current_ids();

        let mut builder = PartBuilder::new();
        let meta = DirMeta::new(uid, gid, 0o755);
        let meta_csum = builder
            .add_metadata(ObjectType::DirMeta, &meta.to_bytes())
            .unwrap();
        let header = FileHeader::new(FileInfo::regular(uid, gid, 0o644, 5), XattrSet::new());
        let file_csum = builder.add_file(&header, b"delta").unwrap();
        let (bytes, part) = repo.finish_delta_part(builder).unwrap();

        let written = repo.apply_delta_part(&part, &bytes, None).unwrap();
        assert_eq!(written, vec![meta_csum, file_csum]);
        assert_eq!(repo.load_file(&file_csum).unwrap().1, b"delta");

        // a second run finds everything present
        let again = repo.apply_delta_part(&part, &bytes[..1], None).unwrap();
        assert_eq!(again, written);
    }

    #[test]
    fn test_apply_delta_part_respects_size_limit() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("repo");
        let repo = Repo::init(&path, RepoMode::ArchiveZ2).unwrap();
        let mut config = repo.config().clone();
        config.delta.max_part_size = 8;
        config.save(&repo.config_path()).unwrap();
        let repo = Repo::open(&path).unwrap();

        let mut builder = PartBuilder::new();
        builder
            .add_metadata(ObjectType::DirMeta, &DirMeta::new(0, 0, 0o755).to_bytes())
            .unwrap();
        let (bytes, part) = repo.finish_delta_part(builder).unwrap();
        let err = repo.apply_delta_part(&part, &bytes, None).unwrap_err();
        assert!(matches!(err, Error::CorruptDelta(_)));
        assert_eq!(fs::read_dir(repo.objects_path()).unwrap().count(), 0);
    }

    #[test]
    fn test_apply_delta_part_checks_declared_sizes() {
        let dir = tempdir().unwrap();
        let repo = Repo::init(&dir.path().join("repo"), RepoMode::ArchiveZ2).unwrap();
        let (uid, gid) = current_ids();

        let mut builder = PartBuilder::new();
        let header = FileHeader::new(FileInfo::regular(uid, gid, 0o644, 5), XattrSet::new());
        builder.add_file(&header, b"delta").unwrap();
        let (bytes, part) = repo.finish_delta_part(builder).unwrap();

        let mut wrong_size = part.clone();
        wrong_size.size += 1000;
        let mut wrong_usize = part.clone();
        wrong_usize.usize += 1000;
        for lying in [wrong_size, wrong_usize] {
            let err = repo.apply_delta_part(&lying, &bytes, None).unwrap_err();
            assert!(matches!(err, Error::CorruptDelta(_)), "{}", err);
            assert_eq!(fs::read_dir(repo.objects_path()).unwrap().count(), 0);
        }
    }

    #[test]
    fn test_apply_delta_part_bounds_decompression() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("repo");
        let repo = Repo::init(&path, RepoMode::ArchiveZ2).unwrap();
        let mut config = repo.config().clone();
        config.delta.max_part_size = 64 * 1024;
        config.delta.compression = PartCompression::Zstd;
        config.save(&repo.config_path()).unwrap();
        let repo = Repo::open(&path).unwrap();
        let (uid, gid) = current_ids();

        let zeros = vec![0u8; 1 << 20];
        let mut builder = PartBuilder::new();
        let header = FileHeader::new(
            FileInfo::regular(uid, gid, 0o644, zeros.len() as u64),
            XattrSet::new(),
        );
        builder.add_file(&header, &zeros).unwrap();
        let (bytes, part) = repo.finish_delta_part(builder).unwrap();
        assert!((bytes.len() as u64) < config.delta.max_part_size);

        let err = repo.apply_delta_part(&part, &bytes, None).unwrap_err();
        assert!(matches!(err, Error::CorruptDelta(_)), "{}", err);
        assert_eq!(fs::read_dir(repo.objects_path()).unwrap().count(), 0);
    }
}
