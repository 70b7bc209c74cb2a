//! the object lookup and write seam
//!
//! delta execution and other higher layers only talk to an `ObjectStore`;
//! `Repo` implements it on disk and `MemoryStore` in memory.

use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::debug;

use crate::checksum::Checksum;
use crate::error::{Error, Result};
use crate::object::{file_checksum, unwrap_content_to_vec, wrap_content, FileHeader, Object};
use crate::types::{ObjectName, ObjectType};
use crate::validate::validate_metadata;

pub trait ObjectStore {
    fn has_object(&self, objtype: ObjectType, checksum: &Checksum) -> Result<bool>;

    /// serialized bytes of a metadata object
    fn load_metadata(&self, objtype: ObjectType, checksum: &Checksum) -> Result<Vec<u8>>;

    /// header and uncompressed content of a file object
    fn load_file(&self, checksum: &Checksum) -> Result<(FileHeader, Vec<u8>)>;

    /// store a metadata object, verifying it against `expected` if given
    fn write_metadata(
        &self,
        objtype: ObjectType,
        data: &[u8],
        expected: Option<&Checksum>,
    ) -> Result<Checksum>;

    /// store a file object, verifying it against `expected` if given
    fn write_file(
        &self,
        header: &FileHeader,
        content: &[u8],
        expected: Option<&Checksum>,
    ) -> Result<Checksum>;

    fn load_object(&self, objtype: ObjectType, checksum: &Checksum) -> Result<Object> {
        match objtype {
            ObjectType::File => {
                let (header, content) = self.load_file(checksum)?;
                Ok(Object::File { header, content })
            }
            _ => Object::from_bytes(objtype, &self.load_metadata(objtype, checksum)?),
        }
    }

    fn write_object(&self, object: &Object, expected: Option<&Checksum>) -> Result<Checksum> {
        match object {
            Object::File { header, content } => self.write_file(header, content, expected),
            other => self.write_metadata(other.objtype(), &other.to_bytes()?, expected),
        }
    }
}

/// compare a computed checksum with the one the caller asked for
pub(crate) fn verify_checksum(expected: Option<&Checksum>, actual: Checksum) -> Result<Checksum> {
    match expected {
        Some(expected) if *expected != actual => Err(Error::CorruptObject {
            expected: *expected,
            actual,
        }),
        _ => Ok(actual),
    }
}

/// checksum of a metadata object after structural validation
pub(crate) fn metadata_checksum(objtype: ObjectType, data: &[u8]) -> Result<Checksum> {
    if objtype == ObjectType::File {
        return Err(Error::InvalidObjectType(
            "file objects are not metadata".to_string(),
        ));
    }
    validate_metadata(objtype, data)?;
    Ok(Checksum::digest(data))
}

/// checksum of a file object; `header.info.size` must match the content
pub(crate) fn content_checksum(header: &FileHeader, content: &[u8]) -> Result<Checksum> {
    if header.info.is_regular() && header.info.size != content.len() as u64 {
        return Err(Error::invalid_variant(format!(
            "file header declares {} bytes, content has {}",
            header.info.size,
            content.len()
        )));
    }
    if header.info.is_symlink() && !content.is_empty() {
        return Err(Error::invalid_variant("symlink objects carry no content"));
    }
    file_checksum(header, content).map_err(|source| Error::Io {
        path: "<content stream>".into(),
        source,
    })
}

/// objects held in memory, files as their uncompressed content stream
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: RwLock<HashMap<ObjectName, Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// every stored object, sorted
    pub fn names(&self) -> Vec<ObjectName> {
        let mut names: Vec<_> = self.read().keys().copied().collect();
        names.sort();
        names
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<ObjectName, Vec<u8>>> {
        self.objects.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<ObjectName, Vec<u8>>> {
        self.objects.write().unwrap_or_else(|e| e.into_inner())
    }

    fn get(&self, name: ObjectName) -> Result<Vec<u8>> {
        self.read()
            .get(&name)
            .cloned()
            .ok_or_else(|| Error::ObjectNotFound(name.to_string()))
    }
}

impl ObjectStore for MemoryStore {
    fn has_object(&self, objtype: ObjectType, checksum: &Checksum) -> Result<bool> {
        Ok(self.read().contains_key(&ObjectName::new(*checksum, objtype)))
    }

    fn load_metadata(&self, objtype: ObjectType, checksum: &Checksum) -> Result<Vec<u8>> {
        self.get(ObjectName::new(*checksum, objtype))
    }

    fn load_file(&self, checksum: &Checksum) -> Result<(FileHeader, Vec<u8>)> {
        let stream = self.get(ObjectName::new(*checksum, ObjectType::File))?;
        unwrap_content_to_vec(&stream, false)
    }

    fn write_metadata(
        &self,
        objtype: ObjectType,
        data: &[u8],
        expected: Option<&Checksum>,
    ) -> Result<Checksum> {
        let checksum = verify_checksum(expected, metadata_checksum(objtype, data)?)?;
        debug!(object = %ObjectName::new(checksum, objtype), "storing in memory");
        self.write()
            .entry(ObjectName::new(checksum, objtype))
            .or_insert_with(|| data.to_vec());
        Ok(checksum)
    }

    fn write_file(
        &self,
        header: &FileHeader,
        content: &[u8],
        expected: Option<&Checksum>,
    ) -> Result<Checksum> {
        let checksum = verify_checksum(expected, content_checksum(header, content)?)?;
        let stream = wrap_content(&header.encode(), content).map_err(|source| Error::Io {
            path: "<content stream>".into(),
            source,
        })?;
        debug!(object = %ObjectName::new(checksum, ObjectType::File), "storing in memory");
        self.write()
            .entry(ObjectName::new(checksum, ObjectType::File))
            .or_insert(stream);
        Ok(checksum)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DirMeta, FileInfo, XattrSet};

    #[test]
    fn test_metadata_roundtrip() {
        let store = MemoryStore::new();
        let meta = DirMeta::new(0, 0, 0o755);
        let c = store
            .write_metadata(ObjectType::DirMeta, &meta.to_bytes(), None)
            .unwrap();
        assert_eq!(c, meta.checksum());
        assert!(store.has_object(ObjectType::DirMeta, &c).unwrap());
        assert!(!store.has_object(ObjectType::DirTree, &c).unwrap());
        assert_eq!(
            store.load_object(ObjectType::DirMeta, &c).unwrap(),
            Object::DirMeta(meta)
        );
    }

    #[test]
    fn test_file_roundtrip() {
        let store = MemoryStore::new();
        let header = FileHeader::new(FileInfo::regular(0, 0, 0o644, 4), XattrSet::new());
        let c = store.write_file(&header, b"data", None).unwrap();
        let (back, content) = store.load_file(&c).unwrap();
        assert_eq!(back, header);
        assert_eq!(content, b"data");
    }

    #[test]
    fn test_expected_checksum_mismatch() {
        let store = MemoryStore::new();
        let wrong = Checksum::digest(b"wrong");
        let err = store
            .write_metadata(ObjectType::DirMeta, &DirMeta::new(0, 0, 0o755).to_bytes(), Some(&wrong))
            .unwrap_err();
        assert!(matches!(err, Error::CorruptObject { .. }));
        assert!(store.is_empty());
    }

    #[test]
    fn test_invalid_metadata_rejected() {
        let store = MemoryStore::new();
        assert!(store.write_metadata(ObjectType::Commit, b"junk", None).is_err());
        assert!(store.write_metadata(ObjectType::File, b"", None).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_size_mismatch_rejected() {
        let store = MemoryStore::new();
        let header = FileHeader::new(FileInfo::regular(0, 0, 0o644, 10), XattrSet::new());
        assert!(store.write_file(&header, b"short", None).is_err());
    }

    #[test]
    fn test_missing_object() {
        let store = MemoryStore::new();
        let err = store.load_file(&Checksum::digest(b"none")).unwrap_err();
        assert!(matches!(err, Error::ObjectNotFound(_)));
    }
}
