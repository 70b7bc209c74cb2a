//! canonical encoding of the four object kinds
//!
//! metadata objects are a single serialized variant; file objects are a
//! header variant framed together with the raw content (see `content`).
//! integer fields inside objects are big-endian, so they are byte-swapped
//! on the way into and out of the (little-endian) variant framing.

mod commit;
pub mod content;
mod dirmeta;
mod dirtree;
mod file;

pub use content::{
    file_checksum, unwrap_content, unwrap_content_to_vec, wrap_content,
    write_compressed_content_stream, write_content_stream,
};
pub use file::FileHeader;

use crate::checksum::Checksum;
use crate::error::{Error, Result};
use crate::types::{Commit, DirMeta, DirTree, ObjectType};
use crate::variant::{Value, VariantType};

/// any object, decoded
#[derive(Clone, Debug, PartialEq)]
pub enum Object {
    File { header: FileHeader, content: Vec<u8> },
    DirTree(DirTree),
    DirMeta(DirMeta),
    Commit(Commit),
}

impl Object {
    pub fn objtype(&self) -> ObjectType {
        match self {
            Object::File { .. } => ObjectType::File,
            Object::DirTree(_) => ObjectType::DirTree,
            Object::DirMeta(_) => ObjectType::DirMeta,
            Object::Commit(_) => ObjectType::Commit,
        }
    }

    /// canonical bytes; for files this is the uncompressed content stream
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(match self {
            Object::File { header, content } => {
                wrap_content(&header.encode(), content).map_err(|source| Error::Io {
                    path: "<content stream>".into(),
                    source,
                })?
            }
            Object::DirTree(t) => t.to_bytes(),
            Object::DirMeta(m) => m.to_bytes(),
            Object::Commit(c) => c.to_bytes(),
        })
    }

    /// decode canonical bytes of the given kind
    pub fn from_bytes(objtype: ObjectType, data: &[u8]) -> Result<Self> {
        Ok(match objtype {
            ObjectType::File => {
                let (header, content) = unwrap_content_to_vec(data, false)?;
                Object::File { header, content }
            }
            ObjectType::DirTree => Object::DirTree(DirTree::from_bytes(data)?),
            ObjectType::DirMeta => Object::DirMeta(DirMeta::from_bytes(data)?),
            ObjectType::Commit => Object::Commit(Commit::from_bytes(data)?),
        })
    }

    pub fn checksum(&self) -> Result<Checksum> {
        Ok(Checksum::digest(&self.to_bytes()?))
    }
}

pub(crate) fn be_u32(v: u32) -> Value {
    Value::UInt32(v.swap_bytes())
}

pub(crate) fn be_u64(v: u64) -> Value {
    Value::UInt64(v.swap_bytes())
}

pub(crate) fn from_be_u32(v: &Value) -> Result<u32> {
    Ok(v.as_u32()?.swap_bytes())
}

pub(crate) fn from_be_u64(v: &Value) -> Result<u64> {
    Ok(v.as_u64()?.swap_bytes())
}

pub(crate) fn checksum_value(c: &Checksum) -> Value {
    Value::Bytes(c.as_bytes().to_vec())
}

pub(crate) fn bytes_type() -> VariantType {
    VariantType::array_of(VariantType::Byte)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DirTreeFile, FileInfo, XattrSet};

    #[test]
    fn test_be_fields_on_wire() {
        let bytes = Value::Tuple(vec![be_u32(0x01020304)]).to_bytes();
        assert_eq!(bytes, vec![1, 2, 3, 4]);
        assert_eq!(from_be_u32(&Value::UInt32(0x04030201)).unwrap(), 0x01020304);
        assert_eq!(from_be_u64(&be_u64(42)).unwrap(), 42);
    }

    #[test]
    fn test_object_dispatch() {
        let tree = DirTree::new(
            vec![DirTreeFile {
                name: "a".into(),
                checksum: Checksum::digest(b"a"),
            }],
            vec![],
        )
        .unwrap();
        let objects = vec![
            Object::File {
                header: FileHeader::new(FileInfo::regular(0, 0, 0o644, 3), XattrSet::new()),
                content: b"abc".to_vec(),
            },
            Object::DirTree(tree),
            Object::DirMeta(DirMeta::new(0, 0, 0o755)),
        ];
        for obj in objects {
            let bytes = obj.to_bytes().unwrap();
            let back = Object::from_bytes(obj.objtype(), &bytes).unwrap();
            assert_eq!(back, obj);
            assert_eq!(back.checksum().unwrap(), Checksum::digest(&bytes));
        }
    }
}
