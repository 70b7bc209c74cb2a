use std::collections::HashMap;

use crate::checksum::Checksum;
use crate::error::Result;
use crate::object::FileHeader;
use crate::store::{content_checksum, metadata_checksum};
use crate::types::{mode, FileInfo, ObjectType, XattrSet};

use super::opcode::Op;
use super::part::{ModeEntry, PartCompression, PartPayload};
use super::superblock::{PartMeta, PART_VERSION};

/// assembles one part from whole objects or hand-written ops
#[derive(Debug, Default)]
pub struct PartBuilder {
    payload: PartPayload,
    mode_index: HashMap<ModeEntry, u64>,
    xattr_index: HashMap<XattrSet, u64>,
    objects: Vec<(ObjectType, Checksum)>,
    usize: u64,
}

impl PartBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object_count(&self) -> usize {
        self.objects.len()
    }

    /// index of the (uid, gid, mode) entry for `info`, adding it if new
    pub fn intern_mode(&mut self, info: &FileInfo) -> u64 {
        let entry = ModeEntry {
            uid: info.uid,
            gid: info.gid,
            mode: info.mode,
        };
        let modes = &mut self.payload.modes;
        *self.mode_index.entry(entry).or_insert_with(|| {
            modes.push(entry);
            (modes.len() - 1) as u64
        })
    }

    pub fn intern_xattrs(&mut self, xattrs: &XattrSet) -> u64 {
        if let Some(&idx) = self.xattr_index.get(xattrs) {
            return idx;
        }
        self.payload.xattrs.push(xattrs.clone());
        let idx = (self.payload.xattrs.len() - 1) as u64;
        self.xattr_index.insert(xattrs.clone(), idx);
        idx
    }

    /// append to the raw data, returning the offset it landed at
    pub fn add_raw(&mut self, data: &[u8]) -> u64 {
        let offset = self.payload.raw.len() as u64;
        self.payload.raw.extend_from_slice(data);
        offset
    }

    pub fn push_op(&mut self, op: Op) {
        op.encode(&mut self.payload.ops);
    }

    /// record that the ops pushed so far produce this object next
    pub fn declare_object(&mut self, objtype: ObjectType, checksum: Checksum, size: u64) {
        self.objects.push((objtype, checksum));
        self.usize += size;
    }

    /// splice a whole metadata object
    pub fn add_metadata(&mut self, objtype: ObjectType, data: &[u8]) -> Result<Checksum> {
        let checksum = metadata_checksum(objtype, data)?;
        let offset = self.add_raw(data);
        self.push_op(Op::SpliceMeta {
            size: data.len() as u64,
            offset,
        });
        self.declare_object(objtype, checksum, data.len() as u64);
        Ok(checksum)
    }

    /// splice a whole file object; a symlink's span is its target
    pub fn add_file(&mut self, header: &FileHeader, content: &[u8]) -> Result<Checksum> {
        let checksum = content_checksum(header, content)?;
        let mode_idx = self.intern_mode(&header.info);
        let xattr_idx = self.intern_xattrs(&header.xattrs);
        let data = if mode::is_lnk(header.info.mode) {
            header.info.symlink_target.as_bytes()
        } else {
            content
        };
        let offset = self.add_raw(data);
        self.push_op(Op::SpliceContent {
            mode_idx,
            xattr_idx,
            size: data.len() as u64,
            offset,
        });
        self.declare_object(ObjectType::File, checksum, content.len() as u64);
        Ok(checksum)
    }

    /// the on-wire part and its description
    pub fn finish(self, compression: PartCompression) -> Result<(Vec<u8>, PartMeta)> {
        let bytes = self.payload.to_part_bytes(compression)?;
        let meta = PartMeta {
            version: PART_VERSION,
            checksum: Checksum::digest(&bytes),
            size: bytes.len() as u64,
            usize: self.usize,
            objects: self.objects,
        };
        Ok((bytes, meta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::part::validate_part;
    use crate::types::{DirMeta, Xattr};

    #[test]
    fn test_tables_are_deduplicated() {
        let mut b = PartBuilder::new();
        let a = FileInfo::regular(0, 0, 0o644, 1);
        let c = FileInfo::regular(1000, 1000, 0o644, 1);
        assert_eq!(b.intern_mode(&a), 0);
        assert_eq!(b.intern_mode(&c), 1);
        assert_eq!(b.intern_mode(&a), 0);

        let empty = XattrSet::new();
        let some = XattrSet::canonicalize(vec![Xattr::new("user.x", vec![1])]).unwrap();
        assert_eq!(b.intern_xattrs(&empty), 0);
        assert_eq!(b.intern_xattrs(&some), 1);
        assert_eq!(b.intern_xattrs(&empty), 0);
        assert_eq!(b.payload.modes.len(), 2);
        assert_eq!(b.payload.xattrs.len(), 2);
    }

    #[test]
    fn test_finish_describes_part() {
        let mut b = PartBuilder::new();
        let meta = DirMeta::new(0, 0, 0o755).to_bytes();
        b.add_metadata(ObjectType::DirMeta, &meta).unwrap();
        let header = FileHeader::new(FileInfo::regular(0, 0, 0o644, 4), XattrSet::new());
        b.add_file(&header, b"data").unwrap();
        assert_eq!(b.object_count(), 2);

        let (bytes, part) = b.finish(PartCompression::Zstd).unwrap();
        assert_eq!(part.size, bytes.len() as u64);
        assert_eq!(part.usize, meta.len() as u64 + 4);
        assert_eq!(part.objects.len(), 2);
        assert_eq!(part.objects[0].0, ObjectType::DirMeta);
        validate_part(&bytes, &part.checksum).unwrap();
    }

    #[test]
    fn test_rejects_invalid_objects() {
        let mut b = PartBuilder::new();
        assert!(b.add_metadata(ObjectType::DirMeta, b"junk").is_err());
        let header = FileHeader::new(FileInfo::regular(0, 0, 0o644, 10), XattrSet::new());
        assert!(b.add_file(&header, b"short").is_err());
        assert_eq!(b.object_count(), 0);
    }
}
