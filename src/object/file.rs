use crate::error::{Error, Result};
use crate::object::{be_u32, be_u64, from_be_u32, from_be_u64};
use crate::types::{FileInfo, XattrSet};
use crate::validate::validate_file_mode;
use crate::variant::{Value, VariantType};

const HEADER_SIG: &str = "(uuuusa(ayay))";
const COMPRESSED_HEADER_SIG: &str = "(tuuuusa(ayay))";

/// the metadata part of a file object
///
/// the plain header does not carry the content size; it is implied by the
/// length of the content stream. the compressed header stores it first.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileHeader {
    pub info: FileInfo,
    pub xattrs: XattrSet,
}

impl FileHeader {
    pub fn new(info: FileInfo, xattrs: XattrSet) -> Self {
        Self { info, xattrs }
    }

    /// `(uuuusa(ayay))`: uid, gid, mode, rdev, symlink target, xattrs
    pub fn encode(&self) -> Vec<u8> {
        Value::Tuple(self.fields()).to_bytes()
    }

    /// `(tuuuusa(ayay))`: the plain header prefixed by the content size
    pub fn encode_compressed(&self) -> Vec<u8> {
        let mut fields = vec![be_u64(self.info.size)];
        fields.extend(self.fields());
        Value::Tuple(fields).to_bytes()
    }

    /// decode a plain header; `info.size` is left at zero
    pub fn decode(data: &[u8]) -> Result<Self> {
        let ty = VariantType::parse(HEADER_SIG)?;
        let fields = Value::from_bytes(&ty, data)?.into_tuple(6)?;
        Self::from_fields(0, fields)
    }

    pub fn decode_compressed(data: &[u8]) -> Result<Self> {
        let ty = VariantType::parse(COMPRESSED_HEADER_SIG)?;
        let mut fields = Value::from_bytes(&ty, data)?.into_tuple(7)?;
        let size = from_be_u64(&fields.remove(0))?;
        Self::from_fields(size, fields)
    }

    fn fields(&self) -> Vec<Value> {
        vec![
            be_u32(self.info.uid),
            be_u32(self.info.gid),
            be_u32(self.info.mode),
            be_u32(self.info.rdev),
            Value::String(self.info.symlink_target.clone()),
            self.xattrs.to_value(),
        ]
    }

    fn from_fields(size: u64, fields: Vec<Value>) -> Result<Self> {
        let mut it = fields.into_iter();
        let mut next = || {
            it.next()
                .ok_or_else(|| Error::invalid_variant("file header missing fields"))
        };
        let uid = from_be_u32(&next()?)?;
        let gid = from_be_u32(&next()?)?;
        let mode = from_be_u32(&next()?)?;
        let rdev = from_be_u32(&next()?)?;
        let symlink_target = next()?.into_string()?;
        let xattrs = XattrSet::from_value(next()?)?;

        validate_file_mode(mode)?;

        Ok(Self {
            info: FileInfo {
                uid,
                gid,
                mode,
                rdev,
                size,
                symlink_target,
            },
            xattrs,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{mode, Xattr};

    fn header() -> FileHeader {
        let xattrs = XattrSet::canonicalize(vec![Xattr::new("user.k", b"v".to_vec())]).unwrap();
        FileHeader::new(FileInfo::regular(1000, 100, 0o755, 12), xattrs)
    }

    #[test]
    fn test_header_layout() {
        let h = FileHeader::new(FileInfo::regular(1, 2, 0o644, 0), XattrSet::new());
        let bytes = h.encode();
        assert_eq!(&bytes[0..4], &[0, 0, 0, 1]);
        assert_eq!(&bytes[4..8], &[0, 0, 0, 2]);
        assert_eq!(&bytes[8..12], &(mode::S_IFREG | 0o644).to_be_bytes());
        assert_eq!(&bytes[12..16], &[0, 0, 0, 0]);
        // empty target string, then empty xattr array, then one framing offset
        assert_eq!(&bytes[16..], &[0, 17]);
    }

    #[test]
    fn test_plain_roundtrip_drops_size() {
        let h = header();
        let back = FileHeader::decode(&h.encode()).unwrap();
        assert_eq!(back.info.size, 0);
        assert_eq!(back.xattrs, h.xattrs);
        assert_eq!(back.info.mode, h.info.mode);
        assert_eq!(back.info.uid, 1000);
    }

    #[test]
    fn test_compressed_roundtrip() {
        let h = header();
        let bytes = h.encode_compressed();
        assert_eq!(&bytes[0..8], &12u64.to_be_bytes());
        assert_eq!(FileHeader::decode_compressed(&bytes).unwrap(), h);
    }

    #[test]
    fn test_symlink_roundtrip() {
        let h = FileHeader::new(FileInfo::symlink(0, 0, "../lib/x.so"), XattrSet::new());
        assert_eq!(FileHeader::decode(&h.encode()).unwrap(), h);
    }

    #[test]
    fn test_rejects_special_file_modes() {
        let mut info = FileInfo::regular(0, 0, 0o644, 0);
        info.mode = mode::S_IFSOCK | 0o644;
        let bytes = FileHeader::new(info, XattrSet::new()).encode();
        assert!(matches!(
            FileHeader::decode(&bytes),
            Err(Error::InvalidMode { .. })
        ));
    }
}
