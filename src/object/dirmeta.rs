use crate::checksum::Checksum;
use crate::error::{Error, Result};
use crate::object::{be_u32, from_be_u32};
use crate::types::{DirMeta, XattrSet};
use crate::variant::{Value, VariantType};

const DIRMETA_SIG: &str = "(uuua(ayay))";

impl DirMeta {
    /// `(uuua(ayay))`: uid, gid, mode, xattrs
    pub fn to_bytes(&self) -> Vec<u8> {
        Value::Tuple(vec![
            be_u32(self.uid),
            be_u32(self.gid),
            be_u32(self.mode),
            self.xattrs.to_value(),
        ])
        .to_bytes()
    }

    /// decode without checking the mode; see `validate::validate_dirmeta`
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let ty = VariantType::parse(DIRMETA_SIG)?;
        let mut it = Value::from_bytes(&ty, data)?.into_tuple(4)?.into_iter();
        match (it.next(), it.next(), it.next(), it.next()) {
            (Some(uid), Some(gid), Some(mode), Some(xattrs)) => Ok(Self {
                uid: from_be_u32(&uid)?,
                gid: from_be_u32(&gid)?,
                mode: from_be_u32(&mode)?,
                xattrs: XattrSet::from_value(xattrs)?,
            }),
            _ => Err(Error::invalid_variant("dirmeta missing fields")),
        }
    }

    pub fn checksum(&self) -> Checksum {
        Checksum::digest(&self.to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{mode, Xattr};

    #[test]
    fn test_roundtrip() {
        let xattrs = XattrSet::canonicalize(vec![
            Xattr::new("user.b", vec![2]),
            Xattr::new("user.a", vec![1]),
        ])
        .unwrap();
        let meta = DirMeta::new(0, 0, 0o755).with_xattrs(xattrs);
        let bytes = meta.to_bytes();
        assert_eq!(&bytes[8..12], &(mode::S_IFDIR | 0o755).to_be_bytes());
        assert_eq!(DirMeta::from_bytes(&bytes).unwrap(), meta);
    }

    #[test]
    fn test_checksum_is_digest_of_bytes() {
        let meta = DirMeta::new(1, 1, 0o700);
        assert_eq!(meta.checksum(), Checksum::digest(&meta.to_bytes()));
        assert_ne!(meta.checksum(), DirMeta::new(1, 1, 0o755).checksum());
    }

    #[test]
    fn test_rejects_truncated() {
        let bytes = DirMeta::new(0, 0, 0o755).to_bytes();
        assert!(DirMeta::from_bytes(&bytes[..6]).is_err());
    }
}
