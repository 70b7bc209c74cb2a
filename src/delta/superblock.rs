use crate::checksum::Checksum;
use crate::error::{Error, Result};
use crate::object::{be_u32, be_u64, bytes_type, checksum_value, from_be_u32, from_be_u64};
use crate::types::{Commit, ObjectType};
use crate::validate::validate_objtype;
use crate::variant::{Value, VariantDict, VariantType};

const SUPERBLOCK_SIG: &str = "(a{sv}tayay(a{sv}aya(say)sstayay)aya(uayttay)a(yaytt))";

/// length of one (objtype, checksum) record in a part's object list
pub const OBJTYPE_CSUM_LEN: usize = 1 + Checksum::LEN;

/// the part format version this crate writes and executes
pub const PART_VERSION: u32 = 0;

/// description of one part: what it is and which objects it produces
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PartMeta {
    pub version: u32,
    /// checksum of the whole on-wire part
    pub checksum: Checksum,
    /// size of the on-wire part
    pub size: u64,
    /// total size of the objects it produces
    pub usize: u64,
    /// produced objects, in execution order
    pub objects: Vec<(ObjectType, Checksum)>,
}

/// an object fetched individually instead of through a part
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FallbackEntry {
    pub objtype: ObjectType,
    pub checksum: Checksum,
    pub size: u64,
    pub usize: u64,
}

/// the descriptor of a static delta between two commits
#[derive(Clone, Debug, PartialEq)]
pub struct Superblock {
    pub metadata: VariantDict,
    pub timestamp: u64,
    /// none for a delta from scratch
    pub from: Option<Checksum>,
    pub to: Checksum,
    /// the target commit, embedded
    pub commit: Commit,
    /// (from, to) deltas to apply before this one
    pub dependencies: Vec<(Checksum, Checksum)>,
    pub parts: Vec<PartMeta>,
    pub fallback: Vec<FallbackEntry>,
}

fn part_meta_type() -> VariantType {
    VariantType::Tuple(vec![
        VariantType::UInt32,
        bytes_type(),
        VariantType::UInt64,
        VariantType::UInt64,
        bytes_type(),
    ])
}

fn fallback_type() -> VariantType {
    VariantType::Tuple(vec![
        VariantType::Byte,
        bytes_type(),
        VariantType::UInt64,
        VariantType::UInt64,
    ])
}

/// pack (objtype, checksum) records into 33-byte entries
pub fn encode_object_list(objects: &[(ObjectType, Checksum)]) -> Vec<u8> {
    let mut out = Vec::with_capacity(objects.len() * OBJTYPE_CSUM_LEN);
    for (objtype, checksum) in objects {
        out.push(objtype.as_u8());
        out.extend_from_slice(checksum.as_bytes());
    }
    out
}

pub fn decode_object_list(data: &[u8]) -> Result<Vec<(ObjectType, Checksum)>> {
    if data.len() % OBJTYPE_CSUM_LEN != 0 {
        return Err(Error::invalid_variant(format!(
            "object list of {} bytes is not a multiple of {}",
            data.len(),
            OBJTYPE_CSUM_LEN
        )));
    }
    data.chunks_exact(OBJTYPE_CSUM_LEN)
        .map(|rec| Ok((validate_objtype(rec[0])?, Checksum::from_slice(&rec[1..])?)))
        .collect()
}

fn encode_dependencies(deps: &[(Checksum, Checksum)]) -> Vec<u8> {
    let mut out = Vec::with_capacity(deps.len() * 2 * Checksum::LEN);
    for (from, to) in deps {
        out.extend_from_slice(from.as_bytes());
        out.extend_from_slice(to.as_bytes());
    }
    out
}

fn decode_dependencies(data: &[u8]) -> Result<Vec<(Checksum, Checksum)>> {
    const PAIR: usize = 2 * Checksum::LEN;
    if data.len() % PAIR != 0 {
        return Err(Error::invalid_variant(format!(
            "dependency list of {} bytes is not a multiple of {}",
            data.len(),
            PAIR
        )));
    }
    data.chunks_exact(PAIR)
        .map(|pair| {
            Ok((
                Checksum::from_slice(&pair[..Checksum::LEN])?,
                Checksum::from_slice(&pair[Checksum::LEN..])?,
            ))
        })
        .collect()
}

impl PartMeta {
    fn to_value(&self) -> Value {
        Value::Tuple(vec![
            be_u32(self.version),
            checksum_value(&self.checksum),
            be_u64(self.size),
            be_u64(self.usize),
            Value::Bytes(encode_object_list(&self.objects)),
        ])
    }

    fn from_value(value: Value) -> Result<Self> {
        let mut it = value.into_tuple(5)?.into_iter();
        match (it.next(), it.next(), it.next(), it.next(), it.next()) {
            (Some(version), Some(checksum), Some(size), Some(usize), Some(objects)) => Ok(Self {
                version: from_be_u32(&version)?,
                checksum: Checksum::from_slice(&checksum.into_bytes()?)?,
                size: from_be_u64(&size)?,
                usize: from_be_u64(&usize)?,
                objects: decode_object_list(&objects.into_bytes()?)?,
            }),
            _ => Err(Error::invalid_variant("part meta missing fields")),
        }
    }
}

impl FallbackEntry {
    fn to_value(&self) -> Value {
        Value::Tuple(vec![
            Value::Byte(self.objtype.as_u8()),
            checksum_value(&self.checksum),
            be_u64(self.size),
            be_u64(self.usize),
        ])
    }

    fn from_value(value: Value) -> Result<Self> {
        let mut it = value.into_tuple(4)?.into_iter();
        match (it.next(), it.next(), it.next(), it.next()) {
            (Some(objtype), Some(checksum), Some(size), Some(usize)) => Ok(Self {
                objtype: validate_objtype(objtype.as_u8()?)?,
                checksum: Checksum::from_slice(&checksum.into_bytes()?)?,
                size: from_be_u64(&size)?,
                usize: from_be_u64(&usize)?,
            }),
            _ => Err(Error::invalid_variant("fallback entry missing fields")),
        }
    }
}

impl Superblock {
    /// a delta to `commit`, with no parts yet
    pub fn new(from: Option<Checksum>, commit: Commit, timestamp: u64) -> Self {
        Self {
            metadata: VariantDict::new(),
            timestamp,
            from,
            to: commit.checksum(),
            commit,
            dependencies: Vec::new(),
            parts: Vec::new(),
            fallback: Vec::new(),
        }
    }

    /// every object the delta produces, parts first, then fallbacks
    pub fn objects(&self) -> impl Iterator<Item = (ObjectType, Checksum)> + '_ {
        self.parts
            .iter()
            .flat_map(|p| p.objects.iter().copied())
            .chain(self.fallback.iter().map(|f| (f.objtype, f.checksum)))
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let from = match &self.from {
            Some(c) => checksum_value(c),
            None => Value::Bytes(Vec::new()),
        };
        Value::Tuple(vec![
            self.metadata.to_value(),
            be_u64(self.timestamp),
            from,
            checksum_value(&self.to),
            self.commit.to_value(),
            Value::Bytes(encode_dependencies(&self.dependencies)),
            Value::Array(
                part_meta_type(),
                self.parts.iter().map(PartMeta::to_value).collect(),
            ),
            Value::Array(
                fallback_type(),
                self.fallback.iter().map(FallbackEntry::to_value).collect(),
            ),
        ])
        .to_bytes()
    }

    /// decode and check that `to` names the embedded commit
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let ty = VariantType::parse(SUPERBLOCK_SIG)?;
        let mut it = Value::from_bytes(&ty, data)?.into_tuple(8)?.into_iter();
        let mut next = || {
            it.next()
                .ok_or_else(|| Error::invalid_variant("superblock missing fields"))
        };

        let metadata = VariantDict::from_value(next()?)?;
        let timestamp = from_be_u64(&next()?)?;
        let from = next()?.into_bytes()?;
        let from = if from.is_empty() {
            None
        } else {
            Some(Checksum::from_slice(&from)?)
        };
        let to = Checksum::from_slice(&next()?.into_bytes()?)?;
        let commit = Commit::from_value(next()?)?;
        let dependencies = decode_dependencies(&next()?.into_bytes()?)?;
        let parts = next()?
            .into_array()?
            .into_iter()
            .map(PartMeta::from_value)
            .collect::<Result<Vec<_>>>()?;
        let fallback = next()?
            .into_array()?
            .into_iter()
            .map(FallbackEntry::from_value)
            .collect::<Result<Vec<_>>>()?;

        let actual = commit.checksum();
        if actual != to {
            return Err(Error::CorruptObject {
                expected: to,
                actual,
            });
        }

        Ok(Self {
            metadata,
            timestamp,
            from,
            to,
            commit,
            dependencies,
            parts,
            fallback,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn commit() -> Commit {
        Commit::new(Checksum::digest(b"tree"), Checksum::digest(b"meta"), "target", 99)
    }

    fn sample() -> Superblock {
        let mut sb = Superblock::new(Some(Checksum::digest(b"from")), commit(), 1234);
        sb.metadata.insert("ostree.delta.version", Value::UInt32(1));
        sb.dependencies
            .push((Checksum::digest(b"a"), Checksum::digest(b"b")));
        sb.parts.push(PartMeta {
            version: PART_VERSION,
            checksum: Checksum::digest(b"part0"),
            size: 100,
            usize: 400,
            objects: vec![
                (ObjectType::DirMeta, Checksum::digest(b"o1")),
                (ObjectType::File, Checksum::digest(b"o2")),
            ],
        });
        sb.fallback.push(FallbackEntry {
            objtype: ObjectType::File,
            checksum: Checksum::digest(b"big"),
            size: 1 << 30,
            usize: 1 << 31,
        });
        sb
    }

    #[test]
    fn test_roundtrip() {
        let sb = sample();
        let back = Superblock::from_bytes(&sb.to_bytes()).unwrap();
        assert_eq!(back, sb);
        assert_eq!(back.objects().count(), 3);
    }

    #[test]
    fn test_from_scratch() {
        let sb = Superblock::new(None, commit(), 0);
        let back = Superblock::from_bytes(&sb.to_bytes()).unwrap();
        assert_eq!(back.from, None);
        assert_eq!(back.to, commit().checksum());
    }

    #[test]
    fn test_rejects_mismatched_commit() {
        let mut sb = sample();
        sb.to = Checksum::digest(b"something else");
        assert!(matches!(
            Superblock::from_bytes(&sb.to_bytes()),
            Err(Error::CorruptObject { .. })
        ));
    }

    #[test]
    fn test_object_list_records() {
        let objects = vec![(ObjectType::Commit, Checksum::digest(b"c"))];
        let bytes = encode_object_list(&objects);
        assert_eq!(bytes.len(), 33);
        assert_eq!(bytes[0], 4);
        assert_eq!(decode_object_list(&bytes).unwrap(), objects);

        assert!(decode_object_list(&bytes[..32]).is_err());
        let mut bad = bytes.clone();
        bad[0] = 9;
        assert!(matches!(
            decode_object_list(&bad),
            Err(Error::InvalidObjectType(_))
        ));
    }

    #[test]
    fn test_dependency_pairs() {
        let deps = vec![(Checksum::digest(b"1"), Checksum::digest(b"2"))];
        let bytes = encode_dependencies(&deps);
        assert_eq!(bytes.len(), 64);
        assert_eq!(decode_dependencies(&bytes).unwrap(), deps);
        assert!(decode_dependencies(&bytes[..40]).is_err());
    }
}
