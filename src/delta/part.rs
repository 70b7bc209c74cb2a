use std::io::Read;

use serde::{Deserialize, Serialize};

use crate::checksum::Checksum;
use crate::error::{Error, Result};
use crate::object::{be_u32, from_be_u32};
use crate::types::XattrSet;
use crate::variant::{Value, VariantType};

/// parts larger than this are refused
pub const MAX_PART_SIZE: u64 = 16 * 1024 * 1024;

const PAYLOAD_SIG: &str = "(a(uuu)aa(ayay)ayay)";

/// zstd level used when compressing parts
const ZSTD_LEVEL: i32 = 3;

/// the one-byte compression tag in front of every part
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartCompression {
    #[default]
    None,
    Zstd,
}

impl PartCompression {
    pub fn tag(&self) -> u8 {
        match self {
            PartCompression::None => 0,
            PartCompression::Zstd => b'z',
        }
    }

    /// parse a tag; lzma (`x`) is a known format this crate cannot read
    pub fn from_tag(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(PartCompression::None),
            b'z' => Ok(PartCompression::Zstd),
            other => Err(Error::UnsupportedCompression(other)),
        }
    }
}

/// one (uid, gid, mode) entry of the mode table
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ModeEntry {
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
}

/// decoded contents of a part
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PartPayload {
    pub modes: Vec<ModeEntry>,
    pub xattrs: Vec<XattrSet>,
    /// bytes that ops copy from
    pub raw: Vec<u8>,
    /// encoded op stream
    pub ops: Vec<u8>,
}

fn mode_entry_type() -> VariantType {
    VariantType::Tuple(vec![VariantType::UInt32; 3])
}

impl PartPayload {
    /// `(a(uuu)aa(ayay)ayay)` without the compression tag
    pub fn to_bytes(&self) -> Vec<u8> {
        let modes = self
            .modes
            .iter()
            .map(|m| Value::Tuple(vec![be_u32(m.uid), be_u32(m.gid), be_u32(m.mode)]))
            .collect();
        let xattrs = self.xattrs.iter().map(|x| x.to_value()).collect();
        Value::Tuple(vec![
            Value::Array(mode_entry_type(), modes),
            Value::Array(XattrSet::variant_type(), xattrs),
            Value::Bytes(self.raw.clone()),
            Value::Bytes(self.ops.clone()),
        ])
        .to_bytes()
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let ty = VariantType::parse(PAYLOAD_SIG)?;
        let mut it = Value::from_bytes(&ty, data)?.into_tuple(4)?.into_iter();
        let (modes_v, xattrs_v, raw, ops) = match (it.next(), it.next(), it.next(), it.next()) {
            (Some(m), Some(x), Some(r), Some(o)) => (m, x, r.into_bytes()?, o.into_bytes()?),
            _ => return Err(Error::invalid_variant("part payload missing fields")),
        };

        let mut modes = Vec::new();
        for entry in modes_v.into_array()? {
            let fields = entry.into_tuple(3)?;
            modes.push(ModeEntry {
                uid: from_be_u32(&fields[0])?,
                gid: from_be_u32(&fields[1])?,
                mode: from_be_u32(&fields[2])?,
            });
        }
        let xattrs = xattrs_v
            .into_array()?
            .into_iter()
            .map(XattrSet::from_value)
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            modes,
            xattrs,
            raw,
            ops,
        })
    }

    /// the on-wire part: compression tag followed by the (compressed) payload
    pub fn to_part_bytes(&self, compression: PartCompression) -> Result<Vec<u8>> {
        let payload = self.to_bytes();
        let mut out = vec![compression.tag()];
        match compression {
            PartCompression::None => out.extend_from_slice(&payload),
            PartCompression::Zstd => {
                let compressed = zstd::encode_all(&payload[..], ZSTD_LEVEL).map_err(|e| Error::Io {
                    path: "<zstd>".into(),
                    source: e,
                })?;
                out.extend_from_slice(&compressed);
            }
        }
        Ok(out)
    }

    /// decode an on-wire part
    pub fn from_part_bytes(data: &[u8]) -> Result<Self> {
        Self::from_part_bytes_with_limit(data, MAX_PART_SIZE)
    }

    /// decode an on-wire part whose payload may not exceed `limit` bytes
    /// once decompressed
    pub fn from_part_bytes_with_limit(data: &[u8], limit: u64) -> Result<Self> {
        let (&tag, body) = data
            .split_first()
            .ok_or_else(|| Error::corrupt_delta("empty part"))?;
        match PartCompression::from_tag(tag)? {
            PartCompression::None => Self::from_bytes(body),
            PartCompression::Zstd => Self::from_bytes(&decompress_bounded(body, limit)?),
        }
    }
}

fn decompress_bounded(body: &[u8], limit: u64) -> Result<Vec<u8>> {
    let mut payload = Vec::new();
    zstd::stream::read::Decoder::new(body)
        .and_then(|decoder| {
            decoder
                .take(limit.saturating_add(1))
                .read_to_end(&mut payload)
        })
        .map_err(|e| Error::corrupt_delta(format!("failed to decompress part: {}", e)))?;
    if payload.len() as u64 > limit {
        return Err(Error::corrupt_delta(format!(
            "decompressed part exceeds limit of {} bytes",
            limit
        )));
    }
    Ok(payload)
}

/// check a fetched part against its declared checksum
pub fn validate_part(data: &[u8], expected: &Checksum) -> Result<()> {
    validate_part_with_limit(data, expected, MAX_PART_SIZE)
}

/// like `validate_part` with a configured size limit
pub fn validate_part_with_limit(data: &[u8], expected: &Checksum, max_size: u64) -> Result<()> {
    if data.len() as u64 > max_size {
        return Err(Error::corrupt_delta(format!(
            "part of {} bytes exceeds limit of {}",
            data.len(),
            max_size
        )));
    }
    let actual = Checksum::digest(data);
    if actual != *expected {
        return Err(Error::CorruptObject {
            expected: *expected,
            actual,
        });
    }
    Ok(())
}
