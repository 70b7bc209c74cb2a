//! applying `ENDSLEY/BSDIFF43` patches
//!
//! the patch is the magic, the new size, then a stream of control triples
//! `(add_len, copy_len, seek)`, each followed by `add_len` diff bytes and
//! `copy_len` extra bytes.

use crate::error::{Error, Result};

pub const BSDIFF_MAGIC: &[u8; 16] = b"ENDSLEY/BSDIFF43";

/// sign-magnitude little-endian integer used throughout bsdiff
fn offtin(buf: &[u8]) -> i64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[..8]);
    let negative = bytes[7] & 0x80 != 0;
    bytes[7] &= 0x7f;
    let magnitude = i64::from_le_bytes(bytes);
    if negative {
        -magnitude
    } else {
        magnitude
    }
}

struct PatchReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> PatchReader<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| Error::corrupt_delta("truncated bspatch data"))?;
        let out = &self.data[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn offtin(&mut self) -> Result<i64> {
        self.take(8).map(offtin)
    }

    fn len(&mut self) -> Result<usize> {
        let v = self.offtin()?;
        usize::try_from(v).map_err(|_| Error::corrupt_delta(format!("negative length {}", v)))
    }
}

/// rebuild the new file from `old` and a patch
pub fn bspatch(old: &[u8], patch: &[u8]) -> Result<Vec<u8>> {
    let mut reader = PatchReader {
        data: patch,
        pos: 0,
    };
    if reader.take(BSDIFF_MAGIC.len())? != BSDIFF_MAGIC {
        return Err(Error::corrupt_delta("bad bspatch magic"));
    }
    let new_size = reader.len()?;
    // the output is at most what the patch can describe
    let mut new = Vec::with_capacity(new_size.min(patch.len().saturating_mul(8)));
    let mut old_pos: i64 = 0;

    while new.len() < new_size {
        let add_len = reader.len()?;
        let copy_len = reader.len()?;
        let seek = reader.offtin()?;

        if new.len() + add_len > new_size {
            return Err(Error::corrupt_delta("bspatch diff overruns new size"));
        }
        let diff = reader.take(add_len)?;
        for (i, &d) in diff.iter().enumerate() {
            let pos = old_pos.saturating_add(i as i64);
            let base = if pos >= 0 && (pos as usize) < old.len() {
                old[pos as usize]
            } else {
                0
            };
            new.push(base.wrapping_add(d));
        }
        old_pos = old_pos.saturating_add(add_len as i64);

        if new.len() + copy_len > new_size {
            return Err(Error::corrupt_delta("bspatch extra overruns new size"));
        }
        new.extend_from_slice(reader.take(copy_len)?);
        old_pos = old_pos
            .checked_add(seek)
            .ok_or_else(|| Error::corrupt_delta("bspatch seek overflows"))?;
    }

    Ok(new)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offtout(v: i64) -> [u8; 8] {
        let mut bytes = v.unsigned_abs().to_le_bytes();
        if v < 0 {
            bytes[7] |= 0x80;
        }
        bytes
    }

    fn patch(new_size: i64, controls: &[(i64, i64, i64, &[u8], &[u8])]) -> Vec<u8> {
        let mut out = BSDIFF_MAGIC.to_vec();
        out.extend_from_slice(&offtout(new_size));
        for (add, copy, seek, diff, extra) in controls {
            out.extend_from_slice(&offtout(*add));
            out.extend_from_slice(&offtout(*copy));
            out.extend_from_slice(&offtout(*seek));
            out.extend_from_slice(diff);
            out.extend_from_slice(extra);
        }
        out
    }

    #[test]
    fn test_offtin_sign() {
        assert_eq!(offtin(&offtout(5)), 5);
        assert_eq!(offtin(&offtout(-5)), -5);
        assert_eq!(offtin(&offtout(0)), 0);
    }

    #[test]
    fn test_identity_patch() {
        let old = b"hello world";
        let p = patch(11, &[(11, 0, 0, &[0; 11], b"")]);
        assert_eq!(bspatch(old, &p).unwrap(), old);
    }

    #[test]
    fn test_diff_and_extra() {
        let old = b"abcdef";
        // bump the first three bytes by one, then append "XY"
        let p = patch(5, &[(3, 2, 0, &[1, 1, 1], b"XY")]);
        assert_eq!(bspatch(old, &p).unwrap(), b"bcdXY");
    }

    #[test]
    fn test_seek_backwards() {
        let old = b"abc";
        let p = patch(6, &[(3, 0, -3, &[0; 3], b""), (3, 0, 0, &[0; 3], b"")]);
        assert_eq!(bspatch(old, &p).unwrap(), b"abcabc");
    }

    #[test]
    fn test_diff_past_old_end_reads_zero() {
        let p = patch(2, &[(2, 0, 0, &[7, 8], b"")]);
        assert_eq!(bspatch(b"", &p).unwrap(), vec![7, 8]);
    }

    #[test]
    fn test_malformed() {
        assert!(matches!(bspatch(b"", b"short"), Err(Error::CorruptDelta(_))));

        let mut bad_magic = patch(0, &[]);
        bad_magic[0] = b'X';
        assert!(bspatch(b"", &bad_magic).is_err());

        // diff shorter than add_len
        let truncated = patch(4, &[(4, 0, 0, &[0, 0], b"")]);
        assert!(bspatch(b"abcd", &truncated).is_err());

        // control claims more than the new size
        let overrun = patch(1, &[(2, 0, 0, &[0, 0], b"")]);
        assert!(bspatch(b"ab", &overrun).is_err());

        let negative = patch(-1, &[]);
        assert!(bspatch(b"", &negative).is_err());
    }
}
