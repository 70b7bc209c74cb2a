//! delta part operations and their byte encoding
//!
//! each op is one opcode byte followed by LEB128 varuint64 operands. the
//! operands of open-splice-and-close depend on whether the object being
//! produced is metadata or a file, so decoding needs that context.

use std::fmt;

use crate::error::{Error, Result};

/// longest valid encoding of a u64
const MAX_VARINT_LEN: usize = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Opcode {
    OpenSpliceAndClose = b'S',
    Open = b'o',
    Write = b'w',
    SetReadSource = b'r',
    UnsetReadSource = b'R',
    Close = b'c',
    Bspatch = b'B',
}

impl TryFrom<u8> for Opcode {
    type Error = Error;

    fn try_from(b: u8) -> Result<Self> {
        Ok(match b {
            b'S' => Opcode::OpenSpliceAndClose,
            b'o' => Opcode::Open,
            b'w' => Opcode::Write,
            b'r' => Opcode::SetReadSource,
            b'R' => Opcode::UnsetReadSource,
            b'c' => Opcode::Close,
            b'B' => Opcode::Bspatch,
            other => return Err(Error::corrupt_delta(format!("unknown opcode {:#04x}", other))),
        })
    }
}

/// a decoded operation
///
/// offsets and sizes refer to the part's raw data unless noted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Op {
    /// whole metadata object from raw data
    SpliceMeta { size: u64, offset: u64 },
    /// whole file object; the span is the content, or the target of a symlink
    SpliceContent {
        mode_idx: u64,
        xattr_idx: u64,
        size: u64,
        offset: u64,
    },
    /// start a regular file of `size` bytes, filled by later writes
    Open {
        mode_idx: u64,
        xattr_idx: u64,
        size: u64,
    },
    /// append a span of raw data, or of the read source when one is set
    Write { size: u64, offset: u64 },
    /// use the file object whose checksum is stored at `offset` as source
    SetReadSource { offset: u64 },
    UnsetReadSource,
    /// finish the open object
    Close,
    /// append the result of patching the read source
    Bspatch { offset: u64, size: u64 },
}

impl Op {
    pub fn opcode(&self) -> Opcode {
        match self {
            Op::SpliceMeta { .. } | Op::SpliceContent { .. } => Opcode::OpenSpliceAndClose,
            Op::Open { .. } => Opcode::Open,
            Op::Write { .. } => Opcode::Write,
            Op::SetReadSource { .. } => Opcode::SetReadSource,
            Op::UnsetReadSource => Opcode::UnsetReadSource,
            Op::Close => Opcode::Close,
            Op::Bspatch { .. } => Opcode::Bspatch,
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        out.push(self.opcode() as u8);
        match *self {
            Op::SpliceMeta { size, offset } | Op::Write { size, offset } => {
                write_varuint(out, size);
                write_varuint(out, offset);
            }
            Op::SpliceContent {
                mode_idx,
                xattr_idx,
                size,
                offset,
            } => {
                for v in [mode_idx, xattr_idx, size, offset] {
                    write_varuint(out, v);
                }
            }
            Op::Open {
                mode_idx,
                xattr_idx,
                size,
            } => {
                for v in [mode_idx, xattr_idx, size] {
                    write_varuint(out, v);
                }
            }
            Op::SetReadSource { offset } => write_varuint(out, offset),
            Op::Bspatch { offset, size } => {
                write_varuint(out, offset);
                write_varuint(out, size);
            }
            Op::UnsetReadSource | Op::Close => {}
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.opcode() as u8 as char)
    }
}

/// sequential reader over an encoded op stream
#[derive(Debug)]
pub struct OpReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> OpReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// decode the next op, or none at the end of the stream
    ///
    /// `splice_meta` says how to read the operands of a splice; `None`
    /// means no further object is expected, which makes a splice an error.
    pub fn next_op(&mut self, splice_meta: Option<bool>) -> Result<Option<Op>> {
        let Some(&byte) = self.data.get(self.pos) else {
            return Ok(None);
        };
        self.pos += 1;
        let op = match Opcode::try_from(byte)? {
            Opcode::OpenSpliceAndClose => match splice_meta {
                Some(true) => Op::SpliceMeta {
                    size: self.varuint()?,
                    offset: self.varuint()?,
                },
                Some(false) => Op::SpliceContent {
                    mode_idx: self.varuint()?,
                    xattr_idx: self.varuint()?,
                    size: self.varuint()?,
                    offset: self.varuint()?,
                },
                None => return Err(Error::corrupt_delta("more objects than declared")),
            },
            Opcode::Open => Op::Open {
                mode_idx: self.varuint()?,
                xattr_idx: self.varuint()?,
                size: self.varuint()?,
            },
            Opcode::Write => Op::Write {
                size: self.varuint()?,
                offset: self.varuint()?,
            },
            Opcode::SetReadSource => Op::SetReadSource {
                offset: self.varuint()?,
            },
            Opcode::UnsetReadSource => Op::UnsetReadSource,
            Opcode::Close => Op::Close,
            Opcode::Bspatch => Op::Bspatch {
                offset: self.varuint()?,
                size: self.varuint()?,
            },
        };
        Ok(Some(op))
    }

    fn varuint(&mut self) -> Result<u64> {
        let (v, n) = read_varuint(&self.data[self.pos..])?;
        self.pos += n;
        Ok(v)
    }
}

/// LEB128 encode
pub fn write_varuint(out: &mut Vec<u8>, mut v: u64) {
    loop {
        let byte = (v & 0x7f) as u8;
        v >>= 7;
        if v == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// LEB128 decode, returning the value and the number of bytes consumed
pub fn read_varuint(data: &[u8]) -> Result<(u64, usize)> {
    let mut v: u64 = 0;
    for (i, &byte) in data.iter().take(MAX_VARINT_LEN).enumerate() {
        let bits = (byte & 0x7f) as u64;
        let shift = 7 * i as u32;
        if shift == 63 && bits > 1 {
            return Err(Error::corrupt_delta("varint overflows u64"));
        }
        v |= bits << shift;
        if byte & 0x80 == 0 {
            return Ok((v, i + 1));
        }
    }
    Err(Error::corrupt_delta("truncated varint"))
}
