use std::fmt;

use crate::error::{Error, Result};

/// nesting limit for both type signatures and serialized data
pub const MAX_DEPTH: usize = 128;

/// a parsed type signature
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum VariantType {
    Bool,
    Byte,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Double,
    String,
    ObjectPath,
    Signature,
    Variant,
    Array(Box<VariantType>),
    Tuple(Vec<VariantType>),
    DictEntry(Box<VariantType>, Box<VariantType>),
}

impl VariantType {
    /// parse a single complete type from a signature string
    pub fn parse(sig: &str) -> Result<Self> {
        let bytes = sig.as_bytes();
        let mut pos = 0;
        let ty = parse_one(bytes, &mut pos, 0)
            .ok_or_else(|| Error::InvalidSignature(sig.to_string()))?;
        if pos != bytes.len() {
            return Err(Error::InvalidSignature(sig.to_string()));
        }
        Ok(ty)
    }

    /// shorthand for `aT`
    pub fn array_of(elem: VariantType) -> Self {
        VariantType::Array(Box::new(elem))
    }

    /// the type signature string
    pub fn signature(&self) -> String {
        let mut out = String::new();
        self.write_signature(&mut out);
        out
    }

    fn write_signature(&self, out: &mut String) {
        match self {
            VariantType::Bool => out.push('b'),
            VariantType::Byte => out.push('y'),
            VariantType::Int16 => out.push('n'),
            VariantType::UInt16 => out.push('q'),
            VariantType::Int32 => out.push('i'),
            VariantType::UInt32 => out.push('u'),
            VariantType::Int64 => out.push('x'),
            VariantType::UInt64 => out.push('t'),
            VariantType::Double => out.push('d'),
            VariantType::String => out.push('s'),
            VariantType::ObjectPath => out.push('o'),
            VariantType::Signature => out.push('g'),
            VariantType::Variant => out.push('v'),
            VariantType::Array(elem) => {
                out.push('a');
                elem.write_signature(out);
            }
            VariantType::Tuple(members) => {
                out.push('(');
                for m in members {
                    m.write_signature(out);
                }
                out.push(')');
            }
            VariantType::DictEntry(k, v) => {
                out.push('{');
                k.write_signature(out);
                v.write_signature(out);
                out.push('}');
            }
        }
    }

    /// alignment requirement in bytes
    pub fn alignment(&self) -> usize {
        match self {
            VariantType::Bool
            | VariantType::Byte
            | VariantType::String
            | VariantType::ObjectPath
            | VariantType::Signature => 1,
            VariantType::Int16 | VariantType::UInt16 => 2,
            VariantType::Int32 | VariantType::UInt32 => 4,
            VariantType::Int64 | VariantType::UInt64 | VariantType::Double | VariantType::Variant => 8,
            VariantType::Array(elem) => elem.alignment(),
            VariantType::Tuple(members) => members.iter().map(|m| m.alignment()).max().unwrap_or(1),
            VariantType::DictEntry(k, v) => k.alignment().max(v.alignment()),
        }
    }

    /// serialized size if every value of this type has the same size
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            VariantType::Bool | VariantType::Byte => Some(1),
            VariantType::Int16 | VariantType::UInt16 => Some(2),
            VariantType::Int32 | VariantType::UInt32 => Some(4),
            VariantType::Int64 | VariantType::UInt64 | VariantType::Double => Some(8),
            VariantType::String
            | VariantType::ObjectPath
            | VariantType::Signature
            | VariantType::Variant
            | VariantType::Array(_) => None,
            VariantType::Tuple(members) => fixed_struct_size(members.iter(), self.alignment()),
            VariantType::DictEntry(k, v) => {
                fixed_struct_size([k.as_ref(), v.as_ref()].into_iter(), self.alignment())
            }
        }
    }

    /// basic types are the ones allowed as dictionary keys
    pub fn is_basic(&self) -> bool {
        !matches!(
            self,
            VariantType::Variant
                | VariantType::Array(_)
                | VariantType::Tuple(_)
                | VariantType::DictEntry(..)
        )
    }
}

fn fixed_struct_size<'a>(
    members: impl Iterator<Item = &'a VariantType>,
    alignment: usize,
) -> Option<usize> {
    let mut offset = 0usize;
    let mut any = false;
    for m in members {
        any = true;
        let size = m.fixed_size()?;
        offset = align_up(offset, m.alignment()) + size;
    }
    if !any {
        // the unit tuple occupies one byte
        return Some(1);
    }
    Some(align_up(offset, alignment))
}

pub(crate) fn align_up(offset: usize, alignment: usize) -> usize {
    (offset + alignment - 1) & !(alignment - 1)
}

fn parse_one(sig: &[u8], pos: &mut usize, depth: usize) -> Option<VariantType> {
    if depth > MAX_DEPTH {
        return None;
    }
    let c = *sig.get(*pos)?;
    *pos += 1;
    let ty = match c {
        b'b' => VariantType::Bool,
        b'y' => VariantType::Byte,
        b'n' => VariantType::Int16,
        b'q' => VariantType::UInt16,
        b'i' => VariantType::Int32,
        b'u' => VariantType::UInt32,
        b'x' => VariantType::Int64,
        b't' => VariantType::UInt64,
        b'd' => VariantType::Double,
        b's' => VariantType::String,
        b'o' => VariantType::ObjectPath,
        b'g' => VariantType::Signature,
        b'v' => VariantType::Variant,
        b'a' => VariantType::Array(Box::new(parse_one(sig, pos, depth + 1)?)),
        b'(' => {
            let mut members = Vec::new();
            loop {
                if *sig.get(*pos)? == b')' {
                    *pos += 1;
                    break;
                }
                members.push(parse_one(sig, pos, depth + 1)?);
            }
            VariantType::Tuple(members)
        }
        b'{' => {
            let key = parse_one(sig, pos, depth + 1)?;
            if !key.is_basic() {
                return None;
            }
            let value = parse_one(sig, pos, depth + 1)?;
            if *sig.get(*pos)? != b'}' {
                return None;
            }
            *pos += 1;
            VariantType::DictEntry(Box::new(key), Box::new(value))
        }
        _ => return None,
    };
    Some(ty)
}

impl fmt::Display for VariantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.signature())
    }
}

impl std::str::FromStr for VariantType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_signature_roundtrip() {
        for sig in [
            "(uuuusa(ayay))",
            "(tuuuusa(ayay))",
            "(uuua(ayay))",
            "(a(say)a(sayay))",
            "(a{sv}aya(say)sstayay)",
            "(a(uuu)aa(ayay)ayay)",
            "()",
            "v",
        ] {
            assert_eq!(VariantType::parse(sig).unwrap().signature(), sig);
        }
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(VariantType::parse("").is_err());
        assert!(VariantType::parse("(uu").is_err());
        assert!(VariantType::parse("uu").is_err());
        assert!(VariantType::parse("a").is_err());
        assert!(VariantType::parse("{vs}").is_err());
        assert!(VariantType::parse("{sss}").is_err());
        assert!(VariantType::parse("mu").is_err());
    }

    #[test]
    fn test_alignment_and_fixed_size() {
        let t = VariantType::parse("(uuu)").unwrap();
        assert_eq!(t.alignment(), 4);
        assert_eq!(t.fixed_size(), Some(12));

        let t = VariantType::parse("(yt)").unwrap();
        assert_eq!(t.alignment(), 8);
        assert_eq!(t.fixed_size(), Some(16));

        let t = VariantType::parse("(ty)").unwrap();
        assert_eq!(t.fixed_size(), Some(16));

        assert_eq!(VariantType::parse("()").unwrap().fixed_size(), Some(1));
        assert_eq!(VariantType::parse("(say)").unwrap().fixed_size(), None);
        assert_eq!(VariantType::parse("a{sv}").unwrap().alignment(), 8);
    }

    #[test]
    fn test_deep_nesting_rejected() {
        let sig = "a".repeat(MAX_DEPTH + 2) + "y";
        assert!(VariantType::parse(&sig).is_err());
    }
}
