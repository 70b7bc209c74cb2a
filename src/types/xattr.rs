use crate::error::{Error, Result};
use crate::variant::{Value, VariantType};

/// extended attribute (name + value)
///
/// names are raw bytes without the terminating nul.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Xattr {
    pub name: Vec<u8>,
    pub value: Vec<u8>,
}

impl Xattr {
    pub fn new(name: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// a set of extended attributes in canonical order
///
/// entries are unique by name and always sorted byte-wise by name, so the
/// serialized form depends only on the contents, never on the order the
/// filesystem reported them in.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct XattrSet {
    entries: Vec<Xattr>,
}

impl XattrSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// build from attributes in any order; a later duplicate name wins
    pub fn canonicalize(xattrs: impl IntoIterator<Item = Xattr>) -> Result<Self> {
        let mut set = Self::new();
        for x in xattrs {
            set.insert(x)?;
        }
        Ok(set)
    }

    /// insert or replace an attribute
    pub fn insert(&mut self, xattr: Xattr) -> Result<()> {
        validate_name(&xattr.name)?;
        match self
            .entries
            .binary_search_by(|e| e.name.as_slice().cmp(xattr.name.as_slice()))
        {
            Ok(i) => self.entries[i] = xattr,
            Err(i) => self.entries.insert(i, xattr),
        }
        Ok(())
    }

    pub fn get(&self, name: &[u8]) -> Option<&[u8]> {
        self.entries
            .binary_search_by(|e| e.name.as_slice().cmp(name))
            .ok()
            .map(|i| self.entries[i].value.as_slice())
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Xattr> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `a(ayay)`; each name is stored with its terminating nul
    pub fn to_value(&self) -> Value {
        Value::Array(
            entry_type(),
            self.entries
                .iter()
                .map(|x| {
                    let mut name = Vec::with_capacity(x.name.len() + 1);
                    name.extend_from_slice(&x.name);
                    name.push(0);
                    Value::Tuple(vec![Value::Bytes(name), Value::Bytes(x.value.clone())])
                })
                .collect(),
        )
    }

    /// decode `a(ayay)`, requiring strictly ascending names
    pub fn from_value(value: Value) -> Result<Self> {
        let mut entries: Vec<Xattr> = Vec::new();
        for item in value.into_array()? {
            let mut fields = item.into_tuple(2)?.into_iter();
            let (name, value) = match (fields.next(), fields.next()) {
                (Some(n), Some(v)) => (n.into_bytes()?, v.into_bytes()?),
                _ => return Err(Error::invalid_variant("xattr entry missing fields")),
            };
            let name = match name.split_last() {
                Some((0, body)) => body.to_vec(),
                _ => {
                    return Err(Error::invalid_variant(
                        "xattr name is not a nul-terminated bytestring",
                    ))
                }
            };
            validate_name(&name)?;
            if let Some(prev) = entries.last() {
                if prev.name >= name {
                    return Err(Error::NotSorted(format!(
                        "xattr {} after {}",
                        String::from_utf8_lossy(&name),
                        String::from_utf8_lossy(&prev.name)
                    )));
                }
            }
            entries.push(Xattr { name, value });
        }
        Ok(Self { entries })
    }

    /// signature of the serialized form
    pub fn variant_type() -> VariantType {
        VariantType::array_of(entry_type())
    }
}

impl IntoIterator for XattrSet {
    type Item = Xattr;
    type IntoIter = std::vec::IntoIter<Xattr>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a XattrSet {
    type Item = &'a Xattr;
    type IntoIter = std::slice::Iter<'a, Xattr>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

fn entry_type() -> VariantType {
    VariantType::Tuple(vec![
        VariantType::array_of(VariantType::Byte),
        VariantType::array_of(VariantType::Byte),
    ])
}

fn validate_name(name: &[u8]) -> Result<()> {
    if name.is_empty() || name.contains(&0) {
        return Err(Error::invalid_variant(format!(
            "invalid xattr name {:?}",
            String::from_utf8_lossy(name)
        )));
    }
    Ok(())
}

/// sort a raw nul-separated name list as returned by `listxattr`
pub fn canonicalize_name_list(raw: &[u8]) -> Vec<Vec<u8>> {
    let mut names: Vec<Vec<u8>> = raw
        .split(|&b| b == 0)
        .filter(|n| !n.is_empty())
        .map(|n| n.to_vec())
        .collect();
    names.sort();
    names.dedup();
    names
}
