use crate::checksum::Checksum;
use crate::error::{Error, Result};
use crate::object::{bytes_type, checksum_value};
use crate::types::{DirTree, DirTreeDir, DirTreeFile};
use crate::validate::validate_filename;
use crate::variant::{Value, VariantType};

const DIRTREE_SIG: &str = "(a(say)a(sayay))";

fn file_entry_type() -> VariantType {
    VariantType::Tuple(vec![VariantType::String, bytes_type()])
}

fn dir_entry_type() -> VariantType {
    VariantType::Tuple(vec![VariantType::String, bytes_type(), bytes_type()])
}

impl DirTree {
    /// `(a(say)a(sayay))`: files (name, checksum), dirs (name, tree, meta)
    pub fn to_bytes(&self) -> Vec<u8> {
        let files = self
            .files()
            .iter()
            .map(|f| Value::Tuple(vec![Value::String(f.name.clone()), checksum_value(&f.checksum)]))
            .collect();
        let dirs = self
            .dirs()
            .iter()
            .map(|d| {
                Value::Tuple(vec![
                    Value::String(d.name.clone()),
                    checksum_value(&d.tree),
                    checksum_value(&d.meta),
                ])
            })
            .collect();
        Value::Tuple(vec![
            Value::Array(file_entry_type(), files),
            Value::Array(dir_entry_type(), dirs),
        ])
        .to_bytes()
    }

    /// decode, requiring valid names in strictly ascending order and
    /// 32-byte checksums
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let ty = VariantType::parse(DIRTREE_SIG)?;
        let mut it = Value::from_bytes(&ty, data)?.into_tuple(2)?.into_iter();
        let (files_v, dirs_v) = match (it.next(), it.next()) {
            (Some(f), Some(d)) => (f, d),
            _ => return Err(Error::invalid_variant("dirtree missing fields")),
        };

        let mut files = Vec::new();
        for entry in files_v.into_array()? {
            let mut f = entry.into_tuple(2)?.into_iter();
            let (name, csum) = match (f.next(), f.next()) {
                (Some(n), Some(c)) => (n.into_string()?, c.into_bytes()?),
                _ => return Err(Error::invalid_variant("dirtree file entry missing fields")),
            };
            validate_filename(&name)?;
            files.push(DirTreeFile {
                name,
                checksum: Checksum::from_slice(&csum)?,
            });
        }
        check_ascending(files.iter().map(|f| f.name.as_str()))?;

        let mut dirs = Vec::new();
        for entry in dirs_v.into_array()? {
            let mut d = entry.into_tuple(3)?.into_iter();
            let (name, tree, meta) = match (d.next(), d.next(), d.next()) {
                (Some(n), Some(t), Some(m)) => (n.into_string()?, t.into_bytes()?, m.into_bytes()?),
                _ => return Err(Error::invalid_variant("dirtree dir entry missing fields")),
            };
            validate_filename(&name)?;
            dirs.push(DirTreeDir {
                name,
                tree: Checksum::from_slice(&tree)?,
                meta: Checksum::from_slice(&meta)?,
            });
        }
        check_ascending(dirs.iter().map(|d| d.name.as_str()))?;

        Ok(DirTree::from_sorted(files, dirs))
    }

    pub fn checksum(&self) -> Checksum {
        Checksum::digest(&self.to_bytes())
    }
}

fn check_ascending<'a>(names: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut prev: Option<&str> = None;
    for name in names {
        if let Some(p) = prev {
            if p.as_bytes() >= name.as_bytes() {
                return Err(Error::NotSorted(format!("{} after {}", name, p)));
            }
        }
        prev = Some(name);
    }
    Ok(())
}
