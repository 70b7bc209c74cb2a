use crate::checksum::Checksum;
use crate::error::{Error, Result};
use crate::validate::validate_filename;

/// a non-directory child: name and file object checksum
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirTreeFile {
    pub name: String,
    pub checksum: Checksum,
}

/// a subdirectory child: name, its dirtree and its dirmeta
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirTreeDir {
    pub name: String,
    pub tree: Checksum,
    pub meta: Checksum,
}

impl DirTreeFile {
    pub fn new(name: impl Into<String>, checksum: Checksum) -> Self {
        Self {
            name: name.into(),
            checksum,
        }
    }
}

impl DirTreeDir {
    pub fn new(name: impl Into<String>, tree: Checksum, meta: Checksum) -> Self {
        Self {
            name: name.into(),
            tree,
            meta,
        }
    }
}

/// children of one directory, files and subdirectories listed separately
///
/// both lists are sorted by name (byte-wise) and names are unique within
/// each list.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DirTree {
    files: Vec<DirTreeFile>,
    dirs: Vec<DirTreeDir>,
}

impl DirTree {
    /// create a tree, validating and sorting entries
    pub fn new(mut files: Vec<DirTreeFile>, mut dirs: Vec<DirTreeDir>) -> Result<Self> {
        for name in files.iter().map(|f| &f.name).chain(dirs.iter().map(|d| &d.name)) {
            validate_filename(name)?;
        }

        files.sort_by(|a, b| a.name.as_bytes().cmp(b.name.as_bytes()));
        dirs.sort_by(|a, b| a.name.as_bytes().cmp(b.name.as_bytes()));

        check_unique(files.iter().map(|f| f.name.as_str()))?;
        check_unique(dirs.iter().map(|d| d.name.as_str()))?;

        Ok(Self { files, dirs })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// build from lists already known to be canonical
    pub(crate) fn from_sorted(files: Vec<DirTreeFile>, dirs: Vec<DirTreeDir>) -> Self {
        Self { files, dirs }
    }

    pub fn files(&self) -> &[DirTreeFile] {
        &self.files
    }

    pub fn dirs(&self) -> &[DirTreeDir] {
        &self.dirs
    }

    pub fn get_file(&self, name: &str) -> Option<&DirTreeFile> {
        self.files
            .binary_search_by(|e| e.name.as_bytes().cmp(name.as_bytes()))
            .ok()
            .map(|i| &self.files[i])
    }

    pub fn get_dir(&self, name: &str) -> Option<&DirTreeDir> {
        self.dirs
            .binary_search_by(|e| e.name.as_bytes().cmp(name.as_bytes()))
            .ok()
            .map(|i| &self.dirs[i])
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty() && self.dirs.is_empty()
    }
}

fn check_unique<'a>(names: impl Iterator<Item = &'a str>) -> Result<()> {
    let mut prev: Option<&str> = None;
    for name in names {
        if prev == Some(name) {
            return Err(Error::DuplicateEntryName(name.to_string()));
        }
        prev = Some(name);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(name: &str) -> DirTreeFile {
        DirTreeFile {
            name: name.to_string(),
            checksum: Checksum::digest(name.as_bytes()),
        }
    }

    fn dir(name: &str) -> DirTreeDir {
        DirTreeDir {
            name: name.to_string(),
            tree: Checksum::digest(b"tree"),
            meta: Checksum::digest(b"meta"),
        }
    }

    #[test]
    fn test_new_sorts() {
        let tree = DirTree::new(
            vec![file("zebra"), file("Apple"), file("apple")],
            vec![dir("usr"), dir("etc")],
        )
        .unwrap();
        let names: Vec<_> = tree.files().iter().map(|f| f.name.as_str()).collect();
        // byte order: uppercase before lowercase
        assert_eq!(names, vec!["Apple", "apple", "zebra"]);
        assert_eq!(tree.dirs()[0].name, "etc");
    }

    #[test]
    fn test_duplicate_rejected() {
        let err = DirTree::new(vec![file("a"), file("a")], vec![]).unwrap_err();
        assert!(matches!(err, Error::DuplicateEntryName(n) if n == "a"));
    }

    #[test]
    fn test_same_name_in_both_lists_allowed() {
        assert!(DirTree::new(vec![file("a")], vec![dir("a")]).is_ok());
    }

    #[test]
    fn test_invalid_names() {
        for bad in ["", ".", "..", "a/b", "a\0b"] {
            assert!(DirTree::new(vec![file(bad)], vec![]).is_err(), "{:?}", bad);
        }
    }

    #[test]
    fn test_lookup() {
        let tree = DirTree::new(vec![file("b"), file("a")], vec![dir("d")]).unwrap();
        assert!(tree.get_file("a").is_some());
        assert!(tree.get_file("c").is_none());
        assert!(tree.get_dir("d").is_some());
        assert!(DirTree::empty().is_empty());
    }
}
