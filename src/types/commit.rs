use crate::checksum::Checksum;
use crate::variant::VariantDict;

/// a snapshot: root tree plus history and free-form metadata
#[derive(Clone, Debug, PartialEq)]
pub struct Commit {
    /// arbitrary `a{sv}` metadata, kept in wire order
    pub metadata: VariantDict,
    /// none for a root commit
    pub parent: Option<Checksum>,
    /// (name, commit) pairs of related objects
    pub related: Vec<(String, Checksum)>,
    pub subject: String,
    pub body: String,
    /// seconds since the epoch, UTC
    pub timestamp: u64,
    /// dirtree of the root directory
    pub root_contents: Checksum,
    /// dirmeta of the root directory
    pub root_metadata: Checksum,
}

impl Commit {
    pub fn new(
        root_contents: Checksum,
        root_metadata: Checksum,
        subject: impl Into<String>,
        timestamp: u64,
    ) -> Self {
        Self {
            metadata: VariantDict::new(),
            parent: None,
            related: Vec::new(),
            subject: subject.into(),
            body: String::new(),
            timestamp,
            root_contents,
            root_metadata,
        }
    }

    pub fn with_parent(mut self, parent: Checksum) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}
