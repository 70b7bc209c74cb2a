use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::checksum::Checksum;
use crate::error::{Error, Result};
use crate::validate::validate_objtype;
use crate::variant::{Value, VariantType};

const OBJECT_NAME_SIG: &str = "(su)";

/// the four object kinds
///
/// the discriminants are the wire values used in delta parts and fallback
/// entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum ObjectType {
    File = 1,
    DirTree = 2,
    DirMeta = 3,
    Commit = 4,
}

impl ObjectType {
    pub const ALL: [ObjectType; 4] = [
        ObjectType::File,
        ObjectType::DirTree,
        ObjectType::DirMeta,
        ObjectType::Commit,
    ];

    /// the tag used in loose object filenames
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectType::File => "file",
            ObjectType::DirTree => "dirtree",
            ObjectType::DirMeta => "dirmeta",
            ObjectType::Commit => "commit",
        }
    }

    /// metadata objects are stored as a single serialized value
    pub fn is_meta(&self) -> bool {
        !matches!(self, ObjectType::File)
    }

    pub fn as_u8(&self) -> u8 {
        *self as u8
    }
}

impl TryFrom<u8> for ObjectType {
    type Error = Error;

    fn try_from(v: u8) -> Result<Self> {
        match v {
            1 => Ok(ObjectType::File),
            2 => Ok(ObjectType::DirTree),
            3 => Ok(ObjectType::DirMeta),
            4 => Ok(ObjectType::Commit),
            other => Err(Error::InvalidObjectType(format!("'{}'", other))),
        }
    }
}

impl FromStr for ObjectType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        ObjectType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| Error::InvalidObjectType(s.to_string()))
    }
}

impl fmt::Display for ObjectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// an object identity: checksum plus kind, written `<hex>.<tag>`
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectName {
    pub checksum: Checksum,
    pub objtype: ObjectType,
}

impl ObjectName {
    pub fn new(checksum: Checksum, objtype: ObjectType) -> Self {
        Self { checksum, objtype }
    }

    /// `(su)`: hex checksum and object type
    ///
    /// unlike the fields of stored objects the type is a plain
    /// little-endian `u`.
    pub fn to_variant(&self) -> Value {
        Value::Tuple(vec![
            Value::String(self.checksum.to_hex()),
            Value::UInt32(u32::from(self.objtype.as_u8())),
        ])
    }

    pub fn from_variant(value: &Value) -> Result<Self> {
        let (hex, objtype) = match value {
            Value::Tuple(fields) => match fields.as_slice() {
                [Value::String(hex), objtype] => (hex, objtype.as_u32()?),
                _ => return Err(Error::invalid_variant("object name is not (su)")),
            },
            _ => return Err(Error::invalid_variant("object name is not (su)")),
        };
        let objtype = u8::try_from(objtype)
            .map_err(|_| Error::InvalidObjectType(objtype.to_string()))
            .and_then(validate_objtype)?;
        Ok(Self {
            checksum: Checksum::from_hex(hex)?,
            objtype,
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_variant().to_bytes()
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let ty = VariantType::parse(OBJECT_NAME_SIG)?;
        Self::from_variant(&Value::from_bytes(&ty, data)?)
    }
}

impl fmt::Display for ObjectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.checksum, self.objtype)
    }
}

impl FromStr for ObjectName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let (hex, tag) = s
            .rsplit_once('.')
            .ok_or_else(|| Error::InvalidObjectType(s.to_string()))?;
        Ok(Self {
            checksum: Checksum::from_hex(hex)?,
            objtype: tag.parse()?,
        })
    }
}

/// relative path of a loose object inside a repository
///
/// `compressed` only affects file objects, which gain a trailing `z`.
pub fn relative_object_path(checksum: &Checksum, objtype: ObjectType, compressed: bool) -> String {
    let (dir, rest) = checksum.to_path_components();
    let mut path = format!("objects/{}/{}.{}", dir, rest, objtype.as_str());
    if !objtype.is_meta() && compressed {
        path.push('z');
    }
    path
}
