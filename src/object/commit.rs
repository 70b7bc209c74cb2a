use crate::checksum::Checksum;
use crate::error::{Error, Result};
use crate::object::{be_u64, bytes_type, checksum_value, from_be_u64};
use crate::types::Commit;
use crate::variant::{Value, VariantDict, VariantType};

const COMMIT_SIG: &str = "(a{sv}aya(say)sstayay)";

fn related_type() -> VariantType {
    VariantType::Tuple(vec![VariantType::String, bytes_type()])
}

impl Commit {
    pub(crate) fn to_value(&self) -> Value {
        let parent = match &self.parent {
            Some(p) => checksum_value(p),
            None => Value::Bytes(Vec::new()),
        };
        let related = self
            .related
            .iter()
            .map(|(name, c)| Value::Tuple(vec![Value::String(name.clone()), checksum_value(c)]))
            .collect();
        Value::Tuple(vec![
            self.metadata.to_value(),
            parent,
            Value::Array(related_type(), related),
            Value::String(self.subject.clone()),
            Value::String(self.body.clone()),
            be_u64(self.timestamp),
            checksum_value(&self.root_contents),
            checksum_value(&self.root_metadata),
        ])
    }

    pub(crate) fn from_value(value: Value) -> Result<Self> {
        let mut it = value.into_tuple(8)?.into_iter();
        let mut next = || {
            it.next()
                .ok_or_else(|| Error::invalid_variant("commit missing fields"))
        };
        let metadata = VariantDict::from_value(next()?)?;
        let parent = next()?.into_bytes()?;
        let parent = if parent.is_empty() {
            None
        } else {
            Some(Checksum::from_slice(&parent)?)
        };
        let mut related = Vec::new();
        for entry in next()?.into_array()? {
            let mut r = entry.into_tuple(2)?.into_iter();
            match (r.next(), r.next()) {
                (Some(name), Some(c)) => {
                    related.push((name.into_string()?, Checksum::from_slice(&c.into_bytes()?)?))
                }
                _ => return Err(Error::invalid_variant("related entry missing fields")),
            }
        }
        let subject = next()?.into_string()?;
        let body = next()?.into_string()?;
        let timestamp = from_be_u64(&next()?)?;
        let root_contents = Checksum::from_slice(&next()?.into_bytes()?)?;
        let root_metadata = Checksum::from_slice(&next()?.into_bytes()?)?;

        Ok(Self {
            metadata,
            parent,
            related,
            subject,
            body,
            timestamp,
            root_contents,
            root_metadata,
        })
    }

    /// `(a{sv}aya(say)sstayay)`
    pub fn to_bytes(&self) -> Vec<u8> {
        self.to_value().to_bytes()
    }

    /// decode; every checksum field must be 32 bytes (parent may be empty)
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let ty = VariantType::parse(COMMIT_SIG)?;
        Self::from_value(Value::from_bytes(&ty, data)?)
    }

    pub fn checksum(&self) -> Checksum {
        Checksum::digest(&self.to_bytes())
    }
}
