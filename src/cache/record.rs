// Cache record and its persisted document.
// The payload is stored base64-encoded so arbitrary bytes survive YAML or JSON.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

use crate::config::Format;
use crate::error::CodecError;

/// Last known output of a probe.
///
/// `alive` is the trust signal: when it is false the payload must be ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheRecord {
    /// Whether the attempt that produced this record succeeded.
    pub alive: bool,
    /// Bytes returned by the last successful fetch.
    pub payload: Vec<u8>,
}

impl CacheRecord {
    /// A record for a successful fetch.
    pub fn alive(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            alive: true,
            payload: payload.into(),
        }
    }

    /// A record for a failed attempt. Carries no payload.
    pub fn dead() -> Self {
        Self::default()
    }

    /// The payload, only if it can be trusted.
    pub fn data(&self) -> Option<&[u8]> {
        self.alive.then_some(self.payload.as_slice())
    }
}

/// On-disk shape of a [`CacheRecord`].
#[derive(Debug, Serialize, Deserialize)]
struct Document {
    instance_alive: bool,
    data: String,
}

/// Serialize a record into a document of the given format.
pub fn encode(record: &CacheRecord, format: Format) -> Result<Vec<u8>, CodecError> {
    let doc = Document {
        instance_alive: record.alive,
        data: STANDARD.encode(&record.payload),
    };
    let bytes = match format {
        Format::Yaml => serde_yaml::to_string(&doc)?.into_bytes(),
        Format::Json => serde_json::to_vec(&doc)?,
    };
    Ok(bytes)
}

/// Parse a document of the given format back into a record.
pub fn decode(bytes: &[u8], format: Format) -> Result<CacheRecord, CodecError> {
    let doc: Document = match format {
        Format::Yaml => serde_yaml::from_slice(bytes)?,
        Format::Json => serde_json::from_slice(bytes)?,
    };
    Ok(CacheRecord {
        alive: doc.instance_alive,
        payload: STANDARD.decode(doc.data.as_bytes())?,
    })
}
