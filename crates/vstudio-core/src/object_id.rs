//! Object identifiers
//!
//! Every document and embedded sub-document carries a 12-byte synthetic id
//! under `_id`. Ids are stored and exchanged as 24 lowercase hex characters.
//!
//! Layout: 4-byte big-endian seconds timestamp, 5 bytes chosen once per
//! process, 3-byte wrapping counter. Ids created later in the same process
//! therefore sort after earlier ones.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::OnceLock;

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use uuid::Uuid;

use crate::storage::{StoreError, StoreResult};

/// Name of the identifier field on every document
pub const ID_FIELD: &str = "_id";

/// 12-byte document identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId([u8; 12]);

struct ProcessSeed {
    random: [u8; 5],
    counter: AtomicU32,
}

fn process_seed() -> &'static ProcessSeed {
    static SEED: OnceLock<ProcessSeed> = OnceLock::new();
    SEED.get_or_init(|| {
        let bytes = *Uuid::new_v4().as_bytes();
        let mut random = [0u8; 5];
        random.copy_from_slice(&bytes[..5]);
        let start = u32::from_be_bytes([0, bytes[5], bytes[6], bytes[7]]);
        ProcessSeed {
            random,
            counter: AtomicU32::new(start),
        }
    })
}

impl ObjectId {
    /// Generate a fresh id
    pub fn new() -> Self {
        let seed = process_seed();
        let seconds = Utc::now().timestamp() as u32;
        let count = seed.counter.fetch_add(1, Ordering::Relaxed) & 0x00FF_FFFF;

        let mut bytes = [0u8; 12];
        bytes[..4].copy_from_slice(&seconds.to_be_bytes());
        bytes[4..9].copy_from_slice(&seed.random);
        bytes[9..].copy_from_slice(&count.to_be_bytes()[1..]);
        Self(bytes)
    }

    pub fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    pub fn bytes(&self) -> [u8; 12] {
        self.0
    }

    /// Seconds since the epoch at which this id was generated
    pub fn timestamp(&self) -> u32 {
        u32::from_be_bytes([self.0[0], self.0[1], self.0[2], self.0[3]])
    }

    /// Parse a 24 character hex string
    pub fn parse_str(s: &str) -> StoreResult<Self> {
        let invalid = || StoreError::InvalidObjectId {
            value: s.to_string(),
        };
        if s.len() != 24 || !s.is_ascii() {
            return Err(invalid());
        }

        let mut bytes = [0u8; 12];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&s[i * 2..i * 2 + 2], 16).map_err(|_| invalid())?;
        }
        Ok(Self(bytes))
    }

    /// Coerce a JSON value into an id. Only strings are accepted.
    pub fn from_value(value: &Value) -> StoreResult<Self> {
        match value {
            Value::String(s) => Self::parse_str(s),
            other => Err(StoreError::InvalidObjectId {
                value: other.to_string(),
            }),
        }
    }

    /// Hex representation
    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{:02x}", b)).collect()
    }

    /// The id as it is stored inside documents
    pub fn to_value(&self) -> Value {
        Value::String(self.to_hex())
    }
}

impl Default for ObjectId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for ObjectId {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_str(s)
    }
}

impl From<ObjectId> for Value {
    fn from(id: ObjectId) -> Self {
        id.to_value()
    }
}

impl Serialize for ObjectId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for ObjectId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        ObjectId::parse_str(&s).map_err(serde::de::Error::custom)
    }
}
