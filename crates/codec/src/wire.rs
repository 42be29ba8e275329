//! Wire document shapes
//!
//! ```text
//! { "time": "...", "device": { "device_id", "name", "device_type", <variant fields...> } }
//! ```
//!
//! `properties` never appears on the wire; variant fields sit flat next to
//! the base device fields.

use chrono::{DateTime, Utc};
use contracts::{DeviceRecord, RecordId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::value::RawValue;
use serde_json::Value;

/// Server-managed field: anything that is not a valid `T` reads as absent
///
/// Producers do not own these fields, so a foreign shape never rejects the
/// message.
fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|v| T::deserialize(v).ok()))
}

/// First pass: envelope with the device kept as an untyped blob
#[derive(Debug, Deserialize)]
pub(crate) struct RawEnvelope<'a> {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<RecordId>,
    #[serde(default, deserialize_with = "lenient")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient")]
    pub updated_at: Option<DateTime<Utc>>,
    pub time: DateTime<Utc>,
    #[serde(borrow)]
    pub device: &'a RawValue,
}

/// Second pass: base device shape
///
/// Unknown keys (variant fields, a stray `properties`) are ignored here.
#[derive(Debug, Deserialize)]
pub(crate) struct BaseDevice {
    #[serde(default, deserialize_with = "lenient")]
    pub id: Option<RecordId>,
    #[serde(default, deserialize_with = "lenient")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "lenient")]
    pub updated_at: Option<DateTime<Utc>>,
    pub device_id: String,
    /// `null` and absent both mean ""
    #[serde(default)]
    pub name: Option<String>,
    pub device_type: String,
}

impl BaseDevice {
    pub fn into_record(self) -> DeviceRecord {
        DeviceRecord {
            id: self.id,
            created_at: self.created_at,
            updated_at: self.updated_at,
            device_id: self.device_id,
            device_name: self.name.unwrap_or_default(),
            device_type: self.device_type,
            properties: None,
        }
    }
}

/// Base fields as emitted on the wire
#[derive(Debug, Serialize)]
pub(crate) struct WireDevice<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    pub device_id: &'a str,
    pub name: &'a str,
    pub device_type: &'a str,
}

impl<'a> From<&'a DeviceRecord> for WireDevice<'a> {
    fn from(record: &'a DeviceRecord) -> Self {
        Self {
            id: record.id,
            created_at: record.created_at,
            updated_at: record.updated_at,
            device_id: &record.device_id,
            name: &record.device_name,
            device_type: &record.device_type,
        }
    }
}

/// Envelope as emitted on the wire
///
/// The denormalized `device_id` stays internal; it is recomputed on decode.
#[derive(Debug, Serialize)]
pub(crate) struct WireEnvelope {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    pub time: DateTime<Utc>,
    pub device: serde_json::Map<String, serde_json::Value>,
}
