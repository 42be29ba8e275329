//! DeviceRecord - device snapshot carried by every message
//!
//! The base record is the canonical retained shape. Type-specific fields live
//! in the opaque `properties` document and are described by a `VariantSchema`.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Server-assigned record identifier
pub type RecordId = i64;

/// Base device record
///
/// `device_type` selects the variant schema that `properties` conforms to.
/// Unknown types keep `properties` absent.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DeviceRecord {
    /// Server-assigned identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,

    /// Server-managed creation time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    /// Server-managed update time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    /// Stable external identifier
    pub device_id: String,

    /// Display name
    #[serde(rename = "name", default)]
    pub device_name: String,

    /// Type discriminator (e.g. "TempRH")
    pub device_type: String,

    /// Type-specific fields as an embedded document
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Value>,
}

impl DeviceRecord {
    /// Create a base record without properties
    pub fn new(
        device_id: impl Into<String>,
        device_name: impl Into<String>,
        device_type: impl Into<String>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            device_name: device_name.into(),
            device_type: device_type.into(),
            ..Default::default()
        }
    }

    /// Attach a properties document
    pub fn with_properties(mut self, properties: Value) -> Self {
        self.properties = Some(properties);
        self
    }

    /// Re-hydrate `properties` into a typed variant
    ///
    /// Returns `Ok(None)` when the record is not of type `T`. A matching
    /// record without properties yields the variant's default (nothing reported).
    pub fn variant_fields<T: VariantFields>(&self) -> Result<Option<T>, serde_json::Error> {
        if self.device_type != T::SCHEMA.device_type {
            return Ok(None);
        }
        match &self.properties {
            Some(properties) => serde_json::from_value(properties.clone()).map(Some),
            None => Ok(Some(T::default())),
        }
    }
}

/// Field schema of a concrete device variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VariantSchema {
    /// Discriminator value selecting this variant
    pub device_type: &'static str,

    /// Names of the variant-specific fields, flat next to the base fields on the wire
    pub fields: &'static [&'static str],
}

/// Result of looking up a `device_type`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantLookup<'a> {
    /// Registered variant
    Known(&'a VariantSchema),
    /// Not registered; treat as base record only
    Unknown,
}

impl VariantLookup<'_> {
    /// Check if the lookup resolved to a registered variant
    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known(_))
    }
}

/// Extra fields of a concrete variant
///
/// Implementors must tolerate unknown keys (no `deny_unknown_fields`) and
/// default every field, so properties written by an older or newer schema
/// still decode.
pub trait VariantFields: Serialize + DeserializeOwned + Default + Send + Sync + 'static {
    /// Schema registered under the variant's discriminator
    const SCHEMA: VariantSchema;
}

/// Built-in variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BuiltinVariant {
    /// Temperature / relative humidity sensor
    TempRh,
}

impl BuiltinVariant {
    /// All built-in variants
    pub const ALL: &'static [BuiltinVariant] = &[BuiltinVariant::TempRh];

    /// Schema for this variant
    pub fn schema(self) -> &'static VariantSchema {
        match self {
            Self::TempRh => &TempRh::SCHEMA,
        }
    }

    /// Resolve a discriminator to a built-in variant
    pub fn from_device_type(device_type: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|variant| variant.schema().device_type == device_type)
    }
}

/// Extra fields of the `TempRH` variant
///
/// Zero readings are treated as "not reported": they are dropped on
/// deserialization and omitted on serialization.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TempRh {
    /// Temperature
    #[serde(
        default,
        deserialize_with = "reported",
        skip_serializing_if = "is_unreported"
    )]
    pub temp: Option<f64>,

    /// Relative humidity
    #[serde(
        default,
        deserialize_with = "reported",
        skip_serializing_if = "is_unreported"
    )]
    pub rh: Option<f64>,
}

impl VariantFields for TempRh {
    const SCHEMA: VariantSchema = VariantSchema {
        device_type: "TempRH",
        fields: &["temp", "rh"],
    };
}

fn reported<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<f64>::deserialize(deserializer)?.filter(|value| *value != 0.0))
}

fn is_unreported(value: &Option<f64>) -> bool {
    value.is_none_or(|v| v == 0.0)
}
