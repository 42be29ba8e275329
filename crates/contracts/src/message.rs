//! DeviceMessage - event envelope produced by the codec

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{DeviceRecord, RecordId};

/// Device telemetry event
///
/// Owns exactly one device snapshot. `device_id` is a denormalized copy of
/// `device.device_id` and is kept in sync on every decode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceMessage {
    /// Server-assigned identifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,

    /// Server-managed creation time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,

    /// Server-managed update time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,

    /// Producer-supplied event time
    pub time: DateTime<Utc>,

    /// Copy of `device.device_id`
    pub device_id: String,

    /// Embedded device snapshot
    pub device: DeviceRecord,
}

impl DeviceMessage {
    /// Create a message, deriving `device_id` from the device
    pub fn new(time: DateTime<Utc>, device: DeviceRecord) -> Self {
        Self {
            id: None,
            created_at: None,
            updated_at: None,
            time,
            device_id: device.device_id.clone(),
            device,
        }
    }

    /// Re-copy the device identifier into the envelope
    pub fn sync_device_id(&mut self) {
        self.device_id.clone_from(&self.device.device_id);
    }

    /// Device type discriminator
    pub fn device_type(&self) -> &str {
        &self.device.device_type
    }
}

impl fmt::Display for DeviceMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn opt<T: fmt::Display>(value: &Option<T>) -> String {
            value
                .as_ref()
                .map_or_else(|| "-".to_string(), ToString::to_string)
        }

        let properties = self
            .device
            .properties
            .as_ref()
            .map_or_else(|| "null".to_string(), ToString::to_string);

        writeln!(f, "DeviceMessage {{")?;
        writeln!(f, "    id: {},", opt(&self.id))?;
        writeln!(f, "    created_at: {},", opt(&self.created_at))?;
        writeln!(f, "    updated_at: {},", opt(&self.updated_at))?;
        writeln!(f, "    time: {},", self.time.to_rfc3339())?;
        writeln!(f, "    device_id: {},", self.device_id)?;
        writeln!(f, "    device_name: {},", self.device.device_name)?;
        writeln!(f, "    device_type: {},", self.device.device_type)?;
        writeln!(f, "    properties: {},", properties)?;
        write!(f, "}}")
    }
}
