//! Device codec: wire JSON ⇄ `DeviceMessage`
//!
//! Decoding is two-pass. The envelope is parsed with `device` kept raw, the
//! raw device is parsed against the base shape to find `device_type`, and a
//! known variant then re-parses the same blob for its extra fields.

use std::sync::Arc;

use contracts::{DeviceMessage, DeviceRecord};
use serde_json::value::RawValue;
use serde_json::{Map, Value};
use tracing::trace;

use crate::error::CodecError;
use crate::registry::VariantRegistry;
use crate::wire::{BaseDevice, RawEnvelope, WireDevice, WireEnvelope};

/// Type-specific half of a decoded device
#[derive(Debug, Clone, PartialEq)]
pub enum TypedPayload {
    /// Registered variant; extra fields re-serialized as the properties document
    Known {
        device_type: String,
        properties: Value,
    },
    /// Unregistered `device_type`; base record only
    Unknown,
}

impl TypedPayload {
    /// Properties document to retain on the record
    pub fn into_properties(self) -> Option<Value> {
        match self {
            Self::Known { properties, .. } => Some(properties),
            Self::Unknown => None,
        }
    }

    pub fn is_known(&self) -> bool {
        matches!(self, Self::Known { .. })
    }
}

/// Polymorphic device-message codec
///
/// Cheap to clone; the registry is shared.
#[derive(Debug, Clone, Default)]
pub struct DeviceCodec {
    registry: Arc<VariantRegistry>,
}

impl DeviceCodec {
    pub fn new(registry: VariantRegistry) -> Self {
        Self {
            registry: Arc::new(registry),
        }
    }

    pub fn registry(&self) -> &VariantRegistry {
        &self.registry
    }

    /// Decode a wire document
    ///
    /// A known variant always carries a properties document; `{}` is its
    /// canonical shape when no field is reported. A record built with
    /// `properties: None` for a known type therefore re-decodes as
    /// `Some({})`.
    ///
    /// Server-managed fields (`id`, `created_at`, `updated_at`) that do not
    /// parse are read as absent.
    ///
    /// # Errors
    /// - envelope not parseable (`time` and `device` are required)
    /// - device not parseable as a base record
    /// - known variant re-parse failure (no partial record is produced)
    pub fn decode(&self, payload: &[u8]) -> Result<DeviceMessage, CodecError> {
        let envelope: RawEnvelope<'_> =
            serde_json::from_slice(payload).map_err(CodecError::MalformedEnvelope)?;

        let (mut device, typed) = self.decode_device(envelope.device)?;
        device.properties = typed.into_properties();

        let mut message = DeviceMessage::new(envelope.time, device);
        message.id = envelope.id;
        message.created_at = envelope.created_at;
        message.updated_at = envelope.updated_at;
        Ok(message)
    }

    /// Decode a raw device document into its base record and typed payload
    ///
    /// The returned record never carries properties; callers attach them
    /// from the payload.
    pub fn decode_device(
        &self,
        device: &RawValue,
    ) -> Result<(DeviceRecord, TypedPayload), CodecError> {
        let base: BaseDevice =
            serde_json::from_str(device.get()).map_err(CodecError::MalformedDevice)?;
        let record = base.into_record();

        let typed = match self.registry.codec(&record.device_type) {
            Some(codec) => {
                let properties = codec
                    .decode_properties(device)
                    .map_err(|e| CodecError::malformed_variant(&record.device_type, e))?;
                TypedPayload::Known {
                    device_type: record.device_type.clone(),
                    properties,
                }
            }
            None => {
                trace!(device_type = %record.device_type, "unregistered device type, keeping base record");
                TypedPayload::Unknown
            }
        };

        Ok((record, typed))
    }

    /// Encode a message as a wire JSON value
    pub fn encode_value(&self, message: &DeviceMessage) -> Result<Value, CodecError> {
        let envelope = WireEnvelope {
            id: message.id,
            created_at: message.created_at,
            updated_at: message.updated_at,
            time: message.time,
            device: self.encode_device(&message.device)?,
        };
        serde_json::to_value(envelope).map_err(CodecError::Serialize)
    }

    /// Encode a message as wire JSON bytes
    pub fn encode(&self, message: &DeviceMessage) -> Result<Vec<u8>, CodecError> {
        let value = self.encode_value(message)?;
        serde_json::to_vec(&value).map_err(CodecError::Serialize)
    }

    /// Flat device document: base fields plus expanded variant fields
    fn encode_device(&self, record: &DeviceRecord) -> Result<Map<String, Value>, CodecError> {
        let mut device = match serde_json::to_value(WireDevice::from(record))
            .map_err(CodecError::Serialize)?
        {
            Value::Object(map) => map,
            _ => Map::new(),
        };

        if let Some(codec) = self.registry.codec(&record.device_type) {
            let fields = codec
                .encode_fields(record.properties.as_ref())
                .map_err(|e| CodecError::malformed_properties(&record.device_type, e))?;
            for (key, value) in fields {
                device.entry(key).or_insert(value);
            }
        }

        Ok(device)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const TEMP_RH: &str = r#"{"time":"2024-01-01T00:00:00Z","device":{"device_id":"sensor-1","name":"Lobby","device_type":"TempRH","temp":21.5,"rh":40.2}}"#;

    fn codec() -> DeviceCodec {
        DeviceCodec::default()
    }

    #[test]
    fn test_decode_temp_rh() {
        let message = codec().decode(TEMP_RH.as_bytes()).unwrap();

        assert_eq!(message.device_id, "sensor-1");
        assert_eq!(message.device.device_name, "Lobby");
        assert_eq!(message.device.device_type, "TempRH");
        assert_eq!(
            message.device.properties,
            Some(json!({"temp": 21.5, "rh": 40.2}))
        );
        assert_eq!(message.time.to_rfc3339(), "2024-01-01T00:00:00+00:00");
        assert!(message.id.is_none());
    }

    #[test]
    fn test_decode_unknown_type_passthrough() {
        let doc = r#"{"time":"2024-01-01T00:00:00Z","device":{"device_id":"x-7","name":"Roof","device_type":"Unknown42","lux":900}}"#;
        let message = codec().decode(doc.as_bytes()).unwrap();

        assert_eq!(message.device_id, "x-7");
        assert_eq!(message.device_id, message.device.device_id);
        assert!(message.device.properties.is_none());

        let encoded = codec().encode_value(&message).unwrap();
        assert_eq!(
            encoded,
            json!({
                "time": "2024-01-01T00:00:00Z",
                "device": {"device_id": "x-7", "name": "Roof", "device_type": "Unknown42"}
            })
        );
    }

    #[test]
    fn test_decode_ignores_envelope_device_id() {
        let doc = r#"{"time":"2024-01-01T00:00:00Z","device_id":"stale","device":{"device_id":"sensor-1","device_type":"TempRH"}}"#;
        let message = codec().decode(doc.as_bytes()).unwrap();
        assert_eq!(message.device_id, "sensor-1");
        assert_eq!(message.device.device_name, "");
        assert_eq!(message.device.properties, Some(json!({})));
    }

    #[test]
    fn test_foreign_server_fields_read_as_absent() {
        let doc = r#"{"id":"msg-42","created_at":"yesterday","updated_at":17,"time":"2024-01-01T00:00:00Z","device":{"id":"dev-1","device_id":"sensor-1","device_type":"TempRH","temp":21.5}}"#;
        let message = codec().decode(doc.as_bytes()).unwrap();

        assert!(message.id.is_none());
        assert!(message.created_at.is_none());
        assert!(message.updated_at.is_none());
        assert!(message.device.id.is_none());
        assert_eq!(message.device.properties, Some(json!({"temp": 21.5})));
    }

    #[test]
    fn test_null_name_reads_as_empty() {
        let doc = r#"{"time":"2024-01-01T00:00:00Z","device":{"device_id":"s","name":null,"device_type":"TempRH","temp":1.5}}"#;
        let message = codec().decode(doc.as_bytes()).unwrap();
        assert_eq!(message.device.device_name, "");
        assert_eq!(message.device.properties, Some(json!({"temp": 1.5})));
    }

    #[test]
    fn test_known_variant_without_properties_redecodes_canonical() {
        let codec = codec();
        let message = DeviceMessage::new(
            "2024-01-01T00:00:00Z".parse().unwrap(),
            DeviceRecord::new("s", "n", "TempRH"),
        );

        let decoded = codec.decode(&codec.encode(&message).unwrap()).unwrap();
        assert_eq!(decoded.device.properties, Some(json!({})));
        assert_eq!(decoded.device.device_id, message.device.device_id);
        assert_eq!(decoded.time, message.time);
    }

    #[test]
    fn test_zero_values_omitted() {
        let doc = r#"{"time":"2024-01-01T00:00:00Z","device":{"device_id":"s","name":"n","device_type":"TempRH","rh":0}}"#;
        let message = codec().decode(doc.as_bytes()).unwrap();
        assert_eq!(message.device.properties, Some(json!({})));

        let encoded = codec().encode_value(&message).unwrap();
        let device = encoded["device"].as_object().unwrap();
        assert!(!device.contains_key("temp"));
        assert!(!device.contains_key("rh"));
        assert!(!device.contains_key("properties"));
    }

    #[test]
    fn test_round_trip_known_variant() {
        let codec = codec();
        let message = codec.decode(TEMP_RH.as_bytes()).unwrap();
        let bytes = codec.encode(&message).unwrap();
        assert_eq!(codec.decode(&bytes).unwrap(), message);

        let original: Value = serde_json::from_str(TEMP_RH).unwrap();
        assert_eq!(codec.encode_value(&message).unwrap(), original);
    }

    #[test]
    fn test_round_trip_server_fields() {
        let codec = codec();
        let mut message = codec.decode(TEMP_RH.as_bytes()).unwrap();
        let stamp = "2024-02-01T10:00:00Z".parse().unwrap();
        message.id = Some(7);
        message.created_at = Some(stamp);
        message.updated_at = Some(stamp);
        message.device.id = Some(3);

        let decoded = codec.decode(&codec.encode(&message).unwrap()).unwrap();
        assert_eq!(decoded, message);
    }

    #[test]
    fn test_variant_tolerates_newer_schema() {
        let doc = r#"{"time":"2024-01-01T00:00:00Z","device":{"device_id":"s","device_type":"TempRH","temp":19.0,"battery":3.3,"properties":{"rh":1}}}"#;
        let message = codec().decode(doc.as_bytes()).unwrap();
        assert_eq!(message.device.properties, Some(json!({"temp": 19.0})));
    }

    #[test]
    fn test_encode_drops_unknown_stored_properties() {
        let record = DeviceRecord::new("s", "n", "TempRH")
            .with_properties(json!({"temp": 18.25, "pressure": 1013}));
        let message = DeviceMessage::new("2024-01-01T00:00:00Z".parse().unwrap(), record);

        let encoded = codec().encode_value(&message).unwrap();
        assert_eq!(encoded["device"]["temp"], json!(18.25));
        assert!(encoded["device"].get("pressure").is_none());
    }

    #[test]
    fn test_malformed_inputs() {
        let codec = codec();

        let err = codec.decode(b"not json").unwrap_err();
        assert!(matches!(err, CodecError::MalformedEnvelope(_)));

        let err = codec.decode(br#"{"device":{"device_id":"s","device_type":"TempRH"}}"#).unwrap_err();
        assert!(matches!(err, CodecError::MalformedEnvelope(_)));

        let err = codec
            .decode(br#"{"time":"2024-01-01T00:00:00Z","device":{"name":"no id"}}"#)
            .unwrap_err();
        assert!(matches!(err, CodecError::MalformedDevice(_)));

        let err = codec
            .decode(br#"{"time":"2024-01-01T00:00:00Z","device":"oops"}"#)
            .unwrap_err();
        assert!(matches!(err, CodecError::MalformedDevice(_)));
    }

    #[test]
    fn test_known_variant_reparse_failure_is_fatal() {
        let doc = r#"{"time":"2024-01-01T00:00:00Z","device":{"device_id":"s","device_type":"TempRH","temp":"warm"}}"#;
        let err = codec().decode(doc.as_bytes()).unwrap_err();
        assert!(matches!(
            err,
            CodecError::MalformedVariant { ref device_type, .. } if device_type == "TempRH"
        ));
    }

    #[test]
    fn test_empty_registry_treats_all_as_unknown() {
        let codec = DeviceCodec::new(VariantRegistry::empty());
        let message = codec.decode(TEMP_RH.as_bytes()).unwrap();
        assert!(message.device.properties.is_none());
    }

    #[test]
    fn test_decode_device_pair() {
        let raw = RawValue::from_string(
            r#"{"device_id":"s","name":"n","device_type":"TempRH","temp":5.5}"#.to_string(),
        )
        .unwrap();
        let (record, typed) = codec().decode_device(&raw).unwrap();

        assert!(record.properties.is_none());
        assert_eq!(
            typed,
            TypedPayload::Known {
                device_type: "TempRH".to_string(),
                properties: json!({"temp": 5.5}),
            }
        );
    }
}
