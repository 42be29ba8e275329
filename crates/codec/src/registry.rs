//! Variant registry: `device_type` → variant codec
//!
//! New variants are added by implementing `VariantFields` and registering the
//! type; the decode/encode dispatch site never changes.

use std::collections::HashMap;
use std::marker::PhantomData;
use std::sync::Arc;

use contracts::{BuiltinVariant, TempRh, VariantFields, VariantLookup, VariantSchema};
use serde_json::value::RawValue;
use serde_json::{Map, Value};

/// Type-erased decoder/encoder for one variant's extra fields
pub trait VariantCodec: Send + Sync {
    /// Schema handled by this codec
    fn schema(&self) -> &'static VariantSchema;

    /// Parse the extra fields out of a raw device document and re-serialize
    /// them as the opaque properties document
    fn decode_properties(&self, device: &RawValue) -> Result<Value, serde_json::Error>;

    /// Re-hydrate stored properties into flat wire fields
    ///
    /// Missing properties encode as "nothing reported".
    fn encode_fields(
        &self,
        properties: Option<&Value>,
    ) -> Result<Map<String, Value>, serde_json::Error>;
}

/// `VariantCodec` backed by a serde struct
pub struct FieldsCodec<T>(PhantomData<fn() -> T>);

impl<T> FieldsCodec<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for FieldsCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: VariantFields> VariantCodec for FieldsCodec<T> {
    fn schema(&self) -> &'static VariantSchema {
        &T::SCHEMA
    }

    fn decode_properties(&self, device: &RawValue) -> Result<Value, serde_json::Error> {
        let fields: T = serde_json::from_str(device.get())?;
        serde_json::to_value(fields)
    }

    fn encode_fields(
        &self,
        properties: Option<&Value>,
    ) -> Result<Map<String, Value>, serde_json::Error> {
        let fields = match properties {
            Some(value) => T::deserialize(value)?,
            None => T::default(),
        };
        match serde_json::to_value(fields)? {
            Value::Object(map) => Ok(map),
            _ => Ok(Map::new()),
        }
    }
}

/// Registry of known device variants
#[derive(Clone)]
pub struct VariantRegistry {
    variants: HashMap<String, Arc<dyn VariantCodec>>,
}

impl VariantRegistry {
    /// Empty registry: every device type decodes as a base record
    pub fn empty() -> Self {
        Self {
            variants: HashMap::new(),
        }
    }

    /// Registry preloaded with every built-in variant
    pub fn with_builtin_variants() -> Self {
        let mut registry = Self::empty();
        for variant in BuiltinVariant::ALL {
            match variant {
                BuiltinVariant::TempRh => registry.register::<TempRh>(),
            };
        }
        registry
    }

    /// Register (or replace) the variant keyed by `T::SCHEMA.device_type`
    pub fn register<T: VariantFields>(&mut self) -> &mut Self {
        self.register_codec(Arc::new(FieldsCodec::<T>::new()))
    }

    /// Register a hand-written codec
    pub fn register_codec(&mut self, codec: Arc<dyn VariantCodec>) -> &mut Self {
        let device_type = codec.schema().device_type.to_string();
        self.variants.insert(device_type, codec);
        self
    }

    /// Resolve a discriminator to its schema, or `Unknown`
    pub fn lookup(&self, device_type: &str) -> VariantLookup<'_> {
        match self.variants.get(device_type) {
            Some(codec) => VariantLookup::Known(codec.schema()),
            None => VariantLookup::Unknown,
        }
    }

    pub(crate) fn codec(&self, device_type: &str) -> Option<&dyn VariantCodec> {
        self.variants.get(device_type).map(Arc::as_ref)
    }

    /// Registered discriminators, sorted
    pub fn device_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.variants.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }
}

impl Default for VariantRegistry {
    fn default() -> Self {
        Self::with_builtin_variants()
    }
}

impl std::fmt::Debug for VariantRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VariantRegistry")
            .field("device_types", &self.device_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use serde_json::json;

    #[derive(Debug, Default, Serialize, Deserialize)]
    struct Co2 {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        ppm: Option<u32>,
    }

    impl VariantFields for Co2 {
        const SCHEMA: VariantSchema = VariantSchema {
            device_type: "CO2",
            fields: &["ppm"],
        };
    }

    #[test]
    fn test_builtin_lookup() {
        let registry = VariantRegistry::with_builtin_variants();
        assert!(registry.lookup("TempRH").is_known());
        assert_eq!(registry.lookup("Unknown42"), VariantLookup::Unknown);
        assert_eq!(registry.device_types(), vec!["TempRH"]);
    }

    #[test]
    fn test_register_custom_variant() {
        let mut registry = VariantRegistry::with_builtin_variants();
        registry.register::<Co2>();

        match registry.lookup("CO2") {
            VariantLookup::Known(schema) => assert_eq!(schema.fields, &["ppm"]),
            VariantLookup::Unknown => panic!("CO2 should be registered"),
        }
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_fields_codec_properties() {
        let codec = FieldsCodec::<TempRh>::new();
        let raw = RawValue::from_string(
            r#"{"device_id":"s","device_type":"TempRH","temp":21.5,"rh":0}"#.to_string(),
        )
        .unwrap();

        let properties = codec.decode_properties(&raw).unwrap();
        assert_eq!(properties, json!({"temp": 21.5}));

        let fields = codec.encode_fields(Some(&properties)).unwrap();
        assert_eq!(Value::Object(fields), json!({"temp": 21.5}));
        assert!(codec.encode_fields(None).unwrap().is_empty());
    }
}
