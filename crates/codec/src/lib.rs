//! # Codec
//!
//! Polymorphic device-message codec.
//!
//! Responsibilities:
//! - Decode wire JSON into `DeviceMessage`, dispatching on `device_type`
//! - Encode `DeviceMessage` back to the flat wire shape
//! - Keep the variant set open through `VariantRegistry`
//!
//! # Example
//!
//! ```
//! use codec::DeviceCodec;
//!
//! let codec = DeviceCodec::default();
//! let message = codec
//!     .decode(br#"{"time":"2024-01-01T00:00:00Z","device":{"device_id":"sensor-1","name":"Lobby","device_type":"TempRH","temp":21.5}}"#)
//!     .unwrap();
//! assert_eq!(message.device_id, "sensor-1");
//! ```

mod codec;
mod error;
mod registry;
mod wire;

pub use codec::{DeviceCodec, TypedPayload};
pub use error::CodecError;
pub use registry::{FieldsCodec, VariantCodec, VariantRegistry};
