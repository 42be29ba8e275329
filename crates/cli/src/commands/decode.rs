//! `decode` command implementation.

use std::io::Read;

use anyhow::{Context, Result};
use codec::DeviceCodec;

use crate::cli::DecodeArgs;

/// Execute the `decode` command
pub fn run_decode(args: &DecodeArgs) -> Result<()> {
    let input = read_input(args)?;
    let output = decode_document(&DeviceCodec::default(), &input, args.json)?;
    println!("{output}");
    Ok(())
}

fn read_input(args: &DecodeArgs) -> Result<Vec<u8>> {
    match &args.file {
        Some(path) => std::fs::read(path)
            .with_context(|| format!("Failed to read {}", path.display())),
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .context("Failed to read stdin")?;
            Ok(buf)
        }
    }
}

/// Decode a wire document and render it, followed by its re-encoded form
fn decode_document(codec: &DeviceCodec, input: &[u8], json_only: bool) -> Result<String> {
    let message = codec.decode(input).context("Malformed payload")?;

    if json_only {
        return serde_json::to_string_pretty(&message).context("Failed to render message");
    }

    let wire = codec.encode_value(&message).context("Failed to re-encode message")?;
    let wire = serde_json::to_string_pretty(&wire).context("Failed to render wire document")?;
    Ok(format!("{message}\n\nWire:\n{wire}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEMP_RH: &str = r#"{"time":"2024-05-01T12:00:00Z","device":{"device_id":"th-01","name":"greenhouse","device_type":"TempRH","temp":21.5,"rh":0}}"#;

    #[test]
    fn test_decode_document_renders_message_and_wire() {
        let output = decode_document(&DeviceCodec::default(), TEMP_RH.as_bytes(), false).unwrap();
        assert!(output.contains("th-01"));
        assert!(output.contains("Wire:"));
        assert!(!output.contains("\"rh\""));
    }

    #[test]
    fn test_decode_document_json_only() {
        let output = decode_document(&DeviceCodec::default(), TEMP_RH.as_bytes(), true).unwrap();
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(value["device_id"], "th-01");
        assert_eq!(value["device"]["properties"]["temp"], 21.5);
    }

    #[test]
    fn test_decode_document_malformed() {
        let err = decode_document(&DeviceCodec::default(), b"{not json", false).unwrap_err();
        assert!(err.to_string().contains("Malformed payload"));
    }
}
