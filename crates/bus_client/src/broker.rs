//! Broker address parsing

use crate::error::{BusError, Result};

/// Default MQTT port
pub const DEFAULT_MQTT_PORT: u16 = 1883;

/// Parse broker URL in format tcp://host:port, mqtt://host:port, host:port or host
pub fn parse_broker_url(url: &str) -> Result<(String, u16)> {
    let invalid = |message: &str| BusError::InvalidBrokerUrl {
        url: url.to_string(),
        message: message.to_string(),
    };

    let address = url
        .trim()
        .trim_start_matches("mqtt://")
        .trim_start_matches("tcp://")
        .trim_end_matches('/');

    let (host, port) = match address.split_once(':') {
        None => (address, DEFAULT_MQTT_PORT),
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| invalid(&format!("invalid port '{port}'")))?;
            (host, port)
        }
    };

    if host.is_empty() {
        return Err(invalid("missing host"));
    }
    Ok((host.to_string(), port))
}
