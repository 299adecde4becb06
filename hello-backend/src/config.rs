use anyhow::{Context, Result};
use shared::protocol::{BACKEND_PORT_ENV, DEFAULT_BACKEND_PORT};

/// HTTP port from `BACKEND_PORT`, defaulting when unset
pub fn port_from_env() -> Result<u16> {
    parse_port(std::env::var(BACKEND_PORT_ENV).ok())
}

fn parse_port(value: Option<String>) -> Result<u16> {
    match value {
        Some(value) => value
            .trim()
            .parse()
            .with_context(|| format!("Invalid {}: {:?}", BACKEND_PORT_ENV, value)),
        None => Ok(DEFAULT_BACKEND_PORT),
    }
}
