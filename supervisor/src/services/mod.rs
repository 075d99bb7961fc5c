//! Service implementations
//!
//! Real implementations of the supervisor traits: the docker CLI as container
//! runtime and an HTTP probe against the relay's health endpoint.

pub mod container_runtime;
pub mod health_probe;

#[cfg(test)]
mod tests;

pub use container_runtime::RealContainerRuntime;
pub use health_probe::RealHealthProbe;

/// Host port used when the relay URL carries none or cannot be parsed
pub const DEFAULT_RELAY_PORT: u16 = 8080;

/// Host port of the relay as configured in its base URL
pub fn parse_port(api_url: &str) -> u16 {
    url::Url::parse(api_url)
        .ok()
        .and_then(|url| url.port())
        .unwrap_or(DEFAULT_RELAY_PORT)
}
