//! Service-specific tests
//!
//! Each real service has its own test file.

mod container_runtime;

use super::parse_port;

#[test]
fn test_parse_port_from_relay_url() {
    assert_eq!(parse_port("http://localhost:9922"), 9922);
    assert_eq!(parse_port("http://127.0.0.1:8081/"), 8081);
}

#[test]
fn test_parse_port_falls_back_to_default() {
    assert_eq!(parse_port("http://localhost"), 8080);
    assert_eq!(parse_port("not a url"), 8080);
    assert_eq!(parse_port(""), 8080);
}
