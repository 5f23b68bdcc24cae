pub mod config;
pub mod favorites;
pub mod ipc;
pub mod platform;
pub mod protocol;
pub mod radio;

/// User-agent sent on every outgoing HTTP request (directory and streams).
pub const USER_AGENT: &str = "DialFM/1.0 (terminal radio)";
