//! Network subsystem for UDP voice transport

pub mod udp;

pub use udp::create_socket;
