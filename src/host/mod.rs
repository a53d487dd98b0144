//! Frontend-facing host: envelope contract, command router, stdio transport.

pub mod channel;
pub mod contract;
pub mod stdio;
