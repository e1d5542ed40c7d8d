//! Server front ends: MCP over stdio or HTTP

pub mod http;
pub mod stdio;
