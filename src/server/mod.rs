//! MCP server surface
//!
//! Exposes the engine's operations as MCP tools over stdio so an LLM agent
//! can explore and query the experiment store. Transport plumbing only; all
//! semantics live in [`crate::query::DataEngine`].

pub mod mcp;

pub use mcp::McpService;
