//! MCP (Model Context Protocol) support
//!
//! This module provides the HTTP transport pieces of the gateway:
//! - McpHandler: JSON-RPC 2.0 request dispatch
//! - ToolRegistry: fixed set of tools, built once at startup
//! - SseSessions: keep-alive streams for `GET /mcp`

pub mod handler;
pub mod session;
pub mod tools;

pub use handler::{JsonRpcRequest, JsonRpcResponse, McpHandler, McpReply};
pub use session::{SessionError, SseSessions};
pub use tools::{Content, McpTool, ToolContext, ToolOutput, ToolRegistry};
