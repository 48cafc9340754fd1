//! kotadb - code-intelligence engine.
//!
//! Indexes a local git repository into a queryable knowledge base and
//! serves a fixed tool catalog over a stdio RPC transport, with an optional
//! localhost HTTP front-end.

pub mod domains;
pub mod extract;
pub mod guard;
pub mod http;
pub mod indexer;
pub mod query;
pub mod server;
pub mod storage;
pub mod sync;
pub mod tools;

pub use domains::DomainRules;
pub use server::{RpcServer, PROTOCOL_VERSION};
pub use storage::Storage;
pub use tools::{ToolContext, Toolset};
