//! graphcache: client-side normalized GraphQL cache with an offline mutation queue.
//!
//! Reads materialize response-shaped JSON from flat records through field
//! policies and fragments. Mutations issued while offline are persisted in
//! order and replayed one at a time once connectivity returns.

pub mod cache;
pub mod cli;
pub mod codec;
pub mod config;
pub mod connectivity;
pub mod document;
pub mod error;
pub mod link;
pub mod logging;
pub mod operation;
pub mod queue;
pub mod read;
pub mod types;
