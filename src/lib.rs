//! Agreement core of a replicated state-machine node.
//!
//! This crate implements the normal-case path of Practical Byzantine Fault
//! Tolerance: with `n` peers it tolerates `f = floor((n - 1) / 3)` Byzantine
//! ones and still agrees on a single order of client requests.
//!
//! ## How it works
//!
//! The primary of the current view assigns a sequence number to each client
//! request and broadcasts a pre-prepare. Every replica that accepts it
//! broadcasts a prepare; once a replica holds `2f + 1` matching prepares it
//! broadcasts a commit, and once it holds `2f + 1` commits the request is
//! committed. Committed requests are handed to the application in strictly
//! increasing sequence order through the event bus.
//!
//! The main entry point is [`engine::PbftEngine`], driven through
//! [`api::PbftEngineAPI`]. Messages travel inside the envelopes produced by
//! [`codec`]; delivery is left to a [`transport::PbftTransport`].

pub mod api;
pub mod codec;
pub mod config;
pub mod engine;
pub mod engine_api;
pub mod engine_stats;
pub mod error;
pub mod events;
pub mod message;
pub mod operation;
pub mod operation_log;
pub mod ordering;
pub mod protos;
pub mod replica;
pub mod transport;
pub mod types;
pub mod utils;
