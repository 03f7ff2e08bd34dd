//! # NPC Speech Backend
//!
//! Reassembles the chunked speech audio a conversational AI service streams
//! back for a game character into playable units, and serves it over HTTP and
//! WebSocket.
//!
//! ## Application Architecture:
//! - **audio**: the reassembly engine (header decoding, sample conversion,
//!   buffering, flush state machine, queues, sessions, tick loop)
//! - **config**: configuration (TOML files + environment variables)
//! - **state**: shared application state and request metrics
//! - **health**: health and metrics endpoints
//! - **middleware**: request metrics
//! - **handlers**: config and session endpoints
//! - **websocket**: the streaming transport endpoint
//! - **error**: decode errors and HTTP error responses

pub mod audio;
pub mod config;
pub mod error;
pub mod handlers;
pub mod health;
pub mod middleware;
pub mod state;
pub mod websocket;
