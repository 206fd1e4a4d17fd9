//! perfhub agent: samples host metrics once per tick and distributes each
//! snapshot over WebSocket push, long polling and plain HTTP pull.

pub mod config;
pub mod error;
pub mod hub;
pub mod longpoll;
pub mod pull;
pub mod registry;
pub mod sampler;
pub mod server;
pub mod source;
pub mod state;
pub mod store;
pub mod tls;
pub mod types;
pub mod ws;
