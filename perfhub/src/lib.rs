//! perfhub client library: the three subscriber transports, the selector
//! that keeps exactly one of them active and the controller task that runs it
//! beside the UI.

pub mod controller;
pub mod error;
pub mod longpoll;
pub mod poll;
pub mod selector;
pub mod session;
pub mod tls;
pub mod types;
pub mod ws;
