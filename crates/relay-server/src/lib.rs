//! Example listener for the relay messaging protocol.
//!
//! This crate is not part of the protocol's tested core (`relay-core`,
//! `relay-proto`); it is the "thin listener" the spec names but leaves
//! undesigned (§1): a real `TcpListener` accept loop, an in-memory
//! user-to-connection [`directory`], and reference [`auth`]/[`handler`]
//! capabilities the example binary wires together in `main.rs`. Application
//! code that embeds `relay-core` directly is free to ignore this crate
//! entirely and build its own accept loop, user provider, and dispatch.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod auth;
pub mod client;
pub mod directory;
pub mod error;
pub mod handler;
pub mod listener;

pub use auth::{AllowAllUsers, AuthOutcome, StaticUserTable, UserProvider};
pub use client::WireHandshake;
pub use directory::UserDirectory;
pub use error::ServerError;
pub use handler::{EchoHandler, RequestHandler};
pub use listener::{Listener, ListenerConfig};
