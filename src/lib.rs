//! TeleVault server library
//!
//! A Telegram channel repurposed as a durable, append-only blob store:
//! files are split into bounded-size chunks, pushed through rotating
//! bot identities, and reconstructed byte-exact on demand. Share links
//! gate anonymous access behind expiry, download quota, and password
//! checks.

pub mod archive;
pub mod backend;
pub mod chunk;
pub mod config;
pub mod db;
pub mod error;
pub mod identity;
pub mod routes;
pub mod share;
pub mod state;
pub mod store;
pub mod transfer;
