//! Todo Sync Server
//!
//! A multi-tenant todo backend with per-owner version stamping and a
//! last-write-wins incremental sync protocol for offline clients.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod routes;
pub mod state;
pub mod sync;
