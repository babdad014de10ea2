//! Cloud Build backend adapter.
//!
//! Implements the [`BuildBackend`] port against the Cloud Build v1 REST
//! API: trigger listing, trigger invocation, and build status lookup.
//! The base URL is injectable so tests can point the client at a local
//! mock server.

mod client;
mod wire;

pub use client::CloudBuildClient;
