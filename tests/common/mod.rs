//! Integration test common infrastructure.
//!
//! Spawns ironbncd instances with scratch data directories, drives
//! client connections against them, and fakes the upstream IRC server.

pub mod client;
pub mod server;
pub mod upstream;

#[allow(unused_imports)]
pub use client::TestClient;
#[allow(unused_imports)]
pub use server::{ServerSetup, TestServer};
#[allow(unused_imports)]
pub use upstream::{FakeIrcConn, FakeIrcServer};
