// src/lib.rs
// Astro MCP - uniform discovery and execution over astronomical data services

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![cfg_attr(test, allow(clippy::unwrap_used, clippy::expect_used))]

pub mod app;
pub mod auth;
pub mod backends;
pub mod coerce;
pub mod config;
pub mod coords;
pub mod error;
pub mod executor;
pub mod http;
pub mod mcp;
pub mod normalize;
pub mod registry;
pub mod resolver;
pub mod retry;
pub mod utils;
pub mod value;
