//! Redis lock backend for `kvlock`.
//!
//! This crate provides a Redis-backed implementation of the
//! [`LockBackend`] trait, usable on its own for single-instance locks or
//! in groups for quorum locks.
//!
//! # Features
//!
//! - **Atomic primitives**: claim, release and refresh run as Lua scripts.
//! - **Connection pooling**: Uses `deadpool-redis` for connection management.
//! - **Namespacing**: Optional key namespace to share an instance between
//!   applications.
//!
//! See the [`backend`] module documentation for consistency guarantees.
//!
//! [`LockBackend`]: kvlock::LockBackend

pub mod backend;
mod config;
mod key_render;
mod scripts;

pub use backend::{RedisBackend, connect_all};
pub use config::RedisConfig;
