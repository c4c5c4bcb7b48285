//! # Casefile Common Library
//!
//! Shared code for the Casefile services including:
//! - Database initialization and schema
//! - Identity types (roles and actors)
//! - Workflow event types and the event bus
//! - Bootstrap configuration loading
//! - Timestamp utilities

pub mod config;
pub mod db;
pub mod error;
pub mod events;
pub mod identity;
pub mod time;

pub use error::{Error, Result};
pub use identity::{Actor, Role, UserId};
