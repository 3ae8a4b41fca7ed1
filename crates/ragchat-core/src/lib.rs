//! ragchat-core - Core types and traits for the ragchat system
//!
//! This crate provides the foundational types, traits, configuration and
//! error handling shared by the loader, index, retrieval and chat layers.

pub mod config;
pub mod error;
pub mod traits;
pub mod types;

pub use config::*;
pub use error::{RagError, Result};
pub use traits::*;
pub use types::*;
