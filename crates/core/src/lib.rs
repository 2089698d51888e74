//! Core types and shared functionality for rescache.
//!
//! This crate provides:
//! - Signature-keyed entity store and HTTP resource store on SQLite
//! - Configuration defaults and overlays for entities and resources
//! - Unified error types
//! - Application configuration

pub mod cache;
pub mod config;
pub mod error;
pub mod options;
pub mod resource;

pub use cache::{CacheDb, Entity, EntityType};
pub use config::{AppConfig, ConfigError};
pub use error::Error;
pub use options::{ConfigDefaults, Configuration};
pub use resource::{CacheIdentity, Content, Method, NewResource, Params, RequestDescriptor, ResourceRecord};
