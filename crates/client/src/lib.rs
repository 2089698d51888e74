//! Client code for rescache.
//!
//! This crate provides the HTTP fetch executor and the resource pipeline
//! that builds requests, answers them from the store when it can, and
//! records every fetched outcome.

pub mod fetch;
pub mod resource;

pub use fetch::{FetchClient, FetchConfig, RawResponse, Transport};
pub use resource::{
    ArgumentSchema, MethodSchema, Outcome, PlainUrl, Resource, ResourceClient, ResourceKind, raise_for_status,
};
