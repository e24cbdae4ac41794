//! Shared primitives: data model, persisted schema, storage, configuration,
//! branch detection and time sources.

pub mod branch;
pub mod color;
pub mod config;
pub mod error;
pub mod group;
pub mod schemas;
pub mod storage;
pub mod store;
pub mod time;
