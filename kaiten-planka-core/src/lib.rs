#![doc = "kaiten-planka-core: migration engine that recreates a Kaiten workspace in Planka."]

//! Everything except HTTP lives here: the domain model, field mapping, the
//! space tree, the shared identity caches, the source rate limiter and the
//! staged orchestrator. The two services are reached only through the traits
//! in [`contract`], so the whole pipeline runs against mocks or fakes.
//!
//! # Usage
//! Build a [`context::MigrationContext`] from a [`contract::SourceReader`], a
//! [`contract::DestinationWriter`] and a [`config::MigrationConfig`], then
//! call [`migrate::migrate`].

pub mod cache;
pub mod config;
pub mod context;
pub mod contract;
pub mod error;
pub mod mapping;
pub mod migrate;
pub mod model;
pub mod rate_limit;
pub mod report;
pub mod tree;
pub mod work;

pub use error::{Error, Result};
