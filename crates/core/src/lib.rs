//! Core types for the traject state-tracking engine
//!
//! This crate defines the fundamental types shared by every layer:
//! - [`RecordId`] / [`RecordIdGenerator`]: time-ordered record identifiers
//! - [`EntityRef`] / [`StateRecord`]: the append-only state history model
//! - [`TransitionContext`]: the read-only context handed to transitions
//! - The error taxonomy ([`EngineError`], [`StoreError`], [`CacheError`],
//!   [`RegistryError`])

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod context;
pub mod error;
pub mod record;
pub mod record_id;

pub use context::TransitionContext;
pub use error::{CacheError, EngineError, RegistryError, StoreError};
pub use record::{EntityRef, Metadata, StateRecord};
pub use record_id::{RecordId, RecordIdGenerator};
