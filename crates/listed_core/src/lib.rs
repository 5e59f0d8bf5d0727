//! # Listed Core
//!
//! Document-level building blocks for Listed Sync.
//!
//! This crate provides:
//! - The [`MergeEngine`] contract the sync layer drives (apply, full
//!   encoding, state vectors, diffs, mutation events)
//! - [`Subscription`] handles and the [`Listeners`] registry behind every
//!   callback in the workspace
//! - [`LwwEngine`], a reference last-writer-wins key/value document built on
//!   an operation log
//!
//! This is a pure crate with no I/O operations.
//!
//! ## Usage
//!
//! ```
//! use listed_core::{LwwEngine, MergeEngine};
//!
//! let engine = LwwEngine::new(1);
//! let mut doc = engine.create();
//! let update = doc.set("text", "hello").unwrap();
//!
//! let mut other = LwwEngine::new(2).create();
//! LwwEngine::new(2).apply(&mut other, &update).unwrap();
//! assert_eq!(other.get("text"), Some("hello"));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod engine;
mod error;
mod lww;
mod operation;
mod opset;
mod subscription;

pub use engine::{DocUpdate, MergeEngine, StateVector, Update, UpdateHandler, UpdateOrigin};
pub use error::{MergeError, MergeResult};
pub use lww::{LwwDocument, LwwEngine};
pub use operation::{OpId, Operation};
pub use opset::OpSet;
pub use subscription::{Listeners, Subscription};
