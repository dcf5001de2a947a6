//! # Storage Module
//!
//! Access to the remote document store that holds every user's streak, badge
//! flags and records.
//!
//! The domain layer only sees the [`DocumentStore`] trait: a keyed,
//! hierarchical store of JSON-like documents with merge writes,
//! store-assigned ids and ordered live subscriptions. Concrete backends:
//!
//! - **MemoryDocumentStore**: in-process tree of documents with synchronous
//!   subscription delivery. Used by tests and as the engine of the file store.
//! - **YamlDocumentStore**: the memory store persisted as one YAML file per
//!   document under a data directory.
//!
//! ## Layout
//!
//! ```text
//! users/{uid}                      ← root document (streak, badge flags, profile)
//! users/{uid}/reminders/{id}
//! users/{uid}/medicationLogs/{id}
//! users/{uid}/journal/{id}
//! ```
//!
//! ## Design Principles
//!
//! - **Repository Pattern**: services talk to the trait, never to a backend
//! - **Disposable Subscriptions**: every subscribe call returns one handle
//! - **Upsert at the Boundary**: update-or-create lives on the trait, not at call sites

pub mod document;
pub mod memory;
pub mod subscription;
pub mod traits;
pub mod yaml;

#[cfg(test)]
pub mod test_utils;

pub use document::*;
pub use memory::MemoryDocumentStore;
pub use subscription::{SnapshotListener, Subscription, SubscriptionSet};
pub use traits::{DocumentStore, StoreError};
pub use yaml::{YamlConnection, YamlDocumentStore};
