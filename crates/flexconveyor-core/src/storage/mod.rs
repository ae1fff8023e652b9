//! # Storage Module
//!
//! Persistent fact storage backends.
//!
//! ## Backends
//!
//! | Backend | Use Case | Persistence |
//! |---------|----------|-------------|
//! | `MemoryStore` | Tests, seeded demos | None |
//! | `RedbStore` | Single-site deployments | ACID, crash-safe |

pub mod redb_store;

pub use redb_store::RedbStore;
