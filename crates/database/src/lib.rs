//! # Registrar Database Crate
//!
//! This crate owns the MySQL connection pool and every statement the service
//! runs against it.
//!
//! ## Architectural Principles
//!
//! - **Explicit Lifecycle:** The pool is built by [`connect`], verified by
//!   [`DbRepository::probe`], bootstrapped by [`DbRepository::ensure_schema`] and
//!   released by [`DbRepository::close`]. Nothing is created implicitly or held in a global.
//! - **Scoped Acquisition:** Each operation checks out one connection and returns it
//!   when the connection guard drops, whether the query succeeded or not.
//! - **Storage Abstraction:** The HTTP layer only sees the [`UserStore`] trait.
//!
//! ## Public API
//!
//! - `connect`: Decodes the credentials and builds a lazy, bounded pool.
//! - `DbRepository`: Holds the pool and implements `UserStore`.
//! - `AdmissionGate`: Optional bound on callers waiting for a connection.
//! - `ConnectionDiagnostics`: Structured detail for connection failures.
//! - `DbError`: The specific error types that can be returned from this crate.

// Declare the modules that constitute this crate.
pub mod admission;
pub mod connection;
pub mod diagnostics;
pub mod error;
pub mod models;
pub mod repository;

// Re-export the key components to create a clean, public-facing API.
pub use admission::AdmissionGate;
pub use connection::connect;
pub use diagnostics::{ConnectionDiagnostics, ConnectionTarget};
pub use error::DbError;
pub use models::NewUser;
pub use repository::{DbRepository, UserStore};
