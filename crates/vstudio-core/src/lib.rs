//! Validation Studio Core Library
//!
//! This crate provides the document-store layer behind Validation Studio:
//! generic create/read/update/delete over top-level documents and over
//! sub-documents embedded in a parent's array field, with duplicate-key
//! enforcement and foreign-key validation driven by declarative schemas.
//!
//! # Architecture
//!
//! - **Primitives** (`documents`, `embedded`): synchronous operations against
//!   any [`DocumentStore`]
//! - **Controller**: async façade that runs primitives on the blocking pool
//!   and reports failures as a uniform [`ServiceError`]
//! - **Resources**: per-schema boundary (id coercion, foreign keys,
//!   timestamps, soft delete) on top of the controller
//!
//! # Quick Start
//!
//! ```text
//! let store = storage::open(&Config::load()?)?;
//! let resources = Resources::new(store);
//!
//! let org = resources
//!     .create(&catalog::ORGANISATIONS, json!({"name": "Acme", "org_owner_email": "a@x.com"}))
//!     .await?;
//! let all = resources.search(&catalog::ORGANISATIONS, Document::new(), Document::new()).await?;
//! ```
//!
//! # Modules
//!
//! - `storage`: driver boundary plus in-memory and SQLite backends
//! - `documents`: top-level document primitives
//! - `embedded`: embedded-array primitives
//! - `foreign_keys`: reference existence checks
//! - `controller`: async façade
//! - `resource`: per-resource operations
//! - `model` / `catalog`: schema descriptors and the resource catalogue
//! - `config`: application configuration

pub mod catalog;
pub mod config;
pub mod controller;
pub mod documents;
pub mod embedded;
pub mod error;
pub mod foreign_keys;
pub mod model;
pub mod object_id;
pub mod query;
pub mod resource;
pub mod storage;

pub use config::{Backend, Config};
pub use controller::Controller;
pub use embedded::EmbeddedUpdate;
pub use error::{ErrorCode, Location, ServiceError, ServiceResult};
pub use model::{FieldSpec, ModelSchema};
pub use object_id::{ObjectId, ID_FIELD};
pub use query::{Document, Filter, Projection};
pub use resource::Resources;
pub use storage::{DocumentStore, MemoryStore, SqliteStore, StoreError, StoreResult};
