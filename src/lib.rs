//! # Langboost
//!
//! A multi-tenant localization backend. Spaces hold projects, projects hold
//! languages and branches, and branches hold translation keys ("mutations")
//! with one value per language. Writes are gated by the user's role in the
//! space, branch locks, and a per-project rule for editing the main branch.
//!
//! ## Library Usage
//!
//! ```toml
//! [dependencies]
//! langboost = { version = "0.0.1", default-features = false }
//! ```
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use langboost::auth::StoreAuthenticator;
//! use langboost::server::{AppState, create_router};
//! use langboost::store::{SqliteStore, Store};
//!
//! let store: Arc<dyn Store> = Arc::new(SqliteStore::new("./data/langboost.db").unwrap());
//! store.initialize().unwrap();
//!
//! let authenticator = Arc::new(StoreAuthenticator::new(store.clone()));
//! let router = create_router(Arc::new(AppState::new(store, authenticator)));
//! // Serve with axum...
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` (default): Builds the `langboost` binary. Disable with `default-features = false`.

pub mod auth;
pub mod branching;
pub mod config;
pub mod error;
pub mod server;
pub mod store;
pub mod types;
