//! Vescrow attestation store.
//!
//! Records worker completion claims keyed by `(chain_id, agreement_id)` and
//! recomputes their trust on every read: signature recovery against the
//! worker plus a live read of the claimed target state.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod reader;
pub mod service;

pub use api::{router, AppState};
pub use config::StoreConfig;
pub use db::TaskRepository;
pub use error::{Result, StoreError};
pub use service::AttestationStore;
