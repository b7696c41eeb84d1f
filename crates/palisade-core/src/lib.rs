//! # Palisade Core
//!
//! Core types and collaborator traits for the Palisade protection pipeline.
//!
//! This crate holds everything the pipeline stages share but that carries no
//! middleware logic of its own:
//!
//! - [`PalisadeError`] / [`ErrorCategory`]: the error taxonomy and its HTTP
//!   status mapping
//! - [`ClientIdentity`]: best-effort client attribution used to partition
//!   rate-limit state
//! - [`Session`] / [`SessionRecord`]: the internal session value type and
//!   the boundary adapter from the external store's shape
//! - [`store`]: the external collaborator traits (session store, user
//!   store, credential hashing, mail) the pipeline consumes
//! - [`fixtures`]: in-memory collaborator implementations for tests

#![doc(html_root_url = "https://docs.rs/palisade-core/0.1.0")]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod fixtures;
pub mod identity;
pub mod session;
pub mod store;

// Re-export main types at crate root
pub use error::{ErrorCategory, PalisadeError, PalisadeResult};
pub use identity::ClientIdentity;
pub use session::{ExpiryKind, Session, SessionRecord};
pub use store::{
    BoxFuture, CredentialHasher, MailMessage, Mailer, SessionStore, StoreError, StoreResult,
    UserRecord, UserStore,
};
