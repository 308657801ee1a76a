//! Identity profile persistence with an append-only change history
//!
//! This crate keeps one current record per profile and an immutable log of
//! every earlier state:
//! - Argon2id credential hashing with self-describing PHC digests
//! - Email-unique profile storage with atomic file writes
//! - Append-only history entries, one per update, ordered by sequence number
//! - Authentication by exact email match
//!
//! # Architecture
//!
//! - [`directory`]: `ProfileDirectory`, the entry point composing the parts below
//! - [`store`]: current profile state and the email index
//! - [`history`]: the append-only history log
//! - [`credentials`]: hashing and verification of secrets
//! - [`storage`]: file and in-memory persistence backends
//! - [`validation`], [`dates`], [`address`]: field checks and codecs
//! - [`config`], [`observability`]: configuration and logging setup
//! - [`error`]: error types
//!
//! # Error Recovery
//!
//! - File writes go to a temp file and are renamed into place
//! - An update writes its history entry before the profile; a failure
//!   part way is undone or reported as `AuditWriteFailure`
//! - History left by an unfinished update or removal is dropped on open
//! - Unreadable records are skipped with a warning when a store is opened
//!
//! # Example
//!
//! ```no_run
//! use profile_ledger::prelude::*;
//!
//! # async fn example() -> profile_ledger::Result<()> {
//! let directory = ProfileDirectory::open(DirectoryConfig::new("data")).await?;
//!
//! let dob = parse_date_of_birth("1990-04-12")?;
//! let profile = directory
//!     .register(ProfileFields::new("Asha", "asha@example.com", "F", dob), "s3cret")
//!     .await?;
//!
//! let outcome = directory.authenticate("asha@example.com", "s3cret").await?;
//! assert!(outcome.is_authenticated());
//! assert_eq!(directory.update_count(&profile.id).await?, 0);
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_op_in_unsafe_fn, clippy::unwrap_used)]
#![warn(missing_docs, rust_2018_idioms)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod address;
pub mod config;
pub mod credentials;
pub mod dates;
pub mod directory;
pub mod error;
pub mod history;
pub mod model;
pub mod observability;
pub mod prelude;
pub mod storage;
pub mod store;
pub mod validation;

pub use config::DirectoryConfig;
pub use credentials::{CredentialHasher, HasherConfig};
pub use directory::ProfileDirectory;
pub use error::{DirectoryError, ProfileRef, StorageError, ValidationError};
pub use history::HistoryLog;
pub use model::{AuthOutcome, HistoryEntry, Profile, ProfileFields, ProfileId, ProfileSnapshot};
pub use observability::{LoggingConfig, init_logging};
pub use storage::{FileStorage, MemoryStorage, StorageBackend};
pub use store::ProfileStore;
pub use validation::ProfileValidationContext;

/// Result type for directory operations
pub type Result<T> = std::result::Result<T, DirectoryError>;
