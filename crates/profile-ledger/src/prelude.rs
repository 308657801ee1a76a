//! Convenience re-exports for common types

pub use crate::address::{AddressItem, decode_address, encode_address};
pub use crate::config::DirectoryConfig;
pub use crate::credentials::HasherConfig;
pub use crate::dates::parse_date_of_birth;
pub use crate::directory::ProfileDirectory;
pub use crate::error::{DirectoryError, ProfileRef, StorageError, ValidationError};
pub use crate::model::{
    AuthOutcome, HistoryEntry, Profile, ProfileFields, ProfileId, ProfileSnapshot,
};
pub use crate::storage::{FileStorage, MemoryStorage, StorageBackend};
pub use crate::observability::{LoggingConfig, init_logging};
