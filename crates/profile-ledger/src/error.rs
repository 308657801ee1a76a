//! Error types for profile ledger operations

use crate::model::ProfileId;
use chrono::NaiveDate;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// How a missing profile was referenced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProfileRef {
    /// Lookup by identifier
    Id(ProfileId),
    /// Lookup by email
    Email(String),
}

impl fmt::Display for ProfileRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Id(id) => write!(f, "{id}"),
            Self::Email(email) => write!(f, "email {email}"),
        }
    }
}

impl From<ProfileId> for ProfileRef {
    fn from(id: ProfileId) -> Self {
        Self::Id(id)
    }
}

/// Errors that can occur during profile directory operations
#[derive(Error, Debug)]
pub enum DirectoryError {
    /// Referenced profile does not exist
    #[error("Profile not found: {0}")]
    NotFound(ProfileRef),

    /// Email is already held by another live profile
    #[error("Email already registered: {0}")]
    DuplicateEmail(String),

    /// Caller-supplied fields failed validation
    #[error("Profile validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// An update's history entry and profile row could not be committed together
    #[error(
        "Audit write failed for profile {profile_id} at sequence {sequence_number} \
         (rolled back: {rolled_back}): {source}"
    )]
    AuditWriteFailure {
        /// Profile whose update lost its history entry
        profile_id: ProfileId,
        /// Sequence number the missing entry would have carried
        sequence_number: u64,
        /// Whether the profile and its history were left as before the call
        rolled_back: bool,
        /// The failed write
        source: Box<DirectoryError>,
    },

    /// Stored history does not account for the profile's update count
    #[error(
        "History of profile {profile_id} holds {recorded} entries for update count {update_count}"
    )]
    HistoryMismatch {
        /// Affected profile
        profile_id: ProfileId,
        /// The profile's update count
        update_count: u64,
        /// Entries present in the history log
        recorded: u64,
    },

    /// History append with a sequence number that does not advance the ledger
    #[error("History sequence out of order for profile {profile_id}: last {last}, attempted {attempted}")]
    OutOfOrderHistory {
        /// Owning profile
        profile_id: ProfileId,
        /// Last recorded sequence number
        last: u64,
        /// Rejected sequence number
        attempted: u64,
    },

    /// Persistence backend failure
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Credential hashing failed
    #[error("Credential hashing failed: {0}")]
    Hashing(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DirectoryError {
    /// Check if this error is recoverable by the caller
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::DuplicateEmail(_) => true,
            Self::Validation(_) => true,
            Self::AuditWriteFailure { .. } => false,
            Self::OutOfOrderHistory { .. } => false,
            Self::HistoryMismatch { .. } => false,
            Self::Storage(_) => true,
            Self::Serialization(_) => false,
            Self::Hashing(_) => false,
            Self::Config(_) => false,
        }
    }

    /// Create a not-found error for an id or email
    pub fn not_found(reference: impl Into<ProfileRef>) -> Self {
        Self::NotFound(reference.into())
    }

    /// True for the update/audit pairing faults
    pub fn is_audit_failure(&self) -> bool {
        matches!(
            self,
            Self::AuditWriteFailure { .. } | Self::HistoryMismatch { .. }
        )
    }

    /// Create a hashing error
    pub fn hashing(reason: impl std::fmt::Display) -> Self {
        Self::Hashing(reason.to_string())
    }

    /// Create a configuration error
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config(reason.into())
    }
}

/// Storage-specific errors
#[derive(Error, Debug)]
pub enum StorageError {
    /// Failed to read a record
    #[error("Failed to read {path}: {source}")]
    ReadFailed {
        /// Path to the record
        path: PathBuf,
        /// Source error
        source: std::io::Error,
    },

    /// Failed to write a record
    #[error("Failed to write {path}: {source}")]
    WriteFailed {
        /// Path to the record
        path: PathBuf,
        /// Source error
        source: std::io::Error,
    },

    /// Failed to delete a record
    #[error("Failed to delete {path}: {source}")]
    DeleteFailed {
        /// Path to the record
        path: PathBuf,
        /// Source error
        source: std::io::Error,
    },

    /// Failed to create a directory
    #[error("Failed to create directory {path}: {source}")]
    DirectoryCreationFailed {
        /// Path to the directory
        path: PathBuf,
        /// Source error
        source: std::io::Error,
    },

    /// Failed to enumerate a namespace
    #[error("Failed to list {path}: {source}")]
    ListFailed {
        /// Path to the namespace directory
        path: PathBuf,
        /// Source error
        source: std::io::Error,
    },

    /// Stored record exists but cannot be interpreted
    #[error("Corrupt record {namespace}/{name}: {reason}")]
    Corrupt {
        /// Record namespace
        namespace: String,
        /// Record name
        name: String,
        /// What is wrong with it
        reason: String,
    },

    /// Backend refused the operation
    #[error("Storage backend unavailable: {0}")]
    Unavailable(String),
}

impl StorageError {
    /// Create a read error
    pub fn read_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::ReadFailed {
            path: path.into(),
            source,
        }
    }

    /// Create a write error
    pub fn write_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::WriteFailed {
            path: path.into(),
            source,
        }
    }

    /// Create a delete error
    pub fn delete_failed(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::DeleteFailed {
            path: path.into(),
            source,
        }
    }

    /// Create a corrupt record error
    pub fn corrupt(namespace: &str, name: &str, reason: impl fmt::Display) -> Self {
        Self::Corrupt {
            namespace: namespace.to_string(),
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }
}

/// Validation-specific errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Required field is empty or whitespace
    #[error("Field '{0}' must not be blank")]
    Blank(String),

    /// Email does not have a `local@domain.tld` shape
    #[error("Invalid email address: {0}")]
    InvalidEmail(String),

    /// Date of birth lies after the current date
    #[error("Date of birth {0} is in the future")]
    FutureDateOfBirth(NaiveDate),

    /// Date text matched none of the accepted formats
    #[error("Unrecognized date: {0}")]
    InvalidDate(String),

    /// Address entry carries no valid pincode
    #[error("Invalid address at position {index}: {reason}")]
    InvalidAddress {
        /// Position in the address list
        index: usize,
        /// The reason for invalidity
        reason: String,
    },
}

impl ValidationError {
    /// Create a blank field error
    pub fn blank(field: impl Into<String>) -> Self {
        Self::Blank(field.into())
    }

    /// Create an invalid address error
    pub fn invalid_address(index: usize, reason: impl Into<String>) -> Self {
        Self::InvalidAddress {
            index,
            reason: reason.into(),
        }
    }
}
