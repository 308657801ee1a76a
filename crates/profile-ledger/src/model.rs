//! Profile, snapshot and history record types

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Opaque profile identifier, assigned at creation and never reused
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProfileId(Uuid);

impl ProfileId {
    /// Generate a fresh random identifier
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ProfileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}

impl FromStr for ProfileId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Caller-supplied desired state of a profile
///
/// Carries no identity, age, credential or counter: those are owned by the
/// directory and derived at write time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileFields {
    /// Display name
    pub name: String,
    /// Unique, exact-match authentication key
    pub email: String,
    /// Free-text sex attribute
    pub sex: String,
    /// Calendar date of birth
    pub date_of_birth: NaiveDate,
    /// Phone numbers, replaced wholesale on update
    #[serde(default)]
    pub phones: Vec<String>,
    /// Encoded addresses, replaced wholesale on update
    #[serde(default)]
    pub addresses: Vec<String>,
}

impl ProfileFields {
    /// Create fields with empty phone and address lists
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        sex: impl Into<String>,
        date_of_birth: NaiveDate,
    ) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            sex: sex.into(),
            date_of_birth,
            phones: Vec::new(),
            addresses: Vec::new(),
        }
    }

    /// Set the phone list
    pub fn with_phones<I, S>(mut self, phones: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.phones = phones.into_iter().map(Into::into).collect();
        self
    }

    /// Set the address list
    pub fn with_addresses<I, S>(mut self, addresses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.addresses = addresses.into_iter().map(Into::into).collect();
        self
    }
}

/// Current state of an identity record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    /// Stable identifier
    pub id: ProfileId,
    /// Display name
    pub name: String,
    /// Unique authentication key
    pub email: String,
    /// Free-text sex attribute
    pub sex: String,
    /// Calendar date of birth
    pub date_of_birth: NaiveDate,
    /// Whole years since `date_of_birth`, computed at the last write
    pub age: u32,
    /// Salted one-way hash of the credential
    pub credential_hash: String,
    /// Number of successful updates since creation
    pub update_count: u64,
    /// Phone numbers
    pub phones: Vec<String>,
    /// Encoded addresses
    pub addresses: Vec<String>,
    /// Creation timestamp
    pub created_at: DateTime<Utc>,
    /// Timestamp of the last write
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    /// The caller-facing fields of this profile
    pub fn fields(&self) -> ProfileFields {
        ProfileFields {
            name: self.name.clone(),
            email: self.email.clone(),
            sex: self.sex.clone(),
            date_of_birth: self.date_of_birth,
            phones: self.phones.clone(),
            addresses: self.addresses.clone(),
        }
    }

    /// Capture the current field values for the history log
    pub fn snapshot(&self) -> ProfileSnapshot {
        ProfileSnapshot {
            name: self.name.clone(),
            email: self.email.clone(),
            sex: self.sex.clone(),
            age: self.age,
            date_of_birth: self.date_of_birth,
            phones: self.phones.clone(),
            addresses: self.addresses.clone(),
        }
    }

    /// Overwrite every caller-facing field; lists are replaced, not merged
    pub(crate) fn apply(&mut self, fields: ProfileFields, age: u32) {
        self.name = fields.name;
        self.email = fields.email;
        self.sex = fields.sex;
        self.date_of_birth = fields.date_of_birth;
        self.age = age;
        self.phones = fields.phones;
        self.addresses = fields.addresses;
    }
}

/// Field values of a profile as they stood before an update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSnapshot {
    /// Display name
    pub name: String,
    /// Email
    pub email: String,
    /// Sex attribute
    pub sex: String,
    /// Derived age
    pub age: u32,
    /// Date of birth
    pub date_of_birth: NaiveDate,
    /// Phone numbers
    pub phones: Vec<String>,
    /// Encoded addresses
    pub addresses: Vec<String>,
}

impl ProfileSnapshot {
    /// Serialize for storage in a history entry
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Parse a stored snapshot
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Immutable record of one profile update
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Owning profile
    pub profile_id: ProfileId,
    /// JSON [`ProfileSnapshot`] of the state before the update
    pub snapshot_json: String,
    /// Credential hash that became effective with the update
    pub credential_hash_at_time: String,
    /// The profile's `update_count` after the update
    pub sequence_number: u64,
    /// When the entry was appended
    pub recorded_at: DateTime<Utc>,
}

impl HistoryEntry {
    /// Decode the stored snapshot
    pub fn snapshot(&self) -> serde_json::Result<ProfileSnapshot> {
        ProfileSnapshot::from_json(&self.snapshot_json)
    }
}

/// Result of an authentication attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthOutcome {
    /// Credential matched
    Authenticated(Profile),
    /// No profile holds the email
    EmailNotFound,
    /// Profile exists but the credential did not verify
    InvalidCredential,
}

impl AuthOutcome {
    /// Whether the attempt succeeded
    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::Authenticated(_))
    }

    /// The authenticated profile, if any
    pub fn profile(&self) -> Option<&Profile> {
        match self {
            Self::Authenticated(profile) => Some(profile),
            _ => None,
        }
    }
}
