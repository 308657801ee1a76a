//! Current-state profile storage with email uniqueness

use crate::error::{DirectoryError, ProfileRef, StorageError};
use crate::model::{Profile, ProfileFields, ProfileId};
use crate::storage::StorageBackend;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Backend namespace holding one record per live profile
pub const PROFILES_NAMESPACE: &str = "profiles";

#[derive(Debug, Default)]
struct ProfileTable {
    rows: HashMap<ProfileId, Profile>,
    by_email: HashMap<String, ProfileId>,
}

impl ProfileTable {
    fn insert(&mut self, profile: Profile) {
        self.by_email.insert(profile.email.clone(), profile.id);
        self.rows.insert(profile.id, profile);
    }

    fn email_holder(&self, email: &str) -> Option<ProfileId> {
        self.by_email.get(email).copied()
    }
}

/// Keyed store of current profile state
///
/// The table is the in-memory view of the backend; every mutation is written
/// to the backend before the table changes, under the table's write lock, so
/// uniqueness checks and commits cannot interleave.
#[derive(Debug)]
pub struct ProfileStore {
    backend: Arc<dyn StorageBackend>,
    table: RwLock<ProfileTable>,
}

impl ProfileStore {
    /// Open the store and load every persisted profile
    ///
    /// # Error Recovery
    ///
    /// Unreadable or conflicting records are logged and skipped; only a
    /// failure to enumerate the namespace aborts.
    pub async fn open(backend: Arc<dyn StorageBackend>) -> Result<Self, DirectoryError> {
        let store = Self {
            backend,
            table: RwLock::new(ProfileTable::default()),
        };
        store.load_all().await?;
        Ok(store)
    }

    async fn load_all(&self) -> Result<(), DirectoryError> {
        info!("Loading profiles from storage");

        let names = self.backend.list(PROFILES_NAMESPACE).await?;
        let mut table = self.table.write().await;
        let mut loaded_count = 0usize;
        let mut error_count = 0usize;

        for name in names {
            match self.load_record(&name).await {
                Ok(Some(profile)) => {
                    if let Some(holder) = table.email_holder(&profile.email) {
                        warn!(
                            profile_id = %profile.id,
                            holder = %holder,
                            "Skipping profile with an email already loaded"
                        );
                        error_count += 1;
                        continue;
                    }
                    table.insert(profile);
                    loaded_count += 1;
                }
                Ok(None) => {
                    warn!(record = %name, "Profile record disappeared during load");
                    error_count += 1;
                }
                Err(e) => {
                    warn!(record = %name, error = %e, "Failed to load profile record");
                    error_count += 1;
                }
            }
        }

        info!(
            loaded = loaded_count,
            errors = error_count,
            "Profile loading completed"
        );
        Ok(())
    }

    async fn load_record(&self, name: &str) -> Result<Option<Profile>, DirectoryError> {
        let corrupt = |reason: String| StorageError::corrupt(PROFILES_NAMESPACE, name, reason);

        let id: ProfileId = name
            .parse()
            .map_err(|e| corrupt(format!("name is not a profile id: {e}")))?;

        let Some(json) = self.backend.read(PROFILES_NAMESPACE, name).await? else {
            return Ok(None);
        };
        let profile: Profile =
            serde_json::from_str(&json).map_err(|e| corrupt(format!("invalid JSON: {e}")))?;

        if profile.id != id {
            return Err(corrupt(format!("holds profile {}", profile.id)).into());
        }
        if profile.credential_hash.is_empty() {
            return Err(corrupt("credential hash is empty".to_string()).into());
        }
        Ok(Some(profile))
    }

    async fn persist(&self, profile: &Profile) -> Result<(), DirectoryError> {
        let json = serde_json::to_string_pretty(profile)?;
        self.backend
            .write(PROFILES_NAMESPACE, &profile.id.to_string(), &json)
            .await?;
        Ok(())
    }

    /// Insert a new profile with a fresh id and `update_count = 0`
    ///
    /// Fails with [`DirectoryError::DuplicateEmail`] when the email is held by
    /// a live profile.
    pub async fn create(
        &self,
        fields: ProfileFields,
        age: u32,
        credential_hash: String,
    ) -> Result<Profile, DirectoryError> {
        if credential_hash.is_empty() {
            return Err(DirectoryError::hashing("credential hash is empty"));
        }

        let mut table = self.table.write().await;
        if table.email_holder(&fields.email).is_some() {
            return Err(DirectoryError::DuplicateEmail(fields.email));
        }

        let mut id = ProfileId::generate();
        while table.rows.contains_key(&id) {
            id = ProfileId::generate();
        }

        let now = Utc::now();
        let profile = Profile {
            id,
            name: fields.name,
            email: fields.email,
            sex: fields.sex,
            date_of_birth: fields.date_of_birth,
            age,
            credential_hash,
            update_count: 0,
            phones: fields.phones,
            addresses: fields.addresses,
            created_at: now,
            updated_at: now,
        };

        self.persist(&profile).await?;
        table.insert(profile.clone());

        info!(profile_id = %profile.id, "Profile created");
        Ok(profile)
    }

    /// Look up a profile by id
    pub async fn find_by_id(&self, id: &ProfileId) -> Option<Profile> {
        let table = self.table.read().await;
        table.rows.get(id).cloned()
    }

    /// Look up a profile by id, failing with `NotFound`
    pub async fn get_by_id(&self, id: &ProfileId) -> Result<Profile, DirectoryError> {
        self.find_by_id(id)
            .await
            .ok_or_else(|| DirectoryError::not_found(*id))
    }

    /// Exact-match lookup by email
    pub async fn find_by_email(&self, email: &str) -> Option<Profile> {
        let table = self.table.read().await;
        let id = table.email_holder(email)?;
        table.rows.get(&id).cloned()
    }

    /// Exact-match lookup by email, failing with `NotFound`
    pub async fn get_by_email(&self, email: &str) -> Result<Profile, DirectoryError> {
        debug!(email = %email, "Looking up profile by email");
        self.find_by_email(email)
            .await
            .ok_or_else(|| DirectoryError::not_found(ProfileRef::Email(email.to_string())))
    }

    /// Overwrite the row of an existing profile
    ///
    /// Re-checks uniqueness at commit time: a replace that would leave two
    /// rows with the same email fails with `DuplicateEmail`.
    pub async fn replace(&self, profile: &Profile) -> Result<(), DirectoryError> {
        if profile.credential_hash.is_empty() {
            return Err(DirectoryError::hashing("credential hash is empty"));
        }

        let mut table = self.table.write().await;
        let previous_email = match table.rows.get(&profile.id) {
            Some(existing) => existing.email.clone(),
            None => return Err(DirectoryError::not_found(profile.id)),
        };
        if let Some(holder) = table.email_holder(&profile.email)
            && holder != profile.id
        {
            return Err(DirectoryError::DuplicateEmail(profile.email.clone()));
        }

        self.persist(profile).await?;

        if previous_email != profile.email {
            table.by_email.remove(&previous_email);
        }
        table.insert(profile.clone());

        debug!(profile_id = %profile.id, update_count = profile.update_count, "Profile replaced");
        Ok(())
    }

    /// Remove a profile; absent ids are a no-op
    pub async fn delete(&self, id: &ProfileId) -> Result<(), DirectoryError> {
        let mut table = self.table.write().await;

        self.backend
            .delete(PROFILES_NAMESPACE, &id.to_string())
            .await?;

        if let Some(removed) = table.rows.remove(id) {
            table.by_email.remove(&removed.email);
            info!(profile_id = %id, "Profile deleted");
        }
        Ok(())
    }

    /// All live profiles, oldest first
    pub async fn list(&self) -> Vec<Profile> {
        let table = self.table.read().await;
        let mut profiles: Vec<Profile> = table.rows.values().cloned().collect();
        profiles.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        profiles
    }

    /// Number of live profiles
    pub async fn len(&self) -> usize {
        self.table.read().await.rows.len()
    }

    /// Whether the store holds no profiles
    pub async fn is_empty(&self) -> bool {
        self.table.read().await.rows.is_empty()
    }
}
