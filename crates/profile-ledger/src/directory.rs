//! Profile directory: registration, updates with an audit trail, and
//! authentication
//!
//! # Consistency
//!
//! Every mutation runs under a single write gate. An update appends its
//! history entry first and replaces the profile row second, so an
//! interrupted update can only leave an entry numbered above the profile's
//! `update_count`. Such entries are dropped when the directory is opened and
//! before the next update of that profile. A profile whose history falls
//! short of its `update_count` is refused further updates with
//! [`DirectoryError::HistoryMismatch`].

use crate::config::DirectoryConfig;
use crate::credentials::CredentialHasher;
use crate::dates::{age_on, today};
use crate::error::DirectoryError;
use crate::history::HistoryLog;
use crate::model::{AuthOutcome, HistoryEntry, Profile, ProfileFields, ProfileId, ProfileSnapshot};
use crate::storage::{FileStorage, MemoryStorage, StorageBackend};
use crate::store::ProfileStore;
use crate::validation::{ProfileValidationContext, validate_secret};
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

/// Orchestrates the profile store, the history log and the credential hasher
#[derive(Debug)]
pub struct ProfileDirectory {
    config: DirectoryConfig,
    store: ProfileStore,
    history: HistoryLog,
    hasher: Arc<CredentialHasher>,
    validation: ProfileValidationContext,
    write_gate: Mutex<()>,
}

impl ProfileDirectory {
    /// Open a file-backed directory rooted at `config.data_dir`
    pub async fn open(config: DirectoryConfig) -> Result<Self, DirectoryError> {
        config.validate()?;
        let backend = FileStorage::new(&config.data_dir).await?;
        Self::with_backend(config, Arc::new(backend)).await
    }

    /// Open a directory over any storage backend
    pub async fn with_backend(
        config: DirectoryConfig,
        backend: Arc<dyn StorageBackend>,
    ) -> Result<Self, DirectoryError> {
        config.validate()?;

        let hasher = CredentialHasher::new(&config.hasher)?;
        let store = ProfileStore::open(backend.clone()).await?;
        let history = HistoryLog::open(backend).await?;

        let directory = Self {
            validation: config.validation_context(),
            config,
            store,
            history,
            hasher: Arc::new(hasher),
            write_gate: Mutex::new(()),
        };

        directory.reconcile_on_open().await;
        let profiles = directory.store.len().await;
        info!(profiles, "Profile directory opened");
        Ok(directory)
    }

    /// Directory over a fresh in-memory backend
    pub async fn in_memory(config: DirectoryConfig) -> Result<Self, DirectoryError> {
        Self::with_backend(config, Arc::new(MemoryStorage::new())).await
    }

    /// Active configuration
    pub fn config(&self) -> &DirectoryConfig {
        &self.config
    }

    /// Drop history left behind by interrupted updates and removals
    ///
    /// # Error Recovery
    ///
    /// Failures are logged and retried on the next open, or before the next
    /// update of the profile; opening never fails here.
    async fn reconcile_on_open(&self) {
        for profile_id in self.history.profile_ids().await {
            if self.store.find_by_id(&profile_id).await.is_some() {
                continue;
            }
            match self.history.delete_all_for_profile(&profile_id).await {
                Ok(removed) => warn!(
                    profile_id = %profile_id,
                    removed,
                    "Deleted history of a missing profile"
                ),
                Err(e) => warn!(
                    profile_id = %profile_id,
                    error = %e,
                    "Failed to delete history of a missing profile"
                ),
            }
        }

        for profile in self.store.list().await {
            if let Err(e) = self.reconcile_history(&profile).await {
                warn!(profile_id = %profile.id, error = %e, "Profile history is inconsistent");
            }
        }
    }

    /// Make the history of `profile` match its `update_count`
    ///
    /// Entries above the count belong to an update whose profile write never
    /// landed and are removed. A history with fewer entries cannot be
    /// repaired and fails with `HistoryMismatch`.
    async fn reconcile_history(&self, profile: &Profile) -> Result<(), DirectoryError> {
        let latest = self.history.latest_sequence(&profile.id).await.unwrap_or(0);
        if latest > profile.update_count {
            let removed = self
                .history
                .truncate_after(&profile.id, profile.update_count)
                .await?;
            warn!(
                profile_id = %profile.id,
                update_count = profile.update_count,
                removed,
                "Dropped history of an unfinished update"
            );
        }

        let recorded = self.history.count(&profile.id).await as u64;
        let latest = self.history.latest_sequence(&profile.id).await.unwrap_or(0);
        if recorded != profile.update_count || latest != profile.update_count {
            return Err(DirectoryError::HistoryMismatch {
                profile_id: profile.id,
                update_count: profile.update_count,
                recorded,
            });
        }
        Ok(())
    }

    fn validate(&self, fields: &ProfileFields, secret: &str) -> Result<(), DirectoryError> {
        validate_secret(secret)?;
        self.validation.validate_fields(fields, today())?;
        Ok(())
    }

    async fn hash_secret(&self, secret: &str) -> Result<String, DirectoryError> {
        let hasher = Arc::clone(&self.hasher);
        let secret = secret.to_owned();
        tokio::task::spawn_blocking(move || hasher.hash(&secret))
            .await
            .map_err(DirectoryError::hashing)?
    }

    async fn verify_against(&self, secret: &str, digest: &str) -> Result<bool, DirectoryError> {
        let hasher = Arc::clone(&self.hasher);
        let secret = secret.to_owned();
        let digest = digest.to_owned();
        tokio::task::spawn_blocking(move || hasher.verify(&secret, &digest))
            .await
            .map_err(DirectoryError::hashing)
    }

    /// Create a new profile
    ///
    /// Fails with `DuplicateEmail` when a live profile holds the email and
    /// with `Validation` when a field or the secret is rejected. The new
    /// profile starts with `update_count = 0` and no history.
    #[instrument(skip_all)]
    pub async fn register(
        &self,
        fields: ProfileFields,
        secret: &str,
    ) -> Result<Profile, DirectoryError> {
        self.validate(&fields, secret)?;
        let credential_hash = self.hash_secret(secret).await?;

        let _gate = self.write_gate.lock().await;

        if self.store.find_by_email(&fields.email).await.is_some() {
            return Err(DirectoryError::DuplicateEmail(fields.email));
        }

        let age = age_on(fields.date_of_birth, today());
        let profile = self.store.create(fields, age, credential_hash).await?;

        info!(profile_id = %profile.id, "Profile registered");
        Ok(profile)
    }

    /// Replace every caller-facing field and the credential of a profile
    ///
    /// The state before the change is written to the history log with
    /// `sequence_number` equal to the new `update_count`.
    ///
    /// # Error Recovery
    ///
    /// - If the history entry cannot be written nothing has changed and
    ///   `AuditWriteFailure { rolled_back: true }` is returned.
    /// - If the profile row cannot be written the new entry is removed again
    ///   and the write error is returned. When that removal fails too the
    ///   result is `AuditWriteFailure { rolled_back: false }`; the stray entry
    ///   is dropped before the next update or when the directory reopens.
    /// - A history shorter than `update_count` fails with `HistoryMismatch`.
    #[instrument(skip_all, fields(profile_id = %id))]
    pub async fn update(
        &self,
        id: &ProfileId,
        fields: ProfileFields,
        secret: &str,
    ) -> Result<Profile, DirectoryError> {
        self.validate(&fields, secret)?;
        let credential_hash = self.hash_secret(secret).await?;

        let _gate = self.write_gate.lock().await;

        let current = self.store.get_by_id(id).await?;
        if let Some(holder) = self.store.find_by_email(&fields.email).await
            && holder.id != current.id
        {
            return Err(DirectoryError::DuplicateEmail(fields.email));
        }
        self.reconcile_history(&current).await?;

        let snapshot_json = current.snapshot().to_json()?;
        let age = age_on(fields.date_of_birth, today());

        let mut updated = current.clone();
        updated.apply(fields, age);
        updated.credential_hash = credential_hash;
        updated.update_count = current.update_count + 1;
        updated.updated_at = Utc::now();

        if let Err(append_error) = self
            .history
            .append(
                updated.id,
                snapshot_json,
                updated.credential_hash.clone(),
                updated.update_count,
            )
            .await
        {
            error!(
                profile_id = %updated.id,
                sequence_number = updated.update_count,
                error = %append_error,
                "History append failed"
            );
            return Err(DirectoryError::AuditWriteFailure {
                profile_id: updated.id,
                sequence_number: updated.update_count,
                rolled_back: true,
                source: Box::new(append_error),
            });
        }

        if let Err(replace_error) = self.store.replace(&updated).await {
            return match self
                .history
                .truncate_after(&updated.id, current.update_count)
                .await
            {
                Ok(_) => Err(replace_error),
                Err(retract_error) => {
                    error!(
                        profile_id = %updated.id,
                        sequence_number = updated.update_count,
                        error = %replace_error,
                        retract_error = %retract_error,
                        "Profile write failed and its history entry could not be removed"
                    );
                    Err(DirectoryError::AuditWriteFailure {
                        profile_id: updated.id,
                        sequence_number: updated.update_count,
                        rolled_back: false,
                        source: Box::new(replace_error),
                    })
                }
            };
        }

        info!(
            profile_id = %updated.id,
            sequence_number = updated.update_count,
            "Profile updated"
        );
        Ok(updated)
    }

    /// Check an email and secret pair
    #[instrument(skip_all)]
    pub async fn authenticate(
        &self,
        email: &str,
        secret: &str,
    ) -> Result<AuthOutcome, DirectoryError> {
        let Some(profile) = self.store.find_by_email(email).await else {
            debug!(email = %email, "Authentication for unknown email");
            return Ok(AuthOutcome::EmailNotFound);
        };

        if self.verify_against(secret, &profile.credential_hash).await? {
            if self.hasher.needs_rehash(&profile.credential_hash) {
                debug!(profile_id = %profile.id, "Credential hash uses outdated parameters");
            }
            info!(profile_id = %profile.id, "Authentication succeeded");
            Ok(AuthOutcome::Authenticated(profile))
        } else {
            info!(profile_id = %profile.id, "Authentication failed");
            Ok(AuthOutcome::InvalidCredential)
        }
    }

    /// Check a secret against one profile's stored credential
    pub async fn verify_secret(&self, id: &ProfileId, secret: &str) -> Result<bool, DirectoryError> {
        let profile = self.store.get_by_id(id).await?;
        self.verify_against(secret, &profile.credential_hash).await
    }

    /// Look up a profile by id
    pub async fn get(&self, id: &ProfileId) -> Result<Profile, DirectoryError> {
        self.store.get_by_id(id).await
    }

    /// Exact-match lookup by email
    pub async fn get_by_email(&self, email: &str) -> Result<Profile, DirectoryError> {
        self.store.get_by_email(email).await
    }

    /// All live profiles, oldest first
    pub async fn list(&self) -> Vec<Profile> {
        self.store.list().await
    }

    /// Delete a profile and its history
    ///
    /// History goes first, so a failure part way never leaves entries
    /// pointing at a missing profile.
    #[instrument(skip_all, fields(profile_id = %id))]
    pub async fn remove(&self, id: &ProfileId) -> Result<(), DirectoryError> {
        let _gate = self.write_gate.lock().await;

        self.store.get_by_id(id).await?;
        let removed_entries = self.history.delete_all_for_profile(id).await?;
        self.store.delete(id).await?;

        info!(profile_id = %id, removed_entries, "Profile removed");
        Ok(())
    }

    /// History of a profile, most recent first
    pub async fn history(&self, id: &ProfileId) -> Result<Vec<HistoryEntry>, DirectoryError> {
        self.store.get_by_id(id).await?;
        Ok(self.history.list_by_profile(id).await)
    }

    /// History of a profile with each snapshot decoded
    pub async fn history_snapshots(
        &self,
        id: &ProfileId,
    ) -> Result<Vec<(HistoryEntry, ProfileSnapshot)>, DirectoryError> {
        self.history(id)
            .await?
            .into_iter()
            .map(|entry| {
                let snapshot = entry.snapshot()?;
                Ok((entry, snapshot))
            })
            .collect()
    }

    /// Number of successful updates of a profile
    pub async fn update_count(&self, id: &ProfileId) -> Result<u64, DirectoryError> {
        Ok(self.store.get_by_id(id).await?.update_count)
    }
}
