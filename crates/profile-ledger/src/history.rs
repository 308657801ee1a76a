//! Append-only ledger of profile snapshots

use crate::error::DirectoryError;
use crate::model::{HistoryEntry, ProfileId};
use crate::storage::StorageBackend;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Backend namespace holding one record per history entry
pub const HISTORY_NAMESPACE: &str = "history";

fn record_name(profile_id: &ProfileId, sequence_number: u64) -> String {
    format!("{profile_id}_{sequence_number:020}")
}

fn parse_record_name(name: &str) -> Option<(ProfileId, u64)> {
    let (id, sequence) = name.rsplit_once('_')?;
    Some((id.parse().ok()?, sequence.parse().ok()?))
}

/// Most recent first: `recorded_at` descending, then `sequence_number` descending
fn newest_first(a: &HistoryEntry, b: &HistoryEntry) -> std::cmp::Ordering {
    b.recorded_at
        .cmp(&a.recorded_at)
        .then(b.sequence_number.cmp(&a.sequence_number))
}

/// Append-only store of history entries keyed by profile
///
/// Entries are never modified. The only removal path is
/// [`HistoryLog::delete_all_for_profile`], used when a profile is removed.
#[derive(Debug)]
pub struct HistoryLog {
    backend: Arc<dyn StorageBackend>,
    ledger: RwLock<HashMap<ProfileId, Vec<HistoryEntry>>>,
}

impl HistoryLog {
    /// Open the log and load every persisted entry
    pub async fn open(backend: Arc<dyn StorageBackend>) -> Result<Self, DirectoryError> {
        let log = Self {
            backend,
            ledger: RwLock::new(HashMap::new()),
        };
        log.load_all().await?;
        Ok(log)
    }

    async fn load_all(&self) -> Result<(), DirectoryError> {
        let names = self.backend.list(HISTORY_NAMESPACE).await?;
        let mut ledger = self.ledger.write().await;
        let mut loaded_count = 0usize;

        for name in names {
            let Some((profile_id, sequence_number)) = parse_record_name(&name) else {
                warn!(record = %name, "Skipping history record with malformed name");
                continue;
            };
            let entry = match self.backend.read(HISTORY_NAMESPACE, &name).await {
                Ok(Some(json)) => match serde_json::from_str::<HistoryEntry>(&json) {
                    Ok(entry) => entry,
                    Err(e) => {
                        warn!(record = %name, error = %e, "Skipping unparseable history record");
                        continue;
                    }
                },
                Ok(None) => continue,
                Err(e) => {
                    warn!(record = %name, error = %e, "Failed to read history record");
                    continue;
                }
            };
            if entry.profile_id != profile_id || entry.sequence_number != sequence_number {
                warn!(record = %name, "History record does not match its name");
                continue;
            }
            ledger.entry(profile_id).or_default().push(entry);
            loaded_count += 1;
        }

        for entries in ledger.values_mut() {
            entries.sort_by_key(|e| e.sequence_number);
        }

        info!(loaded = loaded_count, "History loading completed");
        Ok(())
    }

    /// Append an immutable entry
    ///
    /// `sequence_number` must be strictly greater than the last one recorded
    /// for the profile.
    pub async fn append(
        &self,
        profile_id: ProfileId,
        snapshot_json: String,
        credential_hash_at_time: String,
        sequence_number: u64,
    ) -> Result<HistoryEntry, DirectoryError> {
        let mut ledger = self.ledger.write().await;

        let last = ledger
            .get(&profile_id)
            .and_then(|entries| entries.last())
            .map(|e| e.sequence_number);
        if let Some(last) = last
            && sequence_number <= last
        {
            return Err(DirectoryError::OutOfOrderHistory {
                profile_id,
                last,
                attempted: sequence_number,
            });
        }

        let entry = HistoryEntry {
            profile_id,
            snapshot_json,
            credential_hash_at_time,
            sequence_number,
            recorded_at: Utc::now(),
        };

        let json = serde_json::to_string_pretty(&entry)?;
        self.backend
            .write(
                HISTORY_NAMESPACE,
                &record_name(&profile_id, sequence_number),
                &json,
            )
            .await?;

        ledger.entry(profile_id).or_default().push(entry.clone());

        debug!(profile_id = %profile_id, sequence_number, "History entry appended");
        Ok(entry)
    }

    /// Entries for a profile, most recent first
    pub async fn list_by_profile(&self, profile_id: &ProfileId) -> Vec<HistoryEntry> {
        let ledger = self.ledger.read().await;
        let mut entries = ledger.get(profile_id).cloned().unwrap_or_default();
        entries.sort_by(newest_first);
        entries
    }

    /// Highest sequence number recorded for a profile
    pub async fn latest_sequence(&self, profile_id: &ProfileId) -> Option<u64> {
        let ledger = self.ledger.read().await;
        ledger
            .get(profile_id)
            .and_then(|entries| entries.last())
            .map(|e| e.sequence_number)
    }

    /// Number of entries recorded for a profile
    pub async fn count(&self, profile_id: &ProfileId) -> usize {
        let ledger = self.ledger.read().await;
        ledger.get(profile_id).map_or(0, Vec::len)
    }

    /// Remove every entry of a profile; returns how many were removed
    ///
    /// # Error Recovery
    ///
    /// On a backend failure the entries not yet deleted stay in the log, so
    /// the call can be retried.
    pub async fn delete_all_for_profile(
        &self,
        profile_id: &ProfileId,
    ) -> Result<usize, DirectoryError> {
        let mut ledger = self.ledger.write().await;
        let Some(entries) = ledger.remove(profile_id) else {
            return Ok(0);
        };

        let mut remaining = entries.into_iter();
        let mut removed = 0usize;
        while let Some(entry) = remaining.next() {
            let name = record_name(profile_id, entry.sequence_number);
            if let Err(e) = self.backend.delete(HISTORY_NAMESPACE, &name).await {
                let mut kept = vec![entry];
                kept.extend(remaining);
                ledger.insert(*profile_id, kept);
                return Err(e.into());
            }
            removed += 1;
        }

        info!(profile_id = %profile_id, removed, "History deleted");
        Ok(removed)
    }

    /// Remove the entries of a profile numbered above `keep_through`;
    /// returns how many were removed
    ///
    /// Entries go newest first, so a failure part way leaves a dense prefix
    /// plus whatever has not been removed yet.
    pub async fn truncate_after(
        &self,
        profile_id: &ProfileId,
        keep_through: u64,
    ) -> Result<usize, DirectoryError> {
        let mut ledger = self.ledger.write().await;
        let Some(entries) = ledger.get_mut(profile_id) else {
            return Ok(0);
        };

        let mut removed = 0usize;
        while let Some(entry) = entries.last() {
            if entry.sequence_number <= keep_through {
                break;
            }
            let name = record_name(profile_id, entry.sequence_number);
            self.backend.delete(HISTORY_NAMESPACE, &name).await?;
            entries.pop();
            removed += 1;
        }

        if entries.is_empty() {
            ledger.remove(profile_id);
        }
        if removed > 0 {
            debug!(profile_id = %profile_id, keep_through, removed, "History truncated");
        }
        Ok(removed)
    }

    /// Profiles with at least one entry
    pub async fn profile_ids(&self) -> Vec<ProfileId> {
        let ledger = self.ledger.read().await;
        ledger.keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn must<T, E: std::fmt::Debug>(r: std::result::Result<T, E>) -> T {
        r.expect("operation should succeed")
    }

    async fn create_test_log() -> (HistoryLog, Arc<MemoryStorage>) {
        let backend = Arc::new(MemoryStorage::new());
        let log = must(HistoryLog::open(backend.clone()).await);
        (log, backend)
    }

    #[test]
    fn test_record_name_round_trip() {
        let id = ProfileId::generate();
        let name = record_name(&id, 42);
        assert_eq!(parse_record_name(&name), Some((id, 42)));
        assert_eq!(parse_record_name("garbage"), None);
        assert_eq!(parse_record_name("garbage_12"), None);
    }

    #[tokio::test]
    async fn test_append_and_list_newest_first() {
        let (log, backend) = create_test_log().await;
        let id = ProfileId::generate();

        for seq in 1..=3 {
            must(
                log.append(id, format!("{{\"n\":{seq}}}"), "hash".to_string(), seq)
                    .await,
            );
        }

        let entries = log.list_by_profile(&id).await;
        let sequences: Vec<u64> = entries.iter().map(|e| e.sequence_number).collect();
        assert_eq!(sequences, vec![3, 2, 1]);
        assert_eq!(log.latest_sequence(&id).await, Some(3));
        assert_eq!(log.count(&id).await, 3);
        assert_eq!(backend.len().await, 3);
    }

    #[test]
    fn test_ties_break_by_sequence() {
        let id = ProfileId::generate();
        let at = Utc::now();
        let entry = |seq| HistoryEntry {
            profile_id: id,
            snapshot_json: "{}".to_string(),
            credential_hash_at_time: "hash".to_string(),
            sequence_number: seq,
            recorded_at: at,
        };

        let mut entries = vec![entry(1), entry(3), entry(2)];
        entries.sort_by(newest_first);
        let sequences: Vec<u64> = entries.iter().map(|e| e.sequence_number).collect();
        assert_eq!(sequences, vec![3, 2, 1]);
    }

    #[tokio::test]
    async fn test_append_rejects_non_increasing_sequence() {
        let (log, _backend) = create_test_log().await;
        let id = ProfileId::generate();

        must(log.append(id, "{}".to_string(), "hash".to_string(), 1).await);
        let result = log.append(id, "{}".to_string(), "hash".to_string(), 1).await;

        assert!(matches!(
            result,
            Err(DirectoryError::OutOfOrderHistory { last: 1, attempted: 1, .. })
        ));
        assert_eq!(log.count(&id).await, 1);
    }

    #[tokio::test]
    async fn test_profiles_are_independent() {
        let (log, _backend) = create_test_log().await;
        let a = ProfileId::generate();
        let b = ProfileId::generate();

        must(log.append(a, "{}".to_string(), "hash".to_string(), 1).await);
        must(log.append(b, "{}".to_string(), "hash".to_string(), 1).await);

        assert_eq!(log.count(&a).await, 1);
        assert_eq!(log.count(&b).await, 1);
        assert!(log.list_by_profile(&ProfileId::generate()).await.is_empty());
    }

    #[tokio::test]
    async fn test_delete_all_for_profile() {
        let (log, backend) = create_test_log().await;
        let a = ProfileId::generate();
        let b = ProfileId::generate();
        for seq in 1..=2 {
            must(log.append(a, "{}".to_string(), "hash".to_string(), seq).await);
        }
        must(log.append(b, "{}".to_string(), "hash".to_string(), 1).await);

        assert_eq!(must(log.delete_all_for_profile(&a).await), 2);
        assert_eq!(must(log.delete_all_for_profile(&a).await), 0);

        assert!(log.list_by_profile(&a).await.is_empty());
        assert_eq!(log.count(&b).await, 1);
        assert_eq!(backend.len().await, 1);
    }

    #[tokio::test]
    async fn test_truncate_after_drops_newer_entries() {
        let (log, backend) = create_test_log().await;
        let id = ProfileId::generate();
        for seq in 1..=4 {
            must(log.append(id, "{}".to_string(), "hash".to_string(), seq).await);
        }

        assert_eq!(must(log.truncate_after(&id, 2).await), 2);
        assert_eq!(must(log.truncate_after(&id, 2).await), 0);
        assert_eq!(log.latest_sequence(&id).await, Some(2));
        assert_eq!(backend.len().await, 2);

        must(log.append(id, "{}".to_string(), "hash".to_string(), 3).await);
        assert_eq!(log.latest_sequence(&id).await, Some(3));

        assert_eq!(must(log.truncate_after(&id, 0).await), 3);
        assert!(log.profile_ids().await.is_empty());
        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn test_profile_ids_lists_owners() {
        let (log, _backend) = create_test_log().await;
        let a = ProfileId::generate();
        let b = ProfileId::generate();
        must(log.append(a, "{}".to_string(), "hash".to_string(), 1).await);
        must(log.append(b, "{}".to_string(), "hash".to_string(), 1).await);

        let mut ids = log.profile_ids().await;
        ids.sort();
        let mut expected = vec![a, b];
        expected.sort();
        assert_eq!(ids, expected);
    }

    #[tokio::test]
    async fn test_reopen_restores_order() {
        let backend = Arc::new(MemoryStorage::new());
        let id = ProfileId::generate();
        {
            let log = must(HistoryLog::open(backend.clone()).await);
            for seq in 1..=12 {
                must(log.append(id, "{}".to_string(), "hash".to_string(), seq).await);
            }
        }

        let reopened = must(HistoryLog::open(backend).await);
        assert_eq!(reopened.latest_sequence(&id).await, Some(12));
        assert_eq!(reopened.count(&id).await, 12);

        let result = reopened
            .append(id, "{}".to_string(), "hash".to_string(), 12)
            .await;
        assert!(result.is_err());
    }
}
