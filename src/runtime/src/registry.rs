//! Instance registry - the single owner of instance records.
//!
//! Records live in a sharded map so operations on different instances do
//! not contend. Every mutation goes through [`InstanceRegistry::compare_and_swap`],
//! which checks the caller's expected version and bumps it atomically.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::RwLock;

use harness_core::error::{HarnessError, Result};
use harness_core::instance::{Instance, InstanceId, InstanceState};

/// Thread-safe store of instance records.
pub struct InstanceRegistry {
    records: DashMap<InstanceId, Instance>,
    /// Writers hold this shared; `list` holds it exclusively so a snapshot
    /// never straddles a mutation.
    snapshot_gate: RwLock<()>,
}

impl InstanceRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            snapshot_gate: RwLock::new(()),
        }
    }

    /// Insert a new record.
    pub fn put(&self, instance: Instance) -> Result<()> {
        let _gate = self.snapshot_gate.read();
        match self.records.entry(instance.id.clone()) {
            Entry::Occupied(entry) => Err(HarnessError::DuplicateId(entry.key().to_string())),
            Entry::Vacant(entry) => {
                entry.insert(instance);
                Ok(())
            }
        }
    }

    /// Current record for `id`.
    pub fn get(&self, id: &InstanceId) -> Result<Instance> {
        self.records
            .get(id)
            .map(|record| record.value().clone())
            .ok_or_else(|| HarnessError::NotFound(id.to_string()))
    }

    /// Snapshot of all records, oldest first.
    pub fn list(&self) -> Snapshot {
        let mut items: Vec<Instance> = {
            let _gate = self.snapshot_gate.write();
            self.records.iter().map(|r| r.value().clone()).collect()
        };
        items.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        Snapshot {
            items: items.into(),
        }
    }

    /// Apply `mutator` if the record is still at `expected_version`.
    ///
    /// The mutator works on a copy; the registry then bumps `version` and
    /// `updated_at` and commits. Mutators may not change `id` or `config`,
    /// and a state change must be an edge of the lifecycle state machine.
    pub fn compare_and_swap<F>(
        &self,
        id: &InstanceId,
        expected_version: u64,
        mutator: F,
    ) -> Result<Instance>
    where
        F: FnOnce(&mut Instance),
    {
        let _gate = self.snapshot_gate.read();
        let mut record = self
            .records
            .get_mut(id)
            .ok_or_else(|| HarnessError::NotFound(id.to_string()))?;
        let current = record.value_mut();

        if current.version != expected_version {
            return Err(HarnessError::VersionConflict {
                id: id.to_string(),
                expected: expected_version,
                actual: current.version,
            });
        }

        let mut next = current.clone();
        mutator(&mut next);

        if next.id != current.id {
            return Err(HarnessError::internal(format!(
                "mutation of {} attempted to change its id",
                id
            )));
        }
        if next.config != current.config {
            return Err(HarnessError::internal(format!(
                "mutation of {} attempted to change its config",
                id
            )));
        }
        if next.state != current.state && !current.state.can_transition_to(next.state) {
            return Err(HarnessError::internal(format!(
                "mutation of {} attempted illegal transition {} -> {}",
                id, current.state, next.state
            )));
        }

        next.version = expected_version + 1;
        next.updated_at = Utc::now();
        *current = next.clone();
        Ok(next)
    }

    /// Remove a record.
    pub fn delete(&self, id: &InstanceId) -> Result<Instance> {
        let _gate = self.snapshot_gate.read();
        self.records
            .remove(id)
            .map(|(_, instance)| instance)
            .ok_or_else(|| HarnessError::NotFound(id.to_string()))
    }

    /// Remove `Terminated` records that were terminated at or before `cutoff`.
    pub fn reap_terminated(&self, cutoff: DateTime<Utc>) -> Vec<Instance> {
        let _gate = self.snapshot_gate.read();
        let mut reaped = Vec::new();
        self.records.retain(|_, instance| {
            let expired = instance.state == InstanceState::Terminated
                && instance.terminated_at.map_or(false, |at| at <= cutoff);
            if expired {
                reaped.push(instance.clone());
            }
            !expired
        });
        reaped
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the registry holds no records.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for InstanceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time view of the registry.
///
/// Cheap to clone; every iteration starts over from the same records.
#[derive(Debug, Clone)]
pub struct Snapshot {
    items: Arc<[Instance]>,
}

impl Snapshot {
    /// Iterate over the records.
    pub fn iter(&self) -> std::slice::Iter<'_, Instance> {
        self.items.iter()
    }

    /// Number of records in the snapshot.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the snapshot is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Copy the records out.
    pub fn to_vec(&self) -> Vec<Instance> {
        self.items.to_vec()
    }
}

impl<'a> IntoIterator for &'a Snapshot {
    type Item = &'a Instance;
    type IntoIter = std::slice::Iter<'a, Instance>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

impl IntoIterator for Snapshot {
    type Item = Instance;
    type IntoIter = SnapshotIter;

    fn into_iter(self) -> Self::IntoIter {
        SnapshotIter {
            items: self.items,
            pos: 0,
        }
    }
}

/// Owning iterator over a [`Snapshot`].
pub struct SnapshotIter {
    items: Arc<[Instance]>,
    pos: usize,
}

impl Iterator for SnapshotIter {
    type Item = Instance;

    fn next(&mut self) -> Option<Instance> {
        let item = self.items.get(self.pos)?.clone();
        self.pos += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.items.len() - self.pos;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for SnapshotIter {}

#[cfg(test)]
mod tests {
    use super::*;
    use harness_core::config::InstanceConfig;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn record(id: &str) -> Instance {
        Instance::pending(InstanceId::from(id), InstanceConfig::new(1, 512))
    }

    #[test]
    fn test_put_and_get() {
        let registry = InstanceRegistry::new();
        registry.put(record("i-1")).unwrap();

        let instance = registry.get(&InstanceId::from("i-1")).unwrap();
        assert_eq!(instance.state, InstanceState::Pending);
        assert_eq!(instance.version, 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_put_duplicate() {
        let registry = InstanceRegistry::new();
        registry.put(record("i-1")).unwrap();

        let err = registry.put(record("i-1")).unwrap_err();
        assert!(matches!(err, HarnessError::DuplicateId(_)));
    }

    #[test]
    fn test_get_missing() {
        let registry = InstanceRegistry::new();
        let err = registry.get(&InstanceId::from("missing")).unwrap_err();
        assert!(matches!(err, HarnessError::NotFound(_)));
    }

    #[test]
    fn test_cas_bumps_version() {
        let registry = InstanceRegistry::new();
        registry.put(record("i-1")).unwrap();
        let id = InstanceId::from("i-1");

        let updated = registry
            .compare_and_swap(&id, 1, |i| i.state = InstanceState::Running)
            .unwrap();
        assert_eq!(updated.version, 2);
        assert_eq!(updated.state, InstanceState::Running);
        assert!(updated.updated_at >= updated.created_at);
        assert_eq!(registry.get(&id).unwrap().version, 2);
    }

    #[test]
    fn test_cas_version_conflict() {
        let registry = InstanceRegistry::new();
        registry.put(record("i-1")).unwrap();
        let id = InstanceId::from("i-1");
        registry
            .compare_and_swap(&id, 1, |i| i.state = InstanceState::Running)
            .unwrap();

        let err = registry
            .compare_and_swap(&id, 1, |i| i.state = InstanceState::Failed)
            .unwrap_err();
        match err {
            HarnessError::VersionConflict {
                expected, actual, ..
            } => {
                assert_eq!(expected, 1);
                assert_eq!(actual, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(registry.get(&id).unwrap().state, InstanceState::Running);
    }

    #[test]
    fn test_cas_missing() {
        let registry = InstanceRegistry::new();
        let err = registry
            .compare_and_swap(&InstanceId::from("missing"), 1, |_| {})
            .unwrap_err();
        assert!(matches!(err, HarnessError::NotFound(_)));
    }

    #[test]
    fn test_cas_rejects_id_change() {
        let registry = InstanceRegistry::new();
        registry.put(record("i-1")).unwrap();
        let id = InstanceId::from("i-1");

        let err = registry
            .compare_and_swap(&id, 1, |i| i.id = InstanceId::from("i-2"))
            .unwrap_err();
        assert!(matches!(err, HarnessError::InternalInvariant(_)));
        assert_eq!(registry.get(&id).unwrap().version, 1);
    }

    #[test]
    fn test_cas_rejects_config_change() {
        let registry = InstanceRegistry::new();
        registry.put(record("i-1")).unwrap();
        let id = InstanceId::from("i-1");

        let err = registry
            .compare_and_swap(&id, 1, |i| i.config.cpus = 8)
            .unwrap_err();
        assert!(matches!(err, HarnessError::InternalInvariant(_)));
    }

    #[test]
    fn test_cas_rejects_illegal_transition() {
        let registry = InstanceRegistry::new();
        registry.put(record("i-1")).unwrap();
        let id = InstanceId::from("i-1");

        let err = registry
            .compare_and_swap(&id, 1, |i| i.state = InstanceState::Terminated)
            .unwrap_err();
        assert!(matches!(err, HarnessError::InternalInvariant(_)));
        let current = registry.get(&id).unwrap();
        assert_eq!(current.state, InstanceState::Pending);
        assert_eq!(current.version, 1);
    }

    #[test]
    fn test_terminated_record_stays_terminated() {
        let registry = InstanceRegistry::new();
        registry.put(record("i-1")).unwrap();
        let id = InstanceId::from("i-1");

        registry
            .compare_and_swap(&id, 1, |i| i.state = InstanceState::Running)
            .unwrap();
        registry
            .compare_and_swap(&id, 2, |i| i.state = InstanceState::Terminated)
            .unwrap();

        for next in InstanceState::ALL {
            if next == InstanceState::Terminated {
                continue;
            }
            let err = registry
                .compare_and_swap(&id, 3, |i| i.state = next)
                .unwrap_err();
            assert!(matches!(err, HarnessError::InternalInvariant(_)));
        }
        assert_eq!(registry.get(&id).unwrap().state, InstanceState::Terminated);
    }

    #[test]
    fn test_cas_same_state_is_allowed() {
        let registry = InstanceRegistry::new();
        registry.put(record("i-1")).unwrap();
        let id = InstanceId::from("i-1");

        let updated = registry
            .compare_and_swap(&id, 1, |i| i.last_error = Some("note".to_string()))
            .unwrap();
        assert_eq!(updated.state, InstanceState::Pending);
        assert_eq!(updated.version, 2);
    }

    #[test]
    fn test_cas_ignores_mutator_version_writes() {
        let registry = InstanceRegistry::new();
        registry.put(record("i-1")).unwrap();
        let id = InstanceId::from("i-1");

        let updated = registry.compare_and_swap(&id, 1, |i| i.version = 100).unwrap();
        assert_eq!(updated.version, 2);
    }

    #[test]
    fn test_concurrent_cas_single_winner() {
        let registry = InstanceRegistry::new();
        registry.put(record("i-1")).unwrap();
        let id = InstanceId::from("i-1");
        let wins = AtomicUsize::new(0);

        std::thread::scope(|scope| {
            for _ in 0..8 {
                scope.spawn(|| {
                    if registry
                        .compare_and_swap(&id, 1, |i| i.state = InstanceState::Running)
                        .is_ok()
                    {
                        wins.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(wins.load(Ordering::SeqCst), 1);
        assert_eq!(registry.get(&id).unwrap().version, 2);
    }

    #[test]
    fn test_delete() {
        let registry = InstanceRegistry::new();
        registry.put(record("i-1")).unwrap();
        let id = InstanceId::from("i-1");

        let removed = registry.delete(&id).unwrap();
        assert_eq!(removed.id, id);
        assert!(registry.is_empty());
        assert!(matches!(
            registry.delete(&id),
            Err(HarnessError::NotFound(_))
        ));
    }

    #[test]
    fn test_list_is_a_snapshot() {
        let registry = InstanceRegistry::new();
        registry.put(record("i-1")).unwrap();
        registry.put(record("i-2")).unwrap();

        let snapshot = registry.list();
        registry.put(record("i-3")).unwrap();
        registry
            .compare_and_swap(&InstanceId::from("i-1"), 1, |i| {
                i.state = InstanceState::Running
            })
            .unwrap();

        assert_eq!(snapshot.len(), 2);
        assert!(snapshot
            .iter()
            .all(|i| i.state == InstanceState::Pending));
        assert_eq!(registry.list().len(), 3);
    }

    #[test]
    fn test_snapshot_is_restartable() {
        let registry = InstanceRegistry::new();
        registry.put(record("i-1")).unwrap();
        registry.put(record("i-2")).unwrap();

        let snapshot = registry.list();
        let first: Vec<InstanceId> = snapshot.iter().map(|i| i.id.clone()).collect();
        let second: Vec<InstanceId> = (&snapshot).into_iter().map(|i| i.id.clone()).collect();
        let owned: Vec<InstanceId> = snapshot.clone().into_iter().map(|i| i.id).collect();
        assert_eq!(first, second);
        assert_eq!(first, owned);
    }

    #[test]
    fn test_list_ordered_by_creation() {
        let registry = InstanceRegistry::new();
        let mut older = record("b");
        older.created_at = Utc::now() - chrono::Duration::seconds(10);
        registry.put(record("a")).unwrap();
        registry.put(older).unwrap();

        let ids: Vec<String> = registry
            .list()
            .into_iter()
            .map(|i| i.id.to_string())
            .collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_reap_terminated() {
        let registry = InstanceRegistry::new();
        let now = Utc::now();

        let mut old = record("old");
        old.state = InstanceState::Terminated;
        old.terminated_at = Some(now - chrono::Duration::seconds(120));
        let mut fresh = record("fresh");
        fresh.state = InstanceState::Terminated;
        fresh.terminated_at = Some(now);
        let mut failed = record("failed");
        failed.state = InstanceState::Failed;

        registry.put(old).unwrap();
        registry.put(fresh).unwrap();
        registry.put(failed).unwrap();
        registry.put(record("pending")).unwrap();

        let reaped: Vec<InstanceId> = registry
            .reap_terminated(now - chrono::Duration::seconds(60))
            .into_iter()
            .map(|i| i.id)
            .collect();
        assert_eq!(reaped, vec![InstanceId::from("old")]);
        assert_eq!(registry.len(), 3);
    }
}
