// Owned record store: one canonical record per identity, mutated only
// through `merge` (data + provenance) and `mark` (provenance only).

use std::collections::BTreeMap;

use tracing::warn;
use tweetvault_common::{CanonicalRecord, MergePolicy, Provenance, Value};

use crate::merge::{MergeConflict, MergeEngine};

/// What a single `merge` call did.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    /// The identity was unknown and the record was inserted verbatim.
    pub inserted: bool,
    pub conflicts: Vec<MergeConflict>,
}

pub struct RecordStore {
    records: BTreeMap<String, CanonicalRecord>,
    engine: MergeEngine,
}

impl RecordStore {
    pub fn new(policy: MergePolicy) -> Self {
        Self {
            records: BTreeMap::new(),
            engine: MergeEngine::new(policy),
        }
    }

    /// Rebuild a store from a persisted snapshot.
    pub fn from_snapshot(policy: MergePolicy, snapshot: BTreeMap<String, CanonicalRecord>) -> Self {
        Self {
            records: snapshot,
            engine: MergeEngine::new(policy),
        }
    }

    /// Insert or deep-merge `incoming` under `id`, then absorb `provenance`.
    /// Conflicts are logged and returned; they never abort the merge of the
    /// remaining fields.
    pub fn merge(&mut self, id: &str, incoming: Value, provenance: &Provenance) -> MergeOutcome {
        match self.records.get_mut(id) {
            None => {
                self.records.insert(
                    id.to_string(),
                    CanonicalRecord::new(id, incoming, provenance.clone()),
                );
                MergeOutcome {
                    inserted: true,
                    conflicts: Vec::new(),
                }
            }
            Some(record) => {
                let conflicts = self.engine.merge(&mut record.data, incoming);
                record.provenance.absorb(provenance);
                for conflict in &conflicts {
                    warn!(
                        id,
                        path = %conflict.path,
                        existing = %conflict.existing,
                        incoming = %conflict.incoming,
                        "Merge conflict, keeping existing value"
                    );
                }
                MergeOutcome {
                    inserted: false,
                    conflicts,
                }
            }
        }
    }

    /// Add provenance flags to an existing record. Unknown identities are
    /// ignored; returns whether anything was gained.
    pub fn mark(&mut self, id: &str, provenance: &Provenance) -> bool {
        match self.records.get_mut(id) {
            Some(record) => record.provenance.absorb(provenance),
            None => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<&CanonicalRecord> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &CanonicalRecord> {
        self.records.values()
    }

    /// Identity of a raw record under the store's merge policy.
    pub fn identity_of(&self, value: &Value) -> Option<String> {
        self.engine.identity_of(value)
    }

    pub fn snapshot(&self) -> BTreeMap<String, CanonicalRecord> {
        self.records.clone()
    }
}
