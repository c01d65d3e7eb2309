// Deep merge of an incoming record into an existing one.
//
// Rules are tried in order, first match wins:
//   1. identical values        -> unchanged
//   2. object + object         -> recurse key-wise, new keys added
//   3. list + list             -> append non-equivalent items, merge by identity
//   4. counter field           -> larger number
//   5. ignored field           -> keep existing
//   6. numeric-string pair     -> numeric form
//   7. null on one side        -> the non-null value
//   8. anything else           -> MergeConflict, existing value kept

use std::cmp::Ordering;

use tweetvault_common::value::compare_numbers;
use tweetvault_common::{MergePolicy, Value};

/// Two leaf values that cannot be reconciled. The existing value stays in
/// place; merging of every other field continues.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("merge conflict at {path}: existing {existing} vs incoming {incoming}")]
pub struct MergeConflict {
    pub path: String,
    pub existing: Value,
    pub incoming: Value,
}

pub struct MergeEngine {
    policy: MergePolicy,
}

impl MergeEngine {
    pub fn new(policy: MergePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &MergePolicy {
        &self.policy
    }

    /// Merge `incoming` into `existing`, returning every field that could not
    /// be reconciled.
    pub fn merge(&self, existing: &mut Value, incoming: Value) -> Vec<MergeConflict> {
        let mut conflicts = Vec::new();
        self.merge_at(existing, incoming, "", None, &mut conflicts);
        conflicts
    }

    /// Identity of an object under the policy's identity field.
    pub fn identity_of(&self, value: &Value) -> Option<String> {
        value.get(&self.policy.identity_field)?.to_identity()
    }

    fn merge_at(
        &self,
        existing: &mut Value,
        incoming: Value,
        path: &str,
        field: Option<&str>,
        conflicts: &mut Vec<MergeConflict>,
    ) {
        if *existing == incoming {
            return;
        }

        match (existing, incoming) {
            (Value::Object(ours), Value::Object(theirs)) => {
                for (key, value) in theirs {
                    let child = join_path(path, &key);
                    match ours.get_mut(&key) {
                        // Noisy fields keep whatever is stored, containers included.
                        Some(_) if self.policy.ignored_fields.contains(&key) => {}
                        Some(slot) => self.merge_at(slot, value, &child, Some(&key), conflicts),
                        None => {
                            ours.insert(key, value);
                        }
                    }
                }
            }
            (Value::List(ours), Value::List(theirs)) => {
                self.merge_lists(ours, theirs, path, conflicts);
            }
            (ours, theirs) => self.merge_leaf(ours, theirs, path, field, conflicts),
        }
    }

    fn merge_lists(
        &self,
        ours: &mut Vec<Value>,
        theirs: Vec<Value>,
        path: &str,
        conflicts: &mut Vec<MergeConflict>,
    ) {
        for item in theirs {
            if let Some(id) = self.identity_of(&item) {
                let position = ours
                    .iter()
                    .position(|existing| self.identity_of(existing).as_deref() == Some(id.as_str()));
                if let Some(index) = position {
                    let child = format!("{path}[{index}]");
                    self.merge_at(&mut ours[index], item, &child, None, conflicts);
                    continue;
                }
            }
            if ours.iter().any(|existing| existing.equivalent(&item)) {
                continue;
            }
            ours.push(item);
        }
    }

    fn merge_leaf(
        &self,
        ours: &mut Value,
        theirs: Value,
        path: &str,
        field: Option<&str>,
        conflicts: &mut Vec<MergeConflict>,
    ) {
        if let Some(name) = field {
            if self.policy.counter_fields.contains(name) {
                if let (Some(a), Some(b)) = (ours.to_number(), theirs.to_number()) {
                    let larger = match compare_numbers(&a, &b) {
                        Ordering::Less => b,
                        _ => a,
                    };
                    *ours = Value::Number(larger);
                    return;
                }
            }
            if self.policy.ignored_fields.contains(name) {
                return;
            }
        }

        if ours.numeric_string_equivalent(&theirs) {
            if let Value::String(_) = ours {
                *ours = theirs;
            }
            return;
        }

        if theirs.is_null() {
            return;
        }
        if ours.is_null() {
            *ours = theirs;
            return;
        }

        conflicts.push(MergeConflict {
            path: path.to_string(),
            existing: ours.clone(),
            incoming: theirs,
        });
    }
}

fn join_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}
