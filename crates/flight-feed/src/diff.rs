// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Snapshot storage and stable-id diffing.
//!
//! Each fetch cycle produces a [`Snapshot`]. [`diff`] compares two snapshots
//! by entity id and yields the [`DiffOperation`]s a renderer needs to turn
//! the first into the second. Operations within one batch touch distinct ids,
//! so they can be applied in any order.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use log::{debug, warn};

use crate::protocol::Entity;

/// The entity set produced by one fetch cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// When the fetch completed.
    pub fetched_at: DateTime<Utc>,
    entities: HashMap<String, Entity>,
}

impl Snapshot {
    /// An empty snapshot.
    #[must_use]
    pub fn empty(fetched_at: DateTime<Utc>) -> Self {
        Self {
            fetched_at,
            entities: HashMap::new(),
        }
    }

    /// Build a snapshot, keeping the last entity seen for a repeated id.
    pub fn from_entities(fetched_at: DateTime<Utc>, entities: impl IntoIterator<Item = Entity>) -> Self {
        let mut map = HashMap::new();
        for entity in entities {
            if let Some(previous) = map.insert(entity.id.clone(), entity) {
                warn!("Duplicate id {} in snapshot, keeping the later record", previous.id);
            }
        }
        Self {
            fetched_at,
            entities: map,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    /// Look up an entity by its (trimmed, case-insensitive) callsign.
    #[must_use]
    pub fn find_by_label(&self, label: &str) -> Option<&Entity> {
        let wanted = label.trim();
        self.entities.values().find(|e| {
            e.label
                .as_deref()
                .is_some_and(|l| l.eq_ignore_ascii_case(wanted))
        })
    }

    /// Apply a batch of operations in place.
    pub fn apply(&mut self, ops: &[DiffOperation]) {
        for op in ops {
            match op {
                DiffOperation::Add(entity) | DiffOperation::Update(entity) => {
                    self.entities.insert(entity.id.clone(), entity.clone());
                }
                DiffOperation::Remove(id) => {
                    self.entities.remove(id);
                }
            }
        }
    }
}

/// One change the renderer must make.
#[derive(Debug, Clone, PartialEq)]
pub enum DiffOperation {
    /// A new entity appeared.
    Add(Entity),
    /// A known entity changed.
    Update(Entity),
    /// An entity is no longer tracked.
    Remove(String),
}

impl DiffOperation {
    /// Id of the entity this operation touches.
    #[must_use]
    pub fn id(&self) -> &str {
        match self {
            Self::Add(entity) | Self::Update(entity) => &entity.id,
            Self::Remove(id) => id,
        }
    }
}

/// Compute the operations that turn `previous` into `next`.
///
/// Entities present in both whose rendered fields are bit-equal produce no
/// operation.
#[must_use]
pub fn diff(previous: &Snapshot, next: &Snapshot) -> Vec<DiffOperation> {
    let mut ops = Vec::new();

    for (id, entity) in &next.entities {
        match previous.entities.get(id) {
            None => ops.push(DiffOperation::Add(entity.clone())),
            Some(old) if !old.render_eq(entity) => ops.push(DiffOperation::Update(entity.clone())),
            Some(_) => {}
        }
    }

    for id in previous.entities.keys() {
        if !next.entities.contains_key(id) {
            ops.push(DiffOperation::Remove(id.clone()));
        }
    }

    ops
}

/// Counts of each operation kind in a batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffSummary {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
}

impl DiffSummary {
    #[must_use]
    pub fn of(ops: &[DiffOperation]) -> Self {
        let mut summary = Self::default();
        for op in ops {
            match op {
                DiffOperation::Add(_) => summary.added += 1,
                DiffOperation::Update(_) => summary.updated += 1,
                DiffOperation::Remove(_) => summary.removed += 1,
            }
        }
        summary
    }
}

/// Holds the last applied snapshot and diffs each new one against it.
#[derive(Debug)]
pub struct SnapshotDiffer {
    applied: Snapshot,
}

impl Default for SnapshotDiffer {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotDiffer {
    #[must_use]
    pub fn new() -> Self {
        Self {
            applied: Snapshot::empty(DateTime::<Utc>::UNIX_EPOCH),
        }
    }

    /// Diff `next` against the last applied snapshot and make it current.
    pub fn advance(&mut self, next: Snapshot) -> Vec<DiffOperation> {
        let ops = diff(&self.applied, &next);
        let summary = DiffSummary::of(&ops);
        debug!(
            "Snapshot diff: {} added, {} updated, {} removed ({} tracked)",
            summary.added,
            summary.updated,
            summary.removed,
            next.len()
        );
        self.applied = next;
        ops
    }

    /// The snapshot the renderer currently reflects.
    #[must_use]
    pub fn current(&self) -> &Snapshot {
        &self.applied
    }
}
