//! Typed side channel between tools and post-processing hooks.
//!
//! Every slot exists from the start of a run, so readers never have to
//! distinguish "missing" from "empty".

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::memory::Memory;
use crate::retrieval::RetrievedChunk;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScratchKind {
    LectureContent,
    Faqs,
    AccessedMemories,
}

impl ScratchKind {
    pub const ALL: [ScratchKind; 3] = [Self::LectureContent, Self::Faqs, Self::AccessedMemories];
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScratchEntry {
    Chunk(RetrievedChunk),
    Memory(Memory),
}

/// Shared handle; clones see the same slots.
#[derive(Debug, Clone)]
pub struct Scratchpad {
    slots: Arc<Mutex<HashMap<ScratchKind, Vec<ScratchEntry>>>>,
}

impl Scratchpad {
    pub fn new() -> Self {
        let slots = ScratchKind::ALL.iter().map(|k| (*k, Vec::new())).collect();
        Self {
            slots: Arc::new(Mutex::new(slots)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ScratchKind, Vec<ScratchEntry>>> {
        // Entries are plain data; a poisoned lock still holds a consistent map.
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn push(&self, kind: ScratchKind, entry: ScratchEntry) {
        self.lock().entry(kind).or_default().push(entry);
    }

    pub fn extend(&self, kind: ScratchKind, entries: impl IntoIterator<Item = ScratchEntry>) {
        self.lock().entry(kind).or_default().extend(entries);
    }

    pub fn is_empty(&self, kind: ScratchKind) -> bool {
        self.lock().get(&kind).is_none_or(Vec::is_empty)
    }

    pub fn chunks(&self, kind: ScratchKind) -> Vec<RetrievedChunk> {
        self.lock()
            .get(&kind)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|e| match e {
                        ScratchEntry::Chunk(c) => Some(c.clone()),
                        ScratchEntry::Memory(_) => None,
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Memories in a slot, first occurrence wins on duplicate ids.
    pub fn memories(&self, kind: ScratchKind) -> Vec<Memory> {
        let guard = self.lock();
        let mut seen = std::collections::HashSet::new();
        guard
            .get(&kind)
            .into_iter()
            .flatten()
            .filter_map(|e| match e {
                ScratchEntry::Memory(m) if seen.insert(m.id) => Some(m.clone()),
                _ => None,
            })
            .collect()
    }
}

impl Default for Scratchpad {
    fn default() -> Self {
        Self::new()
    }
}
