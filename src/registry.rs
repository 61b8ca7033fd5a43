use std::collections::HashMap;

use crate::markers::{self, Definition};
use crate::notebook::Notebook;

/// One canonical bibliographic entry. Two definitions collapse to the same
/// entry iff their texts are equal after `markers::normalize_for_dedup` —
/// never by position or anchor token.
#[derive(Debug, Clone)]
pub struct Reference {
    /// Anchor token the definition was declared under in its origin cell.
    pub anchor: String,
    /// Bracket number used by the origin cell's own numbering.
    pub local_num: u32,
    /// Raw definition text captured at first occurrence. Later duplicates
    /// do not overwrite it.
    pub text: String,
    /// Cell where this textual definition was first recorded.
    pub cell_index: usize,
    /// Document-wide 1-based number, assigned once the full scan is done.
    pub global_num: Option<u32>,
}

/// Per-document registry of canonical references and the per-cell mapping
/// from local citation numbers to them. Built in one full pass, read-only
/// during rewriting, discarded after the run.
#[derive(Debug, Default)]
pub struct RefRegistry {
    /// Canonical references in first-appearance order.
    refs: Vec<Reference>,
    by_normalized: HashMap<String, usize>,
    /// (cell index, local number) -> index into `refs`. Keyed by the
    /// visible bracket number, not the anchor token.
    cell_local: HashMap<(usize, u32), usize>,
}

impl RefRegistry {
    /// Scan all markdown cells in index order and build the registry.
    /// Global numbers are dense, 1-based, in first-appearance order.
    pub fn build(notebook: &Notebook) -> RefRegistry {
        let mut registry = RefRegistry::default();
        for (cell_index, cell) in notebook.cells.iter().enumerate() {
            if !cell.is_markdown() {
                continue;
            }
            for definition in markers::extract_definitions(cell.source()) {
                registry.record(cell_index, definition);
            }
        }
        for (i, reference) in registry.refs.iter_mut().enumerate() {
            reference.global_num = Some(i as u32 + 1);
        }
        registry
    }

    fn record(&mut self, cell_index: usize, definition: Definition) {
        let normalized = markers::normalize_for_dedup(&definition.text);
        let local_num = definition.local_num;
        let idx = match self.by_normalized.get(&normalized) {
            Some(&existing) => existing,
            None => {
                let idx = self.refs.len();
                self.refs.push(Reference {
                    anchor: definition.anchor,
                    local_num: definition.local_num,
                    text: definition.text,
                    cell_index,
                    global_num: None,
                });
                self.by_normalized.insert(normalized, idx);
                idx
            }
        };
        self.cell_local.insert((cell_index, local_num), idx);
    }

    /// Resolve a citation by its cell and local bracket number.
    pub fn global_for(&self, cell_index: usize, local_num: u32) -> Option<u32> {
        self.cell_local
            .get(&(cell_index, local_num))
            .and_then(|&idx| self.refs[idx].global_num)
    }

    pub fn references(&self) -> &[Reference] {
        &self.refs
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }
}
