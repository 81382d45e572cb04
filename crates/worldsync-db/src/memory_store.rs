//! In-memory change form store.
//!
//! Nothing survives a restart. Used by tests and by servers started with
//! `persistence.kind: memory`.

use std::collections::BTreeMap;

use worldsync_types::{ChangeForm, FormDesc};

use crate::error::StoreError;
use crate::storage::{ChangeFormBatch, SaveStorage};

/// Snapshots kept in an ordered map keyed by `formDesc`.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    forms: BTreeMap<FormDesc, ChangeForm>,
    recycled: Option<ChangeFormBatch>,
}

impl InMemoryStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// A store pre-filled with `forms`.
    pub fn with_forms(forms: impl IntoIterator<Item = ChangeForm>) -> Self {
        Self {
            forms: forms
                .into_iter()
                .map(|form| (form.form_desc.clone(), form))
                .collect(),
            recycled: None,
        }
    }

    /// Stored snapshot for `desc`.
    pub fn get(&self, desc: &FormDesc) -> Option<&ChangeForm> {
        self.forms.get(desc)
    }

    /// Number of stored snapshots.
    pub fn len(&self) -> usize {
        self.forms.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.forms.is_empty()
    }
}

impl SaveStorage for InMemoryStore {
    fn upsert(&mut self, mut batch: ChangeFormBatch) -> Result<usize, StoreError> {
        let mut written: usize = 0;
        for form in batch.drain(..).flatten() {
            self.forms.insert(form.form_desc.clone(), form);
            written = written.saturating_add(1);
        }
        self.recycled = Some(batch);
        Ok(written)
    }

    fn iterate(&mut self, visit: &mut dyn FnMut(ChangeForm)) -> Result<(), StoreError> {
        for form in self.forms.values() {
            visit(form.clone());
        }
        Ok(())
    }

    fn recycled_buffer(&mut self) -> Option<ChangeFormBatch> {
        self.recycled.take()
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn form(id: u32) -> ChangeForm {
        ChangeForm {
            form_desc: FormDesc::new(id, "Skyrim.esm"),
            ..ChangeForm::default()
        }
    }

    #[test]
    fn upsert_skips_empty_slots_and_replaces_by_form_desc() {
        let mut store = InMemoryStore::new();
        assert_eq!(store.upsert(vec![Some(form(1)), None, Some(form(2))]).unwrap(), 2);

        let mut updated = form(1);
        updated.is_open = true;
        assert_eq!(store.upsert(vec![Some(updated)]).unwrap(), 1);

        assert_eq!(store.len(), 2);
        assert!(store.get(&FormDesc::new(1, "Skyrim.esm")).unwrap().is_open);
    }

    #[test]
    fn batch_buffer_is_recycled_once() {
        let mut store = InMemoryStore::new();
        let mut batch: ChangeFormBatch = Vec::with_capacity(16);
        batch.extend([Some(form(1))]);
        store.upsert(batch).unwrap();

        let buffer = store.recycled_buffer().unwrap();
        assert!(buffer.is_empty());
        assert!(buffer.capacity() >= 16);
        assert!(store.recycled_buffer().is_none());
    }

    #[test]
    fn iterate_visits_in_form_desc_order() {
        let mut store = InMemoryStore::with_forms([form(3), form(1), form(2)]);
        let mut seen = Vec::new();
        store
            .iterate(&mut |f| seen.push(f.form_desc.short_form_id))
            .unwrap();
        assert_eq!(seen, vec![1, 2, 3]);
    }
}
