//! Optimistic layers: per-request record patches overlaid on real records.

use crate::cache::NormalizedRecord;
use crate::types::RequestId;
use serde_json::{Map, Value};
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct OptimisticLayers {
    // Oldest first; later layers win on read.
    layers: Vec<(RequestId, HashMap<String, Map<String, Value>>)>,
}

impl OptimisticLayers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge `record` into the layer owned by `request_id`, creating it if needed.
    pub fn apply(&mut self, request_id: &RequestId, record: NormalizedRecord) {
        let position = self.layers.iter().position(|(id, _)| id == request_id);
        let layer = match position {
            Some(index) => &mut self.layers[index].1,
            None => {
                self.layers.push((request_id.clone(), HashMap::new()));
                let last = self.layers.len() - 1;
                &mut self.layers[last].1
            }
        };
        let patch = layer.entry(record.id).or_default();
        for (key, value) in record.fields {
            patch.insert(key, value);
        }
    }

    pub fn remove(&mut self, request_id: &RequestId) -> bool {
        let before = self.layers.len();
        self.layers.retain(|(id, _)| id != request_id);
        self.layers.len() != before
    }

    /// Apply every layer's patch for `id` on top of `base`.
    pub fn overlay(&self, id: &str, base: Option<NormalizedRecord>) -> Option<NormalizedRecord> {
        let mut record = base;
        for (_, layer) in &self.layers {
            if let Some(patch) = layer.get(id) {
                record
                    .get_or_insert_with(|| NormalizedRecord::new(id))
                    .merge(patch.clone());
            }
        }
        record
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}
