use std::collections::HashMap;
use uuid::Uuid;

/// Assigns sample identifiers and per-identifier occurrence numbers.
///
/// A registry lives for exactly one prepare run. Identifiers are random, never
/// derived from the sample name or file contents, so two runs over the same
/// manifest produce different identifiers.
#[derive(Debug, Default)]
pub struct SampleIdentityRegistry {
    identifiers: HashMap<String, Uuid>,
    occurrences: HashMap<Uuid, u32>,
}

impl SampleIdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifier for `sample_name`, allocated on first sight
    pub fn identifier_for(&mut self, sample_name: &str) -> Uuid {
        *self
            .identifiers
            .entry(sample_name.to_string())
            .or_insert_with(Uuid::new_v4)
    }

    /// Next occurrence of `id`, starting at 1
    pub fn next_occurrence(&mut self, id: Uuid) -> u32 {
        let counter = self.occurrences.entry(id).or_insert(0);
        *counter += 1;
        *counter
    }

    /// Number of distinct samples seen so far
    pub fn sample_count(&self) -> usize {
        self.identifiers.len()
    }
}
