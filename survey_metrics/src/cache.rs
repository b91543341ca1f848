/*!
Memoization of enriched tables.

A dashboard session loads a file, enriches it and then runs many queries over
it. Reloading the same file with the same settings returns the table built
the first time. A file whose content changed is loaded again.
*/

use std::collections::HashMap;
use std::sync::Arc;

use log::{debug, info};

use crate::{EnrichOptions, EnrichedTable, Schema};

/// Identity of a loaded source: where it came from, what it contained and
/// the settings it was enriched with.
#[derive(Eq, PartialEq, Debug, Clone, Hash)]
pub struct SourceKey {
    pub label: String,
    pub digest: String,
}

impl SourceKey {
    pub fn new(label: &str, content: &[u8], schema: &Schema, options: &EnrichOptions) -> SourceKey {
        let settings = format!("{:?}|{:?}", schema, options);
        let digest = format!("{}:{}", sha256::digest(content), sha256::digest(settings));
        SourceKey {
            label: label.to_string(),
            digest,
        }
    }
}

/// Enriched tables indexed by source label. At most one table is kept per
/// label: the one of the latest content seen.
#[derive(Debug, Default)]
pub struct DatasetCache {
    entries: HashMap<String, (SourceKey, Arc<EnrichedTable>)>,
    hits: usize,
    misses: usize,
}

impl DatasetCache {
    pub fn new() -> DatasetCache {
        DatasetCache::default()
    }

    pub fn get(&self, key: &SourceKey) -> Option<Arc<EnrichedTable>> {
        match self.entries.get(&key.label) {
            Some((k, table)) if k == key => Some(table.clone()),
            _ => None,
        }
    }

    /// Returns the cached table for this key, or builds and stores it.
    ///
    /// When the builder fails, nothing is stored and the error is returned.
    pub fn get_or_insert_with<F, E>(
        &mut self,
        key: SourceKey,
        build: F,
    ) -> Result<Arc<EnrichedTable>, E>
    where
        F: FnOnce() -> Result<EnrichedTable, E>,
    {
        if let Some(table) = self.get(&key) {
            debug!("cache: hit for {}", key.label);
            self.hits += 1;
            return Ok(table);
        }
        info!("cache: loading {}", key.label);
        self.misses += 1;
        let table = Arc::new(build()?);
        self.entries
            .insert(key.label.clone(), (key, table.clone()));
        Ok(table)
    }

    /// Drops the table of a source. Returns whether there was one.
    pub fn invalidate(&mut self, label: &str) -> bool {
        self.entries.remove(label).is_some()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// (hits, misses) since the cache was created.
    pub fn stats(&self) -> (usize, usize) {
        (self.hits, self.misses)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::TableBuilder;
    use crate::{enrich, MetricsError, SurveyKind};

    fn build(content: &str) -> Result<EnrichedTable, MetricsError> {
        let mut b = TableBuilder::with_headers(&["ESTADO"]);
        for line in content.lines() {
            b.add_text_row(&[line]);
        }
        let mut options = EnrichOptions::for_survey(SurveyKind::Energy);
        options.metrics.clear();
        enrich(b.build(), &Schema::defaults(SurveyKind::Energy), &options)
    }

    fn key(label: &str, content: &str) -> SourceKey {
        SourceKey::new(
            label,
            content.as_bytes(),
            &Schema::defaults(SurveyKind::Energy),
            &EnrichOptions::for_survey(SurveyKind::Energy),
        )
    }

    #[test]
    fn same_content_is_loaded_once() {
        let mut cache = DatasetCache::new();
        let a = cache
            .get_or_insert_with(key("a.csv", "SP\nRJ"), || build("SP\nRJ"))
            .unwrap();
        let b = cache
            .get_or_insert_with(key("a.csv", "SP\nRJ"), || -> Result<_, MetricsError> {
                panic!("should not be called")
            })
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(cache.stats(), (1, 1));
    }

    #[test]
    fn changed_content_is_reloaded() {
        let mut cache = DatasetCache::new();
        let a = cache
            .get_or_insert_with(key("a.csv", "SP"), || build("SP"))
            .unwrap();
        let b = cache
            .get_or_insert_with(key("a.csv", "SP\nMG"), || build("SP\nMG"))
            .unwrap();
        assert_eq!(a.len(), 1);
        assert_eq!(b.len(), 2);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn settings_are_part_of_the_key() {
        let strict = SourceKey::new(
            "a.csv",
            b"SP",
            &Schema::defaults(SurveyKind::Energy),
            &EnrichOptions::for_survey(SurveyKind::Energy)
                .with_policy(crate::NumericPolicy::STRICT),
        );
        assert_ne!(strict, key("a.csv", "SP"));
    }

    #[test]
    fn failures_are_not_cached() {
        let mut cache = DatasetCache::new();
        let res = cache.get_or_insert_with(key("a.csv", "SP"), || {
            Err(MetricsError::InvalidQuery {
                reason: "boom".to_string(),
            })
        });
        assert!(res.is_err());
        assert!(cache.is_empty());
        cache
            .get_or_insert_with(key("a.csv", "SP"), || build("SP"))
            .unwrap();
        assert!(cache.invalidate("a.csv"));
        assert!(!cache.invalidate("a.csv"));
    }
}
