//! Known entity values (suppliers, materials, factories, …) used by the
//! extractor, refreshed independently of the rule set.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use iq_protocol::EntitySource;

use crate::error::SourceResult;

/// Entity dictionaries. Entry order is significant: among equally long
/// matches the earlier entry wins.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Dictionaries {
    pub suppliers: Vec<String>,
    pub materials: Vec<String>,
    pub factories: Vec<String>,
    pub statuses: Vec<String>,
    pub projects: Vec<String>,
}

impl Dictionaries {
    /// Entries for a lookup source. Batch codes are pattern-based and have none.
    pub fn entries(&self, source: EntitySource) -> &[String] {
        match source {
            EntitySource::Supplier => &self.suppliers,
            EntitySource::Material => &self.materials,
            EntitySource::Factory => &self.factories,
            EntitySource::Project => &self.projects,
            EntitySource::Status => &self.statuses,
            EntitySource::Batch => &[],
        }
    }

    /// Trim entries, drop blanks and duplicates, keep first-seen order.
    pub fn normalized(mut self) -> Self {
        for list in [
            &mut self.suppliers,
            &mut self.materials,
            &mut self.factories,
            &mut self.statuses,
            &mut self.projects,
        ] {
            let mut seen = std::collections::HashSet::new();
            let cleaned: Vec<String> = list
                .drain(..)
                .map(|e| e.trim().to_string())
                .filter(|e| !e.is_empty() && seen.insert(e.clone()))
                .collect();
            *list = cleaned;
        }
        self
    }

    pub fn total_entries(&self) -> usize {
        self.suppliers.len()
            + self.materials.len()
            + self.factories.len()
            + self.statuses.len()
            + self.projects.len()
    }
}

/// Supplier of dictionary contents (database, file, fixture).
#[async_trait]
pub trait DictionarySource: Send + Sync {
    async fn load(&self) -> SourceResult<Dictionaries>;

    /// Source label for logging.
    fn name(&self) -> &str;
}

/// Fixed dictionaries, for tests and sample mode.
pub struct StaticDictionarySource(pub Dictionaries);

#[async_trait]
impl DictionarySource for StaticDictionarySource {
    async fn load(&self) -> SourceResult<Dictionaries> {
        Ok(self.0.clone())
    }

    fn name(&self) -> &str {
        "static"
    }
}

/// Current dictionaries behind a copy-on-write swap.
pub struct DictionaryStore {
    source: Arc<dyn DictionarySource>,
    current: RwLock<Arc<Dictionaries>>,
}

impl DictionaryStore {
    pub fn new(source: Arc<dyn DictionarySource>) -> Self {
        Self {
            source,
            current: RwLock::new(Arc::new(Dictionaries::default())),
        }
    }

    /// Store pre-populated with fixed dictionaries.
    pub fn with_dictionaries(dictionaries: Dictionaries) -> Self {
        let dictionaries = dictionaries.normalized();
        Self {
            current: RwLock::new(Arc::new(dictionaries.clone())),
            source: Arc::new(StaticDictionarySource(dictionaries)),
        }
    }

    /// Reload from the source. On failure the previous dictionaries stay in place.
    pub async fn refresh(&self) -> SourceResult<Arc<Dictionaries>> {
        let loaded = match self.source.load().await {
            Ok(d) => Arc::new(d.normalized()),
            Err(e) => {
                tracing::warn!(source = self.source.name(), error = %e, "dictionary refresh failed");
                return Err(e);
            }
        };
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = loaded.clone();
        tracing::info!(
            source = self.source.name(),
            entries = loaded.total_entries(),
            "dictionaries loaded"
        );
        Ok(loaded)
    }

    pub fn snapshot(&self) -> Arc<Dictionaries> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
