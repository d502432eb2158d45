//! Identifier-keyed table lookup.
//!
//! [`TableCatalog`] fronts a [`TableSource`] with a [`SingleFlightCache`], so
//! a table's metadata is loaded once no matter how many tasks ask for it at
//! the same time. A missing table is a cached `None`, not an error; a source
//! failure is a cached [`CacheError::Load`] until [`TableCatalog::clear`].

#![allow(clippy::module_name_repetitions)]

use std::collections::HashMap;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::try_join_all;
use tracing::{debug, instrument, warn};

use crate::cache::{CacheError, CancellationToken, LoadFuture, SingleFlightCache};
use crate::schema::{Identifier, Table};

/// Somewhere table metadata can be read from.
pub trait TableSource: Send + Sync + 'static {
    /// Load one table. `Ok(None)` means the source has no such table.
    fn load_table(&self, id: Identifier, cancel: CancellationToken) -> LoadFuture<Option<Arc<Table>>>;
}

/// A [`TableSource`] over tables already in memory, such as a parsed
/// schema document.
#[derive(Debug, Clone, Default)]
pub struct DocumentSource {
    tables: HashMap<Identifier, Arc<Table>>,
}

impl DocumentSource {
    /// Index `tables` by identifier. Later duplicates replace earlier ones.
    #[must_use]
    pub fn new(tables: impl IntoIterator<Item = Table>) -> Self {
        Self {
            tables: tables
                .into_iter()
                .map(|table| (table.id.clone(), Arc::new(table)))
                .collect(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl TableSource for DocumentSource {
    fn load_table(&self, id: Identifier, cancel: CancellationToken) -> LoadFuture<Option<Arc<Table>>> {
        let table = self.tables.get(&id).cloned();
        async move {
            if cancel.is_cancelled() {
                anyhow::bail!("load of {id} cancelled");
            }
            Ok(table)
        }
        .boxed()
    }
}

/// Read-only catalog of tables, keyed by [`Identifier`].
pub struct TableCatalog {
    cache: SingleFlightCache<Identifier, Option<Arc<Table>>, ()>,
}

impl std::fmt::Debug for TableCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableCatalog")
            .field("cached", &self.cache.len())
            .finish()
    }
}

impl TableCatalog {
    pub fn new(source: impl TableSource) -> Self {
        let source = Arc::new(source);
        Self {
            cache: SingleFlightCache::new(move |id: Identifier, (), cancel| {
                let source = Arc::clone(&source);
                let label = id.to_string();
                async move {
                    let loaded = source.load_table(id, cancel).await;
                    match &loaded {
                        Ok(Some(_)) => debug!(table = %label, "table loaded"),
                        Ok(None) => debug!(table = %label, "table not found"),
                        Err(err) => warn!(table = %label, error = %err, "table load failed"),
                    }
                    loaded
                }
                .boxed()
            }),
        }
    }

    /// Look up one table.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the source failed (now or on an earlier
    /// request) or `cancel` fired first.
    #[instrument(skip_all, fields(table = %id))]
    pub async fn table(
        &self,
        id: &Identifier,
        cancel: &CancellationToken,
    ) -> Result<Option<Arc<Table>>, CacheError> {
        self.cache.get_by_key(id.clone(), (), cancel).await
    }

    /// Look up several tables concurrently, keeping request order and
    /// skipping ones the source does not have.
    ///
    /// # Errors
    ///
    /// Returns the first [`CacheError`] encountered.
    pub async fn tables(
        &self,
        ids: &[Identifier],
        cancel: &CancellationToken,
    ) -> Result<Vec<Arc<Table>>, CacheError> {
        let found = try_join_all(ids.iter().map(|id| self.table(id, cancel))).await?;
        Ok(found.into_iter().flatten().collect())
    }

    /// Number of identifiers looked up so far.
    #[must_use]
    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    /// Drop every cached outcome, including cached failures.
    pub fn clear(&self) {
        debug!(entries = self.cache.len(), "clearing table catalog");
        self.cache.clear();
    }
}
