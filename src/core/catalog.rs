use std::sync::Arc;

use tokio::sync::OnceCell;

use crate::core::{
    domain::EnvironmentCatalog,
    traits::judge::{JudgeBackend, JudgeError},
};

/// Memoizes the judge's environment list for the lifetime of the cache.
///
/// Concurrent callers on an empty cache share one in-flight fetch. A failed
/// fetch leaves the cache empty, so the next caller fetches again.
#[derive(Debug)]
pub struct CatalogCache {
    backend: Arc<dyn JudgeBackend>,
    catalog: OnceCell<Arc<EnvironmentCatalog>>,
}

impl CatalogCache {
    pub fn new(backend: Arc<dyn JudgeBackend>) -> Self {
        Self {
            backend,
            catalog: OnceCell::new(),
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn get(&self) -> Result<Arc<EnvironmentCatalog>, JudgeError> {
        self.catalog
            .get_or_try_init(|| async {
                tracing::info!("Fetching environment catalog");
                let catalog = self.backend.environments().await.inspect_err(|e| {
                    tracing::error!("Environment discovery failed: {}", e);
                })?;
                tracing::debug!("Cached {} environments", catalog.len());
                Ok::<_, JudgeError>(Arc::new(catalog))
            })
            .await
            .map(Arc::clone)
    }

    pub fn is_populated(&self) -> bool {
        self.catalog.initialized()
    }
}
