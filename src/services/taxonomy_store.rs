use std::{
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};

use sqlx::PgPool;
use thiserror::Error;

use crate::{dal::taxonomy_db, domain::taxonomy::Taxonomy};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("taxonomy has not been loaded yet")]
    NotLoaded,
    #[error("taxonomy store unavailable: {0}")]
    Unavailable(String),
}

/// Hands out the current taxonomy snapshot. A request takes one snapshot
/// and reads it without further locking.
pub trait TaxonomySource: Send + Sync {
    fn snapshot(&self) -> Result<Arc<Taxonomy>, StoreError>;
}

impl TaxonomySource for Arc<Taxonomy> {
    fn snapshot(&self) -> Result<Arc<Taxonomy>, StoreError> {
        Ok(self.clone())
    }
}

/// Swappable snapshot, refreshed in the background.
#[derive(Debug, Default)]
pub struct SharedTaxonomy {
    current: RwLock<Option<Arc<Taxonomy>>>,
}

impl SharedTaxonomy {
    pub fn new(initial: Option<Taxonomy>) -> Self {
        SharedTaxonomy {
            current: RwLock::new(initial.map(Arc::new)),
        }
    }

    pub fn replace(&self, taxonomy: Taxonomy) {
        let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
        *current = Some(Arc::new(taxonomy));
    }
}

impl TaxonomySource for SharedTaxonomy {
    fn snapshot(&self) -> Result<Arc<Taxonomy>, StoreError> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(StoreError::NotLoaded)
    }
}

/// Reloads the taxonomy from the database every `interval`. A failed
/// reload keeps the previous snapshot.
pub async fn taxonomy_refresh_handler(
    pool: PgPool,
    store: Arc<SharedTaxonomy>,
    interval: Duration,
) {
    log::info!("Started taxonomy refresh handler");

    loop {
        match taxonomy_db::load_taxonomy(&pool).await {
            Ok(taxonomy) if taxonomy.keyword_count() > 0 => {
                log::info!(
                    "Loaded taxonomy with {} keywords from the database",
                    taxonomy.keyword_count()
                );
                store.replace(taxonomy);
            }
            Ok(_) => log::warn!("Database taxonomy is empty, keeping the current snapshot"),
            Err(e) => log::error!("Failed to reload taxonomy. Error: {}", e),
        }

        tokio::time::sleep(interval).await;
    }
}
