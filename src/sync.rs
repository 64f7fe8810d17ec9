use serde::Serialize;
use tracing::{info, warn};

use crate::domain::{GENE_EXPRESSION_COLLECTION, GenePanel, cohort_from_key};
use crate::document_store::DocumentStore;
use crate::error::EtlError;
use crate::matrix::{ExtraColumns, Transformed, transform};
use crate::object_store::ObjectStore;

#[derive(Debug, Clone, Serialize)]
pub struct SyncedObject {
    pub key: String,
    pub cancer_cohort: String,
    pub inserted: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    pub bucket: String,
    pub inserted: usize,
    pub objects: Vec<SyncedObject>,
}

/// Reloads every stored matrix into the gene expression collection.
pub struct CatalogSync<'a, O: ObjectStore, D: DocumentStore> {
    objects: &'a O,
    documents: &'a D,
    panel: GenePanel,
}

impl<'a, O: ObjectStore, D: DocumentStore> CatalogSync<'a, O, D> {
    pub fn new(objects: &'a O, documents: &'a D) -> Self {
        Self {
            objects,
            documents,
            panel: GenePanel::catalog(),
        }
    }

    pub fn with_panel(mut self, panel: GenePanel) -> Self {
        self.panel = panel;
        self
    }

    /// One bulk insert per key. Store failures abort the sync; keys loaded before the
    /// failure stay loaded.
    pub fn sync(&self, bucket: &str) -> Result<SyncResult, EtlError> {
        let keys = self.objects.list_objects(bucket)?;
        info!(bucket, count = keys.len(), "syncing stored matrices");

        let mut objects = Vec::with_capacity(keys.len());
        let mut total = 0;
        for key in keys {
            let cancer_cohort = cohort_from_key(&key).to_string();
            let inserted = self.sync_key(bucket, &key, &cancer_cohort)?;
            info!(key = %key, cohort = %cancer_cohort, inserted, "uploaded matrix to document store");
            total += inserted;
            objects.push(SyncedObject {
                key,
                cancer_cohort,
                inserted,
            });
        }

        Ok(SyncResult {
            bucket: bucket.to_string(),
            inserted: total,
            objects,
        })
    }

    fn sync_key(&self, bucket: &str, key: &str, cancer_cohort: &str) -> Result<usize, EtlError> {
        let blob = self.objects.get_object(bucket, key)?;
        let transformed = transform(&blob, &self.panel, ExtraColumns::with_cohort(cancer_cohort));
        if let Transformed::Empty(reason) = &transformed {
            warn!(key, reason = ?reason, "no records extracted");
        }

        let records = transformed.into_records();
        if records.is_empty() {
            return Ok(0);
        }
        self.documents
            .insert_many(GENE_EXPRESSION_COLLECTION, &records)
    }
}
