use tracing::{debug, info};

use crate::domain::{CohortReference, Document, GenePanel};
use crate::error::EtlError;
use crate::fetch::{MatrixFetcher, gunzip};
use crate::matrix::{ExtraColumns, Transformed, transform};
use crate::object_store::ObjectStore;

#[derive(Debug, Clone)]
pub struct IngestedCohort {
    pub object_key: String,
    pub transformed: Transformed,
}

impl IngestedCohort {
    pub fn into_records(self) -> Vec<Document> {
        self.transformed.into_records()
    }
}

/// Downloads one cohort matrix, keeps the raw TSV in the object store and
/// returns the panel-filtered records.
pub struct IngestionPipeline<'a, F: MatrixFetcher, O: ObjectStore> {
    fetcher: &'a F,
    objects: &'a O,
    bucket: &'a str,
}

impl<'a, F: MatrixFetcher, O: ObjectStore> IngestionPipeline<'a, F, O> {
    /// Creates the bucket when it does not exist yet.
    pub fn new(fetcher: &'a F, objects: &'a O, bucket: &'a str) -> Result<Self, EtlError> {
        objects.ensure_bucket(bucket)?;
        Ok(Self {
            fetcher,
            objects,
            bucket,
        })
    }

    pub fn ingest(
        &self,
        cohort: &CohortReference,
        panel: &GenePanel,
    ) -> Result<IngestedCohort, EtlError> {
        info!(cohort = %cohort.cohort_name, url = %cohort.download_url, "downloading cohort matrix");
        let compressed = self.fetcher.fetch(&cohort.download_url)?;
        let matrix = gunzip(&compressed)?;
        debug!(
            compressed = compressed.len(),
            decompressed = matrix.len(),
            "decompressed cohort matrix"
        );

        let transformed = transform(&matrix, panel, ExtraColumns::NONE);

        let object_key = cohort.object_key();
        info!(bucket = self.bucket, key = %object_key, "uploading raw matrix");
        self.objects.put_object(self.bucket, &object_key, &matrix)?;

        Ok(IngestedCohort {
            object_key,
            transformed,
        })
    }
}
