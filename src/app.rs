use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::warn;

use crate::browser::Browser;
use crate::clinical::{ClinicalJoiner, ClinicalSource, JoinResult};
use crate::discovery::{CohortDiscoverer, DiscoveryTimings};
use crate::document_store::DocumentStore;
use crate::domain::{CohortReference, GenePanel};
use crate::error::EtlError;
use crate::fetch::MatrixFetcher;
use crate::ingest::IngestionPipeline;
use crate::object_store::ObjectStore;
use crate::sync::{CatalogSync, SyncResult};

#[derive(Debug, Clone, Serialize)]
pub struct DiscoverResult {
    pub catalog_url: String,
    pub cohorts: Vec<CohortReference>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestResult {
    pub bucket: String,
    pub total_records: usize,
    pub cohorts: Vec<IngestItemResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestItemResult {
    pub cohort: String,
    pub action: String,
    pub object_key: Option<String>,
    pub records: usize,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunResult {
    pub started_at: String,
    pub finished_at: String,
    pub discover: DiscoverResult,
    pub ingest: IngestResult,
    pub sync: SyncResult,
    pub join: JoinResult,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressLevel {
    Info,
    Error,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub level: ProgressLevel,
    pub message: String,
    pub elapsed: Option<Duration>,
}

impl ProgressEvent {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: ProgressLevel::Info,
            message: message.into(),
            elapsed: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: ProgressLevel::Error,
            message: message.into(),
            elapsed: None,
        }
    }

    fn with_elapsed(mut self, elapsed: Duration) -> Self {
        self.elapsed = Some(elapsed);
        self
    }
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Runs the pipeline stages against one object store and one document database.
pub struct App<O: ObjectStore, D: DocumentStore> {
    objects: O,
    documents: D,
    bucket: String,
}

impl<O: ObjectStore, D: DocumentStore> App<O, D> {
    pub fn new(objects: O, documents: D, bucket: impl Into<String>) -> Self {
        Self {
            objects,
            documents,
            bucket: bucket.into(),
        }
    }

    pub fn objects(&self) -> &O {
        &self.objects
    }

    pub fn documents(&self) -> &D {
        &self.documents
    }

    pub fn discover<B: Browser>(
        &self,
        browser: B,
        catalog_url: &str,
        timings: DiscoveryTimings,
        sink: &dyn ProgressSink,
    ) -> DiscoverResult {
        sink.event(ProgressEvent::info(format!(
            "phase=Discover; rendering {catalog_url}"
        )));
        let start = Instant::now();
        let cohorts = CohortDiscoverer::new(browser, timings).discover(catalog_url);
        sink.event(
            ProgressEvent::info(format!(
                "phase=Discover; resolved {} cohort download links",
                cohorts.len()
            ))
            .with_elapsed(start.elapsed()),
        );
        DiscoverResult {
            catalog_url: catalog_url.to_string(),
            cohorts,
        }
    }

    /// Cohort-scoped failures are reported and skipped; storage failures abort.
    pub fn ingest<F: MatrixFetcher>(
        &self,
        cohorts: &[CohortReference],
        fetcher: &F,
        panel: &GenePanel,
        sink: &dyn ProgressSink,
    ) -> Result<IngestResult, EtlError> {
        let pipeline = IngestionPipeline::new(fetcher, &self.objects, &self.bucket)?;
        let mut items = Vec::with_capacity(cohorts.len());
        let mut total_records = 0;

        for cohort in cohorts {
            sink.event(ProgressEvent::info(format!(
                "Processing cohort: {}",
                cohort.cohort_name
            )));
            let start = Instant::now();
            match pipeline.ingest(cohort, panel) {
                Ok(ingested) => {
                    let object_key = ingested.object_key.clone();
                    let records = ingested.into_records().len();
                    total_records += records;
                    sink.event(
                        ProgressEvent::info(format!(
                            "Successfully processed {records} records for {}",
                            cohort.cohort_name
                        ))
                        .with_elapsed(start.elapsed()),
                    );
                    items.push(IngestItemResult {
                        cohort: cohort.cohort_name.clone(),
                        action: "ingested".to_string(),
                        object_key: Some(object_key),
                        records,
                        error: None,
                    });
                }
                Err(err) if err.is_cohort_scoped() => {
                    warn!(cohort = %cohort.cohort_name, error = %err, "skipping cohort");
                    sink.event(ProgressEvent::error(format!(
                        "Error processing cohort {}: {err}",
                        cohort.cohort_name
                    )));
                    items.push(IngestItemResult {
                        cohort: cohort.cohort_name.clone(),
                        action: "skipped".to_string(),
                        object_key: None,
                        records: 0,
                        error: Some(err.to_string()),
                    });
                }
                Err(err) => return Err(err),
            }
        }

        Ok(IngestResult {
            bucket: self.bucket.clone(),
            total_records,
            cohorts: items,
        })
    }

    pub fn sync(&self, panel: GenePanel, sink: &dyn ProgressSink) -> Result<SyncResult, EtlError> {
        sink.event(ProgressEvent::info(format!(
            "phase=Sync; loading bucket {}",
            self.bucket
        )));
        let start = Instant::now();
        let result = CatalogSync::new(&self.objects, &self.documents)
            .with_panel(panel)
            .sync(&self.bucket)?;
        for object in &result.objects {
            sink.event(ProgressEvent::info(format!(
                "Successfully uploaded {} ({} documents)",
                object.key, object.inserted
            )));
        }
        sink.event(
            ProgressEvent::info(format!("phase=Sync; inserted {} documents", result.inserted))
                .with_elapsed(start.elapsed()),
        );
        Ok(result)
    }

    pub fn join(
        &self,
        source: ClinicalSource,
        sink: &dyn ProgressSink,
    ) -> Result<JoinResult, EtlError> {
        sink.event(ProgressEvent::info("phase=Join; combining clinical records"));
        let start = Instant::now();
        let result = ClinicalJoiner::new(&self.documents, source).join()?;
        sink.event(
            ProgressEvent::info(format!(
                "phase=Join; inserted {} combined records ({} unmatched)",
                result.inserted, result.unmatched
            ))
            .with_elapsed(start.elapsed()),
        );
        Ok(result)
    }

    /// Full pass: discover, ingest, sync, join.
    pub fn run<B: Browser, F: MatrixFetcher>(
        &self,
        browser: B,
        fetcher: &F,
        catalog_url: &str,
        timings: DiscoveryTimings,
        clinical: ClinicalSource,
        sink: &dyn ProgressSink,
    ) -> Result<RunResult, EtlError> {
        let started_at = iso_timestamp();
        let discover = self.discover(browser, catalog_url, timings, sink);
        let ingest = self.ingest(&discover.cohorts, fetcher, &GenePanel::discovery(), sink)?;
        let sync = self.sync(GenePanel::catalog(), sink)?;
        let join = self.join(clinical, sink)?;
        Ok(RunResult {
            started_at,
            finished_at: iso_timestamp(),
            discover,
            ingest,
            sync,
            join,
        })
    }
}

fn iso_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}
