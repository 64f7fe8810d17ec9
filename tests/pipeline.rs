use std::collections::HashMap;
use std::fs;
use std::io::Write;
use std::sync::Mutex;

use assert_matches::assert_matches;
use camino::Utf8PathBuf;
use flate2::Compression;
use flate2::write::GzEncoder;
use serde_json::{Value, json};

use tcga_etl::app::{App, ProgressEvent, ProgressSink};
use tcga_etl::clinical::{ClinicalJoiner, ClinicalSource, ClinicalTable};
use tcga_etl::document_store::{DocumentCursor, DocumentStore, FsDocumentStore};
use tcga_etl::domain::{
    CLINICAL_COLLECTION, COMBINED_COLLECTION, CohortReference, Document,
    GENE_EXPRESSION_COLLECTION, GenePanel,
};
use tcga_etl::error::EtlError;
use tcga_etl::fetch::MatrixFetcher;
use tcga_etl::object_store::{FsObjectStore, ObjectStore};

const BUCKET: &str = "tcga-data";

struct MockFetcher {
    responses: HashMap<String, Result<Vec<u8>, u16>>,
}

impl MockFetcher {
    fn new() -> Self {
        Self {
            responses: HashMap::new(),
        }
    }

    fn serve(mut self, url: &str, matrix: &str) -> Self {
        self.responses.insert(url.to_string(), Ok(gzip(matrix)));
        self
    }

    fn serve_raw(mut self, url: &str, body: &[u8]) -> Self {
        self.responses.insert(url.to_string(), Ok(body.to_vec()));
        self
    }

    fn fail(mut self, url: &str, status: u16) -> Self {
        self.responses.insert(url.to_string(), Err(status));
        self
    }
}

impl MatrixFetcher for MockFetcher {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, EtlError> {
        match self.responses.get(url) {
            Some(Ok(body)) => Ok(body.clone()),
            Some(Err(status)) => Err(EtlError::HttpStatus {
                status: *status,
                message: "Not Found".to_string(),
            }),
            None => Err(EtlError::Http(format!("unexpected url {url}"))),
        }
    }
}

/// Counts bulk inserts and forwards everything to the wrapped store.
struct RecordingStore {
    inner: FsDocumentStore,
    insert_many_calls: Mutex<Vec<usize>>,
    reject_cohort: Option<&'static str>,
}

impl RecordingStore {
    fn new(inner: FsDocumentStore) -> Self {
        Self {
            inner,
            insert_many_calls: Mutex::new(Vec::new()),
            reject_cohort: None,
        }
    }
}

impl DocumentStore for RecordingStore {
    fn insert_many(&self, collection: &str, documents: &[Document]) -> Result<usize, EtlError> {
        self.insert_many_calls.lock().unwrap().push(documents.len());
        let cohort = documents[0].get("cancer_cohort").and_then(Value::as_str);
        if cohort.is_some() && cohort == self.reject_cohort {
            return Err(EtlError::DocumentStore("write concern failed".to_string()));
        }
        self.inner.insert_many(collection, documents)
    }

    fn insert_one(&self, collection: &str, document: &Document) -> Result<(), EtlError> {
        self.inner.insert_one(collection, document)
    }

    fn find(&self, collection: &str) -> Result<DocumentCursor<'_>, EtlError> {
        self.inner.find(collection)
    }
}

struct NullSink;

impl ProgressSink for NullSink {
    fn event(&self, _event: ProgressEvent) {}
}

#[derive(Default)]
struct CollectingSink {
    messages: Mutex<Vec<String>>,
}

impl ProgressSink for CollectingSink {
    fn event(&self, event: ProgressEvent) {
        self.messages.lock().unwrap().push(event.message);
    }
}

fn gzip(text: &str) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes()).unwrap();
    encoder.finish().unwrap()
}

fn cohort(name: &str, url: &str) -> CohortReference {
    CohortReference {
        cohort_name: name.to_string(),
        download_url: url.to_string(),
    }
}

fn doc(value: Value) -> Document {
    value.as_object().cloned().unwrap()
}

fn workspace() -> (tempfile::TempDir, FsObjectStore, FsDocumentStore) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    let objects = FsObjectStore::new(root.join("objects"));
    let documents = FsDocumentStore::new(&root.join("documents"), "tcga");
    (temp, objects, documents)
}

fn collection(store: &impl DocumentStore, name: &str) -> Vec<Document> {
    store
        .find(name)
        .unwrap()
        .collect::<Result<Vec<_>, _>>()
        .unwrap()
}

const LUAD_MATRIX: &str = "sample\tTCGA-05-4244-01\tTCGA-05-4249-01\n\
                           CCL5\t10.5\t11.2\n\
                           IL8\t3.1\t4.0\n\
                           CXCL8\t2.0\t2.5\n\
                           GAPDH\t15.0\t14.8\n";

#[test]
fn ingest_stores_raw_matrix_and_skips_failed_cohorts() {
    let (_temp, objects, documents) = workspace();
    let fetcher = MockFetcher::new()
        .serve("https://hub/LUAD.gz", LUAD_MATRIX)
        .fail("https://hub/GBM.gz", 404)
        .serve_raw("https://hub/BRCA.gz", b"plain text, not gzip");
    let app = App::new(objects, documents, BUCKET);
    let cohorts = [
        cohort("GBM", "https://hub/GBM.gz"),
        cohort("LUAD", "https://hub/LUAD.gz"),
        cohort("BRCA", "https://hub/BRCA.gz"),
    ];

    let result = app
        .ingest(&cohorts, &fetcher, &GenePanel::discovery(), &NullSink)
        .unwrap();

    assert_eq!(result.total_records, 2);
    let actions = result
        .cohorts
        .iter()
        .map(|item| (item.cohort.as_str(), item.action.as_str()))
        .collect::<Vec<_>>();
    assert_eq!(
        actions,
        vec![("GBM", "skipped"), ("LUAD", "ingested"), ("BRCA", "skipped")]
    );
    assert!(result.cohorts[0].error.as_deref().unwrap().contains("404"));

    assert_eq!(
        app.objects().list_objects(BUCKET).unwrap(),
        vec!["LUAD_gene_expression.tsv"]
    );
    let stored = app
        .objects()
        .get_object(BUCKET, "LUAD_gene_expression.tsv")
        .unwrap();
    assert_eq!(stored, LUAD_MATRIX.as_bytes());
}

#[test]
fn ingest_reports_each_cohort_once_and_leaves_totals_to_the_summary() {
    let (_temp, objects, documents) = workspace();
    let fetcher = MockFetcher::new().serve("https://hub/LUAD.gz", LUAD_MATRIX);
    let app = App::new(objects, documents, BUCKET);
    let sink = CollectingSink::default();

    let result = app
        .ingest(
            &[cohort("LUAD", "https://hub/LUAD.gz")],
            &fetcher,
            &GenePanel::discovery(),
            &sink,
        )
        .unwrap();

    assert_eq!(result.total_records, 2);
    assert_eq!(
        *sink.messages.lock().unwrap(),
        vec![
            "Processing cohort: LUAD".to_string(),
            "Successfully processed 2 records for LUAD".to_string(),
        ]
    );
}

#[test]
fn ingest_persists_matrix_without_panel_genes() {
    let (_temp, objects, documents) = workspace();
    let matrix = "sample\tTCGA-AA-0001-01\nGAPDH\t1.0\n";
    let fetcher = MockFetcher::new().serve("https://hub/X.gz", matrix);
    let app = App::new(objects, documents, BUCKET);

    let result = app
        .ingest(
            &[cohort("COAD (colon)", "https://hub/X.gz")],
            &fetcher,
            &GenePanel::discovery(),
            &NullSink,
        )
        .unwrap();

    assert_eq!(result.total_records, 0);
    assert_eq!(
        result.cohorts[0].object_key.as_deref(),
        Some("COAD colon_gene_expression.tsv")
    );
    assert_eq!(
        app.objects()
            .get_object(BUCKET, "COAD colon_gene_expression.tsv")
            .unwrap(),
        matrix.as_bytes()
    );
}

#[test]
fn reingest_overwrites_stored_object() {
    let (_temp, objects, documents) = workspace();
    let app = App::new(objects, documents, BUCKET);
    let first = MockFetcher::new().serve("https://hub/LUAD.gz", "sample\tS1\nCCL5\t1\n");
    let second = MockFetcher::new().serve("https://hub/LUAD.gz", LUAD_MATRIX);
    let cohorts = [cohort("LUAD", "https://hub/LUAD.gz")];

    app.ingest(&cohorts, &first, &GenePanel::discovery(), &NullSink)
        .unwrap();
    app.ingest(&cohorts, &second, &GenePanel::discovery(), &NullSink)
        .unwrap();

    assert_eq!(app.objects().list_objects(BUCKET).unwrap().len(), 1);
    assert_eq!(
        app.objects()
            .get_object(BUCKET, "LUAD_gene_expression.tsv")
            .unwrap(),
        LUAD_MATRIX.as_bytes()
    );
}

#[test]
fn sync_tags_records_with_cohort_and_patient() {
    let (_temp, objects, documents) = workspace();
    objects.ensure_bucket(BUCKET).unwrap();
    objects
        .put_object(BUCKET, "LUAD_gene_expression.tsv", LUAD_MATRIX.as_bytes())
        .unwrap();
    let app = App::new(objects, documents, BUCKET);

    let result = app.sync(GenePanel::catalog(), &NullSink).unwrap();

    assert_eq!(result.inserted, 2);
    assert_eq!(result.objects[0].cancer_cohort, "LUAD");
    let loaded = collection(app.documents(), GENE_EXPRESSION_COLLECTION);
    assert_eq!(
        loaded[0],
        doc(json!({
            "patient_id": "TCGA-05-4244-01",
            "cancer_cohort": "LUAD",
            "CCL5": 10.5,
            "IL8": 3.1,
        }))
    );
    let keys = loaded[1].keys().cloned().collect::<Vec<_>>();
    assert_eq!(keys, vec!["patient_id", "cancer_cohort", "CCL5", "IL8"]);
}

#[test]
fn sync_skips_insert_for_empty_matrices() {
    let (_temp, objects, inner) = workspace();
    objects.ensure_bucket(BUCKET).unwrap();
    objects
        .put_object(BUCKET, "GBM_gene_expression.tsv", b"sample\tS1\nGAPDH\t1\n")
        .unwrap();
    objects
        .put_object(BUCKET, "LUAD_gene_expression.tsv", LUAD_MATRIX.as_bytes())
        .unwrap();
    let app = App::new(objects, RecordingStore::new(inner), BUCKET);

    let result = app.sync(GenePanel::catalog(), &NullSink).unwrap();

    assert_eq!(result.objects.len(), 2);
    assert_eq!(result.objects[0].inserted, 0);
    assert_eq!(result.objects[1].inserted, 2);
    assert_eq!(*app.documents().insert_many_calls.lock().unwrap(), vec![2]);
}

#[test]
fn sync_store_failure_aborts_after_earlier_keys() {
    let (_temp, objects, inner) = workspace();
    objects.ensure_bucket(BUCKET).unwrap();
    for key in ["BRCA_gene_expression.tsv", "LUAD_gene_expression.tsv"] {
        objects
            .put_object(BUCKET, key, LUAD_MATRIX.as_bytes())
            .unwrap();
    }
    let mut documents = RecordingStore::new(inner);
    documents.reject_cohort = Some("LUAD");
    let app = App::new(objects, documents, BUCKET);

    let err = app.sync(GenePanel::catalog(), &NullSink).unwrap_err();

    assert_matches!(err, EtlError::DocumentStore(_));
    let loaded = collection(app.documents(), GENE_EXPRESSION_COLLECTION);
    assert_eq!(loaded.len(), 2);
    assert!(loaded.iter().all(|record| record["cancer_cohort"] == json!("BRCA")));
}

#[test]
fn sync_without_bucket_fails() {
    let (_temp, objects, documents) = workspace();
    let app = App::new(objects, documents, BUCKET);
    assert!(app.sync(GenePanel::catalog(), &NullSink).is_err());
}

fn seed_expression(store: &FsDocumentStore, documents: Vec<Value>) {
    let documents = documents.into_iter().map(doc).collect::<Vec<_>>();
    store
        .insert_many(GENE_EXPRESSION_COLLECTION, &documents)
        .unwrap();
}

#[test]
fn join_uses_first_matching_expression_record() {
    let (_temp, _objects, documents) = workspace();
    seed_expression(
        &documents,
        vec![
            json!({"cancer_cohort": "LUAD", "CCL5": 9.0}),
            json!({"patient_id": "TCGA-05-4244-01", "cancer_cohort": "LUAD", "CCL5": 10.5}),
            json!({"patient_id": "TCGA-05-4244-11", "cancer_cohort": "LUAD", "CCL5": 1.0}),
            json!({"patient_id": "TCGA-05-4249-01", "cancer_cohort": "LUAD", "CCL5": 11.2}),
        ],
    );
    let table = ClinicalTable::parse(
        "bcr_patient_barcode\tDSS\tOS\tclinical_stage\n\
         TCGA-05-4244\t0\t1\tStage IB\n\
         TCGA-99-0000\t1\t1\tStage IV\n\
         TCGA-05-4249\t\t0\t\n",
    )
    .unwrap();

    let result = ClinicalJoiner::new(&documents, ClinicalSource::Collection)
        .join_table(&table)
        .unwrap();

    assert_eq!(result.clinical_records, 3);
    assert_eq!(result.inserted, 2);
    assert_eq!(result.unmatched, 1);
    let combined = collection(&documents, COMBINED_COLLECTION);
    assert_eq!(
        combined[0],
        doc(json!({
            "bcr_patient_barcode": "TCGA-05-4244",
            "DSS": 0,
            "OS": 1,
            "clinical_stage": "Stage IB",
            "patient_id": "TCGA-05-4244-01",
            "cancer_cohort": "LUAD",
            "CCL5": 10.5,
        }))
    );
    assert_eq!(combined[1]["DSS"], Value::Null);
    assert_eq!(combined[1]["CCL5"], json!(11.2));
}

#[test]
fn join_with_no_matches_inserts_nothing() {
    let (temp, _objects, documents) = workspace();
    seed_expression(
        &documents,
        vec![json!({"patient_id": "TCGA-05-4244-01", "CCL5": 1.0})],
    );
    let table = temp.path().join("clinical.tsv");
    fs::write(
        &table,
        "bcr_patient_barcode\tDSS\tOS\tclinical_stage\nTCGA-00-0000\t0\t0\tStage I\n",
    )
    .unwrap();

    let result = ClinicalJoiner::new(&documents, ClinicalSource::Table(table))
        .join()
        .unwrap();

    assert_eq!(result.inserted, 0);
    assert!(collection(&documents, COMBINED_COLLECTION).is_empty());
}

#[test]
fn join_reads_clinical_collection() {
    let (_temp, _objects, documents) = workspace();
    seed_expression(
        &documents,
        vec![json!({"patient_id": "TCGA-05-4244-01", "CCL5": 1.0})],
    );
    documents
        .insert_many(
            CLINICAL_COLLECTION,
            &[
                doc(json!({"bcr_patient_barcode": "TCGA-05-4244", "DSS": 1, "OS": 0, "clinical_stage": "Stage II"})),
                doc(json!({"OS": 1})),
            ],
        )
        .unwrap();
    let app = App::new(FsObjectStore::new(Utf8PathBuf::from("unused")), documents, BUCKET);

    let result = app.join(ClinicalSource::Collection, &NullSink).unwrap();

    assert_eq!(result.clinical_records, 1);
    assert_eq!(result.inserted, 1);
    let combined = collection(app.documents(), COMBINED_COLLECTION);
    assert_eq!(combined[0]["clinical_stage"], json!("Stage II"));
}

#[test]
fn join_reports_missing_clinical_table() {
    let (temp, _objects, documents) = workspace();
    let missing = temp.path().join("absent.tsv");

    let err = ClinicalJoiner::new(&documents, ClinicalSource::Table(missing))
        .join()
        .unwrap_err();

    assert_matches!(err, EtlError::ClinicalRead { .. });
}
