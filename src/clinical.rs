use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use crate::document_store::DocumentStore;
use crate::domain::{
    CLINICAL_COLLECTION, COMBINED_COLLECTION, Document, GENE_EXPRESSION_COLLECTION,
    PATIENT_ID_FIELD, cell_value, normalize_patient_id,
};
use crate::error::EtlError;

pub const BARCODE_COLUMN: &str = "bcr_patient_barcode";
pub const CLINICAL_COLUMNS: [&str; 4] = [BARCODE_COLUMN, "DSS", "OS", "clinical_stage"];

#[derive(Debug, Clone, PartialEq)]
pub struct ClinicalRecord {
    pub bcr_patient_barcode: String,
    pub dss: Value,
    pub os: Value,
    pub clinical_stage: Value,
}

impl ClinicalRecord {
    pub fn to_document(&self) -> Document {
        let mut document = Document::new();
        document.insert(
            BARCODE_COLUMN.to_string(),
            Value::from(self.bcr_patient_barcode.as_str()),
        );
        document.insert("DSS".to_string(), self.dss.clone());
        document.insert("OS".to_string(), self.os.clone());
        document.insert("clinical_stage".to_string(), self.clinical_stage.clone());
        document
    }
}

/// Clinical survival records projected to the join columns.
#[derive(Debug, Clone, Default)]
pub struct ClinicalTable {
    records: Vec<ClinicalRecord>,
}

impl ClinicalTable {
    pub fn load(path: &Path) -> Result<Self, EtlError> {
        let text = fs::read_to_string(path).map_err(|err| EtlError::ClinicalRead {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, EtlError> {
        let mut lines = text
            .lines()
            .map(|line| line.trim_end_matches('\r'))
            .filter(|line| !line.trim().is_empty());
        let header = lines
            .next()
            .ok_or_else(|| EtlError::ClinicalColumn(BARCODE_COLUMN.to_string()))?
            .split('\t')
            .map(str::trim)
            .collect::<Vec<_>>();

        let mut indices = [0usize; 4];
        for (slot, column) in indices.iter_mut().zip(CLINICAL_COLUMNS) {
            *slot = header
                .iter()
                .position(|name| *name == column)
                .ok_or_else(|| EtlError::ClinicalColumn(column.to_string()))?;
        }

        let records = lines
            .map(|line| {
                let cells = line.split('\t').collect::<Vec<_>>();
                let cell = |index: usize| cells.get(index).copied().unwrap_or("");
                ClinicalRecord {
                    bcr_patient_barcode: cell(indices[0]).trim().to_string(),
                    dss: cell_value(cell(indices[1])),
                    os: cell_value(cell(indices[2])),
                    clinical_stage: cell_value(cell(indices[3])),
                }
            })
            .collect();
        Ok(Self { records })
    }

    /// Reads the externally populated clinical collection instead of a local table.
    pub fn from_collection<D: DocumentStore>(documents: &D) -> Result<Self, EtlError> {
        let mut records = Vec::new();
        for document in documents.find(CLINICAL_COLLECTION)? {
            let document = document?;
            let Some(barcode) = document.get(BARCODE_COLUMN).and_then(Value::as_str) else {
                continue;
            };
            let field = |name: &str| document.get(name).cloned().unwrap_or(Value::Null);
            records.push(ClinicalRecord {
                bcr_patient_barcode: barcode.to_string(),
                dss: field("DSS"),
                os: field("OS"),
                clinical_stage: field("clinical_stage"),
            });
        }
        Ok(Self { records })
    }

    pub fn records(&self) -> &[ClinicalRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[derive(Debug, Clone)]
pub enum ClinicalSource {
    Table(PathBuf),
    Collection,
}

#[derive(Debug, Clone, Serialize)]
pub struct JoinResult {
    pub clinical_records: usize,
    pub inserted: usize,
    pub unmatched: usize,
}

/// Joins every clinical record with the first expression document of the same patient.
pub struct ClinicalJoiner<'a, D: DocumentStore> {
    documents: &'a D,
    source: ClinicalSource,
}

impl<'a, D: DocumentStore> ClinicalJoiner<'a, D> {
    pub fn new(documents: &'a D, source: ClinicalSource) -> Self {
        Self { documents, source }
    }

    pub fn join(&self) -> Result<JoinResult, EtlError> {
        let table = match &self.source {
            ClinicalSource::Table(path) => ClinicalTable::load(path)?,
            ClinicalSource::Collection => ClinicalTable::from_collection(self.documents)?,
        };
        info!(records = table.len(), "loaded clinical records");
        self.join_table(&table)
    }

    pub fn join_table(&self, table: &ClinicalTable) -> Result<JoinResult, EtlError> {
        let mut inserted = 0;
        for record in table.records() {
            let Some(expression) = self.first_match(&record.bcr_patient_barcode)? else {
                debug!(barcode = %record.bcr_patient_barcode, "no expression record for patient");
                continue;
            };
            let mut combined = record.to_document();
            combined.extend(expression);
            self.documents.insert_one(COMBINED_COLLECTION, &combined)?;
            inserted += 1;
        }
        info!(inserted, "combined clinical and gene expression records");

        Ok(JoinResult {
            clinical_records: table.len(),
            inserted,
            unmatched: table.len() - inserted,
        })
    }

    /// Full scan of the expression collection; stops at the first hit.
    fn first_match(&self, barcode: &str) -> Result<Option<Document>, EtlError> {
        if barcode.is_empty() {
            return Ok(None);
        }
        for document in self.documents.find(GENE_EXPRESSION_COLLECTION)? {
            let document = document?;
            let Some(patient_id) = document.get(PATIENT_ID_FIELD).and_then(Value::as_str) else {
                continue;
            };
            if normalize_patient_id(patient_id) == barcode {
                return Ok(Some(document));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_projects_required_columns() {
        let text = "extra\tbcr_patient_barcode\tOS\tDSS\tclinical_stage\n\
                    x\tTCGA-AB-1234\t1\t0\tStage IIA\n\
                    y\tTCGA-AB-9999\t\tNA\t\n";
        let table = ClinicalTable::parse(text).unwrap();
        assert_eq!(table.len(), 2);
        let first = &table.records()[0];
        assert_eq!(first.bcr_patient_barcode, "TCGA-AB-1234");
        assert_eq!(first.os, Value::from(1));
        assert_eq!(first.dss, Value::from(0));
        assert_eq!(first.clinical_stage, Value::from("Stage IIA"));
        assert_eq!(table.records()[1].dss, Value::Null);
    }

    #[test]
    fn parse_rejects_missing_column() {
        let err = ClinicalTable::parse("bcr_patient_barcode\tOS\tDSS\n").unwrap_err();
        assert_matches!(err, EtlError::ClinicalColumn(column) if column == "clinical_stage");
    }

    #[test]
    fn document_has_clinical_field_order() {
        let record = ClinicalRecord {
            bcr_patient_barcode: "P".to_string(),
            dss: Value::Null,
            os: Value::from(1),
            clinical_stage: Value::Null,
        };
        let keys = record.to_document().keys().cloned().collect::<Vec<_>>();
        assert_eq!(keys, CLINICAL_COLUMNS);
    }
}
