use thiserror::Error;

use crate::document_store::DocumentStore;
use crate::domain::{
    CANCER_COHORT_FIELD, Document, GENE_EXPRESSION_COLLECTION, GenePanel, PATIENT_ID_FIELD,
};
use crate::error::EtlError;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("patient_id is required")]
    MissingPatientId,

    #[error("No data found for the given patient_id")]
    NotFound,

    #[error(transparent)]
    Store(#[from] EtlError),
}

/// Read-only patient lookup over the gene expression collection.
pub struct QueryService<D: DocumentStore> {
    documents: D,
    projection: Vec<String>,
}

impl<D: DocumentStore> QueryService<D> {
    pub fn new(documents: D) -> Self {
        let mut projection = vec![PATIENT_ID_FIELD.to_string(), CANCER_COHORT_FIELD.to_string()];
        projection.extend(GenePanel::catalog().genes().map(str::to_string));
        Self {
            documents,
            projection,
        }
    }

    pub fn lookup(&self, patient_id: Option<&str>) -> Result<Document, QueryError> {
        let patient_id = patient_id
            .filter(|value| !value.is_empty())
            .ok_or(QueryError::MissingPatientId)?;
        let projection = self
            .projection
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>();
        self.documents
            .find_one(
                GENE_EXPRESSION_COLLECTION,
                PATIENT_ID_FIELD,
                patient_id,
                &projection,
            )?
            .ok_or(QueryError::NotFound)
    }
}
