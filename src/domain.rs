use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type Document = Map<String, Value>;

pub const DEFAULT_BUCKET: &str = "tcga-data";
pub const DEFAULT_DATABASE: &str = "tcga";
pub const GENE_EXPRESSION_COLLECTION: &str = "gene_expression";
pub const CLINICAL_COLLECTION: &str = "clinical_survival_data";
pub const COMBINED_COLLECTION: &str = "combined_clinical_gene_expression_data";
pub const OBJECT_KEY_SUFFIX: &str = "_gene_expression.tsv";

pub const PATIENT_ID_FIELD: &str = "patient_id";
pub const CANCER_COHORT_FIELD: &str = "cancer_cohort";

const DISCOVERY_GENES: [&str; 13] = [
    "C6orf150", "CCL5", "CXCL10", "TMEM173", "CXCL9", "CXCL11", "NFKB1", "IKBKE", "IRF3",
    "TREX1", "ATM", "IL6", "CXCL8",
];

// Same panel with the legacy IL8 symbol, which is what the hub matrices carry.
const CATALOG_GENES: [&str; 13] = [
    "C6orf150", "CCL5", "CXCL10", "TMEM173", "CXCL9", "CXCL11", "NFKB1", "IKBKE", "IRF3",
    "TREX1", "ATM", "IL6", "IL8",
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CohortReference {
    pub cohort_name: String,
    pub download_url: String,
}

impl CohortReference {
    pub fn object_key(&self) -> String {
        object_key_for(&self.cohort_name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenePanel {
    genes: Vec<String>,
}

impl GenePanel {
    pub fn new<I, S>(genes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            genes: genes.into_iter().map(Into::into).collect(),
        }
    }

    /// Panel applied while ingesting freshly discovered cohorts.
    pub fn discovery() -> Self {
        Self::new(DISCOVERY_GENES)
    }

    /// Panel applied when loading stored matrices into the document store.
    pub fn catalog() -> Self {
        Self::new(CATALOG_GENES)
    }

    pub fn genes(&self) -> impl Iterator<Item = &str> {
        self.genes.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.genes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.genes.is_empty()
    }
}

/// Keeps alphanumerics, spaces and underscores, then trims trailing whitespace.
pub fn sanitize_cohort_name(name: &str) -> String {
    let kept = name
        .chars()
        .filter(|ch| ch.is_alphanumeric() || *ch == ' ' || *ch == '_')
        .collect::<String>();
    kept.trim_end().to_string()
}

pub fn object_key_for(cohort_name: &str) -> String {
    format!("{}{OBJECT_KEY_SUFFIX}", sanitize_cohort_name(cohort_name))
}

pub fn cohort_from_key(key: &str) -> &str {
    key.split('_').next().unwrap_or(key)
}

/// Drops the three-character vial/portion suffix of a sample barcode.
pub fn normalize_patient_id(sample_id: &str) -> String {
    let count = sample_id.chars().count();
    sample_id.chars().take(count.saturating_sub(3)).collect()
}

/// Converts a raw table cell into a JSON value: numbers stay numbers, blanks become null.
pub fn cell_value(raw: &str) -> Value {
    let trimmed = raw.trim();
    if trimmed.is_empty() || matches!(trimmed, "NA" | "NaN" | "nan" | "N/A" | "null") {
        return Value::Null;
    }
    if let Ok(int) = trimmed.parse::<i64>() {
        return Value::from(int);
    }
    match trimmed.parse::<f64>() {
        Ok(float) if float.is_finite() => Value::from(float),
        _ => Value::String(trimmed.to_string()),
    }
}
