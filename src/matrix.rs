use std::collections::HashMap;

use serde_json::Value;

use crate::domain::{CANCER_COHORT_FIELD, Document, GenePanel, PATIENT_ID_FIELD, cell_value};

/// Columns appended to every transformed record on request of the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExtraColumns<'a> {
    pub patient_id: bool,
    pub cancer_cohort: Option<&'a str>,
}

impl ExtraColumns<'static> {
    pub const NONE: Self = Self {
        patient_id: false,
        cancer_cohort: None,
    };
}

impl<'a> ExtraColumns<'a> {
    pub fn with_cohort(cancer_cohort: &'a str) -> Self {
        Self {
            patient_id: true,
            cancer_cohort: Some(cancer_cohort),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmptyReason {
    NoPanelGenes,
    NoSamples,
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Transformed {
    Records(Vec<Document>),
    Empty(EmptyReason),
}

impl Transformed {
    pub fn len(&self) -> usize {
        match self {
            Transformed::Records(records) => records.len(),
            Transformed::Empty(_) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn into_records(self) -> Vec<Document> {
        match self {
            Transformed::Records(records) => records,
            Transformed::Empty(_) => Vec::new(),
        }
    }
}

struct Matrix {
    samples: Vec<String>,
    rows: HashMap<String, Vec<Value>>,
}

/// Transposes a gene-by-sample TSV into one record per sample, keeping only panel genes.
///
/// Never fails: unreadable input comes back as `Transformed::Empty(EmptyReason::Malformed)`.
pub fn transform(bytes: &[u8], panel: &GenePanel, extra: ExtraColumns<'_>) -> Transformed {
    let matrix = match parse_matrix(bytes) {
        Ok(matrix) => matrix,
        Err(reason) => return Transformed::Empty(EmptyReason::Malformed(reason)),
    };

    let genes_found = panel
        .genes()
        .filter(|gene| matrix.rows.contains_key(*gene))
        .collect::<Vec<_>>();
    if genes_found.is_empty() {
        return Transformed::Empty(EmptyReason::NoPanelGenes);
    }
    if matrix.samples.is_empty() {
        return Transformed::Empty(EmptyReason::NoSamples);
    }

    let records = matrix
        .samples
        .iter()
        .enumerate()
        .map(|(index, sample)| {
            let mut record = Document::new();
            if extra.patient_id {
                record.insert(PATIENT_ID_FIELD.to_string(), Value::from(sample.as_str()));
            }
            if let Some(cohort) = extra.cancer_cohort {
                record.insert(CANCER_COHORT_FIELD.to_string(), Value::from(cohort));
            }
            for gene in &genes_found {
                let value = matrix.rows[*gene]
                    .get(index)
                    .cloned()
                    .unwrap_or(Value::Null);
                record.insert((*gene).to_string(), value);
            }
            record
        })
        .collect();
    Transformed::Records(records)
}

fn parse_matrix(bytes: &[u8]) -> Result<Matrix, String> {
    let text = std::str::from_utf8(bytes).map_err(|err| format!("not UTF-8: {err}"))?;
    let mut lines = text
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty());

    let (_, header) = lines.next().ok_or_else(|| "no header row".to_string())?;
    let width = header.split('\t').count();
    let samples = header
        .split('\t')
        .skip(1)
        .map(|sample| sample.trim().to_string())
        .collect::<Vec<_>>();

    let mut rows = HashMap::new();
    for (line_no, line) in lines {
        let cells = line.split('\t').collect::<Vec<_>>();
        if cells.len() > width {
            return Err(format!(
                "line {}: expected {width} fields, saw {}",
                line_no + 1,
                cells.len()
            ));
        }
        let gene = cells[0].trim().to_string();
        let values = (1..width)
            .map(|col| cells.get(col).map(|cell| cell_value(cell)).unwrap_or(Value::Null))
            .collect::<Vec<_>>();
        rows.insert(gene, values);
    }

    Ok(Matrix { samples, rows })
}
