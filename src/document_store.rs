use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};

use camino::{Utf8Path, Utf8PathBuf};
use serde_json::Value;

use crate::domain::Document;
use crate::error::EtlError;

pub type DocumentCursor<'a> = Box<dyn Iterator<Item = Result<Document, EtlError>> + 'a>;

/// Collection-oriented document CRUD, scoped to one database.
pub trait DocumentStore: Send + Sync {
    fn insert_many(&self, collection: &str, documents: &[Document]) -> Result<usize, EtlError>;
    fn insert_one(&self, collection: &str, document: &Document) -> Result<(), EtlError>;
    /// Lazily scans the whole collection in insertion order.
    fn find(&self, collection: &str) -> Result<DocumentCursor<'_>, EtlError>;
    /// First document whose `field` equals `value`, reduced to the `projection` fields.
    fn find_one(
        &self,
        collection: &str,
        field: &str,
        value: &str,
        projection: &[&str],
    ) -> Result<Option<Document>, EtlError> {
        for document in self.find(collection)? {
            let document = document?;
            if document.get(field).and_then(Value::as_str) == Some(value) {
                return Ok(Some(project(document, projection)));
            }
        }
        Ok(None)
    }
}

pub fn project(document: Document, projection: &[&str]) -> Document {
    document
        .into_iter()
        .filter(|(key, _)| projection.contains(&key.as_str()))
        .collect()
}

/// One JSON Lines file per collection under `root/<database>/`.
#[derive(Debug, Clone)]
pub struct FsDocumentStore {
    database_dir: Utf8PathBuf,
}

impl FsDocumentStore {
    pub fn new(root: &Utf8Path, database: &str) -> Self {
        Self {
            database_dir: root.join(database),
        }
    }

    pub fn database_dir(&self) -> &Utf8Path {
        &self.database_dir
    }

    pub fn collection_path(&self, collection: &str) -> Utf8PathBuf {
        self.database_dir.join(format!("{collection}.jsonl"))
    }

    fn append(&self, collection: &str, documents: &[Document]) -> Result<(), EtlError> {
        fs::create_dir_all(self.database_dir.as_std_path())
            .map_err(|err| EtlError::DocumentStore(err.to_string()))?;
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.collection_path(collection).as_std_path())
            .map_err(|err| EtlError::DocumentStore(err.to_string()))?;
        let mut writer = BufWriter::new(file);
        for document in documents {
            serde_json::to_writer(&mut writer, document)
                .map_err(|err| EtlError::DocumentStore(err.to_string()))?;
            writer
                .write_all(b"\n")
                .map_err(|err| EtlError::DocumentStore(err.to_string()))?;
        }
        writer
            .flush()
            .map_err(|err| EtlError::DocumentStore(err.to_string()))
    }
}

impl DocumentStore for FsDocumentStore {
    fn insert_many(&self, collection: &str, documents: &[Document]) -> Result<usize, EtlError> {
        if documents.is_empty() {
            return Err(EtlError::DocumentStore(
                "insert_many requires at least one document".to_string(),
            ));
        }
        self.append(collection, documents)?;
        Ok(documents.len())
    }

    fn insert_one(&self, collection: &str, document: &Document) -> Result<(), EtlError> {
        self.append(collection, std::slice::from_ref(document))
    }

    fn find(&self, collection: &str) -> Result<DocumentCursor<'_>, EtlError> {
        let path = self.collection_path(collection);
        let file = match File::open(path.as_std_path()) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(Box::new(std::iter::empty()));
            }
            Err(err) => return Err(EtlError::DocumentStore(err.to_string())),
        };
        let cursor = BufReader::new(file)
            .lines()
            .enumerate()
            .filter_map(move |(index, line)| match line {
                Ok(line) if line.trim().is_empty() => None,
                Ok(line) => Some(serde_json::from_str::<Document>(&line).map_err(|err| {
                    EtlError::DocumentStore(format!("{path}:{}: {err}", index + 1))
                })),
                Err(err) => Some(Err(EtlError::DocumentStore(err.to_string()))),
            });
        Ok(Box::new(cursor))
    }
}
