use std::fs;
use std::io;

use camino::Utf8PathBuf;

use crate::error::EtlError;

/// Bucket/key blob storage as used by ingestion and catalog sync.
pub trait ObjectStore: Send + Sync {
    fn bucket_exists(&self, bucket: &str) -> Result<bool, EtlError>;
    fn make_bucket(&self, bucket: &str) -> Result<(), EtlError>;
    fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> Result<(), EtlError>;
    /// Every key in the bucket, sorted.
    fn list_objects(&self, bucket: &str) -> Result<Vec<String>, EtlError>;
    fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, EtlError>;

    fn ensure_bucket(&self, bucket: &str) -> Result<(), EtlError> {
        if !self.bucket_exists(bucket)? {
            self.make_bucket(bucket)?;
        }
        Ok(())
    }
}

/// Buckets are directories under `root`, objects are files named by key.
#[derive(Debug, Clone)]
pub struct FsObjectStore {
    root: Utf8PathBuf,
}

impl FsObjectStore {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn bucket_dir(&self, bucket: &str) -> Utf8PathBuf {
        self.root.join(bucket)
    }

    fn object_path(&self, bucket: &str, key: &str) -> Result<Utf8PathBuf, EtlError> {
        validate_name("key", key)?;
        Ok(self.bucket_dir(bucket).join(key))
    }
}

impl ObjectStore for FsObjectStore {
    fn bucket_exists(&self, bucket: &str) -> Result<bool, EtlError> {
        validate_name("bucket", bucket)?;
        Ok(self.bucket_dir(bucket).as_std_path().is_dir())
    }

    fn make_bucket(&self, bucket: &str) -> Result<(), EtlError> {
        validate_name("bucket", bucket)?;
        fs::create_dir_all(self.bucket_dir(bucket).as_std_path())
            .map_err(|err| EtlError::ObjectStore(err.to_string()))
    }

    fn put_object(&self, bucket: &str, key: &str, data: &[u8]) -> Result<(), EtlError> {
        if !self.bucket_exists(bucket)? {
            return Err(EtlError::ObjectStore(format!("bucket does not exist: {bucket}")));
        }
        let path = self.object_path(bucket, key)?;
        let parent = self.bucket_dir(bucket);
        let temp = tempfile::Builder::new()
            .prefix(".tcga-etl-object")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| EtlError::ObjectStore(err.to_string()))?;
        fs::write(temp.path(), data).map_err(|err| EtlError::ObjectStore(err.to_string()))?;
        temp.persist(path.as_std_path())
            .map_err(|err| EtlError::ObjectStore(err.to_string()))?;
        Ok(())
    }

    fn list_objects(&self, bucket: &str) -> Result<Vec<String>, EtlError> {
        validate_name("bucket", bucket)?;
        let dir = self.bucket_dir(bucket);
        let entries = match fs::read_dir(dir.as_std_path()) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(EtlError::ObjectStore(format!("bucket does not exist: {bucket}")));
            }
            Err(err) => return Err(EtlError::ObjectStore(err.to_string())),
        };

        let mut keys = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| EtlError::ObjectStore(err.to_string()))?;
            if !entry.path().is_file() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            keys.push(name);
        }
        keys.sort();
        Ok(keys)
    }

    fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, EtlError> {
        let path = self.object_path(bucket, key)?;
        fs::read(path.as_std_path()).map_err(|err| match err.kind() {
            io::ErrorKind::NotFound => EtlError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            },
            _ => EtlError::ObjectStore(err.to_string()),
        })
    }
}

fn validate_name(kind: &str, name: &str) -> Result<(), EtlError> {
    let invalid = name.is_empty()
        || name.starts_with('.')
        || name.contains('/')
        || name.contains('\\');
    if invalid {
        return Err(EtlError::ObjectStore(format!("invalid {kind} name: {name:?}")));
    }
    Ok(())
}
