use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::ExportError;
use crate::executor::ResultSet;
use crate::storage::{join_key, ObjectStore};

/// Where an exported result set ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportedObject {
    pub file_name: String,
    pub key: String,
    /// `bucket/prefix/file_name`
    pub file_path: String,
    /// Local copy kept when `delete_processed_file` is off.
    pub retained: Option<PathBuf>,
}

/// Serializes a result set, stages it in the scratch directory, and uploads
/// it. The staged file is removed on every path unless retention is enabled
/// and the upload succeeded.
pub struct ResultExporter {
    store: Arc<dyn ObjectStore>,
    bucket: String,
    key_prefix: String,
    scratch_dir: PathBuf,
    delete_processed_file: bool,
}

impl ResultExporter {
    pub fn new(store: Arc<dyn ObjectStore>, config: &Config) -> Self {
        Self {
            store,
            bucket: config.aws.s3_bucket.clone(),
            key_prefix: config.aws.s3_object_key_prefix.clone(),
            scratch_dir: config.scratch_dir(),
            delete_processed_file: config.delete_processed_file,
        }
    }

    pub fn object_key(&self, destination_key: &str) -> String {
        join_key([self.key_prefix.as_str(), destination_key])
    }

    pub fn file_path(&self, destination_key: &str) -> String {
        join_key([
            self.bucket.as_str(),
            self.key_prefix.as_str(),
            destination_key,
        ])
    }

    pub async fn export(
        &self,
        results: &ResultSet,
        destination_key: &str,
    ) -> Result<ExportedObject, ExportError> {
        let payload = serde_json::to_vec(results)?;
        let staged = self.stage(&payload, destination_key)?;
        debug!(path = %staged.path().display(), bytes = payload.len(), "results staged");

        let key = self.object_key(destination_key);
        self.store
            .put_object(&self.bucket, &key, payload)
            .await
            .map_err(|source| ExportError::Upload {
                bucket: self.bucket.clone(),
                key: key.clone(),
                source,
            })?;
        info!(bucket = %self.bucket, key = %key, rows = results.len(), "results uploaded");

        let retained = if self.delete_processed_file {
            if let Err(err) = staged.close() {
                warn!(error = %err, "failed to remove staged results");
            }
            None
        } else {
            // retention is best effort once the upload has succeeded
            let target = self.scratch_dir.join(local_name(destination_key));
            match staged.persist(&target) {
                Ok(_) => Some(target),
                Err(err) => {
                    warn!(
                        path = %target.display(),
                        error = %err.error,
                        "failed to retain staged results"
                    );
                    None
                }
            }
        };

        Ok(ExportedObject {
            file_name: destination_key.to_string(),
            key,
            file_path: self.file_path(destination_key),
            retained,
        })
    }

    fn stage(&self, payload: &[u8], destination_key: &str) -> Result<NamedTempFile, ExportError> {
        let stage_err = |source| ExportError::Stage {
            path: self.scratch_dir.display().to_string(),
            source,
        };
        let mut staged = tempfile::Builder::new()
            .prefix("lqe-")
            .suffix(&format!("-{}", local_name(destination_key)))
            .tempfile_in(&self.scratch_dir)
            .map_err(stage_err)?;
        staged.write_all(payload).map_err(stage_err)?;
        staged.flush().map_err(stage_err)?;
        Ok(staged)
    }
}

fn local_name(destination_key: &str) -> String {
    destination_key.replace(['/', '\\'], "_")
}
