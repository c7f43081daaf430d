//! File-backed JSON store: one pretty-printed document per run.

use crate::constants::output_files::RUN_DOCUMENT_SUFFIX;
use crate::error::{Error, Result};
use crate::store::{
    EvaluationRun, EvaluationStore, ImageEvaluationResult, ModelComparison, ModelMetrics,
    RunDocument,
};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Store writing each run as `{run_id}.wildeval.json` in one directory.
///
/// Documents are assembled in memory and rewritten on every mutation, so
/// a crashed worker leaves the last consistent state on disk.
#[derive(Debug)]
pub struct JsonStore {
    dir: PathBuf,
    documents: Mutex<HashMap<String, RunDocument>>,
}

impl JsonStore {
    /// Create a store rooted at `dir`, creating the directory if needed.
    pub fn new(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            documents: Mutex::new(HashMap::new()),
        })
    }

    /// Path of the document for a run id.
    pub fn document_path(&self, run_id: &str) -> PathBuf {
        self.dir.join(format!("{run_id}{RUN_DOCUMENT_SUFFIX}"))
    }

    fn write_document(&self, document: &RunDocument) -> Result<()> {
        let path = self.document_path(&document.run.id);
        let file = File::create(&path)?;
        let writer = BufWriter::new(file);
        serde_json::to_writer_pretty(writer, document)
            .map_err(|source| Error::StoreWrite { path, source })
    }

    fn with_document<F>(&self, run_id: &str, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut RunDocument),
    {
        let mut documents = self
            .documents
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let document = documents.get_mut(run_id).ok_or_else(|| Error::RunNotFound {
            run_id: run_id.to_string(),
        })?;
        mutate(document);
        self.write_document(document)
    }
}

impl EvaluationStore for JsonStore {
    fn save_run(&self, run: &EvaluationRun) -> Result<()> {
        let mut documents = self
            .documents
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        let document = documents
            .entry(run.id.clone())
            .or_insert_with(|| RunDocument {
                run: run.clone(),
                model_metrics: Vec::new(),
                image_results: Vec::new(),
                comparisons: Vec::new(),
            });
        document.run = run.clone();
        self.write_document(document)
    }

    fn append_model_metrics(&self, run_id: &str, metrics: ModelMetrics) -> Result<()> {
        self.with_document(run_id, |document| document.model_metrics.push(metrics))
    }

    fn append_image_result(&self, run_id: &str, result: ImageEvaluationResult) -> Result<()> {
        self.with_document(run_id, |document| document.image_results.push(result))
    }

    fn append_comparison(&self, run_id: &str, comparison: ModelComparison) -> Result<()> {
        self.with_document(run_id, |document| document.comparisons.push(comparison))
    }

    fn load_document(&self, run_id: &str) -> Result<RunDocument> {
        {
            let documents = self
                .documents
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Some(document) = documents.get(run_id) {
                return Ok(document.clone());
            }
        }

        // Fall back to disk for runs from earlier processes.
        let path = self.document_path(run_id);
        if !path.exists() {
            return Err(Error::RunNotFound {
                run_id: run_id.to_string(),
            });
        }
        let content = std::fs::read_to_string(&path)?;
        serde_json::from_str(&content).map_err(|source| Error::StoreRead { path, source })
    }

    fn delete_run(&self, run_id: &str) -> Result<()> {
        let mut documents = self
            .documents
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        documents.remove(run_id);

        let path = self.document_path(run_id);
        if path.exists() {
            std::fs::remove_file(&path)?;
        }
        Ok(())
    }
}
