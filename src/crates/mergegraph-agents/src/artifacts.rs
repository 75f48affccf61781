//! Report files
//!
//! Per-company reports go to `<report_dir>/<company>_<kind>.txt`, pipeline-level
//! reports to `<merger_report_dir>/<name>.txt`. Any filesystem failure becomes
//! [`StageError::ReportWrite`], which aborts the run.

use crate::config::PipelineConfig;
use mergegraph_core::StageError;
use std::path::{Path, PathBuf};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactWriter {
    report_dir: PathBuf,
    merger_report_dir: PathBuf,
}

impl ArtifactWriter {
    pub fn new(report_dir: impl Into<PathBuf>, merger_report_dir: impl Into<PathBuf>) -> Self {
        Self {
            report_dir: report_dir.into(),
            merger_report_dir: merger_report_dir.into(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(&config.report_dir, &config.merger_report_dir)
    }

    /// Resolve both directories under `root`
    pub fn rooted_at(self, root: &Path) -> Self {
        Self {
            report_dir: root.join(self.report_dir),
            merger_report_dir: root.join(self.merger_report_dir),
        }
    }

    pub fn report_dir(&self) -> &Path {
        &self.report_dir
    }

    pub fn merger_report_dir(&self) -> &Path {
        &self.merger_report_dir
    }

    /// `<report_dir>/<company>_<kind>.txt`; the company part never leaves `report_dir`
    pub fn entity_report_path(&self, company: &str, kind: &str) -> PathBuf {
        self.report_dir.join(format!("{}_{}.txt", file_stem(company), kind))
    }

    /// Write a per-company report and return its path
    pub async fn write_entity(&self, company: &str, kind: &str, text: &str) -> Result<PathBuf, StageError> {
        let path = self.entity_report_path(company, kind);
        write_file(&path, text).await?;
        Ok(path)
    }

    /// Write a pipeline-level report named `<name>.txt`
    pub async fn write_pipeline(&self, name: &str, text: &str) -> Result<PathBuf, StageError> {
        let path = self.merger_report_dir.join(format!("{}.txt", name));
        write_file(&path, text).await?;
        Ok(path)
    }
}

/// Company name as a single path component
///
/// Separators and control characters become `_`, as do the dots of a name that
/// is nothing but dots.
pub fn file_stem(company: &str) -> String {
    let stem: String = company
        .trim()
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') || c.is_control() { '_' } else { c })
        .collect();
    if stem.chars().all(|c| c == '.') {
        stem.replace('.', "_")
    } else {
        stem
    }
}

async fn write_file(path: &Path, text: &str) -> Result<(), StageError> {
    let fail = |source| StageError::report_write(path, source);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).await.map_err(fail)?;
    }

    let mut file = File::create(path).await.map_err(fail)?;
    file.write_all(text.as_bytes()).await.map_err(fail)?;
    file.flush().await.map_err(fail)?;
    file.sync_all().await.map_err(fail)?;

    info!(path = %path.display(), bytes = text.len(), "Report written");
    Ok(())
}
