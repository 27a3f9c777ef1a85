//! JsonlSink - one JSON object per line

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use contracts::{ContractError, ResultSink, ScanResult};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument};

use super::{open_append, path_param};

/// Appends results to a JSON Lines file
pub struct JsonlSink {
    name: String,
    path: PathBuf,
    writer: Option<BufWriter<File>>,
}

impl JsonlSink {
    /// Open (append) `path`, creating parent directories
    pub fn new(name: impl Into<String>, path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let (file, _) = open_append(&path)?;
        Ok(Self {
            name: name.into(),
            path,
            writer: Some(BufWriter::new(File::from_std(file))),
        })
    }

    /// Create from params map (for factory)
    pub fn from_params(
        name: impl Into<String>,
        params: &HashMap<String, String>,
    ) -> std::io::Result<Self> {
        let path = path_param(params)?;
        Self::new(name, path)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn writer(&mut self) -> Result<&mut BufWriter<File>, ContractError> {
        self.writer
            .as_mut()
            .ok_or_else(|| ContractError::sink_write(&self.name, "sink is closed"))
    }
}

impl ResultSink for JsonlSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "jsonl_sink_write",
        skip(self, result),
        fields(sink = %self.name, url = %result.url)
    )]
    async fn write(&mut self, result: &ScanResult) -> Result<(), ContractError> {
        let mut line = serde_json::to_vec(result)
            .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;
        line.push(b'\n');

        let name = self.name.clone();
        self.writer()?
            .write_all(&line)
            .await
            .map_err(|e| ContractError::sink_write(name, e.to_string()))
    }

    #[instrument(name = "jsonl_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        if let Some(writer) = self.writer.as_mut() {
            writer
                .flush()
                .await
                .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;
        }
        Ok(())
    }

    #[instrument(name = "jsonl_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        if let Some(mut writer) = self.writer.take() {
            writer
                .shutdown()
                .await
                .map_err(|e| ContractError::sink_close(&self.name, e.to_string()))?;
        }
        debug!(sink = %self.name, path = %self.path.display(), "JsonlSink closed");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_jsonl_sink_appends_lines() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("results.jsonl");

        let mut sink = JsonlSink::new("jsonl", &path).unwrap();
        sink.write(&ScanResult::new("https://a.example/")).await.unwrap();
        sink.write(&ScanResult::failed("https://b.example/", "blacklisted: x"))
            .await
            .unwrap();
        sink.close().await.unwrap();

        // Reopen appends
        let mut sink = JsonlSink::new("jsonl", &path).unwrap();
        sink.write(&ScanResult::new("https://c.example/")).await.unwrap();
        sink.close().await.unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let rows: Vec<ScanResult> = content
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(rows.len(), 3);
        assert!(rows[1].failed);
        assert_eq!(rows[2].url, "https://c.example/");
    }

    #[tokio::test]
    async fn test_write_after_close_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = JsonlSink::new("jsonl", dir.path().join("r.jsonl")).unwrap();
        sink.close().await.unwrap();
        assert!(sink.write(&ScanResult::new("https://a.example/")).await.is_err());
    }

    #[test]
    fn test_from_params_requires_path() {
        assert!(JsonlSink::from_params("jsonl", &HashMap::new()).is_err());
    }
}
