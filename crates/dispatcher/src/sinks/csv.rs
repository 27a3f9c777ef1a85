//! CsvSink - tabular output
//!
//! Columns: URL, Title, ResponseCode, Filename, ProbedAt, FinalURL, Status

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use contracts::{ContractError, ResultSink, ScanResult};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, instrument};

use super::{open_append, path_param};

const HEADER: [&str; 7] = [
    "URL",
    "Title",
    "ResponseCode",
    "Filename",
    "ProbedAt",
    "FinalURL",
    "Status",
];

/// Appends results to a CSV file; the header is written for new files only
pub struct CsvSink {
    name: String,
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    needs_header: bool,
}

impl CsvSink {
    pub fn new(name: impl Into<String>, path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let (file, was_empty) = open_append(&path)?;
        Ok(Self {
            name: name.into(),
            path,
            writer: Some(BufWriter::new(File::from_std(file))),
            needs_header: was_empty,
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

    async fn write_line(&mut self, line: String) -> Result<(), ContractError> {
        let writer = self
            .writer
            .as_mut()
            .ok_or_else(|| ContractError::sink_write(&self.name, "sink is closed"))?;
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))
    }
}

/// Single RFC4180 row, CRLF terminated
fn encode_row<S: AsRef<str>>(fields: &[S]) -> String {
    let mut line = fields
        .iter()
        .map(|f| escape_field(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",");
    line.push_str("\r\n");
    line
}

fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn result_row(result: &ScanResult) -> [String; 7] {
    [
        result.url.clone(),
        result.title.clone(),
        result.response_code.to_string(),
        result.filename.clone(),
        result.probed_at.to_rfc3339(),
        result.final_url.clone(),
        result.status(),
    ]
}

impl ResultSink for CsvSink {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(
        name = "csv_sink_write",
        skip(self, result),
        fields(sink = %self.name, url = %result.url)
    )]
    async fn write(&mut self, result: &ScanResult) -> Result<(), ContractError> {
        if self.needs_header {
            self.write_line(encode_row(&HEADER)).await?;
            self.needs_header = false;
        }
        self.write_line(encode_row(&result_row(result))).await
    }

    #[instrument(name = "csv_sink_flush", skip(self))]
    async fn flush(&mut self) -> Result<(), ContractError> {
        if let Some(writer) = self.writer.as_mut() {
            writer
                .flush()
                .await
                .map_err(|e| ContractError::sink_write(&self.name, e.to_string()))?;
        }
        Ok(())
    }

    #[instrument(name = "csv_sink_close", skip(self))]
    async fn close(&mut self) -> Result<(), ContractError> {
        if let Some(mut writer) = self.writer.take() {
            writer
                .shutdown()
                .await
                .map_err(|e| ContractError::sink_close(&self.name, e.to_string()))?;
        }
        debug!(sink = %self.name, path = %self.path.display(), "CsvSink closed");
        Ok(())
    }
}
