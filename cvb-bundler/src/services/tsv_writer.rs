//! clips.tsv writer
//!
//! One header line, then one tab-separated line per SanitizedRow in arrival
//! order. Fields are never quoted; sentences are normalized before they get
//! here so no field contains a tab or line break.

use crate::models::{SanitizedRow, TSV_COLUMNS};
use cvb_common::Result;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// Streaming TSV writer
pub struct TsvWriter {
    path: PathBuf,
    writer: csv::Writer<BufWriter<File>>,
    records: u64,
}

impl TsvWriter {
    /// Create (truncate) the file and write the header line
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = BufWriter::new(File::create(path)?);
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .quote_style(csv::QuoteStyle::Never)
            .has_headers(false)
            .from_writer(file);

        writer
            .write_record(TSV_COLUMNS)
            .map_err(std::io::Error::from)?;

        Ok(Self {
            path: path.to_path_buf(),
            writer,
            records: 0,
        })
    }

    pub fn write(&mut self, row: &SanitizedRow) -> Result<()> {
        self.writer.serialize(row).map_err(std::io::Error::from)?;
        self.records += 1;
        Ok(())
    }

    /// Records written so far (header excluded)
    pub fn records(&self) -> u64 {
        self.records
    }

    /// Flush buffered output and return the file path
    pub fn finish(mut self) -> Result<PathBuf> {
        self.writer.flush()?;
        tracing::info!(
            path = %self.path.display(),
            records = self.records,
            "clips.tsv written"
        );
        Ok(self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ClipRow;
    use tempfile::TempDir;

    fn sanitized(id: &str, sentence: &str) -> SanitizedRow {
        ClipRow {
            id: id.to_string(),
            client_id: format!("client-{}", id),
            path: format!("remote/{}.mp3", id),
            sentence: sentence.to_string(),
            up_votes: 3,
            down_votes: 1,
            age: "thirties".to_string(),
            gender: "".to_string(),
            accent: "scotland".to_string(),
            locale: "en".to_string(),
            segment: "".to_string(),
        }
        .sanitize()
    }

    #[test]
    fn test_header_and_rows() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("clips.tsv");

        let mut writer = TsvWriter::create(&path).unwrap();
        writer.write(&sanitized("1", "First\rline")).unwrap();
        writer.write(&sanitized("2", "Second")).unwrap();
        assert_eq!(writer.records(), 2);
        writer.finish().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = content.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], TSV_COLUMNS.join("\t"));
        assert!(lines[1].starts_with("1\t"));
        assert!(lines[1].contains("\tcommon_voice_en_1.mp3\tFirst line\t3\t1\t"));
        assert!(!content.contains("client-1"));
    }

    #[test]
    fn test_empty_run_writes_header_only() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("clips.tsv");
        TsvWriter::create(&path).unwrap().finish().unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content.trim_end(), TSV_COLUMNS.join("\t"));
    }

    #[test]
    fn test_written_rows_parse_back() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("clips.tsv");
        let rows = vec![sanitized("10", "Quotes \"stay\" as-is"), sanitized("11", "Plain")];

        let mut writer = TsvWriter::create(&path).unwrap();
        for row in &rows {
            writer.write(row).unwrap();
        }
        writer.finish().unwrap();

        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .quoting(false)
            .from_path(&path)
            .unwrap();
        let parsed: Vec<SanitizedRow> = reader.deserialize().map(|r| r.unwrap()).collect();
        assert_eq!(parsed, rows);
        let ids: Vec<&str> = parsed.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["10", "11"]);
    }
}
