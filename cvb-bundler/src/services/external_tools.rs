//! External helper invocation
//!
//! - Duration summing tool: prints the total clip duration (ms) of a directory
//! - Corpus splitter: reads clips.tsv, writes `<out>/<locale>/<bucket>.tsv`
//!
//! Both are black boxes; only their exit status and output are used.

use cvb_common::{Error, Result};
use std::collections::BTreeMap;
use std::io::BufRead;
use std::path::Path;
use tokio::process::Command;
use walkdir::WalkDir;

/// Runs the duration tool for one locale's clips directory
#[derive(Debug, Clone)]
pub struct DurationSummarizer {
    command: Vec<String>,
}

impl DurationSummarizer {
    pub fn new(command: Vec<String>) -> Result<Self> {
        if command.is_empty() {
            return Err(Error::Config("duration command is empty".to_string()));
        }
        Ok(Self { command })
    }

    /// Total duration in milliseconds of the clips under `clips_dir`
    pub async fn locale_duration(&self, clips_dir: &Path) -> Result<f64> {
        let program = &self.command[0];
        let output = Command::new(program)
            .args(&self.command[1..])
            .arg(clips_dir)
            .output()
            .await
            .map_err(|e| Error::external_tool(program, format!("spawn failed: {}", e)))?;

        if !output.status.success() {
            return Err(Error::external_tool(
                program,
                format!(
                    "{} for {}: {}",
                    output.status,
                    clips_dir.display(),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            ));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let duration = parse_duration_output(&stdout).ok_or_else(|| {
            Error::external_tool(program, format!("unparsable output: {:?}", stdout.trim()))
        })?;

        tracing::debug!(dir = %clips_dir.display(), duration_ms = duration, "Locale duration summed");
        Ok(duration)
    }
}

/// Parse the tool's single numeric result (last non-empty line)
pub fn parse_duration_output(stdout: &str) -> Option<f64> {
    let value: f64 = stdout
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .last()?
        .parse()
        .ok()?;
    (value.is_finite() && value >= 0.0).then_some(value)
}

/// Bucket name → clip count for the splitter output in `locale_dir`
///
/// Counts the lines of each `*.tsv` file directly inside the directory,
/// minus the header line.
pub fn count_buckets(locale_dir: &Path) -> Result<BTreeMap<String, u64>> {
    let mut buckets = BTreeMap::new();

    for entry in WalkDir::new(locale_dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| Error::Io(std::io::Error::other(e.to_string())))?;
        let path = entry.path();
        if !entry.file_type().is_file() || path.extension().and_then(|e| e.to_str()) != Some("tsv") {
            continue;
        }
        let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };

        let file = std::fs::File::open(path)?;
        let lines = std::io::BufReader::new(file).lines().count() as u64;
        buckets.insert(name.to_string(), lines.saturating_sub(1));
    }

    Ok(buckets)
}

/// Run the corpus splitter over `tsv_path`, writing into `out_dir`
pub async fn run_corpus_splitter(command: &[String], tsv_path: &Path, out_dir: &Path) -> Result<()> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| Error::Config("splitter command is empty".to_string()))?;

    tracing::info!(tool = %program, tsv = %tsv_path.display(), "Running corpus splitter");
    let status = Command::new(program)
        .args(args)
        .arg(tsv_path)
        .arg(out_dir)
        .status()
        .await
        .map_err(|e| Error::external_tool(program, format!("spawn failed: {}", e)))?;

    if !status.success() {
        return Err(Error::external_tool(program, status.to_string()));
    }
    Ok(())
}
