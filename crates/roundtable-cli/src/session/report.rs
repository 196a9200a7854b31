use anyhow::Result;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use roundtable::models::message::Message;

/// `~/.config/roundtable/reports`, created on demand
pub fn ensure_report_dir() -> Result<PathBuf> {
    let home_dir =
        dirs::home_dir().ok_or_else(|| anyhow::anyhow!("Could not determine home directory"))?;
    let report_dir = home_dir.join(".config").join("roundtable").join("reports");

    if !report_dir.exists() {
        fs::create_dir_all(&report_dir)?;
    }

    Ok(report_dir)
}

/// A fresh report file named after the current time
pub fn default_report_file() -> Result<PathBuf> {
    let name = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
    Ok(ensure_report_dir()?.join(format!("{}.jsonl", name)))
}

/// Write the transcript as one JSON message per line
pub fn persist_messages(report_file: &Path, messages: &[Message]) -> Result<()> {
    if let Some(parent) = report_file.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    let file = File::create(report_file)?; // Create or truncate the file
    let mut writer = std::io::BufWriter::new(file);

    for message in messages {
        serde_json::to_writer(&mut writer, &message)?;
        writeln!(writer)?;
    }

    writer.flush()?;
    Ok(())
}

pub fn read_messages(report_file: &Path) -> Result<Vec<Message>> {
    let contents = fs::read_to_string(report_file)?;
    contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| Ok(serde_json::from_str(line)?))
        .collect()
}
