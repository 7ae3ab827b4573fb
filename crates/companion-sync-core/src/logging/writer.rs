//! Append-only JSONL file per device.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;

use super::entry::DeviceLogEntry;

/// Appends entries to `<logs_dir>/raw/<date>_<device>.jsonl`
pub struct DeviceLogWriter {
    device: String,
    writer: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl DeviceLogWriter {
    /// Open (or create) today's file for `device`, creating `raw/` if needed
    pub fn new(logs_dir: impl AsRef<Path>, device: impl Into<String>) -> std::io::Result<Self> {
        let device = device.into();
        let raw_dir = logs_dir.as_ref().join("raw");
        fs::create_dir_all(&raw_dir)?;

        let date = chrono::Local::now().format("%Y-%m-%d");
        let path = raw_dir.join(format!("{}_{}.jsonl", date, device));
        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        Ok(Self {
            device,
            writer: Mutex::new(BufWriter::new(file)),
            path,
        })
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write one entry as one line and flush it.
    pub fn write(&self, entry: &DeviceLogEntry) -> std::io::Result<()> {
        let json = entry
            .to_json_line()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;

        let mut writer = self.writer.lock();
        writeln!(writer, "{}", json)?;
        writer.flush()
    }

    pub fn flush(&self) -> std::io::Result<()> {
        self.writer.lock().flush()
    }
}

impl Drop for DeviceLogWriter {
    fn drop(&mut self) {
        let _ = self.flush();
    }
}

/// Read entries from every device file (or only `device`), sorted by time.
///
/// Lines that do not parse are skipped.
pub fn read_device_entries(
    logs_dir: impl AsRef<Path>,
    device: Option<&str>,
) -> std::io::Result<Vec<DeviceLogEntry>> {
    let raw_dir = logs_dir.as_ref().join("raw");
    if !raw_dir.exists() {
        return Ok(Vec::new());
    }

    let suffix = device.map(|device| format!("_{}.jsonl", device));
    let mut entries = Vec::new();

    for dir_entry in fs::read_dir(&raw_dir)? {
        let path = dir_entry?.path();
        let Some(filename) = path.file_name().and_then(|f| f.to_str()) else {
            continue;
        };
        let wanted = match &suffix {
            Some(suffix) => filename.ends_with(suffix.as_str()),
            None => filename.ends_with(".jsonl"),
        };
        if !wanted {
            continue;
        }

        let content = fs::read_to_string(&path)?;
        entries.extend(
            content
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .filter_map(|line| DeviceLogEntry::from_json_line(line).ok()),
        );
    }

    entries.sort_by(|a, b| a.ts.cmp(&b.ts));
    Ok(entries)
}
