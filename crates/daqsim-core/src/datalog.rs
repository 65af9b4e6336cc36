//! Delimited append-only data log.
//!
//! Fields for one record are buffered in order and then written as a single
//! CSV line, optionally prefixed with the local wall-clock time. Fields
//! containing the delimiter are quoted so every record keeps its column
//! count. Every write opens the file in append mode, writes, flushes and
//! closes it again.
//!
//! Failures never propagate: a log whose file could not be created is inert
//! and rejects every write, a failed append is reported through the return
//! value and the next write tries again.

use crate::{Error, Result, DEFAULT_DELIMITER};
use chrono::{DateTime, Local};
use csv::{Terminator, WriterBuilder};
use std::fs::{self, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Format of the leading timestamp column.
const TIMESTAMP_FORMAT: &str = "%H:%M:%S";

/// Format of the log file name.
const FILE_NAME_FORMAT: &str = "DataLog_%Y-%m-%d_%H-%M-%S";

/// Header name of the timestamp column.
pub const TIME_COLUMN: &str = "Time";

/// Append-only delimited log file.
#[derive(Debug)]
pub struct DataLog {
    path: PathBuf,
    delimiter: char,
    pending: Vec<String>,
    entries: u64,
    usable: bool,
}

impl DataLog {
    /// Creates a new log file in `dir`, named after the current local time.
    ///
    /// The directory is created if missing. If anything fails the log is
    /// returned in an unusable state.
    pub fn create(dir: impl AsRef<Path>, delimiter: char) -> Self {
        let dir = dir.as_ref();
        let name = Self::file_name(&Local::now());
        match Self::create_unique(dir, &name) {
            Ok(path) => {
                info!("Log file created: {}", path.display());
                Self::with_state(path, delimiter, true)
            }
            Err(e) => {
                warn!("{}", e);
                Self::with_state(dir.join(format!("{}.csv", name)), delimiter, false)
            }
        }
    }

    /// Creates a new, empty log file at an explicit path.
    pub fn create_at(path: impl Into<PathBuf>, delimiter: char) -> Self {
        let path = path.into();
        let created = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map_or(Ok(()), fs::create_dir_all)
            .and_then(|_| fs::File::create(&path).map(drop));

        match created {
            Ok(()) => {
                info!("Log file created: {}", path.display());
                Self::with_state(path, delimiter, true)
            }
            Err(e) => {
                warn!("{} ({})", Error::LogUnavailable(path.clone()), e);
                Self::with_state(path, delimiter, false)
            }
        }
    }

    fn with_state(path: PathBuf, delimiter: char, usable: bool) -> Self {
        Self {
            path,
            delimiter: Self::checked_delimiter(delimiter),
            pending: Vec::new(),
            entries: 0,
            usable,
        }
    }

    /// Delimiters must be a single ASCII byte other than the quote and line
    /// terminator characters.
    fn checked_delimiter(delimiter: char) -> char {
        if delimiter.is_ascii() && !matches!(delimiter, '"' | '\n' | '\r') {
            delimiter
        } else {
            warn!(
                "Unsupported log delimiter {:?}, using {:?}",
                delimiter, DEFAULT_DELIMITER
            );
            DEFAULT_DELIMITER
        }
    }

    /// Returns the file name stem for a log created at `time`.
    pub fn file_name(time: &DateTime<Local>) -> String {
        time.format(FILE_NAME_FORMAT).to_string()
    }

    /// Creates `dir/<stem>.csv`, adding a numeric suffix instead of
    /// overwriting an existing log from the same second.
    fn create_unique(dir: &Path, stem: &str) -> Result<PathBuf> {
        fs::create_dir_all(dir).map_err(|e| {
            debug!("Failed to create log directory {}: {}", dir.display(), e);
            Error::LogUnavailable(dir.to_path_buf())
        })?;

        let mut suffix = 0u32;
        loop {
            let path = if suffix == 0 {
                dir.join(format!("{}.csv", stem))
            } else {
                dir.join(format!("{}_{}.csv", stem, suffix))
            };
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok(path),
                Err(e) if e.kind() == ErrorKind::AlreadyExists && suffix < 100 => suffix += 1,
                Err(e) => {
                    debug!("Failed to create log file {}: {}", path.display(), e);
                    return Err(Error::LogUnavailable(path));
                }
            }
        }
    }

    /// Buffers a field for the next record.
    pub fn buffer_field(&mut self, field: impl Into<String>) {
        self.pending.push(field.into());
    }

    /// Writes the buffered fields as one line.
    ///
    /// With `include_timestamp` the line starts with the local time. With
    /// `count_on_success` a successful write increments
    /// [`entries`](Self::entries). The buffer is cleared whatever the outcome.
    pub fn write_record(&mut self, include_timestamp: bool, count_on_success: bool) -> bool {
        if !self.usable {
            self.pending.clear();
            return false;
        }

        let timestamp =
            include_timestamp.then(|| Local::now().format(TIMESTAMP_FORMAT).to_string());
        let fields: Vec<String> = timestamp
            .into_iter()
            .chain(self.pending.drain(..))
            .collect();

        match self.append(&fields) {
            Ok(()) => {
                debug!("Log write: {:?}", fields);
                if count_on_success {
                    self.entries += 1;
                }
                true
            }
            Err(e) => {
                warn!("Log write to {} failed: {}", self.path.display(), e);
                false
            }
        }
    }

    /// Writes the header row: the channel names, preceded by the time
    /// column name when data rows carry timestamps. Not counted as an entry.
    pub fn write_header<S: AsRef<str>>(&mut self, names: &[S], time_column: bool) -> bool {
        if time_column {
            self.buffer_field(TIME_COLUMN);
        }
        for name in names {
            self.buffer_field(name.as_ref());
        }
        self.write_record(false, false)
    }

    fn append(&self, fields: &[String]) -> Result<()> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = WriterBuilder::new()
            .delimiter(self.delimiter as u8)
            .terminator(Terminator::Any(b'\n'))
            .has_headers(false)
            .flexible(true)
            .from_writer(file);
        writer.write_record(fields)?;
        writer.flush()?;
        Ok(())
    }

    /// Returns the log file path.
    pub fn file_path(&self) -> &Path {
        &self.path
    }

    /// Returns the field delimiter.
    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    /// Returns the number of successfully written data records.
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Returns the fields buffered for the next record.
    pub fn pending(&self) -> &[String] {
        &self.pending
    }

    /// Returns false if the log file could not be created.
    pub fn is_usable(&self) -> bool {
        self.usable
    }
}
