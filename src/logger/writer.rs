//! Log file handling for the file output

use std::fs::{File, OpenOptions};
use std::sync::Mutex;

use crate::logger::config::FileConfig;
use crate::logger::error::LoggerError;

/// `Mutex<File>` is a `MakeWriter`, so each event locks the file for one write.
pub(crate) type LogFileWriter = Mutex<File>;

/// Open the configured log file, creating its parent directory if needed.
pub(crate) fn open_log_file(config: &FileConfig) -> Result<LogFileWriter, LoggerError> {
    if let Some(parent) = config.path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut options = OpenOptions::new();
    options.create(true);
    if config.append {
        options.append(true);
    } else {
        options.write(true).truncate(true);
    }

    let file = options.open(&config.path)?;
    Ok(Mutex::new(file))
}
