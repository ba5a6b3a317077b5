//! CLI argument validation functions
//!
//! Custom value parsers for arguments that need more than a type check.

use std::fs;
use std::path::PathBuf;

/// Validate that a file path is accessible (exists and is readable)
pub fn validate_config_file_path(path_str: &str) -> Result<PathBuf, String> {
    let path = PathBuf::from(path_str);

    if !path.exists() {
        return Err(format!("Configuration file does not exist: '{}'", path_str));
    }

    if !path.is_file() {
        return Err(format!("Configuration path is not a file: '{}'", path_str));
    }

    match fs::File::open(&path) {
        Ok(_) => Ok(path),
        Err(e) => Err(format!(
            "Cannot read configuration file '{}': {}",
            path_str, e
        )),
    }
}

/// Cache keys must be non-empty and free of whitespace
pub fn validate_key(key_str: &str) -> Result<String, String> {
    if key_str.is_empty() {
        return Err("Key cannot be empty".to_string());
    }
    if key_str.chars().any(char::is_whitespace) {
        return Err(format!("Key cannot contain whitespace: '{}'", key_str));
    }
    Ok(key_str.to_string())
}

/// SCAN batch size must be a positive number
pub fn validate_batch_size(size_str: &str) -> Result<usize, String> {
    let size: usize = size_str
        .parse()
        .map_err(|_| format!("Batch size must be a positive number, got: '{}'", size_str))?;
    if size == 0 {
        return Err("Batch size must be greater than 0".to_string());
    }
    Ok(size)
}
