//! Safe local filenames for server-suggested download names

use std::path::Path;

const INVALID_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];
const RESERVED_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL",
    "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8", "COM9",
    "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// Make a server-provided name safe to create inside the output directory
///
/// Path separators and reserved characters become `_`, so a name can never
/// escape the directory it is joined to.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .trim()
        .chars()
        .map(|c| {
            if INVALID_CHARS.contains(&c) || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect();

    // Leading dots would hide the file or form `..`
    let mut result = replaced
        .trim_start_matches('.')
        .trim_end_matches([' ', '.'])
        .to_string();

    let upper = result.to_uppercase();
    let stem = upper.split('.').next().unwrap_or("");
    if RESERVED_NAMES.contains(&stem) {
        result = format!("_{}", result);
    }

    if result.is_empty() {
        result = "_".to_string();
    }

    result
}

/// Insert a millisecond timestamp before the extension: `song.mp3` → `song[1768053096643].mp3`
fn with_timestamp(filename: &str, unix_millis: i64) -> String {
    let path = Path::new(filename);
    let stem = path.file_stem().and_then(|s| s.to_str());
    let extension = path.extension().and_then(|e| e.to_str());

    match (stem, extension) {
        (Some(stem), Some(ext)) => format!("{}[{}].{}", stem, unix_millis, ext),
        _ => format!("{}[{}]", filename, unix_millis),
    }
}

/// Return `filename`, or a timestamped variant if it already exists in `dir`
pub fn ensure_unique_filename(dir: &Path, filename: &str) -> String {
    if !dir.join(filename).exists() {
        return filename.to_string();
    }

    let mut millis = chrono::Utc::now().timestamp_millis();
    let mut candidate = with_timestamp(filename, millis);
    while dir.join(&candidate).exists() {
        millis += 1;
        candidate = with_timestamp(filename, millis);
    }
    candidate
}
