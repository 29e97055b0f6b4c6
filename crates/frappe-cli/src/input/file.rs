use frappe_core::provider::Dataset;
use std::fs;
use std::path::{Path, PathBuf};

/// Read a JSON dataset file.
pub fn read_dataset(path: &str) -> Result<Dataset, Box<dyn std::error::Error>> {
    let canonical = resolve_path(path)?;
    let contents = fs::read_to_string(&canonical)
        .map_err(|e| format!("Failed to read '{}': {}", canonical.display(), e))?;
    let dataset = Dataset::from_json_str(&contents)
        .map_err(|e| format!("Failed to parse '{}': {}", canonical.display(), e))?;
    Ok(dataset)
}

/// Resolve a path against the working directory and check it is a file.
fn resolve_path(path: &str) -> Result<PathBuf, Box<dyn std::error::Error>> {
    let p = Path::new(path);
    let canonical = if p.is_absolute() {
        p.to_path_buf()
    } else {
        std::env::current_dir()?.join(p)
    };

    if !canonical.is_file() {
        return Err(format!("Dataset not found: {}", canonical.display()).into());
    }
    Ok(canonical)
}
