use frappe_core::provider::Dataset;
use std::io::{self, Read};

/// Read a JSON dataset piped on stdin. `None` when stdin is a terminal or
/// nothing was piped.
pub fn read_stdin() -> Result<Option<Dataset>, Box<dyn std::error::Error>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }

    let mut buffer = String::new();
    io::stdin().read_to_string(&mut buffer)?;

    let trimmed = buffer.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    Ok(Some(Dataset::from_json_str(trimmed)?))
}
