//! Loading JSON documents from disk

use crate::error::{IngotError, Result};
use serde_json::Value;
use std::path::Path;
use tracing::debug;

/// Deepest array/object nesting accepted, the same limit serde_json applies
pub const MAX_NESTING: usize = 128;

/// Read and parse a whole JSON document.
///
/// Parsing goes through simd-json's serde deserializer straight into a
/// `serde_json::Value`, so object keys keep their document order.
pub fn load_document(path: impl AsRef<Path>) -> Result<Value> {
    let path = path.as_ref();
    let mut content = std::fs::read(path).map_err(|e| IngotError::io(path, e))?;
    debug!(path = %path.display(), bytes = content.len(), "loaded JSON document");

    parse_document(&mut content).map_err(|message| IngotError::Parse {
        path: path.to_path_buf(),
        message,
    })
}

/// Parse an in-memory document. The buffer is used as scratch space.
///
/// Documents nested deeper than [`MAX_NESTING`] are rejected before they
/// reach the recursive deserializer.
pub fn parse_document(content: &mut [u8]) -> std::result::Result<Value, String> {
    check_nesting(content, MAX_NESTING)?;
    simd_json::serde::from_slice::<Value>(content).map_err(|e| e.to_string())
}

/// Scan for `[`/`{` nesting past `limit`, ignoring brackets inside strings
fn check_nesting(content: &[u8], limit: usize) -> std::result::Result<(), String> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in content.iter().enumerate() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'[' | b'{' => {
                depth += 1;
                if depth > limit {
                    return Err(format!(
                        "recursion limit exceeded: nesting deeper than {} at byte {}",
                        limit, offset
                    ));
                }
            }
            b']' | b'}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    Ok(())
}
