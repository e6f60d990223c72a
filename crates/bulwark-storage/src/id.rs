//! Collection names, document identifiers and key escaping.
//!
//! Document identifiers may not contain `/`, may not be `.` or `..`, and may
//! not look like a reserved `__name__`. Arbitrary KV keys therefore go
//! through [`escape_key`] before they become identifiers. The escaping is a
//! percent-encoding over UTF-8 bytes with a small safe set; it is reversible
//! and preserves prefixes, so a prefix scan over escaped identifiers is a
//! prefix scan over raw keys.

use crate::error::{StorageError, StorageResult};

/// Longest identifier a backend will accept, in bytes.
pub const MAX_ID_BYTES: usize = 1500;

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

/// Validate a collection name.
///
/// # Errors
///
/// Returns [`StorageError::InvalidKey`] for empty names or names containing
/// `/` or null bytes.
pub fn validate_collection(name: &str) -> StorageResult<()> {
    if name.is_empty() {
        return Err(StorageError::InvalidKey(
            "collection name must not be empty".into(),
        ));
    }
    if name.contains('/') || name.contains('\0') {
        return Err(StorageError::InvalidKey(format!(
            "collection name {name:?} must not contain '/' or null bytes"
        )));
    }
    Ok(())
}

/// Validate a document identifier.
///
/// # Errors
///
/// Returns [`StorageError::InvalidKey`] if the identifier is empty, too long,
/// contains `/`, is `.` or `..`, or matches the reserved `__*__` form.
pub fn validate_document_id(id: &str) -> StorageResult<()> {
    if id.is_empty() {
        return Err(StorageError::InvalidKey(
            "document id must not be empty".into(),
        ));
    }
    if id.len() > MAX_ID_BYTES {
        return Err(StorageError::InvalidKey(format!(
            "document id exceeds {MAX_ID_BYTES} bytes"
        )));
    }
    if id.contains('/') {
        return Err(StorageError::InvalidKey(format!(
            "document id {id:?} must not contain '/'"
        )));
    }
    if id == "." || id == ".." {
        return Err(StorageError::InvalidKey(format!(
            "document id {id:?} is reserved"
        )));
    }
    if id.len() >= 4 && id.starts_with("__") && id.ends_with("__") {
        return Err(StorageError::InvalidKey(format!(
            "document id {id:?} matches the reserved __name__ form"
        )));
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Escaping
// ---------------------------------------------------------------------------

fn is_safe(byte: u8) -> bool {
    byte.is_ascii_alphanumeric()
        || matches!(
            byte,
            b'-' | b':'
                | b'~'
                | b'+'
                | b'='
                | b'@'
                | b','
                | b';'
                | b'!'
                | b'$'
                | b'*'
                | b'('
                | b')'
                | b'\''
        )
}

const HEX: &[u8; 16] = b"0123456789ABCDEF";

/// Escape an arbitrary key into a valid document identifier.
///
/// Safe bytes pass through; every other byte (including `%`, `.`, `_` and
/// `/`) becomes `%XX`. The result never contains `/`, never equals `.` or
/// `..`, and never starts with `_`.
#[must_use]
pub fn escape_key(key: &str) -> String {
    let mut out = String::with_capacity(key.len());
    for &byte in key.as_bytes() {
        if is_safe(byte) {
            out.push(char::from(byte));
        } else {
            out.push('%');
            out.push(char::from(HEX[usize::from(byte.wrapping_shr(4))]));
            out.push(char::from(HEX[usize::from(byte & 0x0F)]));
        }
    }
    out
}

fn hex_value(byte: u8) -> Option<u8> {
    match byte {
        b'0'..=b'9' => Some(byte.wrapping_sub(b'0')),
        b'A'..=b'F' => Some(byte.wrapping_sub(b'A').wrapping_add(10)),
        b'a'..=b'f' => Some(byte.wrapping_sub(b'a').wrapping_add(10)),
        _ => None,
    }
}

/// Reverse [`escape_key`].
///
/// # Errors
///
/// Returns [`StorageError::InvalidKey`] for truncated or malformed escapes
/// and for byte sequences that are not UTF-8.
pub fn unescape_key(escaped: &str) -> StorageResult<String> {
    let bytes = escaped.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while let Some(&byte) = bytes.get(i) {
        if byte == b'%' {
            let hi = bytes.get(i.saturating_add(1)).copied().and_then(hex_value);
            let lo = bytes.get(i.saturating_add(2)).copied().and_then(hex_value);
            match (hi, lo) {
                (Some(hi), Some(lo)) => out.push(hi.wrapping_shl(4) | lo),
                _ => {
                    return Err(StorageError::InvalidKey(format!(
                        "malformed escape in {escaped:?}"
                    )));
                },
            }
            i = i.saturating_add(3);
        } else {
            out.push(byte);
            i = i.saturating_add(1);
        }
    }
    String::from_utf8(out).map_err(|e| StorageError::InvalidKey(e.to_string()))
}

/// Smallest string strictly greater than every string that starts with
/// `prefix`, for use as an exclusive range end.
///
/// Returns `None` when no such bound exists in the ASCII range (empty prefix
/// or a prefix of all `0x7F` bytes), meaning the scan is unbounded above.
#[must_use]
pub fn prefix_upper_bound(prefix: &str) -> Option<String> {
    let mut bytes = prefix.as_bytes().to_vec();
    while let Some(last) = bytes.pop() {
        if last < 0x7F {
            bytes.push(last.wrapping_add(1));
            return String::from_utf8(bytes).ok();
        }
    }
    None
}
