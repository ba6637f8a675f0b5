//! Upload filename validation and sanitization.
//!
//! Uploaded filenames are untrusted input. `is_allowed_extension` gates the
//! file types the service accepts and `sanitize_name` turns the original
//! filename into a storage key that is safe to use as a path component.

/// File extensions accepted for upload, compared case-insensitively against
/// the part of the filename after the last dot.
pub const ALLOWED_EXTENSIONS: [&str; 7] = ["txt", "pdf", "png", "jpg", "jpeg", "doc", "docx"];

const MAX_STORED_NAME_LEN: usize = 255;

/// True iff `filename` contains a `.` and the lowercased suffix after the
/// last `.` is one of [`ALLOWED_EXTENSIONS`].
pub fn is_allowed_extension(filename: &str) -> bool {
    match filename.rsplit_once('.') {
        Some((_, ext)) => ALLOWED_EXTENSIONS
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(ext)),
        None => false,
    }
}

/// Derive a filesystem-safe storage key from a user-supplied filename.
///
/// Drops any directory components, maps whitespace to `_`, keeps only ASCII
/// alphanumerics plus `.`, `-` and `_`, and strips leading dots so the result
/// can never be a hidden file or a traversal component. Truncated to 255
/// characters. The mapping is deterministic and not collision-free: two
/// uploads sanitizing to the same key overwrite each other at the storage
/// layer.
pub fn sanitize_name(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(filename);

    let mut out = String::with_capacity(base.len());
    for c in base.chars() {
        if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
            out.push(c);
        } else if c.is_whitespace() {
            out.push('_');
        }
        // everything else is dropped
    }

    let trimmed = out.trim_start_matches('.');
    let mut name = trimmed.to_string();
    name.truncate(MAX_STORED_NAME_LEN);
    name
}
