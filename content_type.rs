//! File-extension to MIME type resolution for response headers.
//!
//! A total function over all string inputs: unknown extensions fall back to
//! `application/octet-stream`, never an error.

/// Fallback MIME type for extensions not in the table
pub const DEFAULT_CONTENT_TYPE: &str = "application/octet-stream";

/// Resolve a file extension (with or without a leading dot, any case)
/// to a MIME type.
pub fn resolve(extension: &str) -> &'static str {
    let ext = extension.trim_start_matches('.').to_ascii_lowercase();
    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        _ => DEFAULT_CONTENT_TYPE,
    }
}
