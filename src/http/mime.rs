//! # Tipos MIME
//! src/http/mime.rs

use std::path::Path;

/// Content-Type según la extensión del archivo
pub fn content_type_for(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "html" | "htm" => "text/html",
        "css" => "text/css",
        "js" => "application/javascript",
        "json" => "application/json",
        "txt" => "text/plain",
        "xml" => "application/xml",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        "pdf" => "application/pdf",
        "wasm" => "application/wasm",
        "woff2" => "font/woff2",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_types() {
        assert_eq!(content_type_for(Path::new("www/index.html")), "text/html");
        assert_eq!(content_type_for(Path::new("style.CSS")), "text/css");
        assert_eq!(content_type_for(Path::new("a/b/script.js")), "application/javascript");
        assert_eq!(content_type_for(Path::new("photo.JPEG")), "image/jpeg");
    }

    #[test]
    fn test_unknown_and_missing_extension() {
        assert_eq!(content_type_for(Path::new("archive.tar.zst")), "application/octet-stream");
        assert_eq!(content_type_for(Path::new("Makefile")), "application/octet-stream");
    }
}
