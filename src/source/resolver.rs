//! Source resolution for document data

use crate::document::Document;
use crate::error::{Error, Result};
use base64::Engine;
use std::path::Path;

/// Display name used for inline uploads without a name
pub const BASE64_SOURCE_NAME: &str = "<base64>";

/// Read a document from disk, sniffing its media type
pub fn resolve_path<P: AsRef<Path>>(path: P, max_bytes: u64) -> Result<Document> {
    let path = path.as_ref();

    if !path.is_file() {
        return Err(Error::DocumentNotFound {
            path: path.display().to_string(),
        });
    }

    let size = std::fs::metadata(path)?.len();
    check_size(size, max_bytes)?;

    let data = std::fs::read(path)?;
    Document::from_bytes(path.display().to_string(), data)
}

/// Decode an inline base64 upload
pub fn resolve_base64(base64_data: &str, name: Option<&str>, max_bytes: u64) -> Result<Document> {
    // Reject oversized payloads before allocating the decoded buffer.
    let estimated = (base64_data.len() as u64 / 4) * 3;
    check_size(estimated, max_bytes)?;

    let engine = base64::engine::general_purpose::STANDARD;
    let data = engine.decode(base64_data.trim())?;
    check_size(data.len() as u64, max_bytes)?;

    let name = name
        .filter(|n| !n.trim().is_empty())
        .unwrap_or(BASE64_SOURCE_NAME);
    Document::from_bytes(name, data)
}

fn check_size(size: u64, max_size: u64) -> Result<()> {
    if size > max_size {
        return Err(Error::DocumentTooLarge { size, max_size });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::MediaType;
    use std::io::Write;

    const MAX: u64 = 1024 * 1024;

    fn png_bytes() -> Vec<u8> {
        let img = image::RgbImage::from_pixel(4, 4, image::Rgb([255, 255, 255]));
        let mut out = std::io::Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(img)
            .write_to(&mut out, image::ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn test_resolve_path_not_found() {
        let result = resolve_path("/nonexistent/path/file.pdf", MAX);
        assert!(matches!(result, Err(Error::DocumentNotFound { .. })));
    }

    #[test]
    fn test_resolve_path_sniffs_pdf() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"%PDF-1.7\n%stub").unwrap();

        let doc = resolve_path(file.path(), MAX).unwrap();
        assert_eq!(doc.media_type(), MediaType::Pdf);
        assert_eq!(doc.name(), file.path().display().to_string());
    }

    #[test]
    fn test_resolve_path_rejects_unknown_content() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"just some text").unwrap();

        let result = resolve_path(file.path(), MAX);
        assert!(matches!(result, Err(Error::UnsupportedMediaType { .. })));
    }

    #[test]
    fn test_resolve_path_too_large() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(&[b'%'; 64]).unwrap();

        let result = resolve_path(file.path(), 32);
        assert!(matches!(
            result,
            Err(Error::DocumentTooLarge { size: 64, max_size: 32 })
        ));
    }

    #[test]
    fn test_resolve_base64_image() {
        let encoded = base64::engine::general_purpose::STANDARD.encode(png_bytes());
        let doc = resolve_base64(&encoded, Some("scan.png"), MAX).unwrap();
        assert_eq!(doc.media_type(), MediaType::Image);
        assert_eq!(doc.name(), "scan.png");
    }

    #[test]
    fn test_resolve_base64_default_name() {
        // "%PDF-1.4"
        let doc = resolve_base64("JVBERi0xLjQ=", None, MAX).unwrap();
        assert_eq!(doc.name(), BASE64_SOURCE_NAME);
        assert_eq!(doc.media_type(), MediaType::Pdf);
    }

    #[test]
    fn test_resolve_base64_not_a_document() {
        // "Hello World"
        let result = resolve_base64("SGVsbG8gV29ybGQ=", None, MAX);
        assert!(matches!(result, Err(Error::UnsupportedMediaType { .. })));
    }

    #[test]
    fn test_resolve_base64_invalid_base64() {
        let result = resolve_base64("not valid base64!!!", None, MAX);
        assert!(matches!(result, Err(Error::Base64Decode(_))));
    }

    #[test]
    fn test_resolve_base64_too_large() {
        let encoded = "A".repeat(400);
        let result = resolve_base64(&encoded, None, 100);
        assert!(matches!(result, Err(Error::DocumentTooLarge { .. })));
    }
}
