//! Input documents

use crate::error::{Error, Result};
use rmcp::schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Kind of document, sniffed from content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Pdf,
    Image,
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MediaType::Pdf => f.write_str("pdf"),
            MediaType::Image => f.write_str("image"),
        }
    }
}

impl MediaType {
    /// Detect the media type from the leading bytes
    pub fn sniff(data: &[u8]) -> Option<Self> {
        if data.len() >= 4 && &data[0..4] == b"%PDF" {
            return Some(MediaType::Pdf);
        }
        image::guess_format(data).ok().map(|_| MediaType::Image)
    }
}

/// An immutable document handed to the pipeline.
///
/// Cloning is cheap: the bytes are shared, so every page task can hold its
/// own handle without copying the upload.
#[derive(Clone)]
pub struct Document {
    name: String,
    media_type: MediaType,
    data: Arc<[u8]>,
}

impl Document {
    pub fn new(name: impl Into<String>, media_type: MediaType, data: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            media_type,
            data: data.into(),
        }
    }

    /// Build a document, sniffing its media type
    pub fn from_bytes(name: impl Into<String>, data: Vec<u8>) -> Result<Self> {
        let name = name.into();
        let media_type =
            MediaType::sniff(&data).ok_or_else(|| Error::UnsupportedMediaType { name: name.clone() })?;
        Ok(Self::new(name, media_type, data))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("name", &self.name)
            .field("media_type", &self.media_type)
            .field("bytes", &self.data.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn png_bytes() -> Vec<u8> {
        let img = image::DynamicImage::new_luma8(2, 2);
        let mut out = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        out
    }

    #[test]
    fn test_sniff_pdf() {
        assert_eq!(MediaType::sniff(b"%PDF-1.7\n..."), Some(MediaType::Pdf));
    }

    #[test]
    fn test_sniff_image() {
        assert_eq!(MediaType::sniff(&png_bytes()), Some(MediaType::Image));
    }

    #[test]
    fn test_sniff_unknown() {
        assert_eq!(MediaType::sniff(b"hello world"), None);
        assert_eq!(MediaType::sniff(b""), None);
    }

    #[test]
    fn test_from_bytes_rejects_unknown() {
        let result = Document::from_bytes("notes.txt", b"plain text".to_vec());
        assert!(matches!(result, Err(Error::UnsupportedMediaType { .. })));
    }

    #[test]
    fn test_clone_shares_bytes() {
        let doc = Document::from_bytes("scan.png", png_bytes()).unwrap();
        let copy = doc.clone();
        assert_eq!(copy.media_type(), MediaType::Image);
        assert_eq!(copy.data().as_ptr(), doc.data().as_ptr());
        assert!(format!("{:?}", doc).contains("scan.png"));
    }
}
