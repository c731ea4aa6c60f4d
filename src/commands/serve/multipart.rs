//! `multipart/form-data` decoding for uploads
//!
//! Works on a fully buffered body (the microserver already enforces the size
//! cap). Framing and Content-Disposition parsing are done by `multer`, driven
//! to completion on the connection thread.

use futures::executor::block_on;
use std::convert::Infallible;

/// One form field
#[derive(Debug, Clone, PartialEq)]
pub struct Part {
    pub name: Option<String>,
    pub filename: Option<String>,
    pub content_type: Option<String>,
    pub data: Vec<u8>,
}

#[derive(Debug, thiserror::Error)]
pub enum MultipartError {
    #[error("Expected multipart/form-data, got {0}")]
    NotMultipart(String),

    #[error("Missing multipart boundary")]
    MissingBoundary,

    #[error("Malformed multipart body: {0}")]
    Malformed(#[from] multer::Error),
}

/// Split a multipart body into its parts
pub fn parse(content_type: &str, body: &[u8]) -> Result<Vec<Part>, MultipartError> {
    let boundary = multer::parse_boundary(content_type).map_err(|e| match e {
        multer::Error::NoBoundary => MultipartError::MissingBoundary,
        _ => MultipartError::NotMultipart(content_type.to_string()),
    })?;

    let chunk = body.to_vec();
    let stream = futures::stream::once(async move { Ok::<_, Infallible>(chunk) });
    let mut multipart = multer::Multipart::new(stream, boundary);

    block_on(async {
        let mut parts = Vec::new();
        while let Some(field) = multipart.next_field().await? {
            let name = field.name().map(str::to_string);
            let filename = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(|m| m.to_string());
            let data = field.bytes().await?.to_vec();
            parts.push(Part {
                name,
                filename,
                content_type,
                data,
            });
        }
        Ok::<_, MultipartError>(parts)
    })
}

/// Find the first part with the given field name
pub fn find_field<'a>(parts: &'a [Part], name: &str) -> Option<&'a Part> {
    parts.iter().find(|p| p.name.as_deref() == Some(name))
}
