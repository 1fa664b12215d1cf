//! The seam to a `multipart/form-data` decoder.
//!
//! The facade does not split multipart bodies itself. An endpoint that accepts
//! multipart requests registers a [`MultipartDecoder`] along with its
//! [`MultipartConfig`]; the parameter parser drains the body, hands it to the decoder,
//! enforces the configured limits, feeds field parts into the parameter table and keeps
//! file parts aside.

use bytes::Bytes;
use serde::Deserialize;

use crate::encoding::Charset;
use crate::error::ParameterError;

/// Limits applied to multipart requests of one endpoint. `None` means unlimited.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MultipartConfig {
    pub max_file_size: Option<u64>,
    pub max_request_size: Option<u64>,
    pub max_part_count: Option<usize>,
}

/// One decoded part of a multipart body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part {
    /// A scalar form field, decoded with the request charset.
    Field { name: String, value: String },
    File(FilePart),
}

/// An uploaded file part.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilePart {
    pub name: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl FilePart {
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait MultipartDecoder: Send + Sync {
    /// Splits `body` into parts along `boundary`. Field values are decoded with `charset`.
    fn decode(&self, boundary: &str, body: Bytes, charset: Charset) -> Result<Vec<Part>, ParameterError>;
}

/// Checks decoded parts against `config`, splitting them into fields and files.
pub(crate) fn check_parts(
    parts: Vec<Part>,
    config: &MultipartConfig,
) -> Result<(Vec<(String, String)>, Vec<FilePart>), ParameterError> {
    if let Some(max_count) = config.max_part_count {
        if parts.len() > max_count {
            return Err(ParameterError::TooManyParts { max_count });
        }
    }

    let mut fields = Vec::new();
    let mut files = Vec::new();
    for part in parts {
        match part {
            Part::Field { name, value } => fields.push((name, value)),
            Part::File(file) => {
                if let Some(max_size) = config.max_file_size {
                    let size = file.size();
                    if size > max_size {
                        return Err(ParameterError::FileTooLarge { name: file.name, size, max_size });
                    }
                }
                files.push(file);
            }
        }
    }
    Ok((fields, files))
}
