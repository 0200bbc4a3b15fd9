use sha2::{Digest, Sha256};
use shared::UploadMetadata;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum UploadError {
    #[error("File must be an image, got content type '{0}'")]
    InvalidFormat(String),
    #[error("Image is empty")]
    Empty,
    #[error("Image is {size} bytes, limit is {limit}")]
    FileTooLarge { size: usize, limit: usize },
}

/// An uploaded lesion photograph, held only long enough to classify it.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub data: Vec<u8>,
    pub mime_type: String,
    pub file_name: Option<String>,
}

impl ImageUpload {
    pub fn new(data: Vec<u8>, mime_type: impl Into<String>, file_name: Option<String>) -> Self {
        Self {
            data,
            mime_type: mime_type.into(),
            file_name,
        }
    }

    pub fn validate(&self, max_bytes: usize) -> Result<(), UploadError> {
        if !self.mime_type.starts_with("image/") {
            return Err(UploadError::InvalidFormat(self.mime_type.clone()));
        }
        if self.data.is_empty() {
            return Err(UploadError::Empty);
        }
        if self.data.len() > max_bytes {
            return Err(UploadError::FileTooLarge {
                size: self.data.len(),
                limit: max_bytes,
            });
        }
        Ok(())
    }

    pub fn metadata(&self) -> UploadMetadata {
        UploadMetadata {
            file_name: self.file_name.clone(),
            mime_type: self.mime_type.clone(),
            size_bytes: self.data.len() as u64,
            sha256: calculate_image_hash(&self.data),
        }
    }
}

pub fn calculate_image_hash(image_data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(image_data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_hex_sha256() {
        assert_eq!(
            calculate_image_hash(b"abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn validation_rules() {
        let ok = ImageUpload::new(vec![1, 2, 3], "image/jpeg", Some("lesion.jpg".into()));
        assert!(ok.validate(10).is_ok());
        assert_eq!(
            ok.validate(2),
            Err(UploadError::FileTooLarge { size: 3, limit: 2 })
        );
        let pdf = ImageUpload::new(vec![1], "application/pdf", None);
        assert!(matches!(pdf.validate(10), Err(UploadError::InvalidFormat(_))));
        let empty = ImageUpload::new(vec![], "image/png", None);
        assert_eq!(empty.validate(10), Err(UploadError::Empty));
    }

    #[test]
    fn metadata_records_size_and_hash() {
        let upload = ImageUpload::new(b"abc".to_vec(), "image/png", None);
        let meta = upload.metadata();
        assert_eq!(meta.size_bytes, 3);
        assert_eq!(meta.mime_type, "image/png");
        assert_eq!(meta.sha256, calculate_image_hash(b"abc"));
    }
}
