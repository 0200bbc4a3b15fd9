pub mod error;
pub mod lifecycle;
pub mod transitions;
pub mod upload;

pub use error::LifecycleError;
pub use lifecycle::{DEFAULT_CLASSIFIER_TIMEOUT, DEFAULT_MAX_IMAGE_BYTES, LifecycleManager};
pub use upload::{ImageUpload, UploadError, calculate_image_hash};
