#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Image transcoding failed: {0}")]
    Transcode(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
