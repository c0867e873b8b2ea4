use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForensicsError {
    #[error("Image loading error: {0}")]
    ImageLoad(#[from] image::ImageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Tensor shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Analysis failed: {0}")]
    AnalysisFailed(String),

    #[error("Metadata extraction error: {0}")]
    MetadataError(String),

    #[error("Checkpoint error: {0}")]
    Checkpoint(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Image too small for analysis (minimum: {0}x{0})")]
    ImageTooSmall(u32),
}

pub type Result<T> = std::result::Result<T, ForensicsError>;
