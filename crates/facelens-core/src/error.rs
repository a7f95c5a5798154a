use thiserror::Error;

#[derive(Error, Debug)]
pub enum FaceError {
    #[error("required input is empty: {0}")]
    NullArgument(&'static str),
    #[error("model file could not be loaded: {0}")]
    InvalidModelPath(String),
    #[error("invalid image: {0}")]
    InvalidImage(String),
    #[error("could not decode image: {0}")]
    Decode(String),
    #[error("no image format for {0}")]
    UnknownFormat(String),
    #[error("could not encode image: {0}")]
    Encode(String),
    #[error("inference failed: {0}")]
    Inference(String),
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}

impl FaceError {
    pub(crate) fn model_load(path: &str, err: impl std::fmt::Display) -> Self {
        FaceError::InvalidModelPath(format!("{path}: {err}"))
    }
}

impl From<ort::Error> for FaceError {
    fn from(err: ort::Error) -> Self {
        FaceError::Inference(format!("ort: {err}"))
    }
}

pub type Result<T, E = FaceError> = std::result::Result<T, E>;
