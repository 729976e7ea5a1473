use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Config Error: {0}")]
    Config(String),

    #[error("No mapping tables for {width}x{height}, call precompute first")]
    NotReady { width: usize, height: usize },

    #[error("Frame is {actual:?}, mapping table expects {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        actual: (usize, usize),
    },

    #[error("Unknown view: {0}")]
    UnknownView(String),

    #[error("Detector Error: {0}")]
    Detector(String),

    #[error("Io Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Json Error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "opencv")]
    #[error("OpenCV Error: {0}")]
    OpenCv(#[from] opencv::Error),
}

impl Error {
    pub(crate) fn config<S: Into<String>>(msg: S) -> Self {
        Error::Config(msg.into())
    }
}
