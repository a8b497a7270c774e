use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiaError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("No input images matching '{pattern}' in {}", dir.display())]
    NoInputImages { dir: PathBuf, pattern: String },

    #[error("Reference image {}: {reason}", path.display())]
    ReferenceImage { path: PathBuf, reason: String },

    #[error("Registration failed for {}: {reason}", path.display())]
    Registration { path: PathBuf, reason: String },

    #[error("Subtraction engine ({variant}) failed: {reason}")]
    Engine { variant: String, reason: String },

    #[error("WCS propagation failed for {}: {reason}", path.display())]
    WcsPropagation { path: PathBuf, reason: String },

    #[error("Invalid FITS file: {0}")]
    InvalidFits(String),

    #[error("Unusable WCS: {0}")]
    Wcs(String),

    #[error("Run log {} not writable: {source}", path.display())]
    RunLog {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl DiaError {
    /// Short error class name, written into run log error entries.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Io(_) => "IoError",
            Self::Configuration(_) => "ConfigurationError",
            Self::NoInputImages { .. } => "NoInputImagesError",
            Self::ReferenceImage { .. } => "ReferenceImageError",
            Self::Registration { .. } => "RegistrationError",
            Self::Engine { .. } => "EngineError",
            Self::WcsPropagation { .. } => "WCSPropagationError",
            Self::InvalidFits(_) => "FitsError",
            Self::Wcs(_) => "WcsError",
            Self::RunLog { .. } => "RunLogError",
        }
    }
}

pub type Result<T> = std::result::Result<T, DiaError>;
