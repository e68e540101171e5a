use std::{error::Error, fmt::Display};

use crate::acquisition::AcquisitionError;

/// Everything that can go wrong while the terminal front-end is up.
#[derive(Debug)]
pub enum TactileGuiError {
    /// Drawing to or reading from the terminal failed.
    IOError(std::io::Error),
    /// There is no serial device to choose from.
    NoPorts,
    /// The acquisition thread died while the view was showing it.
    AcquisitionError(AcquisitionError),
}

impl Display for TactileGuiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::IOError(e) => write!(f, "terminal error: {}", e),
            Self::NoPorts => write!(f, "no serial ports detected"),
            Self::AcquisitionError(e) => write!(f, "{}", e),
        }
    }
}

impl Error for TactileGuiError {}

impl From<std::io::Error> for TactileGuiError {
    fn from(value: std::io::Error) -> Self {
        Self::IOError(value)
    }
}

impl From<AcquisitionError> for TactileGuiError {
    fn from(value: AcquisitionError) -> Self {
        Self::AcquisitionError(value)
    }
}
