use std::{error, fmt};

// -------------------------------------------------------------------------------------------------

/// `Error` provides an enumeration of all possible errors reported by mipwave.
#[derive(Debug)]
pub enum Error {
    ConfigError(String),
    NotReady,
    InputOverflow,
    ParameterError(String),
}

impl error::Error for Error {}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigError(str) => write!(f, "Invalid configuration: {str}"),
            Self::NotReady => write!(f, "Used before being fully initialized"),
            Self::InputOverflow => write!(f, "Got more sample data than expected"),
            Self::ParameterError(str) => write!(f, "Invalid parameter: {str}"),
        }
    }
}
