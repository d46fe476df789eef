/// Main error type for the library.
#[derive(Debug)]
pub enum Error {
    /// Used when the user passes a logically invalid parameter to a function.
    InvalidParameter(String),
    Io(std::io::Error),
    Parser(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Error::Io(err) => write!(f, "IO error: {}", err),
            Error::Parser(err) => write!(f, "Parser error: {}", err),
            Error::InvalidParameter(err) => write!(f, "Parameter error: {}", err),
        }
    }
}

impl Error {
    /// Create an error with the kind `InvalidParameter`.
    /// # Arguments
    /// * `msg` - The error message.
    pub fn invalid_parameter<T: ToString>(msg: T) -> Self {
        Error::InvalidParameter(msg.to_string())
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            Error::Parser(_) => None,
            Error::InvalidParameter(_) => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}
