use super::BinaryName;

#[derive(Debug)]
pub enum Error {
    /// A binary or unqualified name failed validation
    MalformedName(String),

    /// A field or method descriptor failed to parse
    MalformedDescriptor(String),

    /// The hierarchy provider has no entry for this class
    MissingClass(BinaryName),

    /// A method listing could not be parsed
    ListingSyntax {
        line: usize,
        message: String,
    },

    IoError(std::io::Error),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Error {
        Error::IoError(err)
    }
}
