use crate::jvm;
use crate::util::Offset;

#[derive(Debug)]
pub enum Error {
    /// The method body can't be decoded (stack underflow, inconsistent stack heights, branches
    /// to missing blocks, ...)
    MalformedCode { address: Offset, message: String },

    Jvm(jvm::Error),
}

impl Error {
    pub fn malformed(address: Offset, message: impl Into<String>) -> Error {
        Error::MalformedCode {
            address,
            message: message.into(),
        }
    }
}

impl From<jvm::Error> for Error {
    fn from(err: jvm::Error) -> Error {
        Error::Jvm(err)
    }
}
