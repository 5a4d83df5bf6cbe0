/// Why a presented approval token was refused.
///
/// The checks in [`crate::token::validate`] run in a fixed order so each
/// refusal carries the most accurate reason the UI can show.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenError {
    #[error("no approval token was presented")]
    Missing,
    #[error("no request exists under the presented id")]
    NotFound,
    #[error("presented token does not match the issued token")]
    Mismatch,
    #[error("approval token has already been used")]
    AlreadyUsed,
    #[error("approval token expired before it was presented")]
    Expired,
}

#[derive(thiserror::Error, Debug)]
pub enum RequestError {
    #[error(transparent)]
    Token(#[from] TokenError),
    #[error("required field is missing: {0}")]
    MissingField(&'static str),
    #[error("request {0} was not found")]
    UnknownRequest(String),
    #[error("request store failure: {0}")]
    Store(#[from] sled::Error),
    #[error("record encode failure: {0}")]
    Encode(#[from] minicbor::encode::Error<std::convert::Infallible>),
    #[error("record decode failure: {0}")]
    Decode(#[from] minicbor::decode::Error),
}

impl RequestError {
    /// The machine-readable token reason, if this failure is one.
    pub fn token_reason(&self) -> Option<TokenError> {
        match self {
            RequestError::Token(reason) => Some(*reason),
            _ => None,
        }
    }
}
