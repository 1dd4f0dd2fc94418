use std::fmt::{Display, Formatter};

#[derive(Debug)]
pub enum HttpError {
    // first line matches neither a request nor a response
    NoHttpFormat,

    // blank line terminating the header block is missing
    NoHttpHeader,

    NoHttpVersion,

    NoValidHttpStatusCode,

    NotEnoughData,

    Httparse(httparse::Error),
}

impl Display for HttpError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        use HttpError::*;
        match self {
            NoHttpFormat => write!(f, "Not an http message"),
            NoHttpHeader => write!(f, "Missing end of http headers"),
            NoHttpVersion => write!(f, "Illegal http version"),
            NoValidHttpStatusCode => write!(f, "Illegal http status code"),
            NotEnoughData => write!(f, "Not enough data to parse"),
            Httparse(e) => write!(f, "Http parse error: {}", e),
        }
    }
}

impl From<httparse::Error> for HttpError {
    fn from(e: httparse::Error) -> Self {
        use httparse::Error::*;
        match e {
            Version => HttpError::NoHttpVersion,
            Status => HttpError::NoValidHttpStatusCode,
            e => HttpError::Httparse(e),
        }
    }
}

impl std::error::Error for HttpError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        if let HttpError::Httparse(e) = self {
            Some(e)
        } else {
            None
        }
    }
}
