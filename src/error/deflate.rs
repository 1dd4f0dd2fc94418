use std::fmt::{Display, Formatter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeflateError {
    Compress,

    Decompress,

    // window bits outside 9..=15
    IllegalWindowBits,
}

impl Display for DeflateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        use DeflateError::*;
        match self {
            Compress => write!(f, "Deflate compression failed"),
            Decompress => write!(f, "Deflate decompression failed"),
            IllegalWindowBits => write!(f, "Window bits outside 9..=15"),
        }
    }
}

// use default impl
impl std::error::Error for DeflateError {}
