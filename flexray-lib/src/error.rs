#[derive(thiserror::Error, Debug)]
#[non_exhaustive]
pub enum Error {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("not enough bits: needed {needed}, have {actual}")]
    NotEnoughBits { actual: usize, needed: usize },

    /// Byte start sequence pattern violated while unwrapping a bit buffer.
    #[error("byte start sequence violated at bit {bit}")]
    BssViolation { bit: usize },

    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// Edge stream handed the decoder a sample index that moved backwards.
    #[error("edge order violated: sample {sample} after {previous}")]
    EdgeOrder { sample: u64, previous: u64 },
}

pub type Result<T> = std::result::Result<T, Error>;
