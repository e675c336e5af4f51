use std::fmt;

#[derive(Debug)]
pub enum Error {
    /// A clustering parameter was out of its allowed range (dc <= 0,
    /// rhoc <= 0, points_per_tile <= 0, zero workers, ...).
    InvalidParameter(String),
    /// A coordinate dimension index was requested beyond the rank of the
    /// point set, or the rank exceeds the supported maximum.
    DimensionOutOfRange { dim: usize, ndim: usize },
    /// The point set is empty. Clustering treats this as an empty result;
    /// the variant exists for surfaces that must report it explicitly.
    EmptyInput,
    /// The device refused an allocation or could not be acquired.
    AllocationFailure(String),
    /// points_per_tile was chosen so low that the tile grid no longer fits
    /// the index space. Recoverable: retry with a larger points_per_tile.
    TileOverflow { n_tiles: i64 },
    /// A follower chain exceeded the fixed propagation stack depth.
    ClusterPropagationOverflow,
    Io(std::io::Error),
    Parse(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidParameter(msg) => write!(f, "invalid parameter: {msg}"),
            Error::DimensionOutOfRange { dim, ndim } => {
                write!(f, "dimension {dim} out of range for {ndim}-dimensional points")
            }
            Error::EmptyInput => write!(f, "empty point set"),
            Error::AllocationFailure(msg) => write!(f, "device allocation failure: {msg}"),
            Error::TileOverflow { n_tiles } => {
                write!(f, "tile grid of {n_tiles} tiles exceeds the index space; increase points_per_tile")
            }
            Error::ClusterPropagationOverflow => {
                write!(f, "cluster propagation stack overflow")
            }
            Error::Io(err) => write!(f, "io error: {err}"),
            Error::Parse(msg) => write!(f, "parse error: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}
