use std::{error::Error, fmt::Display};

#[derive(Debug, PartialEq)]
pub enum CubePIRError {
    // Geometry
    UnsupportedDimensionCount(usize),
    ZeroBlocksPerEntry,
    EmptyDatabase,
    GeometryTooLarge,
    GeometryOverflow,
    CoordinateOutOfRange,

    // Server
    AllocationFailure,
    BackendUnavailable,
    QueryGeometryMismatch,

    // Client
    AnswerGeometryMismatch,

    // Transport framing
    FailedToDeserializeQuery,
    FailedToDeserializeAnswer,
}

impl Display for CubePIRError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnsupportedDimensionCount(dims) => write!(f, "Database cube must have either 2 or 3 dimensions, found '{}'.", dims),
            Self::ZeroBlocksPerEntry => write!(f, "Each database entry must span at least one 32 -bytes block."),
            Self::EmptyDatabase => write!(f, "Database buffer doesn't hold even a single entry."),
            Self::GeometryTooLarge => write!(f, "Database cube geometry overflows the addressable byte range."),
            Self::GeometryOverflow => write!(f, "Coordinate maps to a byte range beyond the provisioned database buffer."),
            Self::CoordinateOutOfRange => write!(f, "Coordinate doesn't lie inside the database cube."),

            Self::AllocationFailure => write!(f, "Failed to allocate backing storage for the answer set."),
            Self::BackendUnavailable => write!(f, "Requested XOR backend isn't supported by the running CPU."),
            Self::QueryGeometryMismatch => write!(f, "Query's selector count or selector length doesn't match database geometry."),

            Self::AnswerGeometryMismatch => write!(f, "Answer set's shape doesn't match agreed database geometry."),

            Self::FailedToDeserializeQuery => write!(f, "Query bytes don't frame a valid query for the agreed geometry."),
            Self::FailedToDeserializeAnswer => write!(f, "Answer bytes don't frame a valid answer set for the agreed geometry."),
        }
    }
}

impl Error for CubePIRError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        None
    }
}
