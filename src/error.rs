use thiserror::Error as ThisError;

use crate::geometry::Coordinate;

/// Errors surfaced by the router core.
///
/// Per the error-handling design, "Unreachability" (`findPath` returning an
/// empty path) is *not* an error: the iteration controller treats it as a
/// normal, non-fatal outcome and keeps going. Every variant here is either a
/// fatal configuration/capacity error or a conditional-fatal error that only
/// triggers after a bounded recovery search has already failed.
#[derive(ThisError, Debug)]
pub enum Error {
    #[error("io error: {0}")]
    IOError(#[from] std::io::Error),

    #[error("bincode error: {0}")]
    BincodeError(#[from] bincode::Error),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("net {net} has no diff-pair partner configured")]
    MissingDiffPairPartner { net: String },

    #[error(
        "cell ({x},{y},{z}) would exceed the maximum of {max} traversing (path, subset, shape) entries"
    )]
    TraversingPathCapacityExceeded { x: u32, y: u32, z: u32, max: u32 },

    #[error("design-rule subset index {0} is out of range")]
    InvalidSubset(u8),

    #[error("design-rule set index {0} is out of range")]
    InvalidDesignRuleSet(u8),

    #[error("illegal routeDirections value: {0:#x}")]
    IllegalRouteDirections(u32),

    #[error(
        "diff-pair via placement failed for pair ({path_a}, {path_b}) at {at:?}: no legal radial \
         substitute found for both vias"
    )]
    DiffPairViaInfeasible {
        path_a: u32,
        path_b: u32,
        at: Coordinate,
    },

    #[error(
        "diff-pair shoulder placement failed at segment {segment}: both shoulders remain in a \
         forbidden zone after the bounded symmetric search"
    )]
    DiffPairShoulderInfeasible { segment: usize },

    #[error("diff-pair shoulder splice failed: no layer-transition match found on shoulder path")]
    DiffPairSpliceFailed,

    #[error(
        "invalid inter-segment jump in sparse path for net {path}: ({from:?}) -> ({to:?}) is not \
         a legal move"
    )]
    InvalidJump {
        path: u32,
        from: Coordinate,
        to: Coordinate,
    },

    #[error("net count {0} would exceed the maximum of {1}")]
    TooManyNets(usize, usize),

    #[error("coordinate out of bounds: {0:?}")]
    CoordinateOutOfBounds(Coordinate),
}

pub type Result<T> = std::result::Result<T, Error>;
