use thiserror::Error;

/// A controller's engagement precondition was not met, so it produced no
/// acceleration. Callers propagate this as "no value", never as zero.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum NotEngaged {
    #[error("lead vehicle is {distance:.1} m away, beyond the engagement range")]
    OutOfRange { distance: f64 },

    #[error("time to collision {ttc:.1} s with a wide gap, following disengaged")]
    Disengaged { ttc: f64 },

    #[error("catch-up acceleration refused with a {gap:.1} m gap")]
    CatchUpRefused { gap: f64 },

    #[error("distance to the lead vehicle is unknown")]
    UnknownDistance,

    #[error("lead vehicle no longer exists")]
    InvalidLead,
}

/// A road-network query returned an invalid position, path or object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum GeometryError {
    #[error("position is not on the road network")]
    InvalidPosition,

    #[error("path is empty or does not contain the position")]
    InvalidPath,

    #[error("merge road has no corridor overlapping the target lane")]
    NoMergeGeometry,
}
