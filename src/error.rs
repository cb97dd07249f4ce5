//! # the error types of the kmeans accelerator host
//! - shape and state errors are reported before any side effect.
//! - device errors are fatal, there is no retry path.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum KmeansError {
    /// the requested buffer shape is not representable, rejected before any
    /// allocation happens.
    #[error("invalid shape: num_points={num_points}, num_clusters={num_clusters}, num_dims={num_dims}, all counts must be positive")]
    InvalidShape {
        num_points: usize,
        num_clusters: usize,
        num_dims: usize,
    },

    /// none of the candidate devices accepted the binary image. without a
    /// programmed device no computation is possible, the run terminates.
    #[error("no usable device: none of the {tried} candidate device(s) accepted the binary image")]
    NoUsableDevice { tried: usize },

    /// a device api call failed. carries the name of the failing stage so the
    /// top level diagnostic can point at it.
    #[error("accelerator io failure in `{stage}`: {detail}")]
    AcceleratorIo { stage: &'static str, detail: String },

    /// a method was called out of lifecycle order, this is a programming
    /// error of the caller.
    #[error("invalid state: {detail}")]
    InvalidState { detail: String },
}

impl KmeansError {
    pub fn invalid_state(detail: impl Into<String>) -> Self {
        KmeansError::InvalidState {
            detail: detail.into(),
        }
    }
}
