//! Error types for host-side launches and policy composition.

use thiserror::Error;

use crate::policy::KernelVariant;

/// Errors reported when a simulated kernel launch cannot run to completion.
#[derive(Error, Debug)]
pub enum LaunchError {
    /// Block size is not a non-zero multiple of the warp size within the
    /// per-block thread limit.
    #[error("invalid block size {block_dim}: must be a multiple of 32 between 32 and {max}")]
    InvalidBlockDim { block_dim: usize, max: usize },

    /// A launch needs at least one block.
    #[error("grid must contain at least one block")]
    EmptyGrid,

    /// The host could not start a thread for a lane.
    #[error("failed to spawn lane {thread_idx} of block {block_idx}: {source}")]
    Spawn {
        block_idx: usize,
        thread_idx: usize,
        #[source]
        source: std::io::Error,
    },

    /// A lane panicked and the block was torn down.
    #[error("block {block_idx} aborted: {message}")]
    BlockAborted { block_idx: usize, message: String },
}

/// Errors that can occur in the histogram scan and reduction entry points.
#[derive(Error, Debug)]
pub enum PrimsError {
    /// No histogram scan kernel is instantiated for this digit width.
    #[error("unsupported digit width of {0} bits: sort histogram kernels exist for 1 to 7 bits")]
    UnsupportedDigitBits(u32),

    /// The count array does not hold one count per task and digit.
    #[error("expected {expected} block counts ({num_tasks} tasks x {num_digits} digits), found {actual}")]
    CountsLength {
        expected: usize,
        actual: usize,
        num_tasks: usize,
        num_digits: usize,
    },

    /// A composed kernel policy does not fit the target architecture.
    #[error("{variant} policy is invalid: {reason}")]
    InvalidPolicy {
        variant: KernelVariant,
        reason: String,
    },

    /// The problem does not fit the policy's size type.
    #[error("{num_elements} elements do not fit the {size_type} size type")]
    SizeOverflow {
        num_elements: usize,
        size_type: &'static str,
    },

    /// The output buffer handed to a kernel is too small.
    #[error("output buffer holds {actual} elements, kernel writes {expected}")]
    OutputLength { expected: usize, actual: usize },

    /// A launch asks for more shared memory than one CTA may hold.
    #[error("{requested} bytes of shared memory requested, a CTA holds at most {max}")]
    SharedMemory { requested: usize, max: usize },

    #[error(transparent)]
    Launch(#[from] LaunchError),
}

/// Result type for the crate's host entry points.
pub type Result<T> = std::result::Result<T, PrimsError>;
