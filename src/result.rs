//! Error types and the related `Result<T>`.
//!
//! Only truly unrecoverable conditions are represented here. Everything
//! non-fatal (record rejection, ambiguous placement, a lost page, partial
//! recovery) is reported through [`crate::pipeline::Diagnostic`] instead of
//! an `Err`.

use thiserror::Error;

pub type SalvageResult<T> = Result<T, SalvageError>;

#[derive(Debug, Error)]
pub enum SalvageError {
    /// An error from underlying I/O.
    #[error("I/O Error")]
    Io(#[from] std::io::Error),

    /// The image is too small to contain anything useful, or couldn't be
    /// mapped/read at all.
    #[error("Invalid image: {0}")]
    InvalidImage(&'static str),

    /// A 64-bit offset or length didn't fit into a `usize`, which can only
    /// happen on 32-bit targets with very large images.
    #[error("Image too large for address space")]
    InsufficientAddressSpace,
}
