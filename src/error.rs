//! DMA errors

use core::fmt::{self, Display};

/// A DMA driver error
///
/// Parameter errors are returned immediately from the call that received
/// the parameter. They're never retried. Transfer errors are reported by
/// the controller, and surface once the transfer ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Error {
    /// The channel index is not less than the number of channels
    InvalidChannel,
    /// The channel was not selected or reserved before use
    NotAllocated,
    /// The channel is already running a transfer
    Busy,
    /// A block is empty, or larger than the maximum block size
    InvalidBlockSize,
    /// A transfer has no items
    ZeroLength,
    /// A transfer width is reserved, or wider than the data bus
    InvalidWidth,
    /// Scatter or gather is enabled without a valid pattern
    InvalidScatterGather,
    /// The items of a linked list disagree on their link master
    InvalidLinkList,
    /// The configuration requests automatic reloading
    AutoReload,
    /// The transfer was disabled before it finished
    Cancelled,
    /// The controller reported a bus error
    Transfer {
        /// Bytes transferred before the error
        transferred: usize,
    },
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidChannel => f.write_str("invalid DMA channel"),
            Error::NotAllocated => f.write_str("DMA channel not selected or reserved"),
            Error::Busy => f.write_str("DMA channel busy"),
            Error::InvalidBlockSize => f.write_str("invalid DMA block size"),
            Error::ZeroLength => f.write_str("zero length DMA transfer"),
            Error::InvalidWidth => f.write_str("unsupported DMA transfer width"),
            Error::InvalidScatterGather => f.write_str("invalid DMA scatter / gather pattern"),
            Error::InvalidLinkList => f.write_str("inconsistent DMA linked list"),
            Error::AutoReload => f.write_str("DMA auto reload is not supported"),
            Error::Cancelled => f.write_str("DMA transfer cancelled"),
            Error::Transfer { transferred } => {
                write!(f, "DMA transfer error after {} bytes", transferred)
            }
        }
    }
}
