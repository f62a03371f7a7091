//! DMA elements

use crate::channel::TransferWidth;

mod private {
    pub trait Sealed {}
    impl Sealed for u8 {}
    impl Sealed for u16 {}
    impl Sealed for u32 {}
}

/// An element that can be moved by a DMA channel
///
/// This trait is sealed, and cannot be implemented outside of this crate.
pub trait Element: Copy + private::Sealed {
    /// The transfer width that moves one element
    const WIDTH: TransferWidth;
}

impl Element for u8 {
    const WIDTH: TransferWidth = TransferWidth::Bits8;
}

impl Element for u16 {
    const WIDTH: TransferWidth = TransferWidth::Bits16;
}

impl Element for u32 {
    const WIDTH: TransferWidth = TransferWidth::Bits32;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widths_match_sizes() {
        assert_eq!(u8::WIDTH.bytes(), core::mem::size_of::<u8>());
        assert_eq!(u16::WIDTH.bytes(), core::mem::size_of::<u16>());
        assert_eq!(u32::WIDTH.bytes(), core::mem::size_of::<u32>());
    }
}
