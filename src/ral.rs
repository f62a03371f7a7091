//! A RAL-like module to support DMA register access
//!
//! The controller's register space is a cluster of identical channel
//! register blocks followed by the controller-wide registers. Every register
//! is 64 bits wide in the address map, but only the low word is implemented.
//! This module represents that layout as structs, and exposes field modules
//! compatible with the RAL macros.

#![allow(
    non_snake_case, // Compatibility with RAL
    non_upper_case_globals, // Compatibility with RAL
    unused, // Not every field is used by the driver
)]

/// Define field modules for a register.
///
/// Each field expands into a module with `offset` and `mask` constants, and
/// the `R`, `W`, and `RW` modules the RAL macros expect. Enumerated values go
/// into `RW`.
macro_rules! fields {
    ($(
        $(#[$attr:meta])*
        $name:ident [$offset:expr, $width:expr] $({ $($value:ident = $val:expr),* $(,)? })?
    ),* $(,)?) => {
        $(
            $(#[$attr])*
            pub mod $name {
                pub const offset: u32 = $offset;
                pub const mask: u32 = (((1u64 << $width) - 1) as u32) << offset;
                pub mod R {}
                pub mod W {}
                pub mod RW {
                    $($(pub const $value: u32 = $val;)*)?
                }
            }
        )*
    };
}

pub mod channel;
pub mod dma;

pub use ral_registers::{modify_reg, read_reg, write_reg};
use ral_registers::{RORegister, RWRegister, WORegister};

//
// Helper types for static memory
//
// Similar to the RAL's `Instance` type, but more copy.
//

pub(crate) struct Static<T>(pub(crate) *const T);
impl<T> core::ops::Deref for Static<T> {
    type Target = T;
    fn deref(&self) -> &Self::Target {
        // Safety: pointer points to static memory (peripheral memory)
        unsafe { &*self.0 }
    }
}
impl<T> Clone for Static<T> {
    fn clone(&self) -> Self {
        *self
    }
}
impl<T> Copy for Static<T> {}
