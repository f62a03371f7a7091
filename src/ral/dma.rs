//! DMA controller register block and fields

use super::{channel, RORegister, RWRegister, WORegister};

/// The maximum number of channels the controller implements.
pub const MAX_CHANNELS: usize = 8;

/// DMA controller registers.
#[repr(C)]
pub struct RegisterBlock {
    /// Channel registers
    pub CH: [channel::RegisterBlock; MAX_CHANNELS],
    /// Raw interrupt status
    pub RAW: Interrupts<RWRegister<u32>>,
    /// Interrupt status, after masking
    pub STATUS: Interrupts<RORegister<u32>>,
    /// Interrupt masks
    pub MASK: Interrupts<RWRegister<u32>>,
    /// Interrupt clear
    pub CLEAR: Interrupts<WORegister<u32>>,
    /// Combined interrupt status
    pub STATUS_INT: RORegister<u32>,
    _reserved0: u32,
    /// Software handshaking registers, unused by this driver
    _reserved1: [u32; 12],
    /// DMA Configuration Register
    pub DMA_CFG: RWRegister<u32>,
    _reserved2: u32,
    /// DMA Channel Enable Register
    pub CH_EN: RWRegister<u32>,
    _reserved3: u32,
    /// DMA ID Register
    pub ID: RORegister<u32>,
    _reserved4: u32,
    /// DMA Test Register
    pub TEST: RWRegister<u32>,
    _reserved5: u32,
    _reserved6: [u32; 4],
    /// Component parameter registers
    pub COMP_PARAMS: [RORegister<u32>; 12],
    /// Component ID
    pub COMPS_ID: RORegister<u32>,
    /// Component version
    pub COMPS_VERSION: RORegister<u32>,
}

const _: () = assert!(core::mem::offset_of!(RegisterBlock, RAW) == 0x2C0);
const _: () = assert!(core::mem::offset_of!(RegisterBlock, STATUS) == 0x2E8);
const _: () = assert!(core::mem::offset_of!(RegisterBlock, MASK) == 0x310);
const _: () = assert!(core::mem::offset_of!(RegisterBlock, CLEAR) == 0x338);
const _: () = assert!(core::mem::offset_of!(RegisterBlock, STATUS_INT) == 0x360);
const _: () = assert!(core::mem::offset_of!(RegisterBlock, DMA_CFG) == 0x398);
const _: () = assert!(core::mem::offset_of!(RegisterBlock, CH_EN) == 0x3A0);
const _: () = assert!(core::mem::offset_of!(RegisterBlock, ID) == 0x3A8);
const _: () = assert!(core::mem::offset_of!(RegisterBlock, COMP_PARAMS) == 0x3C8);
const _: () = assert!(core::mem::offset_of!(RegisterBlock, COMPS_VERSION) == 0x3FC);

/// One register per interrupt category, one bit per channel.
#[repr(C)]
pub struct Interrupts<R> {
    pub TFR: R,
    _reserved0: u32,
    pub BLOCK: R,
    _reserved1: u32,
    pub SRC_TRAN: R,
    _reserved2: u32,
    pub DST_TRAN: R,
    _reserved3: u32,
    pub ERR: R,
    _reserved4: u32,
}

impl<R> Interrupts<R> {
    /// Returns the register for the given interrupt category.
    pub fn get(&self, interrupt: crate::Interrupt) -> &R {
        use crate::Interrupt;
        match interrupt {
            Interrupt::Transfer => &self.TFR,
            Interrupt::Block => &self.BLOCK,
            Interrupt::SourceTransaction => &self.SRC_TRAN,
            Interrupt::DestinationTransaction => &self.DST_TRAN,
            Interrupt::Error => &self.ERR,
        }
    }
}

pub mod DMA_CFG {
    fields! {
        /// Controller enable
        DMA_EN[0, 1],
    }
}

pub mod CH_EN {
    fields! {
        /// Channel enable, one bit per channel
        CH_EN[0, 8],
        /// Channel enable write enable, one bit per channel
        CH_EN_WE[8, 8],
    }
}

pub mod MASK {
    fields! {
        /// Interrupt mask, one bit per channel
        INT_MASK[0, 8],
        /// Interrupt mask write enable, one bit per channel
        INT_MASK_WE[8, 8],
    }
}
