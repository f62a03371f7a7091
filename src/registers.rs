//! Register file access
//!
//! The driver never touches the register block directly. It reads and writes
//! named registers through [`Registers`], so that the transfer engine runs the
//! same against the memory-mapped controller ([`Mmio`]) and against a
//! simulated register file.

use crate::ral::{self, dma, Static};

/// A per-channel register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelRegister {
    /// Source address
    Sar,
    /// Destination address
    Dar,
    /// Linked list pointer
    Llp,
    /// Control, low word
    CtlLo,
    /// Control, high word (block size)
    CtlHi,
    /// Configuration, low word
    CfgLo,
    /// Configuration, high word
    CfgHi,
    /// Source gather
    Sgr,
    /// Destination scatter
    Dsr,
}

/// A controller interrupt category
///
/// Each category has a raw, status, mask, and clear register. Each
/// register has one bit per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interrupt {
    /// The whole (possibly multi-block) transfer completed
    Transfer,
    /// One block completed
    Block,
    /// A source burst or single transaction completed
    SourceTransaction,
    /// A destination burst or single transaction completed
    DestinationTransaction,
    /// A bus error occurred
    Error,
}

impl Interrupt {
    /// All interrupt categories.
    pub const ALL: [Interrupt; 5] = [
        Interrupt::Transfer,
        Interrupt::Block,
        Interrupt::SourceTransaction,
        Interrupt::DestinationTransaction,
        Interrupt::Error,
    ];
}

/// Named access to the DMA controller's registers.
///
/// Methods take `&self`; implementations rely on volatile or interior
/// mutability, the same way the hardware does.
///
/// The channel enable register, and the mask registers, use the
/// "write-enable" idiom: the low byte carries a value per channel, and the
/// next byte carries a write-enable bit per channel. A channel's value only
/// changes if its write-enable bit is set in the same write.
pub trait Registers {
    /// Read a channel register.
    fn read_channel(&self, channel: usize, register: ChannelRegister) -> u32;
    /// Write a channel register.
    fn write_channel(&self, channel: usize, register: ChannelRegister, value: u32);
    /// Read the raw (unmasked) interrupt status for a category.
    fn raw(&self, interrupt: Interrupt) -> u32;
    /// Read the masked interrupt status for a category.
    fn status(&self, interrupt: Interrupt) -> u32;
    /// Write the interrupt mask for a category, using the write-enable idiom.
    ///
    /// A set value bit unmasks (enables) the channel's interrupt.
    fn write_mask(&self, interrupt: Interrupt, value: u32);
    /// Clear the interrupt bits set in `value`.
    fn clear(&self, interrupt: Interrupt, value: u32);
    /// Read the actual channel enable bits.
    fn channel_enable(&self) -> u32;
    /// Write the channel enable register, using the write-enable idiom.
    fn write_channel_enable(&self, value: u32);
    /// Enable or disable the whole controller.
    fn set_controller_enabled(&self, enable: bool);
    /// The controller's ID register.
    fn id(&self) -> u32;
    /// The controller's component version register.
    fn version(&self) -> u32;
}

/// Memory-mapped DMA controller registers.
pub struct Mmio {
    block: Static<dma::RegisterBlock>,
}

impl Mmio {
    /// Create a register file for the controller at `base`.
    ///
    /// # Safety
    ///
    /// `base` must point to the start of the DMA controller register block.
    /// The caller must make sure that only one `Mmio` is in use for the
    /// controller.
    pub const unsafe fn new(base: *const ()) -> Self {
        Mmio {
            block: Static(base.cast()),
        }
    }

    fn channel(&self, channel: usize) -> &ral::channel::RegisterBlock {
        &self.block.CH[channel]
    }
}

// Safety: the register block is static memory. Writers coordinate
// through the driver's critical sections.
unsafe impl Send for Mmio {}
// Safety: see above.
unsafe impl Sync for Mmio {}

impl Registers for Mmio {
    fn read_channel(&self, channel: usize, register: ChannelRegister) -> u32 {
        let ch = self.channel(channel);
        match register {
            ChannelRegister::Sar => ral::read_reg!(crate::ral::channel, ch, SAR),
            ChannelRegister::Dar => ral::read_reg!(crate::ral::channel, ch, DAR),
            ChannelRegister::Llp => ral::read_reg!(crate::ral::channel, ch, LLP),
            ChannelRegister::CtlLo => ral::read_reg!(crate::ral::channel, ch, CTL_LO),
            ChannelRegister::CtlHi => ral::read_reg!(crate::ral::channel, ch, CTL_HI),
            ChannelRegister::CfgLo => ral::read_reg!(crate::ral::channel, ch, CFG_LO),
            ChannelRegister::CfgHi => ral::read_reg!(crate::ral::channel, ch, CFG_HI),
            ChannelRegister::Sgr => ral::read_reg!(crate::ral::channel, ch, SGR),
            ChannelRegister::Dsr => ral::read_reg!(crate::ral::channel, ch, DSR),
        }
    }

    fn write_channel(&self, channel: usize, register: ChannelRegister, value: u32) {
        let ch = self.channel(channel);
        match register {
            ChannelRegister::Sar => ral::write_reg!(crate::ral::channel, ch, SAR, value),
            ChannelRegister::Dar => ral::write_reg!(crate::ral::channel, ch, DAR, value),
            ChannelRegister::Llp => ral::write_reg!(crate::ral::channel, ch, LLP, value),
            ChannelRegister::CtlLo => ral::write_reg!(crate::ral::channel, ch, CTL_LO, value),
            ChannelRegister::CtlHi => ral::write_reg!(crate::ral::channel, ch, CTL_HI, value),
            ChannelRegister::CfgLo => ral::write_reg!(crate::ral::channel, ch, CFG_LO, value),
            ChannelRegister::CfgHi => ral::write_reg!(crate::ral::channel, ch, CFG_HI, value),
            ChannelRegister::Sgr => ral::write_reg!(crate::ral::channel, ch, SGR, value),
            ChannelRegister::Dsr => ral::write_reg!(crate::ral::channel, ch, DSR, value),
        }
    }

    fn raw(&self, interrupt: Interrupt) -> u32 {
        self.block.RAW.get(interrupt).read()
    }

    fn status(&self, interrupt: Interrupt) -> u32 {
        self.block.STATUS.get(interrupt).read()
    }

    fn write_mask(&self, interrupt: Interrupt, value: u32) {
        self.block.MASK.get(interrupt).write(value);
    }

    fn clear(&self, interrupt: Interrupt, value: u32) {
        self.block.CLEAR.get(interrupt).write(value);
    }

    fn channel_enable(&self) -> u32 {
        ral::read_reg!(crate::ral::dma, self.block, CH_EN, CH_EN)
    }

    fn write_channel_enable(&self, value: u32) {
        ral::write_reg!(crate::ral::dma, self.block, CH_EN, value);
    }

    fn set_controller_enabled(&self, enable: bool) {
        ral::write_reg!(crate::ral::dma, self.block, DMA_CFG, DMA_EN: enable as u32);
    }

    fn id(&self) -> u32 {
        ral::read_reg!(crate::ral::dma, self.block, ID)
    }

    fn version(&self) -> u32 {
        ral::read_reg!(crate::ral::dma, self.block, COMPS_VERSION)
    }
}

/// Compose a write-enable style value that sets channel `channel` to `on`.
pub(crate) const fn write_enable(channel: usize, on: bool) -> u32 {
    let bit = 1 << channel;
    (bit << 8) | if on { bit } else { 0 }
}
