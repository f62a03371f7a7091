//! DMA channel control and configuration words
//!
//! [`Control`] is the low word of a channel's control register. It's also
//! the control word of every [`LinkListItem`](crate::LinkListItem).
//! [`Configuration`] covers both configuration registers.

use crate::ral::channel::{CFG_HI, CFG_LO, CTL_LO};

const fn get(word: u32, mask: u32, offset: u32) -> u32 {
    (word & mask) >> offset
}

const fn set(word: u32, mask: u32, offset: u32, value: u32) -> u32 {
    (word & !mask) | ((value << offset) & mask)
}

/// The width of a single transfer unit
///
/// The hardware encodes widths as a power-of-two exponent: the number of
/// bytes moved per unit is `1 << shift()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum TransferWidth {
    /// 8 bits
    Bits8 = 0,
    /// 16 bits
    Bits16 = 1,
    /// 32 bits
    Bits32 = 2,
    /// 64 bits
    Bits64 = 3,
    /// 128 bits
    Bits128 = 4,
    /// 256 bits
    Bits256 = 5,
}

impl TransferWidth {
    /// Decode a width from its register encoding.
    ///
    /// Returns `None` for the reserved encodings.
    pub const fn from_shift(shift: u32) -> Option<Self> {
        Some(match shift {
            0 => TransferWidth::Bits8,
            1 => TransferWidth::Bits16,
            2 => TransferWidth::Bits32,
            3 => TransferWidth::Bits64,
            4 => TransferWidth::Bits128,
            5 => TransferWidth::Bits256,
            _ => return None,
        })
    }
    /// The width encoding, `log2(bytes)`.
    pub const fn shift(self) -> u8 {
        self as u8
    }
    /// The number of bytes in one transfer unit.
    pub const fn bytes(self) -> usize {
        1 << self.shift()
    }
}

/// How an address changes across a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressMode {
    /// The address increments by the transfer width after every unit
    Increment,
    /// The address decrements by the transfer width after every unit
    Decrement,
    /// The address never changes, like a peripheral FIFO register
    Fixed,
}

impl AddressMode {
    const fn from_bits(bits: u32) -> Self {
        match bits {
            CTL_LO::SINC::RW::INCREMENT => AddressMode::Increment,
            CTL_LO::SINC::RW::DECREMENT => AddressMode::Decrement,
            _ => AddressMode::Fixed,
        }
    }
    const fn bits(self) -> u32 {
        match self {
            AddressMode::Increment => CTL_LO::SINC::RW::INCREMENT,
            AddressMode::Decrement => CTL_LO::SINC::RW::DECREMENT,
            AddressMode::Fixed => CTL_LO::SINC::RW::NO_CHANGE,
        }
    }
}

/// Number of transfer units in a burst transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BurstSize {
    Items1 = 0,
    Items4 = 1,
    Items8 = 2,
    Items16 = 3,
    Items32 = 4,
    Items64 = 5,
    Items128 = 6,
    Items256 = 7,
}

impl BurstSize {
    /// The number of transfer units per burst.
    pub const fn items(self) -> usize {
        match self {
            BurstSize::Items1 => 1,
            other => 2 << (other as u8),
        }
    }
}

/// Transfer type, with the DMA controller as the flow controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FlowControl {
    MemoryToMemory = 0,
    MemoryToPeripheral = 1,
    PeripheralToMemory = 2,
    PeripheralToPeripheral = 3,
}

/// A channel control word
///
/// Describes the widths, address modes, and bursts of each side of a
/// transfer. The interrupt enable and block chaining bits are managed by
/// the driver; the values you set are overwritten when a transfer starts.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Control(u32);

impl Control {
    /// A memory-to-memory, byte-wide, incrementing control word.
    pub const fn new() -> Self {
        Control(0)
    }
    /// Use a raw control register value.
    pub const fn from_bits(bits: u32) -> Self {
        Control(bits)
    }
    /// Returns the raw control register value.
    pub const fn bits(self) -> u32 {
        self.0
    }

    /// Set the source transfer width.
    pub const fn source_width(self, width: TransferWidth) -> Self {
        Control(set(
            self.0,
            CTL_LO::SRC_TR_WIDTH::mask,
            CTL_LO::SRC_TR_WIDTH::offset,
            width as u32,
        ))
    }
    /// Set the destination transfer width.
    pub const fn destination_width(self, width: TransferWidth) -> Self {
        Control(set(
            self.0,
            CTL_LO::DST_TR_WIDTH::mask,
            CTL_LO::DST_TR_WIDTH::offset,
            width as u32,
        ))
    }
    /// Set how the source address changes.
    pub const fn source_address(self, mode: AddressMode) -> Self {
        Control(set(
            self.0,
            CTL_LO::SINC::mask,
            CTL_LO::SINC::offset,
            mode.bits(),
        ))
    }
    /// Set how the destination address changes.
    pub const fn destination_address(self, mode: AddressMode) -> Self {
        Control(set(
            self.0,
            CTL_LO::DINC::mask,
            CTL_LO::DINC::offset,
            mode.bits(),
        ))
    }
    /// Set the source burst size.
    pub const fn source_burst(self, burst: BurstSize) -> Self {
        Control(set(
            self.0,
            CTL_LO::SRC_MSIZE::mask,
            CTL_LO::SRC_MSIZE::offset,
            burst as u32,
        ))
    }
    /// Set the destination burst size.
    pub const fn destination_burst(self, burst: BurstSize) -> Self {
        Control(set(
            self.0,
            CTL_LO::DEST_MSIZE::mask,
            CTL_LO::DEST_MSIZE::offset,
            burst as u32,
        ))
    }
    /// Set the transfer type.
    pub const fn flow(self, flow: FlowControl) -> Self {
        Control(set(
            self.0,
            CTL_LO::TT_FC::mask,
            CTL_LO::TT_FC::offset,
            flow as u32,
        ))
    }
    /// Enable or disable source gather.
    ///
    /// A gather pattern must accompany the transfer when enabled.
    pub const fn gather(self, enable: bool) -> Self {
        Control(set(
            self.0,
            CTL_LO::SRC_GATHER_EN::mask,
            CTL_LO::SRC_GATHER_EN::offset,
            enable as u32,
        ))
    }
    /// Enable or disable destination scatter.
    ///
    /// A scatter pattern must accompany the transfer when enabled.
    pub const fn scatter(self, enable: bool) -> Self {
        Control(set(
            self.0,
            CTL_LO::DST_SCATTER_EN::mask,
            CTL_LO::DST_SCATTER_EN::offset,
            enable as u32,
        ))
    }

    /// Returns the raw source width encoding.
    pub const fn source_shift(self) -> u32 {
        get(
            self.0,
            CTL_LO::SRC_TR_WIDTH::mask,
            CTL_LO::SRC_TR_WIDTH::offset,
        )
    }
    /// Returns the raw destination width encoding.
    pub const fn destination_shift(self) -> u32 {
        get(
            self.0,
            CTL_LO::DST_TR_WIDTH::mask,
            CTL_LO::DST_TR_WIDTH::offset,
        )
    }
    /// Returns the source address mode.
    pub const fn source_mode(self) -> AddressMode {
        AddressMode::from_bits(get(self.0, CTL_LO::SINC::mask, CTL_LO::SINC::offset))
    }
    /// Returns the destination address mode.
    pub const fn destination_mode(self) -> AddressMode {
        AddressMode::from_bits(get(self.0, CTL_LO::DINC::mask, CTL_LO::DINC::offset))
    }
    /// Indicates if source gather is enabled.
    pub const fn is_gather(self) -> bool {
        self.0 & CTL_LO::SRC_GATHER_EN::mask != 0
    }
    /// Indicates if destination scatter is enabled.
    pub const fn is_scatter(self) -> bool {
        self.0 & CTL_LO::DST_SCATTER_EN::mask != 0
    }
    /// Indicates if either side continues through a linked list.
    pub const fn is_linked(self) -> bool {
        self.0 & (CTL_LO::LLP_SRC_EN::mask | CTL_LO::LLP_DST_EN::mask) != 0
    }

    pub(crate) const fn interrupts(self, enable: bool) -> Self {
        Control(set(
            self.0,
            CTL_LO::INT_EN::mask,
            CTL_LO::INT_EN::offset,
            enable as u32,
        ))
    }
    pub(crate) const fn linked(self, enable: bool) -> Self {
        let bits = CTL_LO::LLP_SRC_EN::mask | CTL_LO::LLP_DST_EN::mask;
        if enable {
            Control(self.0 | bits)
        } else {
            Control(self.0 & !bits)
        }
    }
}

impl Default for Control {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Control {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "CTL_LO({:#010X})", self.0)
    }
}

/// Handshaking for one side of a transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handshake {
    /// Software handshaking. Use for memory.
    Software,
    /// Hardware handshaking with the numbered peripheral interface
    Hardware(u8),
}

/// A channel configuration
///
/// Covers both the low and high configuration registers.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Configuration {
    lo: u32,
    hi: u32,
}

impl Configuration {
    /// Priority 0, software handshaking on both sides.
    pub const fn new() -> Self {
        Configuration {
            lo: CFG_LO::HS_SEL_DST::mask | CFG_LO::HS_SEL_SRC::mask,
            hi: 0,
        }
    }
    /// Use raw configuration register values.
    pub const fn from_raw(lo: u32, hi: u32) -> Self {
        Configuration { lo, hi }
    }
    /// Returns the raw `(low, high)` configuration register values.
    pub const fn raw(self) -> (u32, u32) {
        (self.lo, self.hi)
    }

    /// Set the channel priority. 7 is the highest priority.
    pub const fn priority(mut self, priority: u8) -> Self {
        self.lo = set(
            self.lo,
            CFG_LO::CH_PRIOR::mask,
            CFG_LO::CH_PRIOR::offset,
            priority as u32,
        );
        self
    }
    /// Set the source handshake.
    pub const fn source_handshake(mut self, handshake: Handshake) -> Self {
        let (sel, per) = match handshake {
            Handshake::Software => (CFG_LO::HS_SEL_SRC::RW::SOFTWARE, 0),
            Handshake::Hardware(per) => (CFG_LO::HS_SEL_SRC::RW::HARDWARE, per as u32),
        };
        self.lo = set(
            self.lo,
            CFG_LO::HS_SEL_SRC::mask,
            CFG_LO::HS_SEL_SRC::offset,
            sel,
        );
        self.hi = set(self.hi, CFG_HI::SRC_PER::mask, CFG_HI::SRC_PER::offset, per);
        self
    }
    /// Set the destination handshake.
    pub const fn destination_handshake(mut self, handshake: Handshake) -> Self {
        let (sel, per) = match handshake {
            Handshake::Software => (CFG_LO::HS_SEL_DST::RW::SOFTWARE, 0),
            Handshake::Hardware(per) => (CFG_LO::HS_SEL_DST::RW::HARDWARE, per as u32),
        };
        self.lo = set(
            self.lo,
            CFG_LO::HS_SEL_DST::mask,
            CFG_LO::HS_SEL_DST::offset,
            sel,
        );
        self.hi = set(
            self.hi,
            CFG_HI::DEST_PER::mask,
            CFG_HI::DEST_PER::offset,
            per,
        );
        self
    }
    /// Set the automatic reload bits.
    ///
    /// The driver rejects reloading configurations; this exists so that
    /// raw configurations can be described and inspected.
    pub const fn reload(mut self, source: bool, destination: bool) -> Self {
        self.lo = set(
            self.lo,
            CFG_LO::RELOAD_SRC::mask,
            CFG_LO::RELOAD_SRC::offset,
            source as u32,
        );
        self.lo = set(
            self.lo,
            CFG_LO::RELOAD_DST::mask,
            CFG_LO::RELOAD_DST::offset,
            destination as u32,
        );
        self
    }
    /// Prefer filling the FIFO to half full before starting destination
    /// transfers.
    pub const fn fifo_mode(mut self, enable: bool) -> Self {
        self.hi = set(
            self.hi,
            CFG_HI::FIFO_MODE::mask,
            CFG_HI::FIFO_MODE::offset,
            enable as u32,
        );
        self
    }

    /// Indicates if either side automatically reloads.
    pub const fn is_reload(self) -> bool {
        self.lo & (CFG_LO::RELOAD_SRC::mask | CFG_LO::RELOAD_DST::mask) != 0
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Debug for Configuration {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "CFG({:#010X}, {:#010X})", self.lo, self.hi)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn control_fields() {
        let ctl = Control::new()
            .source_width(TransferWidth::Bits32)
            .destination_width(TransferWidth::Bits16)
            .source_address(AddressMode::Fixed)
            .destination_address(AddressMode::Decrement)
            .flow(FlowControl::PeripheralToMemory)
            .scatter(true);

        assert_eq!(ctl.source_shift(), 2);
        assert_eq!(ctl.destination_shift(), 1);
        assert_eq!(ctl.source_mode(), AddressMode::Fixed);
        assert_eq!(ctl.destination_mode(), AddressMode::Decrement);
        assert!(ctl.is_scatter());
        assert!(!ctl.is_gather());
        assert_eq!(ctl.bits(), 0b010 << 20 | 1 << 18 | 0b10 << 9 | 0b01 << 7 | 2 << 4 | 1 << 1);
    }

    #[test]
    fn linked_and_interrupt_bits() {
        let ctl = Control::new().linked(true).interrupts(true);
        assert!(ctl.is_linked());
        assert_eq!(ctl.bits(), 1 << 28 | 1 << 27 | 1);
        assert!(!ctl.linked(false).is_linked());
    }

    #[test]
    fn reserved_width() {
        assert_eq!(TransferWidth::from_shift(6), None);
        assert_eq!(TransferWidth::from_shift(2), Some(TransferWidth::Bits32));
        assert_eq!(TransferWidth::Bits64.bytes(), 8);
    }

    #[test]
    fn burst_items() {
        assert_eq!(BurstSize::Items1.items(), 1);
        assert_eq!(BurstSize::Items4.items(), 4);
        assert_eq!(BurstSize::Items256.items(), 256);
    }

    #[test]
    fn hardware_handshake() {
        let cfg = Configuration::new()
            .priority(7)
            .source_handshake(Handshake::Hardware(5))
            .destination_handshake(Handshake::Software);
        let (lo, hi) = cfg.raw();
        assert_eq!(lo & (1 << 11), 0, "source uses hardware handshaking");
        assert_ne!(lo & (1 << 10), 0, "destination uses software handshaking");
        assert_eq!((lo >> 5) & 0x7, 7);
        assert_eq!((hi >> 7) & 0xF, 5);
        assert!(!cfg.is_reload());
        assert!(cfg.reload(false, true).is_reload());
    }
}
