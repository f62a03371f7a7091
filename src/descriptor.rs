//! Block descriptors and scatter / gather patterns

use crate::{
    channel::Control,
    ral::channel::{CTL_HI, DSR, LLP, SGR},
};

/// A hardware linked list item
///
/// Describes one block of a multi-block transfer. The controller fetches the
/// first five words when it moves to the block, and may write back the
/// control high word and status words when the block completes.
///
/// Items are caller-owned. The driver writes the link pointers when it
/// chains items in hardware.
#[derive(Clone, PartialEq, Eq)]
#[repr(C, align(4))]
pub struct LinkListItem {
    sar: u32,
    dar: u32,
    llp: u32,
    ctl_lo: u32,
    ctl_hi: u32,
    sstat: u32,
    dstat: u32,
}

impl LinkListItem {
    /// An empty item, suitable for static storage.
    pub const EMPTY: Self = LinkListItem {
        sar: 0,
        dar: 0,
        llp: 0,
        ctl_lo: 0,
        ctl_hi: 0,
        sstat: 0,
        dstat: 0,
    };

    /// Describe a block of `items` source transfer units from `source` to
    /// `destination`.
    ///
    /// `items` is not checked here; the driver checks it against the maximum
    /// block size when the item is used.
    pub const fn new(source: u32, destination: u32, items: usize, control: Control) -> Self {
        LinkListItem {
            sar: source,
            dar: destination,
            llp: 0,
            ctl_lo: control.bits(),
            ctl_hi: items as u32,
            sstat: 0,
            dstat: 0,
        }
    }

    /// Select the AHB master interface used to fetch the next item.
    pub fn set_link_master(&mut self, master: u8) {
        self.llp =
            (self.llp & !LLP::LMS::mask) | ((master as u32) << LLP::LMS::offset & LLP::LMS::mask);
    }

    /// Returns the source address.
    pub const fn source(&self) -> u32 {
        self.sar
    }
    /// Returns the destination address.
    pub const fn destination(&self) -> u32 {
        self.dar
    }
    /// Returns the control word.
    pub const fn control(&self) -> Control {
        Control::from_bits(self.ctl_lo)
    }
    /// Returns the raw control high word.
    ///
    /// This includes the block size, and the done bit written back by the
    /// controller.
    pub const fn control_high(&self) -> u32 {
        self.ctl_hi
    }
    /// Returns the raw link pointer.
    pub const fn link(&self) -> u32 {
        self.llp
    }
    /// Returns the link master select.
    pub const fn link_master(&self) -> u8 {
        ((self.llp & LLP::LMS::mask) >> LLP::LMS::offset) as u8
    }
    /// Returns the requested number of items.
    ///
    /// This might differ from the raw block size field if the request
    /// overflows the field. That's caught during validation.
    pub const fn items(&self) -> usize {
        self.ctl_hi as usize
    }

    /// Point this item at `next`, or terminate the list.
    pub(crate) fn chain(&mut self, next: Option<u32>) {
        let lms = self.llp & LLP::LMS::mask;
        match next {
            Some(address) => {
                self.llp = (address & LLP::LOC::mask) | lms;
                self.ctl_lo = self.control().linked(true).bits();
            }
            None => {
                self.llp = 0;
                self.ctl_lo = self.control().linked(false).bits();
            }
        }
    }

    pub(crate) fn set_block(
        &mut self,
        source: u32,
        destination: u32,
        items: usize,
        control: Control,
    ) {
        self.sar = source;
        self.dar = destination;
        self.ctl_lo = control.bits();
        self.ctl_hi = (items as u32) & CTL_HI::BLOCK_TS::mask;
        self.sstat = 0;
        self.dstat = 0;
    }
}

impl core::fmt::Debug for LinkListItem {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("LinkListItem")
            .field("sar", &format_args!("{:#010X}", self.sar))
            .field("dar", &format_args!("{:#010X}", self.dar))
            .field("llp", &format_args!("{:#010X}", self.llp))
            .field("ctl_lo", &format_args!("{:#010X}", self.ctl_lo))
            .field("ctl_hi", &format_args!("{:#010X}", self.ctl_hi))
            .finish()
    }
}

/// A scatter or gather pattern
///
/// Move `count` contiguous transfer units, then skip `interval` units.
/// Repeats for the whole block. Both values are in the transfer width of
/// the side that uses the pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScatterGather {
    /// Contiguous units between skips. Must be non-zero.
    pub count: u16,
    /// Units skipped after every `count` units.
    pub interval: u32,
}

impl ScatterGather {
    /// The largest count supported by the hardware.
    pub const MAX_COUNT: u16 = (SGR::SGC::mask >> SGR::SGC::offset) as u16;
    /// The largest interval supported by the hardware.
    pub const MAX_INTERVAL: u32 = SGR::SGI::mask >> SGR::SGI::offset;

    /// Indicates if the hardware can express this pattern.
    pub const fn is_valid(&self) -> bool {
        self.count != 0 && self.count <= Self::MAX_COUNT && self.interval <= Self::MAX_INTERVAL
    }

    /// The raw gather register value.
    pub(crate) const fn gather_bits(&self) -> u32 {
        ((self.count as u32) << SGR::SGC::offset & SGR::SGC::mask)
            | (self.interval << SGR::SGI::offset & SGR::SGI::mask)
    }

    /// The raw scatter register value.
    pub(crate) const fn scatter_bits(&self) -> u32 {
        ((self.count as u32) << DSR::DSC::offset & DSR::DSC::mask)
            | (self.interval << DSR::DSI::offset & DSR::DSI::mask)
    }
}

/// Returns the number of bytes spanned by `units` transfer units of
/// `1 << shift` bytes, following an optional scatter or gather pattern.
///
/// Every complete group of `count` units is followed by `interval` skipped
/// units; a trailing partial group isn't.
pub const fn span(units: usize, shift: u8, pattern: Option<ScatterGather>) -> usize {
    let width = 1usize << shift;
    match pattern {
        Some(ScatterGather { count, interval }) if count != 0 => {
            let count = count as usize;
            let interval = interval as usize;
            (units / count) * (count + interval) * width + (units % count) * width
        }
        _ => units * width,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::TransferWidth;

    #[test]
    fn linear_span() {
        assert_eq!(span(10, 0, None), 10);
        assert_eq!(span(10, 2, None), 40);
        assert_eq!(span(0, 2, None), 0);
    }

    #[test]
    fn scatter_span() {
        let scatter = Some(ScatterGather {
            count: 4,
            interval: 1,
        });
        for items in [1usize, 4, 7, 8, 4095] {
            let width = TransferWidth::Bits32;
            let expected =
                (items / 4) * (4 + 1) * width.bytes() + (items % 4) * width.bytes();
            assert_eq!(span(items, width.shift(), scatter), expected, "{items} items");
        }
    }

    #[test]
    fn pattern_validity() {
        let pattern = |count, interval| ScatterGather { count, interval };
        assert!(!pattern(0, 1).is_valid());
        assert!(pattern(1, 0).is_valid());
        assert!(pattern(0xFFF, 0xF_FFFF).is_valid());
        assert!(!pattern(0x1000, 0).is_valid());
        assert!(!pattern(1, 0x10_0000).is_valid());
    }

    #[test]
    fn pattern_bits() {
        let pattern = ScatterGather {
            count: 3,
            interval: 5,
        };
        assert_eq!(pattern.gather_bits(), 3 << 20 | 5);
        assert_eq!(pattern.scatter_bits(), 3 << 20 | 5);
    }

    #[test]
    fn chaining() {
        let mut item = LinkListItem::new(0x100, 0x200, 16, Control::new());
        item.set_link_master(1);
        item.chain(Some(0x2000_0040));
        assert_eq!(item.link(), 0x2000_0041);
        assert!(item.control().is_linked());

        item.chain(None);
        assert_eq!(item.link(), 0);
        assert!(!item.control().is_linked());
    }
}
