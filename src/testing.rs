//! A simulated controller for host tests

use std::{cell::RefCell, vec::Vec};

use crate::{
    cache::Cache,
    dma::{Config, Dma, Event, State},
    descriptor::LinkListItem,
    ral::channel::{CFG_LO, CTL_HI},
    registers::{ChannelRegister, Interrupt, Registers},
};

pub(crate) const ID: u32 = 0x4448_0000;
pub(crate) const VERSION: u32 = 0x3232_312A;

/// A block started by a channel enable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Started {
    pub(crate) channel: usize,
    pub(crate) source: u32,
    pub(crate) destination: u32,
    pub(crate) link: u32,
    pub(crate) control: u32,
    pub(crate) items: usize,
}

#[derive(Default)]
struct Sim {
    channels: [[u32; 9]; 8],
    raw: [u32; 5],
    mask: [u32; 5],
    enable: u32,
    controller: bool,
    started: Vec<Started>,
}

/// Applies a write-enable style write to `current`.
fn write_enabled(current: u32, value: u32) -> u32 {
    let enable = (value >> 8) & 0xFF;
    (current & !enable) | (value & enable)
}

/// A register file that behaves like the controller, without moving data.
///
/// Every rising channel enable records the block programmed in the
/// channel's registers. Tests end blocks with [`finish`](Self::finish) and
/// [`fail`](Self::fail).
#[derive(Default)]
pub(crate) struct SimRegisters {
    sim: RefCell<Sim>,
}

impl SimRegisters {
    pub(crate) fn new() -> Self {
        Self::default()
    }
    /// Blocks started so far.
    pub(crate) fn started(&self) -> Vec<Started> {
        self.sim.borrow().started.clone()
    }
    pub(crate) fn mask(&self, interrupt: Interrupt) -> u32 {
        self.sim.borrow().mask[interrupt as usize]
    }
    pub(crate) fn is_controller_enabled(&self) -> bool {
        self.sim.borrow().controller
    }
    /// Complete the channel's running block, and stop the channel.
    pub(crate) fn finish(&self, channel: usize) {
        let mut sim = self.sim.borrow_mut();
        sim.raw[Interrupt::Transfer as usize] |= 1 << channel;
        sim.raw[Interrupt::Block as usize] |= 1 << channel;
        sim.enable &= !(1 << channel);
    }
    /// Stop the channel with a bus error after `items` source units.
    pub(crate) fn fail(&self, channel: usize, items: u32) {
        let mut sim = self.sim.borrow_mut();
        sim.raw[Interrupt::Error as usize] |= 1 << channel;
        let ctl_hi = &mut sim.channels[channel][ChannelRegister::CtlHi as usize];
        *ctl_hi = (*ctl_hi & !CTL_HI::BLOCK_TS::mask) | (items & CTL_HI::BLOCK_TS::mask);
        sim.enable &= !(1 << channel);
    }
}

impl Registers for SimRegisters {
    fn read_channel(&self, channel: usize, register: ChannelRegister) -> u32 {
        let value = self.sim.borrow().channels[channel][register as usize];
        match register {
            // The FIFO drains immediately.
            ChannelRegister::CfgLo => value | CFG_LO::FIFO_EMPTY::mask,
            _ => value,
        }
    }
    fn write_channel(&self, channel: usize, register: ChannelRegister, value: u32) {
        self.sim.borrow_mut().channels[channel][register as usize] = value;
    }
    fn raw(&self, interrupt: Interrupt) -> u32 {
        self.sim.borrow().raw[interrupt as usize]
    }
    fn status(&self, interrupt: Interrupt) -> u32 {
        let sim = self.sim.borrow();
        sim.raw[interrupt as usize] & sim.mask[interrupt as usize]
    }
    fn write_mask(&self, interrupt: Interrupt, value: u32) {
        let mut sim = self.sim.borrow_mut();
        let mask = &mut sim.mask[interrupt as usize];
        *mask = write_enabled(*mask, value);
    }
    fn clear(&self, interrupt: Interrupt, value: u32) {
        self.sim.borrow_mut().raw[interrupt as usize] &= !value;
    }
    fn channel_enable(&self) -> u32 {
        self.sim.borrow().enable
    }
    fn write_channel_enable(&self, value: u32) {
        let mut sim = self.sim.borrow_mut();
        let enable = write_enabled(sim.enable, value);
        let rising = enable & !sim.enable;
        for channel in (0..8).filter(|channel| rising & (1 << channel) != 0) {
            let registers = sim.channels[channel];
            let read = |register: ChannelRegister| registers[register as usize];
            sim.started.push(Started {
                channel,
                source: read(ChannelRegister::Sar),
                destination: read(ChannelRegister::Dar),
                link: read(ChannelRegister::Llp),
                control: read(ChannelRegister::CtlLo),
                items: (read(ChannelRegister::CtlHi) & CTL_HI::BLOCK_TS::mask) as usize,
            });
        }
        sim.enable = enable;
    }
    fn set_controller_enabled(&self, enable: bool) {
        self.sim.borrow_mut().controller = enable;
    }
    fn id(&self) -> u32 {
        ID
    }
    fn version(&self) -> u32 {
        VERSION
    }
}

/// A cache maintenance operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CacheOp {
    Clean(usize, usize),
    Flush(usize, usize),
    Invalidate(usize, usize),
}

/// Records cache maintenance, with 32 byte lines.
pub(crate) struct RecordingCache {
    cacheable: bool,
    ops: RefCell<Vec<CacheOp>>,
}

impl RecordingCache {
    pub(crate) fn new(cacheable: bool) -> Self {
        RecordingCache {
            cacheable,
            ops: RefCell::new(Vec::new()),
        }
    }
    /// Operations recorded since the last call.
    pub(crate) fn take(&self) -> Vec<CacheOp> {
        self.ops.take()
    }
}

impl Cache for RecordingCache {
    fn line_size(&self) -> usize {
        32
    }
    fn is_cacheable(&self, _: usize, _: usize) -> bool {
        self.cacheable
    }
    fn clean(&self, address: usize, len: usize) {
        self.ops.borrow_mut().push(CacheOp::Clean(address, len));
    }
    fn flush(&self, address: usize, len: usize) {
        self.ops.borrow_mut().push(CacheOp::Flush(address, len));
    }
    fn invalidate(&self, address: usize, len: usize) {
        self.ops.borrow_mut().push(CacheOp::Invalidate(address, len));
    }
}

pub(crate) type TestDma = Dma<SimRegisters, RecordingCache, 8>;

/// A driver over a fresh simulator, with nothing cacheable.
pub(crate) fn dma(config: Config) -> TestDma {
    dma_with_cache(config, false)
}

pub(crate) fn dma_with_cache(config: Config, cacheable: bool) -> TestDma {
    Dma::new(SimRegisters::new(), RecordingCache::new(cacheable), config)
}

/// Finish blocks until the channel's transfer ends.
pub(crate) fn run_to_completion(dma: &TestDma, channel: usize) {
    for _ in 0..1_000_000 {
        if !matches!(dma.state(channel), Ok(State::Running { .. })) {
            return;
        }
        dma.registers().finish(channel);
        dma.on_interrupt();
    }
    panic!("DMA channel {channel} never finished");
}

/// The channel's hardware linked list items.
pub(crate) fn pool(dma: &TestDma, channel: usize) -> Vec<LinkListItem> {
    dma.with(|shared| shared.pool[channel].to_vec())
}

/// The controller address of a hardware linked list item.
pub(crate) fn pool_address(dma: &TestDma, channel: usize, index: usize) -> u32 {
    dma.with(|shared| &shared.pool[channel][index] as *const LinkListItem as usize as u32)
}

std::thread_local! {
    static EVENTS: RefCell<Vec<(Event, usize)>> = const { RefCell::new(Vec::new()) };
}

/// A channel callback that records its events for this thread.
pub(crate) fn record(event: Event, user: usize) {
    EVENTS.with(|events| events.borrow_mut().push((event, user)));
}

/// Events recorded since the last call.
pub(crate) fn events() -> Vec<(Event, usize)> {
    EVENTS.with(|events| events.take())
}
