//! The DMA controller driver and channel allocation

use core::{cell::RefCell, ptr::NonNull, task::Waker};

use critical_section::Mutex;

use crate::{
    cache::{Cache, CacheSync, Span},
    channel::{Control, TransferWidth},
    descriptor::{LinkListItem, ScatterGather},
    ral::{channel::CFG_LO, dma::MAX_CHANNELS},
    registers::{write_enable, ChannelRegister, Interrupt, Registers},
    Error, Result,
};

/// The largest block the controller can run, in source transfer units.
pub const MAX_BLOCK_SIZE: usize = 4095;

/// The number of hardware linked list items the driver keeps per channel.
///
/// A chained transfer that doesn't fit in this many blocks (plus the first
/// block, programmed in the channel registers) falls back to software
/// continuation.
pub const LLI_POOL_SIZE: usize = 8;

/// How the driver runs transfers larger than one block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainStrategy {
    /// Re-arm the channel from the interrupt handler after every block
    SoftwareContinuation,
    /// Describe the remaining blocks with hardware linked list items, and
    /// let the controller walk them
    HardwareLinkedList,
}

/// Driver configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Config {
    /// How to run transfers that span more than one block
    pub chain: ChainStrategy,
    /// The largest block to program, in source transfer units
    ///
    /// Must be within `1..=MAX_BLOCK_SIZE`.
    pub max_block_size: usize,
    /// The widest transfer unit the data bus supports
    pub max_width: TransferWidth,
}

impl Config {
    /// Software continuation, full size blocks, and a 32-bit data bus.
    pub const DEFAULT: Self = Config {
        chain: ChainStrategy::SoftwareContinuation,
        max_block_size: MAX_BLOCK_SIZE,
        max_width: TransferWidth::Bits32,
    };
}

impl Default for Config {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// A transfer event, delivered to a channel's callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    /// The transfer completed. Contains the number of bytes transferred.
    Complete(usize),
    /// The controller reported an error. Contains the number of bytes
    /// transferred before the error.
    Error(usize),
}

/// A channel callback
///
/// Receives the transfer event, and the user value supplied when the
/// channel was selected. Callbacks usually run in the DMA interrupt handler.
/// A zero length [`memcpy`](Dma::memcpy) calls the callback before returning.
pub type Callback = fn(Event, usize);

/// The state of a channel's transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    /// No transfer configured since selection, or the last transfer was
    /// disabled
    Idle,
    /// A transfer is in flight
    Running {
        /// Index of the current linked list item. Zero if the transfer has
        /// no caller-provided list.
        item: usize,
        /// Source units not yet completed in the current item, including
        /// the running block.
        remaining: usize,
    },
    /// The last transfer completed
    Done {
        /// Bytes transferred
        transferred: usize,
    },
    /// The last transfer ended with an error
    Error {
        /// Bytes transferred before the error
        transferred: usize,
    },
}

/// A caller-provided, or pool-provided, list of items.
pub(crate) struct ItemList {
    base: NonNull<LinkListItem>,
    len: usize,
    /// The next item software starts, or the first item the controller
    /// fetches
    cursor: usize,
}

// Safety: the list is only dereferenced within the driver's critical
// sections. The caller guarantees that it outlives the transfer.
unsafe impl Send for ItemList {}

impl ItemList {
    pub(crate) fn new(items: &mut [LinkListItem], cursor: usize) -> Self {
        ItemList {
            // Safety: slice pointers are never null.
            base: unsafe { NonNull::new_unchecked(items.as_mut_ptr()) },
            len: items.len(),
            cursor,
        }
    }
    /// # Safety
    ///
    /// The list memory must still be valid, and `index < len`.
    pub(crate) unsafe fn get(&self, index: usize) -> &LinkListItem {
        debug_assert!(index < self.len);
        &*self.base.as_ptr().add(index)
    }
    pub(crate) fn address(&self, index: usize) -> u32 {
        // Safety: only computes an address.
        unsafe { self.base.as_ptr().add(index) as usize as u32 }
    }
    pub(crate) fn len(&self) -> usize {
        self.len
    }
    pub(crate) fn cursor(&self) -> usize {
        self.cursor
    }
    pub(crate) fn take_next(&mut self) -> Option<usize> {
        (self.cursor < self.len).then(|| {
            self.cursor += 1;
            self.cursor - 1
        })
    }
}

/// How the rest of a transfer continues after the running block.
pub(crate) enum Chain {
    /// Software re-arms the channel until `remaining` is exhausted
    None,
    /// Software starts each item in turn
    Software(ItemList),
    /// The controller walks the items, starting at the list's cursor
    Hardware {
        list: ItemList,
        /// Bytes moved by the whole chain
        bytes: usize,
    },
}

/// Software shadow state of one channel.
pub(crate) struct ChannelInfo {
    pub(crate) callback: Option<Callback>,
    pub(crate) user: usize,
    pub(crate) sync: CacheSync,
    pub(crate) state: State,
    /// Control word of the current item, as programmed
    pub(crate) control: Control,
    pub(crate) source_shift: u8,
    pub(crate) destination_shift: u8,
    pub(crate) gather: Option<ScatterGather>,
    pub(crate) scatter: Option<ScatterGather>,
    /// Bytes transferred by completed blocks
    pub(crate) transferred: usize,
    /// Units of the current item not yet completed, including the running block
    pub(crate) remaining: usize,
    /// Units in the running block
    pub(crate) block: usize,
    /// Largest block that software continuation starts
    pub(crate) limit: usize,
    pub(crate) next_source: u32,
    pub(crate) next_destination: u32,
    pub(crate) chain: Chain,
    /// Destination range to invalidate once the running block completes
    pub(crate) deferred: Option<Span>,
    /// Index of the current item of a caller-provided list
    pub(crate) item: usize,
    pub(crate) waker: Option<Waker>,
}

impl ChannelInfo {
    const IDLE: Self = ChannelInfo {
        callback: None,
        user: 0,
        sync: CacheSync::None,
        state: State::Idle,
        control: Control::new(),
        source_shift: 0,
        destination_shift: 0,
        gather: None,
        scatter: None,
        transferred: 0,
        remaining: 0,
        block: 0,
        limit: 0,
        next_source: 0,
        next_destination: 0,
        chain: Chain::None,
        deferred: None,
        item: 0,
        waker: None,
    };

    fn claim(&mut self, callback: Option<Callback>, user: usize, sync: CacheSync) {
        *self = ChannelInfo {
            callback,
            user,
            sync,
            ..ChannelInfo::IDLE
        };
    }

    pub(crate) fn is_running(&self) -> bool {
        matches!(self.state, State::Running { .. })
    }
}

const EMPTY_POOL: [LinkListItem; LLI_POOL_SIZE] = [LinkListItem::EMPTY; LLI_POOL_SIZE];

/// State shared between the caller and the interrupt handler.
pub(crate) struct Shared<const CHANNELS: usize> {
    pub(crate) active: u8,
    pub(crate) reserved: u8,
    pub(crate) channels: [ChannelInfo; CHANNELS],
    pub(crate) pool: [[LinkListItem; LLI_POOL_SIZE]; CHANNELS],
}

impl<const CHANNELS: usize> Shared<CHANNELS> {
    /// Release a channel after its transfer ends, unless it's reserved.
    pub(crate) fn release(&mut self, channel: usize) {
        if self.reserved & (1 << channel) == 0 {
            self.active &= !(1 << channel);
        }
    }
}

/// Callback and waker to run once the shared state is released.
pub(crate) struct Notification {
    callback: Option<(Callback, usize)>,
    event: Event,
    waker: Option<Waker>,
}

impl Notification {
    pub(crate) fn new(info: &mut ChannelInfo, event: Event) -> Self {
        Notification {
            callback: info.callback.map(|callback| (callback, info.user)),
            event,
            waker: info.waker.take(),
        }
    }
    pub(crate) fn notify(self) {
        if let Some(waker) = self.waker {
            waker.wake();
        }
        if let Some((callback, user)) = self.callback {
            callback(self.event, user);
        }
    }
}

/// A DMA controller driver
///
/// `Dma` owns the controller's register file, a cache maintenance
/// implementation, and the software state of `CHANNELS` channels. All
/// methods take `&self`; the driver coordinates with its interrupt handler
/// using critical sections. Consider placing the driver in a `static`:
///
/// ```no_run
/// use ahb_dmac::{cache::NoCache, Config, Dma, Mmio};
/// # const DMA_BASE: *const () = core::ptr::null();
///
/// // Safety: DMA_BASE is the controller's register block, and
/// // there's only one driver for the controller.
/// static DMA: Dma<Mmio, NoCache, 8> =
///     Dma::new(unsafe { Mmio::new(DMA_BASE) }, NoCache, Config::DEFAULT);
/// ```
///
/// A transfer takes a channel through
///
/// 1. [`select`](Dma::select) or [`reserve`](Dma::reserve),
/// 2. one of the `configure_*` methods, which starts the transfer,
/// 3. [`on_interrupt`](Dma::on_interrupt) calls, until the channel's callback
///    receives an [`Event`].
///
/// Once the transfer ends, a selected channel is free for the next
/// `select`. A reserved channel stays with its owner until
/// [`unreserve`](Dma::unreserve).
///
/// The driver must not move while a transfer is in flight. Hardware linked
/// list items live inside the driver.
pub struct Dma<R, C, const CHANNELS: usize> {
    pub(crate) registers: R,
    pub(crate) cache: C,
    pub(crate) config: Config,
    pub(crate) shared: Mutex<RefCell<Shared<CHANNELS>>>,
}

impl<R: Registers, C: Cache, const CHANNELS: usize> Dma<R, C, CHANNELS> {
    /// Create the DMA driver.
    ///
    /// Note that this can evaluate at compile time.
    ///
    /// # Panics
    ///
    /// Panics if `CHANNELS` exceeds the controller's channel count, or if
    /// the configured maximum block size is out of range.
    pub const fn new(registers: R, cache: C, config: Config) -> Self {
        assert!(
            CHANNELS <= MAX_CHANNELS,
            "DMA channel count exceeds the controller's channels"
        );
        assert!(
            config.max_block_size > 0 && config.max_block_size <= MAX_BLOCK_SIZE,
            "DMA maximum block size out of range"
        );
        Dma {
            registers,
            cache,
            config,
            shared: Mutex::new(RefCell::new(Shared {
                active: 0,
                reserved: 0,
                channels: [ChannelInfo::IDLE; CHANNELS],
                pool: [EMPTY_POOL; CHANNELS],
            })),
        }
    }

    /// Initialize the controller.
    ///
    /// Enables the controller, disables every channel, and masks and clears
    /// every channel interrupt. Make sure that the DMA clock is running
    /// before calling `init`.
    pub fn init(&self) {
        self.registers.set_controller_enabled(true);
        for channel in 0..CHANNELS {
            self.registers
                .write_channel_enable(write_enable(channel, false));
            self.mask_interrupts(channel);
        }
        log::debug!("DMA controller enabled with {} channels", CHANNELS);
    }

    /// Returns the controller's ID register.
    pub fn id(&self) -> u32 {
        self.registers.id()
    }

    /// Returns the controller's component version.
    pub fn version(&self) -> u32 {
        self.registers.version()
    }

    /// Returns the register file.
    pub fn registers(&self) -> &R {
        &self.registers
    }

    /// Returns the cache maintenance implementation.
    pub fn cache(&self) -> &C {
        &self.cache
    }

    /// Returns the driver configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run `f` with exclusive access to the shared state.
    pub(crate) fn with<T>(&self, f: impl FnOnce(&mut Shared<CHANNELS>) -> T) -> T {
        critical_section::with(|cs| f(&mut self.shared.borrow_ref_mut(cs)))
    }

    /// Select a free channel.
    ///
    /// If `channel` is `Some`, `select` only claims that channel. Otherwise,
    /// it claims the lowest numbered free channel. Returns the claimed
    /// channel, or `None` if the requested channel is busy or invalid, or if
    /// there is no free channel.
    ///
    /// `callback` receives the transfer [`Event`]s, along with `user`.
    /// `sync` selects the cache maintenance for the channel's transfers.
    pub fn select(
        &self,
        channel: Option<usize>,
        callback: Option<Callback>,
        user: usize,
        sync: CacheSync,
    ) -> Option<usize> {
        self.allocate(channel, callback, user, sync, false)
    }

    /// Select a free channel, and keep it after its transfers complete.
    ///
    /// Behaves like [`select`](Dma::select). The channel stays claimed until
    /// [`unreserve`](Dma::unreserve).
    pub fn reserve(
        &self,
        channel: Option<usize>,
        callback: Option<Callback>,
        user: usize,
        sync: CacheSync,
    ) -> Option<usize> {
        self.allocate(channel, callback, user, sync, true)
    }

    fn allocate(
        &self,
        channel: Option<usize>,
        callback: Option<Callback>,
        user: usize,
        sync: CacheSync,
        reserve: bool,
    ) -> Option<usize> {
        let claimed = self.with(|shared| {
            let index = match channel {
                Some(index) if index < CHANNELS && shared.active & (1 << index) == 0 => index,
                Some(_) => return None,
                None => (0..CHANNELS).find(|index| shared.active & (1 << index) == 0)?,
            };
            shared.active |= 1 << index;
            if reserve {
                shared.reserved |= 1 << index;
            }
            shared.channels[index].claim(callback, user, sync);
            Some(index)
        });
        match claimed {
            Some(index) => log::debug!(
                "DMA channel {} {}",
                index,
                if reserve { "reserved" } else { "selected" }
            ),
            None => log::debug!("no DMA channel available for {:?}", channel),
        }
        claimed
    }

    /// Release a reserved channel.
    ///
    /// Clears the reserved and active flags. The channel is free for the
    /// next `select`.
    pub fn unreserve(&self, channel: usize) -> Result<()> {
        check_index::<CHANNELS>(channel)?;
        self.with(|shared| {
            shared.reserved &= !(1 << channel);
            shared.active &= !(1 << channel);
            shared.channels[channel].state = State::Idle;
        });
        log::debug!("DMA channel {} unreserved", channel);
        Ok(())
    }

    /// Indicates if the channel is reserved.
    pub fn is_reserved(&self, channel: usize) -> bool {
        channel < CHANNELS && self.with(|shared| shared.reserved & (1 << channel) != 0)
    }

    /// Indicates if the channel is claimed by a `select` or `reserve`.
    pub fn is_active(&self, channel: usize) -> bool {
        channel < CHANNELS && self.with(|shared| shared.active & (1 << channel) != 0)
    }

    /// Release a selected channel without running a transfer.
    ///
    /// Has no effect on reserved channels. Returns [`Error::Busy`] if a
    /// transfer is in flight; use [`disable`](Dma::disable) to stop it.
    pub fn release(&self, channel: usize) -> Result<()> {
        check_index::<CHANNELS>(channel)?;
        self.with(|shared| {
            if shared.channels[channel].is_running() {
                return Err(Error::Busy);
            }
            shared.release(channel);
            Ok(())
        })
    }

    /// Returns the state of the channel's last transfer.
    pub fn state(&self, channel: usize) -> Result<State> {
        check_index::<CHANNELS>(channel)?;
        Ok(self.with(|shared| shared.channels[channel].state))
    }

    /// Indicates if the controller has the channel enabled.
    pub fn is_enabled(&self, channel: usize) -> bool {
        channel < CHANNELS && self.registers.channel_enable() & (1 << channel) != 0
    }

    /// Suspend the channel.
    ///
    /// The controller stops the channel after the current source
    /// transaction. The channel's FIFO might still hold data.
    pub fn suspend(&self, channel: usize) -> Result<()> {
        check_index::<CHANNELS>(channel)?;
        let cfg = self.registers.read_channel(channel, ChannelRegister::CfgLo);
        self.registers
            .write_channel(channel, ChannelRegister::CfgLo, cfg | CFG_LO::CH_SUSP::mask);
        Ok(())
    }

    /// Resume a suspended channel.
    pub fn resume(&self, channel: usize) -> Result<()> {
        check_index::<CHANNELS>(channel)?;
        let cfg = self.registers.read_channel(channel, ChannelRegister::CfgLo);
        self.registers
            .write_channel(channel, ChannelRegister::CfgLo, cfg & !CFG_LO::CH_SUSP::mask);
        Ok(())
    }

    /// Indicates if the channel's FIFO is empty.
    pub fn is_drained(&self, channel: usize) -> bool {
        channel < CHANNELS
            && self.registers.read_channel(channel, ChannelRegister::CfgLo)
                & CFG_LO::FIFO_EMPTY::mask
                != 0
    }

    /// Disable the channel, cancelling any transfer.
    ///
    /// If `wait_for_drain`, the channel is suspended and its FIFO drained
    /// before it's disabled. Otherwise, data in the FIFO is lost. The
    /// channel's transfer can't be resumed; configure a new transfer
    /// instead. Cancelling a transfer releases a selected channel; a
    /// reserved channel stays reserved.
    ///
    /// Disabling a channel that's already disabled, and isn't running a
    /// transfer, does nothing and succeeds. The channel stays claimed; use
    /// [`release`](Dma::release) to free it.
    pub fn disable(&self, channel: usize, wait_for_drain: bool) -> Result<()> {
        check_index::<CHANNELS>(channel)?;
        if self.is_enabled(channel) {
            if wait_for_drain {
                self.suspend(channel)?;
                while !self.is_drained(channel) {}
            }
            self.registers
                .write_channel_enable(write_enable(channel, false));
            while self.is_enabled(channel) {}
            self.resume(channel)?;
            self.mask_interrupts(channel);
            log::debug!("DMA channel {} disabled", channel);
        }

        let waker = self.with(|shared| {
            let info = &mut shared.channels[channel];
            if !info.is_running() {
                return None;
            }
            info.state = State::Idle;
            self.mask_interrupts(channel);
            self.settle(info);
            info.chain = Chain::None;
            let waker = info.waker.take();
            shared.release(channel);
            waker
        });
        if let Some(waker) = waker {
            waker.wake();
        }
        Ok(())
    }

    /// Mask and clear all of the channel's interrupts.
    pub(crate) fn mask_interrupts(&self, channel: usize) {
        for interrupt in Interrupt::ALL {
            self.registers
                .write_mask(interrupt, write_enable(channel, false));
        }
        self.clear_interrupts(channel);
    }

    /// Clear all of the channel's pending interrupts.
    pub(crate) fn clear_interrupts(&self, channel: usize) {
        for interrupt in Interrupt::ALL {
            self.registers.clear(interrupt, 1 << channel);
        }
    }
}

pub(crate) fn check_index<const CHANNELS: usize>(channel: usize) -> Result<()> {
    if channel < CHANNELS {
        Ok(())
    } else {
        log::warn!("DMA channel {} out of range", channel);
        Err(Error::InvalidChannel)
    }
}
