//! Transfer configuration and block chaining
//!
//! The controller runs at most [`MAX_BLOCK_SIZE`](crate::MAX_BLOCK_SIZE)
//! source units per block. Larger transfers are split into blocks. Under
//! [`ChainStrategy::SoftwareContinuation`], the interrupt handler re-arms the
//! channel with the next block once the previous block completes. Under
//! [`ChainStrategy::HardwareLinkedList`], the driver describes the remaining
//! blocks with linked list items, and the controller walks them without
//! software help.
//!
//! Every block starts at the address where the previous block stopped. The
//! next address accounts for the address direction, and for any scatter or
//! gather pattern on that side.

use core::sync::atomic;

use crate::{
    cache::{self, Cache, Span},
    channel::{AddressMode, Configuration, Control, FlowControl, TransferWidth},
    descriptor::{span, LinkListItem, ScatterGather},
    dma::{
        check_index, Chain, ChainStrategy, ChannelInfo, Dma, Event, ItemList, Notification,
        Shared, State, LLI_POOL_SIZE,
    },
    ral::channel::{CFG_LO, CTL_HI, LLP},
    registers::{write_enable, ChannelRegister, Interrupt, Registers},
    Error, Result,
};

/// The addresses and memory touched by one block.
pub(crate) struct Coverage {
    pub(crate) next_source: u32,
    pub(crate) next_destination: u32,
    pub(crate) source: Option<Span>,
    pub(crate) destination: Option<Span>,
}

impl Coverage {
    /// Compute the coverage of `units` source units, starting at `source`
    /// and `destination`.
    ///
    /// The destination moves the same number of bytes as the source, in its
    /// own transfer width.
    pub(crate) fn new(
        control: Control,
        source: u32,
        destination: u32,
        units: usize,
        gather: Option<ScatterGather>,
        scatter: Option<ScatterGather>,
    ) -> Self {
        let source_shift = control.source_shift() as u8;
        let destination_shift = control.destination_shift() as u8;
        let destination_units = (units << source_shift) >> destination_shift;

        let source_bytes = span(units, source_shift, gather.filter(|_| control.is_gather()));
        let destination_bytes = span(
            destination_units,
            destination_shift,
            scatter.filter(|_| control.is_scatter()),
        );

        let next_source = advance(source, control.source_mode(), source_bytes);
        let next_destination = advance(destination, control.destination_mode(), destination_bytes);
        Coverage {
            next_source,
            next_destination,
            source: Span::covering(source, next_source, control.source_mode(), source_shift),
            destination: Span::covering(
                destination,
                next_destination,
                control.destination_mode(),
                destination_shift,
            ),
        }
    }
}

fn advance(address: u32, mode: AddressMode, bytes: usize) -> u32 {
    match mode {
        AddressMode::Increment => address.wrapping_add(bytes as u32),
        AddressMode::Decrement => address.wrapping_sub(bytes as u32),
        AddressMode::Fixed => address,
    }
}

/// Bytes moved by an item.
fn item_bytes(item: &LinkListItem) -> usize {
    item.items() << item.control().source_shift()
}

fn lcm(a: usize, b: usize) -> usize {
    let (mut x, mut y) = (a, b);
    while y != 0 {
        (x, y) = (y, x % y);
    }
    a / x * b
}

/// The largest block, in source units, that ends on a whole transfer unit
/// of both sides, and on a whole scatter or gather group.
///
/// Falls back to whole transfer units when a group doesn't fit in `max`.
/// Patterns must only be given for the sides that enable them.
fn block_limit(
    max: usize,
    control: Control,
    gather: Option<ScatterGather>,
    scatter: Option<ScatterGather>,
) -> Result<usize> {
    let source_shift = control.source_shift();
    let destination_shift = control.destination_shift();
    let widths = 1usize << source_shift.max(destination_shift);
    let mut groups = widths;
    if let Some(pattern) = gather {
        groups = lcm(groups, (pattern.count as usize) << source_shift);
    }
    if let Some(pattern) = scatter {
        groups = lcm(groups, (pattern.count as usize) << destination_shift);
    }
    match [groups, widths]
        .into_iter()
        .map(|bytes| bytes >> source_shift)
        .find(|&granule| granule <= max)
    {
        Some(granule) => Ok(max - max % granule),
        None => {
            log::warn!("DMA block of {} items can't hold whole destination units", max);
            Err(Error::InvalidWidth)
        }
    }
}

impl<R: Registers, C: Cache, const CHANNELS: usize> Dma<R, C, CHANNELS> {
    /// Check both transfer widths against the data bus.
    fn check_widths(&self, control: Control) -> Result<()> {
        let fits = |shift| {
            TransferWidth::from_shift(shift).is_some_and(|width| width <= self.config.max_width)
        };
        if fits(control.source_shift()) && fits(control.destination_shift()) {
            Ok(())
        } else {
            log::warn!("unsupported DMA transfer width in {:?}", control);
            Err(Error::InvalidWidth)
        }
    }

    fn check_block(&self, items: usize) -> Result<()> {
        if items == 0 || items > self.config.max_block_size {
            log::warn!(
                "DMA block of {} items exceeds 1..={}",
                items,
                self.config.max_block_size
            );
            Err(Error::InvalidBlockSize)
        } else {
            Ok(())
        }
    }

    /// Returns the pattern used by an enabled side, or an error if the
    /// pattern is missing or out of range.
    fn check_pattern(
        enabled: bool,
        pattern: Option<ScatterGather>,
    ) -> Result<Option<ScatterGather>> {
        match (enabled, pattern) {
            (false, _) => Ok(None),
            (true, Some(pattern)) if pattern.is_valid() => Ok(Some(pattern)),
            (true, pattern) => {
                log::warn!("invalid DMA scatter / gather pattern {:?}", pattern);
                Err(Error::InvalidScatterGather)
            }
        }
    }

    fn check_reload(configuration: Configuration) -> Result<()> {
        if configuration.is_reload() {
            log::warn!("DMA auto reload requested in {:?}", configuration);
            Err(Error::AutoReload)
        } else {
            Ok(())
        }
    }

    /// Make sure that the channel is claimed and idle, then reset its
    /// transfer state.
    fn prepare(&self, shared: &mut Shared<CHANNELS>, channel: usize) -> Result<()> {
        if shared.active & (1 << channel) == 0 {
            log::warn!("DMA channel {} used before selection", channel);
            return Err(Error::NotAllocated);
        }
        let info = &mut shared.channels[channel];
        if info.is_running() || self.is_enabled(channel) {
            return Err(Error::Busy);
        }
        info.transferred = 0;
        info.limit = self.config.max_block_size;
        info.item = 0;
        info.chain = Chain::None;
        info.deferred = None;
        Ok(())
    }

    /// Write the channel configuration and interrupt masks.
    fn setup(
        &self,
        channel: usize,
        info: &mut ChannelInfo,
        configuration: Configuration,
        gather: Option<ScatterGather>,
        scatter: Option<ScatterGather>,
        interrupts: bool,
    ) {
        let (lo, hi) = configuration.raw();
        self.registers
            .write_channel(channel, ChannelRegister::CfgLo, lo & !CFG_LO::CH_SUSP::mask);
        self.registers
            .write_channel(channel, ChannelRegister::CfgHi, hi);
        self.registers.write_channel(
            channel,
            ChannelRegister::Sgr,
            gather.map_or(0, |pattern| pattern.gather_bits()),
        );
        self.registers.write_channel(
            channel,
            ChannelRegister::Dsr,
            scatter.map_or(0, |pattern| pattern.scatter_bits()),
        );

        for interrupt in Interrupt::ALL {
            let unmask = interrupts && matches!(interrupt, Interrupt::Transfer | Interrupt::Error);
            self.registers
                .write_mask(interrupt, write_enable(channel, unmask));
        }

        info.gather = gather;
        info.scatter = scatter;
    }

    /// Adopt `control` as the channel's current control word.
    fn set_control(info: &mut ChannelInfo, control: Control) {
        info.control = control;
        info.source_shift = control.source_shift() as u8;
        info.destination_shift = control.destination_shift() as u8;
    }

    /// Program and enable one block.
    ///
    /// `link` is the raw link pointer for the controller. Zero means that
    /// the block is the last block the controller runs on its own.
    fn launch(
        &self,
        channel: usize,
        info: &mut ChannelInfo,
        source: u32,
        destination: u32,
        units: usize,
        link: u32,
    ) {
        let coverage = Coverage::new(
            info.control,
            source,
            destination,
            units,
            info.gather,
            info.scatter,
        );
        info.deferred = cache::before_block(
            &self.cache,
            info.sync,
            coverage.source,
            coverage.destination,
            info.control.is_scatter(),
        );
        info.block = units;
        info.next_source = coverage.next_source;
        info.next_destination = coverage.next_destination;
        info.state = State::Running {
            item: info.item,
            remaining: info.remaining,
        };

        let control = info.control.interrupts(true).linked(link & LLP::LOC::mask != 0);
        self.registers
            .write_channel(channel, ChannelRegister::Sar, source);
        self.registers
            .write_channel(channel, ChannelRegister::Dar, destination);
        self.registers
            .write_channel(channel, ChannelRegister::Llp, link);
        self.registers
            .write_channel(channel, ChannelRegister::CtlLo, control.bits());
        self.registers
            .write_channel(channel, ChannelRegister::CtlHi, units as u32);

        self.clear_interrupts(channel);
        atomic::fence(atomic::Ordering::SeqCst);
        self.registers
            .write_channel_enable(write_enable(channel, true));
        log::trace!(
            "DMA channel {} block of {} items, {:#010X} -> {:#010X}",
            channel,
            units,
            source,
            destination
        );
    }

    /// Make linked list items visible to the controller.
    fn clean_items(&self, items: &[LinkListItem]) {
        let address = items.as_ptr() as usize;
        let len = core::mem::size_of_val(items);
        if self.cache.is_cacheable(address, len) {
            self.cache.clean(address, len);
        }
    }

    /// Run the cache maintenance that waits for the end of the transfer.
    pub(crate) fn settle(&self, info: &mut ChannelInfo) {
        cache::after_block(&self.cache, info.deferred.take());
        if let Chain::Hardware { list, .. } = &info.chain {
            for index in list.cursor()..list.len() {
                // Safety: the list outlives the transfer.
                let item = unsafe { list.get(index) };
                let coverage = Coverage::new(
                    item.control(),
                    item.source(),
                    item.destination(),
                    item.items(),
                    info.gather,
                    info.scatter,
                );
                cache::after_block(
                    &self.cache,
                    cache::deferred(&self.cache, info.sync, coverage.destination),
                );
            }
        }
    }

    /// Configure and start a single block transfer.
    ///
    /// Moves `items` source transfer units from `source` to `destination`.
    /// `items` can't exceed the maximum block size. If `interrupts` is
    /// `false`, the transfer and error interrupts stay masked; use
    /// [`poll`](Dma::poll) to advance the transfer.
    ///
    /// Scatter and gather aren't available for single blocks.
    ///
    /// # Safety
    ///
    /// The controller reads and writes the memory described by the
    /// addresses until the transfer ends. That memory must stay valid, and
    /// not be used by the CPU, until then.
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn configure_single_block(
        &self,
        channel: usize,
        source: u32,
        destination: u32,
        items: usize,
        control: Control,
        configuration: Configuration,
        interrupts: bool,
    ) -> Result<()> {
        check_index::<CHANNELS>(channel)?;
        self.check_block(items)?;
        self.check_widths(control)?;
        if control.is_gather() || control.is_scatter() {
            log::warn!("DMA single block can't scatter or gather");
            return Err(Error::InvalidScatterGather);
        }
        Self::check_reload(configuration)?;

        self.with(|shared| {
            self.prepare(shared, channel)?;
            let info = &mut shared.channels[channel];
            Self::set_control(info, control);
            info.remaining = items;
            self.setup(channel, info, configuration, None, None, interrupts);
            self.launch(channel, info, source, destination, items, 0);
            Ok(())
        })?;
        log::debug!("DMA channel {} single block of {} items", channel, items);
        Ok(())
    }

    /// Configure and start a transfer of any length.
    ///
    /// Moves `items` source transfer units from `source` to `destination`,
    /// splitting the transfer into blocks no larger than the maximum block
    /// size. Every block but the last ends on a whole transfer unit of both
    /// sides, and on a whole scatter or gather group when one fits.
    /// `gather` and `scatter` must describe valid patterns when the control
    /// word enables them.
    ///
    /// The transfer continues in the interrupt handler. Its transfer and
    /// error interrupts are unmasked.
    ///
    /// # Safety
    ///
    /// See [`configure_single_block`](Dma::configure_single_block).
    #[allow(clippy::too_many_arguments)]
    pub unsafe fn configure_chained(
        &self,
        channel: usize,
        source: u32,
        destination: u32,
        items: usize,
        control: Control,
        configuration: Configuration,
        gather: Option<ScatterGather>,
        scatter: Option<ScatterGather>,
    ) -> Result<()> {
        check_index::<CHANNELS>(channel)?;
        if items == 0 {
            log::warn!("DMA channel {} zero length transfer", channel);
            return Err(Error::ZeroLength);
        }
        self.check_widths(control)?;
        let gather = Self::check_pattern(control.is_gather(), gather)?;
        let scatter = Self::check_pattern(control.is_scatter(), scatter)?;
        Self::check_reload(configuration)?;

        let max = block_limit(self.config.max_block_size, control, gather, scatter)?;
        let hardware = self.config.chain == ChainStrategy::HardwareLinkedList
            && items > max
            && items <= max * (LLI_POOL_SIZE + 1);

        self.with(|shared| {
            self.prepare(shared, channel)?;
            let Shared { channels, pool, .. } = shared;
            let info = &mut channels[channel];
            Self::set_control(info, control);
            info.remaining = items;
            info.limit = max;
            self.setup(channel, info, configuration, gather, scatter, true);

            let head = items.min(max);
            if !hardware {
                self.launch(channel, info, source, destination, head, 0);
                return Ok(());
            }

            // Describe the blocks after the head block in the pool.
            let pool = &mut pool[channel];
            let first = Coverage::new(control, source, destination, head, gather, scatter);
            let mut next_source = first.next_source;
            let mut next_destination = first.next_destination;
            let mut remaining = items - head;
            let mut count = 0;
            while remaining > 0 {
                let units = remaining.min(max);
                let coverage =
                    Coverage::new(control, next_source, next_destination, units, gather, scatter);
                pool[count].set_block(
                    next_source,
                    next_destination,
                    units,
                    control.interrupts(true),
                );
                cache::before_block(
                    &self.cache,
                    info.sync,
                    coverage.source,
                    coverage.destination,
                    control.is_scatter(),
                );
                next_source = coverage.next_source;
                next_destination = coverage.next_destination;
                remaining -= units;
                count += 1;
            }
            let list = ItemList::new(&mut pool[..count], 0);
            for index in 0..count {
                let next = (index + 1 < count).then(|| list.address(index + 1));
                pool[index].chain(next);
            }
            self.clean_items(&pool[..count]);

            let link = list.address(0);
            info.chain = Chain::Hardware {
                list,
                bytes: items << control.source_shift(),
            };
            self.launch(channel, info, source, destination, head, link);
            Ok(())
        })?;
        log::debug!(
            "DMA channel {} chained transfer of {} items{}",
            channel,
            items,
            if hardware { " in hardware" } else { "" }
        );
        Ok(())
    }

    /// Configure and start a transfer described by linked list items.
    ///
    /// Each item is one block, and can't exceed the maximum block size.
    /// Every item must use the same link master. `gather` and `scatter` apply
    /// to every item that enables them.
    ///
    /// Under [`ChainStrategy::HardwareLinkedList`], the driver links the
    /// items together, and the controller walks them. Otherwise, the
    /// interrupt handler starts each item in turn.
    ///
    /// # Safety
    ///
    /// `items` must stay valid, and unmoved, until the transfer ends. See
    /// [`configure_single_block`](Dma::configure_single_block) for the
    /// memory that the items describe.
    pub unsafe fn configure_explicit_chain(
        &self,
        channel: usize,
        items: &mut [LinkListItem],
        configuration: Configuration,
        gather: Option<ScatterGather>,
        scatter: Option<ScatterGather>,
    ) -> Result<()> {
        check_index::<CHANNELS>(channel)?;
        let first = items.first().ok_or(Error::ZeroLength)?;
        let master = first.link_master();
        for item in items.iter() {
            self.check_block(item.items())?;
            self.check_widths(item.control())?;
            if item.link_master() != master {
                log::warn!("DMA linked list mixes link masters");
                return Err(Error::InvalidLinkList);
            }
        }
        let gather =
            Self::check_pattern(items.iter().any(|item| item.control().is_gather()), gather)?;
        let scatter =
            Self::check_pattern(items.iter().any(|item| item.control().is_scatter()), scatter)?;
        Self::check_reload(configuration)?;

        let hardware = self.config.chain == ChainStrategy::HardwareLinkedList;
        let count = items.len();

        self.with(|shared| {
            self.prepare(shared, channel)?;
            let info = &mut shared.channels[channel];
            let head = items[0].clone();
            Self::set_control(info, head.control());
            info.remaining = head.items();
            self.setup(channel, info, configuration, gather, scatter, true);

            if !hardware {
                info.chain = Chain::Software(ItemList::new(items, 1));
                self.launch(channel, info, head.source(), head.destination(), head.items(), 0);
                return Ok(());
            }

            let list = ItemList::new(items, 1);
            for index in 0..count {
                let next = (index + 1 < count).then(|| list.address(index + 1));
                let item = &mut items[index];
                let control = item.control().interrupts(true);
                item.set_block(item.source(), item.destination(), item.items(), control);
                item.chain(next);
            }
            for item in items[1..].iter() {
                let coverage = Coverage::new(
                    item.control(),
                    item.source(),
                    item.destination(),
                    item.items(),
                    gather,
                    scatter,
                );
                cache::before_block(
                    &self.cache,
                    info.sync,
                    coverage.source,
                    coverage.destination,
                    item.control().is_scatter(),
                );
            }
            self.clean_items(items);

            let link = items[0].link();
            info.chain = Chain::Hardware {
                list,
                bytes: items.iter().map(item_bytes).sum(),
            };
            self.launch(channel, info, head.source(), head.destination(), head.items(), link);
            Ok(())
        })?;
        log::debug!(
            "DMA channel {} linked list of {} items{}",
            channel,
            count,
            if hardware { " in hardware" } else { "" }
        );
        Ok(())
    }

    /// Copy `bytes` bytes from `source` to `destination`.
    ///
    /// Uses the widest transfer width that the addresses, the length, and the
    /// data bus allow. A zero length copy completes immediately: the
    /// channel's callback receives `Event::Complete(0)` before `memcpy`
    /// returns, and a selected channel is released.
    ///
    /// # Safety
    ///
    /// See [`configure_single_block`](Dma::configure_single_block).
    pub unsafe fn memcpy(
        &self,
        channel: usize,
        source: u32,
        destination: u32,
        bytes: usize,
    ) -> Result<()> {
        check_index::<CHANNELS>(channel)?;
        if bytes == 0 {
            let notification = self.with(|shared| {
                self.prepare(shared, channel)?;
                let info = &mut shared.channels[channel];
                info.state = State::Done { transferred: 0 };
                let notification = Notification::new(info, Event::Complete(0));
                shared.release(channel);
                Ok::<_, Error>(notification)
            })?;
            log::debug!("DMA channel {} zero length copy", channel);
            notification.notify();
            return Ok(());
        }

        let alignment = (source | destination | bytes as u32).trailing_zeros();
        let width = TransferWidth::from_shift(alignment.min(self.config.max_width.shift() as u32))
            .ok_or(Error::InvalidWidth)?;
        let control = Control::new()
            .source_width(width)
            .destination_width(width)
            .flow(FlowControl::MemoryToMemory);
        self.configure_chained(
            channel,
            source,
            destination,
            bytes >> width.shift(),
            control,
            Configuration::new(),
            None,
            None,
        )
    }

    /// Handle the end of the running block.
    ///
    /// Returns the notification to deliver once the shared state is
    /// released, if the transfer has ended.
    pub(crate) fn complete_block(
        &self,
        shared: &mut Shared<CHANNELS>,
        channel: usize,
    ) -> Option<Notification> {
        let info = &mut shared.channels[channel];
        if !info.is_running() {
            return None;
        }

        if let Chain::Hardware { bytes, .. } = info.chain {
            info.transferred = bytes;
            info.remaining = 0;
            self.settle(info);
        } else {
            cache::after_block(&self.cache, info.deferred.take());
            info.transferred += info.block << info.source_shift;
            info.remaining -= info.block;

            if info.remaining > 0 {
                let units = info.remaining.min(info.limit);
                let (source, destination) = (info.next_source, info.next_destination);
                self.launch(channel, info, source, destination, units, 0);
                return None;
            }

            let next = match &mut info.chain {
                Chain::Software(list) => list
                    .take_next()
                    // Safety: the list outlives the transfer.
                    .map(|index| (index, unsafe { list.get(index) }.clone())),
                _ => None,
            };
            if let Some((index, item)) = next {
                Self::set_control(info, item.control());
                info.item = index;
                info.remaining = item.items();
                self.launch(
                    channel,
                    info,
                    item.source(),
                    item.destination(),
                    item.items(),
                    0,
                );
                return None;
            }
        }

        let transferred = info.transferred;
        info.state = State::Done { transferred };
        info.chain = Chain::None;
        let notification = Notification::new(info, Event::Complete(transferred));
        shared.release(channel);
        log::trace!("DMA channel {} done, {} bytes", channel, transferred);
        Some(notification)
    }

    /// Handle a bus error on the channel.
    ///
    /// Stops the channel, and returns the notification to deliver once the
    /// shared state is released.
    pub(crate) fn fail(
        &self,
        shared: &mut Shared<CHANNELS>,
        channel: usize,
    ) -> Option<Notification> {
        let info = &mut shared.channels[channel];
        if !info.is_running() {
            return None;
        }

        let control = Control::from_bits(
            self.registers
                .read_channel(channel, ChannelRegister::CtlLo),
        );
        let done = self
            .registers
            .read_channel(channel, ChannelRegister::CtlHi)
            & CTL_HI::BLOCK_TS::mask;
        let partial = (done as usize) << control.source_shift();
        let before = match &info.chain {
            Chain::Hardware { list, .. } => {
                let link = self.registers.read_channel(channel, ChannelRegister::Llp);
                hardware_progress(info, list, link)
            }
            _ => 0,
        };
        let transferred = info.transferred + before + partial;

        for register in [
            ChannelRegister::CtlLo,
            ChannelRegister::CtlHi,
            ChannelRegister::CfgLo,
            ChannelRegister::CfgHi,
        ] {
            self.registers.write_channel(channel, register, 0);
        }
        self.registers
            .write_channel_enable(write_enable(channel, false));

        self.settle(info);
        info.state = State::Error { transferred };
        info.chain = Chain::None;
        let notification = Notification::new(info, Event::Error(transferred));
        shared.release(channel);
        log::warn!(
            "DMA channel {} error after {} bytes",
            channel,
            transferred
        );
        Some(notification)
    }
}

/// Bytes moved by hardware chained blocks before the running block.
///
/// The link register holds the address of the item after the running
/// block, or zero while the last block runs.
fn hardware_progress(info: &ChannelInfo, list: &ItemList, link: u32) -> usize {
    let first = list.cursor();
    let blocks = list.len() - first + 1;
    let link = link & LLP::LOC::mask;
    let running = if link == 0 {
        blocks - 1
    } else {
        (first..list.len())
            .find(|&index| list.address(index) & LLP::LOC::mask == link)
            .map_or(0, |index| index - first)
    };
    (0..running)
        .map(|block| {
            if block == 0 {
                info.block << info.source_shift
            } else {
                // Safety: the list outlives the transfer, and the index is
                // within the list.
                item_bytes(unsafe { list.get(first + block - 1) })
            }
        })
        .sum()
}
