//! DMA interrupt support

use crate::{
    cache::Cache,
    dma::{check_index, Dma, State},
    registers::{Interrupt, Registers},
    Error, Result,
};
use core::{
    future::Future,
    pin::Pin,
    task::{Context, Poll},
};

/// A channel event reported by the controller
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelEvent {
    /// The channel finished the blocks it was programmed with
    TransferComplete,
    /// The channel stopped on a bus error
    Error,
}

impl<R: Registers, C: Cache, const CHANNELS: usize> Dma<R, C, CHANNELS> {
    /// Handle a DMA interrupt
    ///
    /// Checks the error and transfer status of every channel, highest channel
    /// first. An error takes precedence over a completion on the same
    /// channel. For each event, `on_interrupt` advances the channel's
    /// transfer, which might start the channel's next block. Once a transfer
    /// ends, `on_interrupt` invokes the channel's callback, and wakes any
    /// waiting [`Transfer`] future.
    ///
    /// Consider calling `on_interrupt` in the DMA interrupt handler:
    ///
    /// ```no_run
    /// use ahb_dmac::{cache::NoCache, Config, Dma, Mmio};
    /// # const DMA_BASE: *const () = core::ptr::null();
    /// static DMA: Dma<Mmio, NoCache, 8> =
    ///     Dma::new(unsafe { Mmio::new(DMA_BASE) }, NoCache, Config::DEFAULT);
    ///
    /// // #[cortex_m_rt::interrupt]
    /// fn DMA_IRQ() {
    ///     DMA.on_interrupt();
    /// }
    /// ```
    pub fn on_interrupt(&self) {
        let errors = self.registers.status(Interrupt::Error);
        let complete = self.registers.status(Interrupt::Transfer);
        for channel in (0..CHANNELS).rev() {
            let bit = 1 << channel;
            if errors & bit != 0 {
                self.handle_event(channel, ChannelEvent::Error);
            } else if complete & bit != 0 {
                self.handle_event(channel, ChannelEvent::TransferComplete);
            }
        }
    }

    /// Advance the channel's transfer for `event`.
    ///
    /// [`on_interrupt`](Dma::on_interrupt) calls `handle_event` for every
    /// pending event. You may call it directly if you decode the interrupt
    /// status yourself. An event for a channel that isn't running a transfer
    /// only clears the channel's interrupt flags.
    pub fn handle_event(&self, channel: usize, event: ChannelEvent) {
        if channel >= CHANNELS {
            return;
        }
        log::trace!("DMA channel {} {:?}", channel, event);
        let notification = self.with(|shared| {
            match event {
                ChannelEvent::Error => {
                    self.clear_interrupts(channel);
                    self.fail(shared, channel)
                }
                ChannelEvent::TransferComplete => {
                    self.registers.clear(Interrupt::Transfer, 1 << channel);
                    self.registers.clear(Interrupt::Block, 1 << channel);
                    self.complete_block(shared, channel)
                }
            }
        });
        if let Some(notification) = notification {
            notification.notify();
        }
    }

    /// Advance the channel's transfer without interrupts.
    ///
    /// Checks the channel's raw error and transfer status, and handles any
    /// event like [`on_interrupt`](Dma::on_interrupt). Returns the channel's
    /// state after handling the event.
    pub fn poll(&self, channel: usize) -> Result<State> {
        check_index::<CHANNELS>(channel)?;
        let bit = 1 << channel;
        if self.registers.raw(Interrupt::Error) & bit != 0 {
            self.handle_event(channel, ChannelEvent::Error);
        } else if self.registers.raw(Interrupt::Transfer) & bit != 0 {
            self.handle_event(channel, ChannelEvent::TransferComplete);
        }
        self.state(channel)
    }

    /// Wait for the channel's transfer to end.
    ///
    /// The returned [`Transfer`] takes ownership of the channel's running
    /// transfer: dropping it early disables the channel, even if the
    /// transfer was started elsewhere. Don't create a `Transfer` for a
    /// transfer that's driven only by its callback.
    pub fn transfer(&self, channel: usize) -> Transfer<'_, R, C, CHANNELS> {
        Transfer { dma: self, channel }
    }
}

/// The root DMA transfer future
///
/// `Transfer` resolves once the channel's transfer ends, with the number of
/// bytes transferred. It's woken by [`on_interrupt`](Dma::on_interrupt).
/// If the controller reports an error, the future resolves to
/// [`Error::Transfer`]. If the transfer is disabled before it ends, the
/// future resolves to [`Error::Cancelled`].
///
/// A `Transfer` owns whatever transfer is running on its channel. Dropping
/// a `Transfer` before it resolves disables the channel, and cancels that
/// transfer; the channel's callback doesn't run.
pub struct Transfer<'a, R: Registers, C: Cache, const CHANNELS: usize> {
    dma: &'a Dma<R, C, CHANNELS>,
    channel: usize,
}

impl<R: Registers, C: Cache, const CHANNELS: usize> Transfer<'_, R, C, CHANNELS> {
    /// Returns the channel running the transfer.
    pub fn channel(&self) -> usize {
        self.channel
    }
}

impl<R: Registers, C: Cache, const CHANNELS: usize> Future for Transfer<'_, R, C, CHANNELS> {
    type Output = Result<usize>;
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        check_index::<CHANNELS>(self.channel)?;
        self.dma.with(|shared| {
            let info = &mut shared.channels[self.channel];
            match info.state {
                State::Done { transferred } => Poll::Ready(Ok(transferred)),
                State::Error { transferred } => Poll::Ready(Err(Error::Transfer { transferred })),
                State::Idle => Poll::Ready(Err(Error::Cancelled)),
                State::Running { .. } => {
                    info.waker = Some(cx.waker().clone());
                    Poll::Pending
                }
            }
        })
    }
}

impl<R: Registers, C: Cache, const CHANNELS: usize> Drop for Transfer<'_, R, C, CHANNELS> {
    fn drop(&mut self) {
        let running = self.dma.with(|shared| {
            shared
                .channels
                .get_mut(self.channel)
                .is_some_and(|info| {
                    info.waker = None;
                    info.is_running()
                })
        });
        if running {
            // Only fails for an invalid channel, which can't be running.
            let _ = self.dma.disable(self.channel, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        cache::CacheSync,
        channel::{Configuration, Control, TransferWidth},
        dma::{Config, Event},
        poll_no_wake,
        testing,
    };

    #[test]
    fn highest_channel_first() {
        let dma = testing::dma(Config::DEFAULT);
        dma.init();
        for user in 0..3 {
            let channel = dma
                .select(None, Some(testing::record), user, CacheSync::None)
                .unwrap();
            assert_eq!(channel, user);
            unsafe { dma.memcpy(channel, 0x100, 0x200, 4) }.unwrap();
        }
        for channel in 0..3 {
            dma.registers().finish(channel);
        }
        dma.on_interrupt();
        let users: Vec<_> = testing::events().into_iter().map(|(_, user)| user).collect();
        assert_eq!(users, [2, 1, 0]);
    }

    #[test]
    fn error_takes_precedence() {
        let dma = testing::dma(Config::DEFAULT);
        dma.init();
        let channel = dma.select(None, Some(testing::record), 0, CacheSync::None).unwrap();
        unsafe { dma.memcpy(channel, 0x100, 0x200, 16) }.unwrap();
        dma.registers().finish(channel);
        dma.registers().fail(channel, 2);
        dma.on_interrupt();
        assert_eq!(testing::events(), [(Event::Error(8), 0)]);
        for interrupt in Interrupt::ALL {
            assert_eq!(dma.registers().raw(interrupt) & 1 << channel, 0);
        }
    }

    #[test]
    fn spurious_events_only_clear_flags() {
        let dma = testing::dma(Config::DEFAULT);
        dma.init();
        let channel = dma.select(None, Some(testing::record), 0, CacheSync::None).unwrap();
        dma.handle_event(channel, ChannelEvent::TransferComplete);
        dma.handle_event(channel, ChannelEvent::Error);
        dma.handle_event(99, ChannelEvent::Error);
        assert!(testing::events().is_empty());
        assert_eq!(dma.state(channel), Ok(State::Idle));
        assert!(dma.is_active(channel));
    }

    #[test]
    fn polling_mode() {
        let dma = testing::dma(Config::DEFAULT);
        dma.init();
        let channel = dma.select(None, None, 0, CacheSync::None).unwrap();
        let control = Control::new()
            .source_width(TransferWidth::Bits16)
            .destination_width(TransferWidth::Bits16);
        unsafe {
            dma.configure_single_block(
                channel,
                0x100,
                0x200,
                10,
                control,
                Configuration::new(),
                false,
            )
        }
        .unwrap();

        // Masked interrupts never reach the handler.
        dma.registers().finish(channel);
        dma.on_interrupt();
        assert!(matches!(dma.state(channel), Ok(State::Running { .. })));

        assert_eq!(dma.poll(channel), Ok(State::Done { transferred: 20 }));
        assert_eq!(dma.poll(8), Err(Error::InvalidChannel));
    }

    #[test]
    fn transfer_future() {
        let dma = testing::dma(Config::DEFAULT);
        dma.init();
        let channel = dma.select(None, None, 0, CacheSync::None).unwrap();
        unsafe { dma.memcpy(channel, 0x100, 0x200, 8000 * 4) }.unwrap();

        let mut transfer = dma.transfer(channel);
        let mut transfer = Pin::new(&mut transfer);
        assert!(poll_no_wake(transfer.as_mut()).is_pending());
        testing::run_to_completion(&dma, channel);
        assert_eq!(poll_no_wake(transfer.as_mut()), Poll::Ready(Ok(32000)));
    }

    #[test]
    fn transfer_future_error() {
        let dma = testing::dma(Config::DEFAULT);
        dma.init();
        let channel = dma.select(None, None, 0, CacheSync::None).unwrap();
        unsafe { dma.memcpy(channel, 0x100, 0x200, 64) }.unwrap();

        let mut transfer = dma.transfer(channel);
        dma.registers().fail(channel, 5);
        dma.on_interrupt();
        assert_eq!(
            poll_no_wake(Pin::new(&mut transfer)),
            Poll::Ready(Err(Error::Transfer { transferred: 20 }))
        );
    }

    #[test]
    fn dropping_transfer_disables_channel() {
        let dma = testing::dma(Config::DEFAULT);
        dma.init();
        let channel = dma.select(None, None, 0, CacheSync::None).unwrap();
        unsafe { dma.memcpy(channel, 0x100, 0x200, 64) }.unwrap();
        assert!(dma.is_enabled(channel));

        let mut transfer = dma.transfer(channel);
        assert!(poll_no_wake(Pin::new(&mut transfer)).is_pending());
        drop(transfer);

        assert!(!dma.is_enabled(channel));
        assert_eq!(dma.state(channel), Ok(State::Idle));
        assert!(!dma.is_active(channel));
    }

    #[test]
    fn dropped_transfer_owns_callback_transfer() {
        let dma = testing::dma(Config::DEFAULT);
        dma.init();
        let channel = dma
            .reserve(None, Some(testing::record), 5, CacheSync::None)
            .unwrap();
        unsafe { dma.memcpy(channel, 0x100, 0x200, 64) }.unwrap();

        drop(dma.transfer(channel));
        assert!(!dma.is_enabled(channel));
        assert_eq!(dma.state(channel), Ok(State::Idle));
        assert!(testing::events().is_empty());
        assert!(dma.is_reserved(channel));
    }

    #[test]
    fn disable_cancels_future() {
        let dma = testing::dma(Config::DEFAULT);
        dma.init();
        let channel = dma.select(None, None, 0, CacheSync::None).unwrap();
        unsafe { dma.memcpy(channel, 0x100, 0x200, 64) }.unwrap();
        let mut transfer = dma.transfer(channel);
        dma.disable(channel, true).unwrap();
        assert_eq!(
            poll_no_wake(Pin::new(&mut transfer)),
            Poll::Ready(Err(Error::Cancelled))
        );
    }
}
