//! DMA-powered memcpy

use crate::{cache::Cache, interrupt::Transfer, registers::Registers, Dma, Element, Result};

use core::{
    future::Future,
    marker::PhantomData,
    pin::Pin,
    task::{Context, Poll},
};

/// A memcpy operation
///
/// The future starts the copy when it's first polled, and yields when the
/// copy is complete.
pub struct Memcpy<'a, R: Registers, C: Cache, const CHANNELS: usize> {
    transfer: Transfer<'a, R, C, CHANNELS>,
    dma: &'a Dma<R, C, CHANNELS>,
    start: Option<(u32, u32, usize)>,
    _buffers: PhantomData<&'a mut [u8]>,
}

/// Perform a DMA-powered `memcpy` between the `source` and `destination` buffers
///
/// Copies the minimum number of elements between the two buffers. The
/// channel must already be selected or reserved. The future resolves to the
/// number of bytes copied.
///
/// You're responsible for unmasking the DMA interrupt, and calling
/// [`on_interrupt`](crate::Dma::on_interrupt) when it fires. Otherwise, the
/// future never completes.
pub fn memcpy<'a, E: Element, R: Registers, C: Cache, const CHANNELS: usize>(
    dma: &'a Dma<R, C, CHANNELS>,
    channel: usize,
    source: &'a [E],
    destination: &'a mut [E],
) -> Memcpy<'a, R, C, CHANNELS> {
    let bytes = core::mem::size_of::<E>().saturating_mul(source.len().min(destination.len()));
    Memcpy {
        transfer: dma.transfer(channel),
        dma,
        start: Some((
            source.as_ptr() as usize as u32,
            destination.as_mut_ptr() as usize as u32,
            bytes,
        )),
        _buffers: PhantomData,
    }
}

impl<R: Registers, C: Cache, const CHANNELS: usize> Future for Memcpy<'_, R, C, CHANNELS> {
    type Output = Result<usize>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some((source, destination, bytes)) = this.start.take() {
            // Safety: the future borrows both buffers until it's dropped.
            // Dropping the transfer disables the channel.
            unsafe {
                this.dma
                    .memcpy(this.transfer.channel(), source, destination, bytes)
            }?;
        }
        Pin::new(&mut this.transfer).poll(cx)
    }
}

// Drop handled by Transfer impl

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{cache::CacheSync, poll_no_wake, testing, Config, Error};

    #[test]
    fn copies_shorter_buffer() {
        let dma = testing::dma(Config::DEFAULT);
        dma.init();
        let channel = dma.select(None, None, 0, CacheSync::None).unwrap();
        let source = [1u32, 2, 3, 4, 5];
        let mut destination = [0u32; 3];

        let mut copy = memcpy(&dma, channel, &source, &mut destination);
        assert!(dma.registers().started().is_empty());
        assert!(poll_no_wake(Pin::new(&mut copy)).is_pending());

        let started = dma.registers().started();
        assert_eq!(started.len(), 1);
        assert_eq!(started[0].items, 3);
        assert_eq!(started[0].source, source.as_ptr() as usize as u32);

        testing::run_to_completion(&dma, channel);
        assert_eq!(poll_no_wake(Pin::new(&mut copy)), Poll::Ready(Ok(12)));
    }

    #[test]
    fn empty_copy_is_ready() {
        let dma = testing::dma(Config::DEFAULT);
        dma.init();
        let channel = dma.select(None, None, 0, CacheSync::None).unwrap();
        let source: [u8; 0] = [];
        let mut destination = [0u8; 4];
        let mut copy = memcpy(&dma, channel, &source, &mut destination);
        assert_eq!(poll_no_wake(Pin::new(&mut copy)), Poll::Ready(Ok(0)));
    }

    #[test]
    fn unselected_channel() {
        let dma = testing::dma(Config::DEFAULT);
        dma.init();
        let source = [0u8; 4];
        let mut destination = [0u8; 4];
        let mut copy = memcpy(&dma, 3, &source, &mut destination);
        assert_eq!(
            poll_no_wake(Pin::new(&mut copy)),
            Poll::Ready(Err(Error::NotAllocated))
        );
    }
}
