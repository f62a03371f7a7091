//! Direct Memory Access (DMA) driver for DesignWare-style AHB DMA controllers
//!
//! `ahb-dmac` provides
//!
//! - channel allocation, with channels that are either selected for one
//!   transfer or reserved across transfers
//! - an unsafe API for configuring single block, chained, and linked list
//!   transfers of any length
//! - an interrupt driven engine that continues transfers that exceed the
//!   controller's block size, either by re-arming the channel in software or
//!   by handing the controller a hardware linked list
//! - data cache maintenance around every block
//! - safe DMA futures for memcpy, peripheral-to-memory, and memory-to-peripheral
//!   transfers
//!
//! This DMA driver may be re-exported from a BSP. If it is, you should consider
//! using the safer APIs provided by your BSP.
//!
//! # Example
//!
//! Copy a buffer with channel callbacks, and no futures.
//!
//! ```no_run
//! use ahb_dmac::{cache::{CacheSync, CortexM7}, Config, Dma, Event, Mmio};
//!
//! # const DMA_BASE: *const () = core::ptr::null();
//! /// Tightly coupled memory is never cached.
//! fn is_cacheable(address: usize, _: usize) -> bool {
//!     address >= 0x2800_0000
//! }
//!
//! static DMA: Dma<Mmio, CortexM7, 8> = Dma::new(
//!     unsafe { Mmio::new(DMA_BASE) },
//!     CortexM7::new(is_cacheable),
//!     Config::DEFAULT,
//! );
//!
//! fn on_copy(event: Event, _: usize) {
//!     if let Event::Error(transferred) = event {
//!         // Retry, or report, the copy.
//!         # let _ = transferred;
//!     }
//! }
//!
//! // #[cortex_m_rt::interrupt]
//! fn DMA_IRQ() {
//!     DMA.on_interrupt();
//! }
//!
//! DMA.init();
//! let channel = DMA.select(None, Some(on_copy), 0, CacheSync::Auto).unwrap();
//! // Safety: both ranges are owned by this code, and unused until the
//! // callback runs.
//! unsafe { DMA.memcpy(channel, 0x2800_0000, 0x2810_0000, 64 * 1024) }.unwrap();
//! ```
//!
//! ### License
//!
//! Licensed under either of
//!
//! - [Apache License, Version 2.0](http://www.apache.org/licenses/LICENSE-2.0) ([LICENSE-APACHE](./LICENSE-APACHE))
//! - [MIT License](http://opensource.org/licenses/MIT) ([LICENSE-MIT](./LICENSE-MIT))
//!
//! at your option.
//!
//! Unless you explicitly state otherwise, any contribution intentionally submitted
//! for inclusion in the work by you, as defined in the Apache-2.0 license, shall be
//! dual licensed as above, without any additional terms or conditions.

#![cfg_attr(not(test), no_std)]

pub mod cache;
mod channel;
mod descriptor;
mod dma;
mod element;
mod error;
mod interrupt;
pub mod memcpy;
pub mod peripheral;
mod ral;
mod registers;
mod transfer;

#[cfg(test)]
mod testing;

pub use channel::{
    AddressMode, BurstSize, Configuration, Control, FlowControl, Handshake, TransferWidth,
};
pub use descriptor::{span, LinkListItem, ScatterGather};
pub use dma::{
    Callback, ChainStrategy, Config, Dma, Event, State, LLI_POOL_SIZE, MAX_BLOCK_SIZE,
};
pub use element::Element;
pub use error::Error;
pub use interrupt::{ChannelEvent, Transfer};
pub use registers::{ChannelRegister, Interrupt, Mmio, Registers};

/// A DMA result
pub type Result<T> = core::result::Result<T, Error>;

use core::{future::Future, pin::Pin, task::Poll};

/// Poll a future with a dummy waker.
///
/// Use `poll_no_wake` when you want to drive a future to completion, but you
/// don't care about the future waking an executor. It may be used to initiate
/// a DMA transfer that will later be awaited with [`block`].
///
/// Do not use `poll_no_wake` if you want an executor to be woken when the DMA
/// transfer completes.
pub fn poll_no_wake<F>(future: Pin<&mut F>) -> Poll<F::Output>
where
    F: Future,
{
    use core::task::{Context, RawWaker, RawWakerVTable, Waker};
    const VTABLE: RawWakerVTable = RawWakerVTable::new(|_| RAW_WAKER, |_| {}, |_| {}, |_| {});

    const RAW_WAKER: RawWaker = RawWaker::new(core::ptr::null(), &VTABLE);
    // Safety: raw waker meets documented requirements.
    let waker = unsafe { Waker::from_raw(RAW_WAKER) };
    let mut context = Context::from_waker(&waker);
    future.poll(&mut context)
}

/// Block until the future returns a result.
///
/// `block` invokes [`poll_no_wake`] in a loop until the future
/// returns a result. Consider using `block` after starting a transfer
/// with `poll_no_wake`, and after doing other work.
pub fn block<F>(mut future: Pin<&mut F>) -> F::Output
where
    F: Future,
{
    loop {
        match poll_no_wake(future.as_mut()) {
            Poll::Ready(result) => return result,
            Poll::Pending => {}
        }
    }
}
