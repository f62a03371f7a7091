//! DMA support for hardware peripherals.
//!
//! If a driver is compatible with this API, it implements some or all of
//! the traits in this module. Consult your HAL for more information.
//!
//! Each future documents when it resolves. To wake the executor, you can
//! route the DMA interrupt handler to [`on_interrupt()`](crate::Dma::on_interrupt).
//! Otherwise, you can poll the future in a loop.

use crate::{
    cache::Cache,
    channel::{AddressMode, Configuration, Control, FlowControl, Handshake},
    interrupt::Transfer,
    registers::Registers,
    Dma, Element, Result,
};

use core::{
    future::Future,
    marker::PhantomData,
    pin::Pin,
    task::{Context, Poll},
};

/// A peripheral that can be the source of DMA data
///
/// By 'source,' we mean that it provides data for a DMA transfer.
/// A source would be a hardware device writing data into memory,
/// like a UART receiver.
///
/// # Safety
///
/// `Source` should only be implemented on peripherals that are
/// DMA capable. This trait should be implemented by HAL authors
/// who are exposing DMA capable peripherals.
pub unsafe trait Source<E: Element> {
    /// The hardware handshake interface that signals source requests
    fn source_signal(&self) -> u8;
    /// Returns a pointer to the register from which the DMA channel
    /// reads data
    ///
    /// This is the register that software reads to acquire data from
    /// a device. The type of the pointer describes the type of reads
    /// the DMA channel performs when transferring data.
    ///
    /// This memory is assumed to be static. Repeated `source` calls
    /// should always return the same address.
    fn source_address(&self) -> *const E;
    /// Perform any actions necessary to enable DMA transfers
    ///
    /// Callers use this method to put the peripheral in a state where
    /// it can supply the DMA channel with data.
    fn enable_source(&mut self);
    /// Perform any actions necessary to disable or cancel DMA transfers
    ///
    /// This may include undoing the actions in `enable_source`.
    fn disable_source(&mut self);
}

/// A peripheral that can be the destination for DMA data
///
/// By 'destination,' we mean that it receives data from a DMA transfer.
/// A destination would be a peripheral that could send data out of
/// processor memory, like a UART transmitter.
///
/// # Safety
///
/// `Destination` should only be implemented on peripherals that are
/// DMA capable. This trait should be implemented by HAL authors
/// who are exposing DMA capable peripherals.
pub unsafe trait Destination<E: Element> {
    /// The hardware handshake interface that signals destination requests
    fn destination_signal(&self) -> u8;
    /// Returns a pointer to the register into which the DMA channel
    /// writes data
    ///
    /// This is the register that software writes to when sending data to a
    /// device. The type of the pointer describes the type of writes the
    /// DMA channel performs when transferring data.
    fn destination_address(&self) -> *const E;
    /// Perform any actions necessary to enable DMA transfers
    ///
    /// Callers use this method to put the peripheral into a state where
    /// it can accept transfers from a DMA channel.
    fn enable_destination(&mut self);
    /// Perform any actions necessary to disable or cancel DMA transfers
    ///
    /// This may include undoing the actions in `enable_destination`.
    fn disable_destination(&mut self);
}

/// The memory address and element count of a buffer.
fn buffer<E>(buffer: &[E]) -> (u32, usize) {
    (buffer.as_ptr() as usize as u32, buffer.len())
}

/// A DMA transfer that receives data from hardware
///
/// The future resolves when the peripheral has provided all
/// expected data. Use [`read()`](crate::peripheral::read) to construct
/// this future.
pub struct Read<'a, S, E, R, C, const CHANNELS: usize>
where
    S: Source<E>,
    E: Element,
    R: Registers,
    C: Cache,
{
    dma: &'a Dma<R, C, CHANNELS>,
    source: &'a mut S,
    transfer: Transfer<'a, R, C, CHANNELS>,
    start: Option<(u32, usize)>,
    _elem: PhantomData<&'a mut [E]>,
}

impl<S, E, R, C, const CHANNELS: usize> Future for Read<'_, S, E, R, C, CHANNELS>
where
    S: Source<E>,
    E: Element,
    R: Registers,
    C: Cache,
{
    type Output = Result<usize>;
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some((address, len)) = this.start.take() {
            let control = Control::new()
                .source_width(E::WIDTH)
                .destination_width(E::WIDTH)
                .source_address(AddressMode::Fixed)
                .destination_address(AddressMode::Increment)
                .flow(FlowControl::PeripheralToMemory);
            let configuration = Configuration::new()
                .source_handshake(Handshake::Hardware(this.source.source_signal()));
            // Safety: hardware source address must be valid, otherwise impl is unsound.
            // Destination buffer lifetime captured by future.
            unsafe {
                this.dma.configure_chained(
                    this.transfer.channel(),
                    this.source.source_address() as usize as u32,
                    address,
                    len,
                    control,
                    configuration,
                    None,
                    None,
                )
            }?;
            this.source.enable_source();
        }
        Pin::new(&mut this.transfer).poll(cx)
    }
}

impl<S, E, R, C, const CHANNELS: usize> Drop for Read<'_, S, E, R, C, CHANNELS>
where
    S: Source<E>,
    E: Element,
    R: Registers,
    C: Cache,
{
    fn drop(&mut self) {
        self.source.disable_source();
        // Drop `transfer` to finish cancellation...
    }
}

/// Use a DMA channel to receive a `buffer` of elements from the source peripheral.
///
/// The channel must already be selected or reserved. The transfer starts
/// when the future is first polled, and resolves to the number of bytes
/// received.
///
/// Consider using a DMA interrupt handler that calls [`on_interrupt()`](crate::Dma::on_interrupt)
/// to wake the executor when the transfer completes. Otherwise, poll the future.
///
/// # Example
///
/// Receive 32 bytes from a UART peripheral. Wake the executor when the transfer completes.
///
/// ```no_run
/// use ahb_dmac::{cache::{CacheSync, NoCache}, peripheral, Config, Dma, Mmio};
/// # const DMA_BASE: *const () = core::ptr::null();
/// static DMA: Dma<Mmio, NoCache, 8> =
///     Dma::new(unsafe { Mmio::new(DMA_BASE) }, NoCache, Config::DEFAULT);
/// # struct X;
/// # unsafe impl peripheral::Source<u8> for X {
/// #   fn source_signal(&self) -> u8 { 0 }
/// #   fn source_address(&self) -> *const u8 { panic!() }
/// #   fn enable_source(&mut self) { panic!() }
/// #   fn disable_source(&mut self) { panic!() }
/// # }
///
/// // #[cortex_m_rt::interrupt]
/// fn DMA_IRQ() {
///     DMA.on_interrupt();
/// }
///
/// # async fn f() -> ahb_dmac::Result<()> {
/// let mut uart = // A UART peripheral
///     # X;
/// let channel = DMA.select(None, None, 0, CacheSync::Destination).unwrap();
/// // Unmask the DMA interrupt in the NVIC before awaiting the transfer.
///
/// let mut buffer = [0u8; 32];
///
/// peripheral::read(&DMA, channel, &mut uart, &mut buffer).await?;
/// # Ok(()) }
/// ```
pub fn read<'a, S, E, R, C, const CHANNELS: usize>(
    dma: &'a Dma<R, C, CHANNELS>,
    channel: usize,
    source: &'a mut S,
    buffer: &'a mut [E],
) -> Read<'a, S, E, R, C, CHANNELS>
where
    S: Source<E>,
    E: Element,
    R: Registers,
    C: Cache,
{
    Read {
        dma,
        source,
        transfer: dma.transfer(channel),
        start: Some(self::buffer(buffer)),
        _elem: PhantomData,
    }
}

/// A DMA transfer that sends data to hardware
///
/// The future resolves when the device has sent all provided data.
/// Use [`write()`](crate::peripheral::write) to construct this future.
pub struct Write<'a, D, E, R, C, const CHANNELS: usize>
where
    D: Destination<E>,
    E: Element,
    R: Registers,
    C: Cache,
{
    dma: &'a Dma<R, C, CHANNELS>,
    destination: &'a mut D,
    transfer: Transfer<'a, R, C, CHANNELS>,
    start: Option<(u32, usize)>,
    _elem: PhantomData<&'a [E]>,
}

impl<D, E, R, C, const CHANNELS: usize> Future for Write<'_, D, E, R, C, CHANNELS>
where
    D: Destination<E>,
    E: Element,
    R: Registers,
    C: Cache,
{
    type Output = Result<usize>;
    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some((address, len)) = this.start.take() {
            let control = Control::new()
                .source_width(E::WIDTH)
                .destination_width(E::WIDTH)
                .source_address(AddressMode::Increment)
                .destination_address(AddressMode::Fixed)
                .flow(FlowControl::MemoryToPeripheral);
            let configuration = Configuration::new()
                .destination_handshake(Handshake::Hardware(this.destination.destination_signal()));
            // Safety: hardware address must be valid, otherwise impl is unsound.
            // Source buffer lifetime captured by future.
            unsafe {
                this.dma.configure_chained(
                    this.transfer.channel(),
                    address,
                    this.destination.destination_address() as usize as u32,
                    len,
                    control,
                    configuration,
                    None,
                    None,
                )
            }?;
            this.destination.enable_destination();
        }
        Pin::new(&mut this.transfer).poll(cx)
    }
}

impl<D, E, R, C, const CHANNELS: usize> Drop for Write<'_, D, E, R, C, CHANNELS>
where
    D: Destination<E>,
    E: Element,
    R: Registers,
    C: Cache,
{
    fn drop(&mut self) {
        self.destination.disable_destination();
        // Drop `transfer` to finish cancellation...
    }
}

/// Use a DMA channel to send a `buffer` of data to the destination peripheral.
///
/// The channel must already be selected or reserved. The transfer starts
/// when the future is first polled, and resolves to the number of bytes
/// sent.
///
/// Consider using a DMA interrupt handler that calls [`on_interrupt()`](crate::Dma::on_interrupt)
/// to wake the executor when the transfer completes. Otherwise, poll the future.
///
/// # Example
///
/// Send five bytes to a UART device. Wake the executor when the transfer completes.
///
/// ```no_run
/// use ahb_dmac::{cache::{CacheSync, NoCache}, peripheral, Config, Dma, Mmio};
/// # const DMA_BASE: *const () = core::ptr::null();
/// static DMA: Dma<Mmio, NoCache, 8> =
///     Dma::new(unsafe { Mmio::new(DMA_BASE) }, NoCache, Config::DEFAULT);
/// # struct X;
/// # unsafe impl peripheral::Destination<u8> for X {
/// #   fn destination_signal(&self) -> u8 { 0 }
/// #   fn destination_address(&self) -> *const u8 { panic!() }
/// #   fn enable_destination(&mut self) { panic!() }
/// #   fn disable_destination(&mut self) { panic!() }
/// # }
///
/// # async fn f() -> ahb_dmac::Result<()> {
/// let mut uart = // A UART peripheral
///     # X;
/// let channel = DMA.select(None, None, 0, CacheSync::Source).unwrap();
///
/// let buffer = [4u8, 5, 6, 7, 8];
///
/// peripheral::write(&DMA, channel, &buffer, &mut uart).await?;
/// # Ok(()) }
/// ```
pub fn write<'a, D, E, R, C, const CHANNELS: usize>(
    dma: &'a Dma<R, C, CHANNELS>,
    channel: usize,
    buffer: &'a [E],
    destination: &'a mut D,
) -> Write<'a, D, E, R, C, CHANNELS>
where
    D: Destination<E>,
    E: Element,
    R: Registers,
    C: Cache,
{
    Write {
        dma,
        destination,
        transfer: dma.transfer(channel),
        start: Some(self::buffer(buffer)),
        _elem: PhantomData,
    }
}
