//! Data cache maintenance around DMA blocks
//!
//! Before a block starts, the driver cleans the source range, so the
//! controller reads what the CPU wrote, and invalidates the destination
//! range, so the CPU doesn't later read stale lines over what the controller
//! wrote.
//!
//! An invalidate can only act on whole cache lines. When the destination
//! doesn't start and end on a line boundary, or when it's scattered, the
//! driver flushes it before the block instead. If it's misaligned, the
//! driver invalidates it again once the block has completed. Invalidating a
//! misaligned range before completion could discard data that the CPU wrote
//! to the shared lines.

use crate::channel::AddressMode;

/// Data cache maintenance operations
///
/// Addresses are the addresses programmed into the DMA controller. The
/// implementation decides if, and how, they map to cache lines.
pub trait Cache {
    /// The cache line size, in bytes.
    fn line_size(&self) -> usize;
    /// Indicates if any part of `[address, address + len)` may be cached.
    fn is_cacheable(&self, address: usize, len: usize) -> bool;
    /// Write back dirty lines covering the range.
    fn clean(&self, address: usize, len: usize);
    /// Write back, then invalidate, the lines covering the range.
    fn flush(&self, address: usize, len: usize);
    /// Invalidate the lines covering the range without writing them back.
    fn invalidate(&self, address: usize, len: usize);
}

/// Which sides of a transfer need cache maintenance
///
/// A side is only maintained if [`Cache::is_cacheable`] reports its range
/// as cacheable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheSync {
    /// No maintenance. Use for non-cacheable buffers.
    #[default]
    None,
    /// Clean the source
    Source,
    /// Invalidate the destination
    Destination,
    /// Clean the source and invalidate the destination
    Both,
    /// Maintain both sides, like [`Both`](CacheSync::Both)
    Auto,
}

impl CacheSync {
    fn source<C: Cache>(self, cache: &C, span: Span) -> bool {
        match self {
            CacheSync::Source | CacheSync::Both | CacheSync::Auto => {
                cache.is_cacheable(span.address, span.len)
            }
            CacheSync::None | CacheSync::Destination => false,
        }
    }
    fn destination<C: Cache>(self, cache: &C, span: Span) -> bool {
        match self {
            CacheSync::Destination | CacheSync::Both | CacheSync::Auto => {
                cache.is_cacheable(span.address, span.len)
            }
            CacheSync::None | CacheSync::Source => false,
        }
    }
}

/// A byte range touched by one side of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Span {
    pub(crate) address: usize,
    pub(crate) len: usize,
}

impl Span {
    /// The range covered by a side that starts at `first` and, once done,
    /// would continue at `next`.
    ///
    /// A decrementing side covers down from the last byte of its first
    /// unit. A fixed side isn't memory, so it has no range.
    pub(crate) fn covering(first: u32, next: u32, mode: AddressMode, shift: u8) -> Option<Self> {
        let width = 1u32 << shift;
        let (address, len) = match mode {
            AddressMode::Fixed => return None,
            AddressMode::Increment => (first, next.wrapping_sub(first)),
            AddressMode::Decrement => (next.wrapping_add(width), first.wrapping_sub(next)),
        };
        (len != 0).then_some(Span {
            address: address as usize,
            len: len as usize,
        })
    }
}

/// Maintain the cache before a block starts.
///
/// Returns the destination range that must be invalidated after the block
/// completes, if any.
pub(crate) fn before_block<C: Cache>(
    cache: &C,
    sync: CacheSync,
    source: Option<Span>,
    destination: Option<Span>,
    scattered: bool,
) -> Option<Span> {
    if let Some(source) = source.filter(|&span| sync.source(cache, span)) {
        cache.clean(source.address, source.len);
    }

    let destination = destination.filter(|&span| sync.destination(cache, span))?;
    let aligned = is_aligned(cache, destination);
    if aligned && !scattered {
        cache.invalidate(destination.address, destination.len);
        None
    } else {
        cache.flush(destination.address, destination.len);
        (!aligned).then_some(destination)
    }
}

/// The destination range that [`before_block`] defers, computed again
/// without touching the cache.
pub(crate) fn deferred<C: Cache>(
    cache: &C,
    sync: CacheSync,
    destination: Option<Span>,
) -> Option<Span> {
    destination
        .filter(|&span| sync.destination(cache, span))
        .filter(|&span| !is_aligned(cache, span))
}

fn is_aligned<C: Cache>(cache: &C, span: Span) -> bool {
    let line = cache.line_size();
    span.address % line == 0 && span.len % line == 0
}

/// Run the invalidate deferred by [`before_block`].
pub(crate) fn after_block<C: Cache>(cache: &C, deferred: Option<Span>) {
    if let Some(span) = deferred {
        cache.invalidate(span.address, span.len);
    }
}

/// No data cache, or DMA buffers that are never cached
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCache;

impl Cache for NoCache {
    fn line_size(&self) -> usize {
        1
    }
    fn is_cacheable(&self, _: usize, _: usize) -> bool {
        false
    }
    fn clean(&self, _: usize, _: usize) {}
    fn flush(&self, _: usize, _: usize) {}
    fn invalidate(&self, _: usize, _: usize) {}
}

/// The Cortex-M7 L1 data cache
///
/// Maintenance is by address, to the point of coherency, through the cache
/// maintenance registers. `is_cacheable` describes your memory map; for
/// example, TCM is never cached.
#[derive(Clone, Copy)]
pub struct CortexM7 {
    is_cacheable: fn(usize, usize) -> bool,
}

impl CortexM7 {
    /// The L1 data cache line size.
    pub const LINE_SIZE: usize = 32;

    /// Create the cache maintenance handle.
    ///
    /// `is_cacheable` is called with a DMA address and length. It returns
    /// `true` if any part of that range may be held in the data cache.
    pub const fn new(is_cacheable: fn(usize, usize) -> bool) -> Self {
        CortexM7 { is_cacheable }
    }

    fn for_each_line(address: usize, len: usize, mut op: impl FnMut(u32)) {
        let start = address & !(Self::LINE_SIZE - 1);
        let end = address.saturating_add(len);
        let mut line = start;
        while line < end {
            op(line as u32);
            line += Self::LINE_SIZE;
        }
        cortex_m::asm::dsb();
        cortex_m::asm::isb();
    }
}

impl Cache for CortexM7 {
    fn line_size(&self) -> usize {
        Self::LINE_SIZE
    }
    fn is_cacheable(&self, address: usize, len: usize) -> bool {
        (self.is_cacheable)(address, len)
    }
    fn clean(&self, address: usize, len: usize) {
        // Safety: write-only maintenance register at a fixed address.
        let cbp = unsafe { &*cortex_m::peripheral::CBP::PTR };
        Self::for_each_line(address, len, |line| unsafe { cbp.dccmvac.write(line) });
    }
    fn flush(&self, address: usize, len: usize) {
        // Safety: write-only maintenance register at a fixed address.
        let cbp = unsafe { &*cortex_m::peripheral::CBP::PTR };
        Self::for_each_line(address, len, |line| unsafe { cbp.dccimvac.write(line) });
    }
    fn invalidate(&self, address: usize, len: usize) {
        // Safety: the driver only invalidates DMA destinations, which the
        // caller lent to the transfer.
        let cbp = unsafe { &*cortex_m::peripheral::CBP::PTR };
        Self::for_each_line(address, len, |line| unsafe { cbp.dcimvac.write(line) });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CacheOp, RecordingCache};

    #[test]
    fn increment_and_decrement_coverage() {
        let inc = Span::covering(0x1000, 0x1040, AddressMode::Increment, 2);
        assert_eq!(
            inc,
            Some(Span {
                address: 0x1000,
                len: 0x40
            })
        );
        // First unit at 0x103C, descending 16 words.
        let dec = Span::covering(0x103C, 0x0FFC, AddressMode::Decrement, 2);
        assert_eq!(
            dec,
            Some(Span {
                address: 0x1000,
                len: 0x40
            })
        );
        assert_eq!(Span::covering(0x1000, 0x1000, AddressMode::Fixed, 2), None);
    }

    #[test]
    fn aligned_destination_fast_invalidate() {
        let cache = RecordingCache::new(true);
        let deferred = before_block(
            &cache,
            CacheSync::Both,
            Some(Span {
                address: 0x100,
                len: 0x40,
            }),
            Some(Span {
                address: 0x200,
                len: 0x40,
            }),
            false,
        );
        assert_eq!(deferred, None);
        assert_eq!(
            cache.take(),
            [CacheOp::Clean(0x100, 0x40), CacheOp::Invalidate(0x200, 0x40)]
        );
    }

    #[test]
    fn misaligned_destination_is_deferred() {
        let cache = RecordingCache::new(true);
        let destination = Span {
            address: 0x204,
            len: 0x40,
        };
        let deferred = before_block(&cache, CacheSync::Destination, None, Some(destination), false);
        assert_eq!(deferred, Some(destination));
        assert_eq!(cache.take(), [CacheOp::Flush(0x204, 0x40)]);

        after_block(&cache, deferred);
        assert_eq!(cache.take(), [CacheOp::Invalidate(0x204, 0x40)]);

        assert_eq!(
            super::deferred(&cache, CacheSync::Destination, Some(destination)),
            Some(destination)
        );
        assert_eq!(super::deferred(&cache, CacheSync::Source, Some(destination)), None);
        assert!(cache.take().is_empty());
    }

    #[test]
    fn scattered_aligned_destination_flushes_only() {
        let cache = RecordingCache::new(true);
        let deferred = before_block(
            &cache,
            CacheSync::Both,
            None,
            Some(Span {
                address: 0x200,
                len: 0x40,
            }),
            true,
        );
        assert_eq!(deferred, None);
        assert_eq!(cache.take(), [CacheOp::Flush(0x200, 0x40)]);
    }

    #[test]
    fn auto_checks_cacheability() {
        let cache = RecordingCache::new(false);
        let span = Some(Span {
            address: 0x200,
            len: 0x40,
        });
        assert_eq!(before_block(&cache, CacheSync::Auto, span, span, false), None);
        assert!(cache.take().is_empty());
    }

    #[test]
    fn explicit_policies_skip_uncached_ranges() {
        let cache = RecordingCache::new(false);
        let span = Some(Span {
            address: 0x204,
            len: 0x40,
        });
        for sync in [CacheSync::Source, CacheSync::Destination, CacheSync::Both] {
            assert_eq!(before_block(&cache, sync, span, span, false), None);
            assert_eq!(deferred(&cache, sync, span), None);
        }
        assert!(cache.take().is_empty());
    }

    #[test]
    fn policy_selects_sides() {
        let cache = RecordingCache::new(true);
        let span = Some(Span {
            address: 0x200,
            len: 0x40,
        });
        before_block(&cache, CacheSync::Source, span, span, false);
        assert_eq!(cache.take(), [CacheOp::Clean(0x200, 0x40)]);
        before_block(&cache, CacheSync::None, span, span, false);
        assert!(cache.take().is_empty());
    }
}
