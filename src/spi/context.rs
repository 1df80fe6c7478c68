use core::cell::RefCell;
use core::sync::atomic::{AtomicBool, Ordering};

use critical_section::Mutex;
#[cfg(feature = "embassy")]
use embassy_sync::waitqueue::AtomicWaker;

use super::Error;

struct Buffers<const TX: usize, const RX: usize> {
    tx: [u8; TX],
    rx: [u8; RX],
    tx_offset: usize,
    tx_count: usize,
    rx_count: usize,
    /// Transmit bytes the engine is still reading, as `start..end`.
    locked: Option<(usize, usize)>,
}

impl<const TX: usize, const RX: usize> Buffers<TX, RX> {
    fn overlaps_locked(&self, start: usize, end: usize) -> bool {
        self.locked.is_some_and(|(lo, hi)| start < hi && lo < end)
    }
}

/// Per-peer transaction state: buffers, byte counts for the next transfer and
/// a completion flag.
///
/// The engine keeps a shared reference to the context while a transfer is in
/// flight, so all access goes through `&self`. A context is usually a
/// `static`, one per peer driver:
///
/// ```
/// use spi_engine::spi::TransactionContext;
///
/// static DISPLAY: TransactionContext<20, 10> = TransactionContext::new();
/// ```
pub struct TransactionContext<const TX: usize, const RX: usize> {
    buffers: Mutex<RefCell<Buffers<TX, RX>>>,
    done: AtomicBool,
    #[cfg(feature = "embassy")]
    waker: AtomicWaker,
}

impl<const TX: usize, const RX: usize> Default for TransactionContext<TX, RX> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const TX: usize, const RX: usize> TransactionContext<TX, RX> {
    /// Empty buffers, zero counts. Reports done, since nothing is outstanding.
    pub const fn new() -> Self {
        Self {
            buffers: Mutex::new(RefCell::new(Buffers {
                tx: [0; TX],
                rx: [0; RX],
                tx_offset: 0,
                tx_count: 0,
                rx_count: 0,
                locked: None,
            })),
            done: AtomicBool::new(true),
            #[cfg(feature = "embassy")]
            waker: AtomicWaker::new(),
        }
    }

    /// Byte counts for the next transaction. Checked against the buffers when
    /// the transaction starts.
    pub fn set_counts(&self, tx_count: usize, rx_count: usize) {
        self.with_buffers(|b| {
            b.tx_count = tx_count;
            b.rx_count = rx_count;
        })
    }

    /// Where in the transmit buffer the next transaction starts reading.
    pub fn set_tx_offset(&self, offset: usize) {
        self.with_buffers(|b| b.tx_offset = offset)
    }

    pub fn tx_count(&self) -> usize {
        self.with_buffers(|b| b.tx_count)
    }

    pub fn rx_count(&self) -> usize {
        self.with_buffers(|b| b.rx_count)
    }

    pub fn tx_offset(&self) -> usize {
        self.with_buffers(|b| b.tx_offset)
    }

    /// Copy `bytes` into the transmit buffer at `offset`.
    ///
    /// Bytes a transaction in flight has yet to send are off limits
    /// ([`Error::Busy`]); the rest of the buffer can be filled for the next one.
    pub fn write_tx(&self, offset: usize, bytes: &[u8]) -> Result<(), Error> {
        self.with_buffers(|b| {
            let end = offset.checked_add(bytes.len()).ok_or(Error::TxOverflow)?;
            if end > TX {
                return Err(Error::TxOverflow);
            }
            if b.overlaps_locked(offset, end) {
                return Err(Error::Busy);
            }
            b.tx[offset..end].copy_from_slice(bytes);
            Ok(())
        })
    }

    /// Direct access to the whole transmit buffer, refused with
    /// [`Error::Busy`] while a transaction is sending from it.
    pub fn with_tx<R>(&self, f: impl FnOnce(&mut [u8]) -> R) -> Result<R, Error> {
        self.with_buffers(|b| {
            if b.overlaps_locked(0, TX) {
                return Err(Error::Busy);
            }
            Ok(f(&mut b.tx))
        })
    }

    /// The first `rx_count` bytes of the receive buffer.
    pub fn with_rx<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        self.with_buffers(|b| {
            let len = b.rx_count.min(RX);
            f(&b.rx[..len])
        })
    }

    /// Copy received bytes into `out`, returning how many were copied.
    pub fn read_rx(&self, out: &mut [u8]) -> usize {
        self.with_rx(|rx| {
            let len = rx.len().min(out.len());
            out[..len].copy_from_slice(&rx[..len]);
            len
        })
    }

    /// True once the most recently started transaction has finished.
    ///
    /// Only a flag: the transfer moves when the engine is polled or waited
    /// on, so spinning on this alone never sees it turn true.
    #[inline]
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Resolve once the most recently started transaction has finished.
    #[cfg(feature = "embassy")]
    pub async fn wait_done(&self) {
        core::future::poll_fn(|cx| {
            self.waker.register(cx.waker());
            if self.is_done() {
                core::task::Poll::Ready(())
            } else {
                core::task::Poll::Pending
            }
        })
        .await
    }

    fn with_buffers<R>(&self, f: impl FnOnce(&mut Buffers<TX, RX>) -> R) -> R {
        critical_section::with(|cs| f(&mut *self.buffers.borrow_ref_mut(cs)))
    }
}

/// Byte counts latched when a transaction starts.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub(crate) struct Window {
    pub tx_offset: usize,
    pub tx_count: usize,
    pub rx_count: usize,
}

impl Window {
    pub fn is_empty(&self) -> bool {
        self.tx_count == 0 && self.rx_count == 0
    }
}

pub(crate) mod sealed {
    use super::*;

    /// What the engine needs from a context, independent of buffer sizes.
    pub trait Transfer {
        /// Check and latch the counts, then clear `done`.
        fn begin(&self) -> Result<Window, Error>;

        fn tx_byte(&self, index: usize) -> u8;

        fn store_rx(&self, index: usize, byte: u8);

        /// Unlock the transmit bytes, set `done` and wake anyone waiting on it.
        fn complete(&self);

        /// Unlock the transmit bytes of a transfer that will never finish.
        /// `done` stays false.
        fn abandon(&self);
    }
}

impl<const TX: usize, const RX: usize> sealed::Transfer for TransactionContext<TX, RX> {
    fn begin(&self) -> Result<Window, Error> {
        let window = self.with_buffers(|b| {
            let tx_end = b.tx_offset.checked_add(b.tx_count).ok_or(Error::TxOverflow)?;
            if tx_end > TX {
                return Err(Error::TxOverflow);
            }
            if b.rx_count > RX {
                return Err(Error::RxOverflow);
            }
            b.locked = (b.tx_count > 0).then_some((b.tx_offset, tx_end));
            Ok(Window {
                tx_offset: b.tx_offset,
                tx_count: b.tx_count,
                rx_count: b.rx_count,
            })
        })?;
        self.done.store(false, Ordering::Release);
        Ok(window)
    }

    fn tx_byte(&self, index: usize) -> u8 {
        self.with_buffers(|b| b.tx.get(index).copied().unwrap_or(0))
    }

    fn store_rx(&self, index: usize, byte: u8) {
        self.with_buffers(|b| {
            if let Some(slot) = b.rx.get_mut(index) {
                *slot = byte;
            }
        })
    }

    fn complete(&self) {
        self.abandon();
        self.done.store(true, Ordering::Release);
        #[cfg(feature = "embassy")]
        self.waker.wake();
    }

    fn abandon(&self) {
        self.with_buffers(|b| b.locked = None)
    }
}
