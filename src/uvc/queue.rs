//! Double-buffered frame queue
//!
//! The queue is split into two halves joined by a pair of lock-free
//! single-producer/single-consumer rings:
//!
//! - [`FrameSupply`] stays with the consumer. It pushes empty buffers and
//!   pops filled ones.
//! - [`FrameSink`] goes with the capture session into the interrupt
//!   context. It takes empty buffers, fills them and hands them back.
//!
//! Buffers move between the halves by value, so a buffer is always owned by
//! exactly one side and neither half needs a lock. Push order, capture
//! order and pop order are the same FIFO order, which is the ring with
//! three independent cursors the driver models.
//!
//! ```
//! use usbh_uvc::uvc::FrameQueue;
//!
//! let mut frames: FrameQueue<[u8; 64]> = FrameQueue::new();
//! let (mut supply, _sink) = frames.split();
//! supply.push([0; 64]).unwrap();
//! supply.push([0; 64]).unwrap();
//! assert!(supply.push([0; 64]).is_err());
//! ```

use core::fmt;

use heapless::spsc::{Consumer, Producer, Queue};

/// Frame buffers the driver may hold at once
pub const QUEUE_DEPTH: usize = 2;

/// Ring storage size; a `heapless` ring of `N` holds `N - 1` elements
const RING: usize = QUEUE_DEPTH + 1;

/// `push` found both slots taken; the buffer is handed back
#[derive(Debug, PartialEq, Eq)]
pub struct AlreadyFull<B>(pub B);

impl<B> AlreadyFull<B> {
    /// Recover the rejected buffer
    pub fn into_inner(self) -> B {
        self.0
    }
}

impl<B> fmt::Display for AlreadyFull<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "capture queue full")
    }
}

/// `pop` found no completed frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct NotReady;

impl fmt::Display for NotReady {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "no frame ready")
    }
}

/// A completed frame returned by `pop`
#[derive(Debug)]
pub struct CaptureInfo<B> {
    /// The buffer, back in the consumer's hands
    pub buffer: B,
    /// Bytes of frame data at the start of the buffer
    pub length: usize,
    /// A payload of this frame was flagged or lost
    pub had_error: bool,
}

impl<B: AsRef<[u8]>> CaptureInfo<B> {
    /// Filled part of the buffer
    pub fn frame(&self) -> &[u8] {
        let data = self.buffer.as_ref();
        &data[..self.length.min(data.len())]
    }
}

impl<B> CaptureInfo<B> {
    /// Take the buffer back for reuse
    pub fn into_buffer(self) -> B {
        self.buffer
    }
}

/// Backing storage for both halves of the queue
pub struct FrameQueue<B> {
    empty: Queue<B, RING>,
    filled: Queue<CaptureInfo<B>, RING>,
}

impl<B> FrameQueue<B> {
    /// Empty queue
    pub const fn new() -> Self {
        Self {
            empty: Queue::new(),
            filled: Queue::new(),
        }
    }

    /// Split into the consumer half and the capture half
    ///
    /// Buffers still queued from an earlier split stay queued and count
    /// against the supply's limit. A frame that was being captured when the
    /// earlier sink was dropped is gone with it.
    pub fn split(&mut self) -> (FrameSupply<'_, B>, FrameSink<'_, B>) {
        let held = self.empty.len() + self.filled.len();
        let (empty_tx, empty_rx) = self.empty.split();
        let (filled_tx, filled_rx) = self.filled.split();
        (
            FrameSupply {
                empty: empty_tx,
                filled: filled_rx,
                held,
            },
            FrameSink {
                empty: empty_rx,
                filled: filled_tx,
                capturing: None,
            },
        )
    }
}

impl<B> Default for FrameQueue<B> {
    fn default() -> Self {
        Self::new()
    }
}

/// Consumer half: hands empty buffers in, takes completed frames out
pub struct FrameSupply<'a, B> {
    empty: Producer<'a, B, RING>,
    filled: Consumer<'a, CaptureInfo<B>, RING>,
    held: usize,
}

impl<'a, B> FrameSupply<'a, B> {
    /// Hand an empty buffer to the driver
    ///
    /// Fails once the driver holds [`QUEUE_DEPTH`] buffers, counting the one
    /// being filled and completed frames not yet popped.
    pub fn push(&mut self, buffer: B) -> Result<(), AlreadyFull<B>> {
        if self.held >= QUEUE_DEPTH {
            return Err(AlreadyFull(buffer));
        }
        self.empty.enqueue(buffer).map_err(AlreadyFull)?;
        self.held += 1;
        Ok(())
    }

    /// Take the next completed frame
    pub fn pop(&mut self) -> Result<CaptureInfo<B>, NotReady> {
        let info = self.filled.dequeue().ok_or(NotReady)?;
        self.held = self.held.saturating_sub(1);
        Ok(info)
    }

    /// Buffers currently owned by the driver
    pub fn held(&self) -> usize {
        self.held
    }

    /// A completed frame is waiting
    pub fn is_ready(&self) -> bool {
        self.filled.ready()
    }
}

struct Capture<B> {
    buffer: B,
    written: usize,
    error: bool,
}

/// Result of writing payload into the capturing buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteOutcome {
    /// Bytes copied
    pub written: usize,
    /// Bytes that did not fit
    pub truncated: usize,
}

/// Capture half: fills buffers from the interrupt context
pub struct FrameSink<'a, B> {
    empty: Consumer<'a, B, RING>,
    filled: Producer<'a, CaptureInfo<B>, RING>,
    capturing: Option<Capture<B>>,
}

impl<'a, B: AsMut<[u8]>> FrameSink<'a, B> {
    /// A buffer is being filled
    pub fn is_capturing(&self) -> bool {
        self.capturing.is_some()
    }

    /// Empty buffers waiting for a frame
    pub fn available(&self) -> usize {
        self.empty.len()
    }

    /// Start a frame in the next empty buffer
    ///
    /// Returns `false` if a frame is already capturing or no empty buffer
    /// was pushed.
    pub(crate) fn begin_frame(&mut self) -> bool {
        if self.capturing.is_some() {
            return false;
        }
        let Some(buffer) = self.empty.dequeue() else {
            return false;
        };
        self.capturing = Some(Capture {
            buffer,
            written: 0,
            error: false,
        });
        true
    }

    /// Append payload to the capturing buffer, clamped to its capacity
    ///
    /// Returns `None` when nothing is capturing.
    pub(crate) fn write(&mut self, data: &[u8]) -> Option<WriteOutcome> {
        let capture = self.capturing.as_mut()?;
        let storage = capture.buffer.as_mut();
        let room = storage.len().saturating_sub(capture.written);
        let written = data.len().min(room);
        storage[capture.written..capture.written + written].copy_from_slice(&data[..written]);
        capture.written += written;
        Some(WriteOutcome {
            written,
            truncated: data.len() - written,
        })
    }

    /// Flag the capturing frame as errored
    pub(crate) fn mark_error(&mut self) -> bool {
        match self.capturing.as_mut() {
            Some(capture) => {
                capture.error = true;
                true
            }
            None => false,
        }
    }

    /// Hand the capturing frame to the consumer
    ///
    /// Returns the frame's error flag, or `None` when nothing was capturing.
    pub(crate) fn complete(&mut self) -> Option<bool> {
        let capture = self.capturing.take()?;
        let had_error = capture.error;
        let info = CaptureInfo {
            buffer: capture.buffer,
            length: capture.written,
            had_error,
        };
        // the supply never lets more than QUEUE_DEPTH buffers in
        if let Err(info) = self.filled.enqueue(info) {
            warn!("completed frame ring full, frame kept capturing");
            self.capturing = Some(Capture {
                buffer: info.buffer,
                written: info.length,
                error: info.had_error,
            });
            return None;
        }
        Some(had_error)
    }
}
