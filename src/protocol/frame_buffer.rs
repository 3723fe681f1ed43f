//! Incremental deframer for sentinel-delimited streams.
//!
//! Uses `bytes::BytesMut` to accumulate a frame that spans several reads.
//! The parser is a two-state machine:
//! - idle: bytes are discarded until a start sentinel shows up
//! - capturing: bytes accumulate until an end sentinel shows up
//!
//! A frame that grows past the payload limit is dropped and the buffer goes
//! back to idle, so an unterminated frame cannot hold more than the limit.
//!
//! # Example
//!
//! ```
//! use sentinel_rpc::protocol::{build_frame, FrameBuffer};
//!
//! let mut buffer = FrameBuffer::new();
//! let wire = build_frame(br#"{"jsonrpc":"2.0"}"#);
//!
//! // Data arrives in chunks from the socket
//! assert_eq!(buffer.feed(&wire[..4]).count(), 0);
//! let frames: Vec<_> = buffer.feed(&wire[4..]).collect();
//!
//! assert_eq!(frames.len(), 1);
//! assert_eq!(&frames[0][..], br#"{"jsonrpc":"2.0"}"#);
//! ```

use std::iter::FusedIterator;

use bytes::{Bytes, BytesMut};

use super::wire_format::{pack_with, DEFAULT_MAX_PAYLOAD_SIZE, END_OF_FRAME, START_OF_FRAME};

/// Default capacity of the accumulation buffer.
const DEFAULT_CAPACITY: usize = 4 * 1024;

/// Per-connection framing state.
///
/// Holds the sentinel pair, the capturing flag and the bytes of the frame
/// currently being assembled. State survives across [`feed`](Self::feed)
/// calls so a frame may be split over any number of reads.
#[derive(Debug)]
pub struct FrameBuffer {
    /// Bytes of the in-progress frame.
    buffer: BytesMut,
    /// Whether a start sentinel has been seen without a matching end.
    capturing: bool,
    start: u8,
    end: u8,
    /// Largest payload accepted, in bytes.
    max_payload_size: usize,
    /// Frames discarded for exceeding `max_payload_size`.
    oversized: u64,
}

impl FrameBuffer {
    /// Create a frame buffer using the default `0xA5` / `0x00` sentinels.
    pub fn new() -> Self {
        Self::with_sentinels(START_OF_FRAME, END_OF_FRAME)
    }

    /// Create a frame buffer with custom sentinel bytes.
    pub fn with_sentinels(start: u8, end: u8) -> Self {
        Self {
            buffer: BytesMut::with_capacity(DEFAULT_CAPACITY),
            capturing: false,
            start,
            end,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            oversized: 0,
        }
    }

    /// Create a frame buffer with a custom payload limit.
    pub fn with_max_payload(max_payload_size: usize) -> Self {
        Self::new().max_payload(max_payload_size)
    }

    /// Set the payload limit. Frames longer than this are dropped.
    pub fn max_payload(mut self, max_payload_size: usize) -> Self {
        self.max_payload_size = max_payload_size;
        self
    }

    /// The payload limit in bytes.
    pub fn max_payload_size(&self) -> usize {
        self.max_payload_size
    }

    /// Number of frames dropped so far for exceeding the payload limit.
    pub fn oversized_frames(&self) -> u64 {
        self.oversized
    }

    /// Wrap `payload` in this buffer's sentinels.
    ///
    /// The payload is not escaped.
    pub fn pack(&self, payload: &[u8]) -> Bytes {
        pack_with(self.start, self.end, payload)
    }

    /// Scan `chunk` and lazily yield every frame it completes.
    ///
    /// Trailing bytes of an unfinished frame are kept once the returned
    /// iterator is exhausted. Dropping the iterator early leaves the rest
    /// of `chunk` unscanned.
    pub fn feed<'a>(&'a mut self, chunk: &'a [u8]) -> Frames<'a> {
        Frames {
            state: self,
            chunk,
            pos: 0,
            mark: 0,
        }
    }

    /// Scan `chunk` and collect all completed frames.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Bytes> {
        self.feed(chunk).collect()
    }

    /// Drop any partial frame and return to the idle state.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.capturing = false;
    }

    /// Abandon an oversized frame; its tail is noise until the next start.
    fn discard_oversized(&mut self) {
        self.buffer = BytesMut::with_capacity(DEFAULT_CAPACITY);
        self.capturing = false;
        self.oversized += 1;
    }

    /// Whether adding `pending` bytes would exceed the payload limit.
    fn overflows(&self, pending: usize) -> bool {
        self.buffer.len().saturating_add(pending) > self.max_payload_size
    }

    /// Whether a frame is currently being assembled.
    pub fn is_capturing(&self) -> bool {
        self.capturing
    }

    /// Number of buffered bytes of the in-progress frame.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Check if no partial frame bytes are buffered.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}

impl Default for FrameBuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// Iterator over the frames completed by one chunk.
///
/// Created by [`FrameBuffer::feed`].
#[derive(Debug)]
pub struct Frames<'a> {
    state: &'a mut FrameBuffer,
    chunk: &'a [u8],
    /// Next byte to inspect.
    pos: usize,
    /// Start of the span not yet copied into the buffer.
    mark: usize,
}

impl Iterator for Frames<'_> {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        while self.pos < self.chunk.len() {
            let j = self.pos;
            let byte = self.chunk[j];
            self.pos += 1;

            if byte == self.state.start {
                self.state.buffer.clear();
                self.state.capturing = true;
                self.mark = j + 1;
            }

            // Not an `else`: with identical sentinels a byte both opens and closes.
            if byte == self.state.end && self.state.capturing {
                if self.state.overflows(j.saturating_sub(self.mark)) {
                    self.state.discard_oversized();
                    self.mark = j + 1;
                    continue;
                }
                if self.mark < j {
                    self.state
                        .buffer
                        .extend_from_slice(&self.chunk[self.mark..j]);
                }
                self.state.capturing = false;
                self.mark = j + 1;
                return Some(self.state.buffer.split().freeze());
            }
        }

        if self.state.capturing && self.mark < self.chunk.len() {
            if self.state.overflows(self.chunk.len() - self.mark) {
                self.state.discard_oversized();
            } else {
                self.state
                    .buffer
                    .extend_from_slice(&self.chunk[self.mark..]);
            }
            self.mark = self.chunk.len();
        }

        None
    }
}

impl FusedIterator for Frames<'_> {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::build_frame;

    /// Feed `data` in pieces of `size` bytes and collect every frame.
    fn feed_in_pieces(buffer: &mut FrameBuffer, data: &[u8], size: usize) -> Vec<Bytes> {
        data.chunks(size)
            .flat_map(|piece| buffer.push(piece))
            .collect()
    }

    #[test]
    fn test_single_complete_frame() {
        let mut buffer = FrameBuffer::new();

        let frames = buffer.push(&build_frame(b"hello"));

        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], b"hello");
        assert!(!buffer.is_capturing());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_every_split_point() {
        let payload = br#"{"jsonrpc":"2.0","method":"echo","params":[1,2,3],"id":7}"#;
        let wire = build_frame(payload);

        for split in 0..=wire.len() {
            let mut buffer = FrameBuffer::new();
            let mut frames = buffer.push(&wire[..split]);
            frames.extend(buffer.push(&wire[split..]));

            assert_eq!(frames.len(), 1, "split at {}", split);
            assert_eq!(&frames[0][..], payload, "split at {}", split);
        }
    }

    #[test]
    fn test_uneven_piece_sizes() {
        let payload = b"this is a longer payload that will be fragmented";
        let wire = build_frame(payload);

        for size in [1, 2, 3, 7, 16, wire.len()] {
            let mut buffer = FrameBuffer::new();
            let frames = feed_in_pieces(&mut buffer, &wire, size);

            assert_eq!(frames.len(), 1, "piece size {}", size);
            assert_eq!(&frames[0][..], payload);
        }
    }

    #[test]
    fn test_two_frames_byte_at_a_time() {
        let mut buffer = FrameBuffer::new();
        let mut wire = build_frame(b"first").to_vec();
        wire.extend_from_slice(&build_frame(b"second"));

        let frames = feed_in_pieces(&mut buffer, &wire, 1);

        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0][..], b"first");
        assert_eq!(&frames[1][..], b"second");
    }

    #[test]
    fn test_multiple_frames_in_one_chunk() {
        let mut buffer = FrameBuffer::new();
        let mut wire = Vec::new();
        for payload in [&b"one"[..], b"two", b"three"] {
            wire.extend_from_slice(&build_frame(payload));
        }

        let frames = buffer.push(&wire);

        assert_eq!(frames.len(), 3);
        assert_eq!(&frames[0][..], b"one");
        assert_eq!(&frames[1][..], b"two");
        assert_eq!(&frames[2][..], b"three");
    }

    #[test]
    fn test_partial_frame_is_retained() {
        let mut buffer = FrameBuffer::new();

        let frames = buffer.push(&[START_OF_FRAME, b'a', b'b']);
        assert!(frames.is_empty());
        assert!(buffer.is_capturing());
        assert_eq!(buffer.len(), 2);

        let frames = buffer.push(&[b'c', END_OF_FRAME]);
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], b"abc");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_empty_frame() {
        let mut buffer = FrameBuffer::new();

        let frames = buffer.push(&[START_OF_FRAME, END_OF_FRAME]);

        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_empty());
    }

    #[test]
    fn test_repeated_start_keeps_latest() {
        let mut buffer = FrameBuffer::new();

        let frames = buffer.push(&[START_OF_FRAME, b'x', START_OF_FRAME, b'y', b'z', END_OF_FRAME]);

        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], b"yz");
    }

    #[test]
    fn test_restart_discards_partial_from_previous_chunk() {
        let mut buffer = FrameBuffer::new();

        buffer.push(&[START_OF_FRAME, b'o', b'l', b'd']);
        let frames = buffer.push(&[START_OF_FRAME, b'n', b'e', b'w', END_OF_FRAME]);

        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], b"new");
    }

    #[test]
    fn test_end_while_idle_is_ignored() {
        let mut buffer = FrameBuffer::new();

        let frames = buffer.push(&[END_OF_FRAME, b'q', END_OF_FRAME]);

        assert!(frames.is_empty());
        assert!(!buffer.is_capturing());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_bytes_outside_frames_are_discarded() {
        let mut buffer = FrameBuffer::new();
        let mut wire = b"noise".to_vec();
        wire.extend_from_slice(&build_frame(b"a"));
        wire.extend_from_slice(b"between");
        wire.extend_from_slice(&build_frame(b"b"));
        wire.extend_from_slice(b"trailing");

        let frames = buffer.push(&wire);

        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0][..], b"a");
        assert_eq!(&frames[1][..], b"b");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_embedded_start_sentinel_truncates_frame() {
        let mut buffer = FrameBuffer::new();

        let frames = buffer.push(&build_frame(&[b'a', b'b', START_OF_FRAME, b'c', b'd']));

        // Everything before the embedded sentinel is lost.
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], b"cd");
    }

    #[test]
    fn test_embedded_end_sentinel_splits_frame() {
        let mut buffer = FrameBuffer::new();

        let frames = buffer.push(&build_frame(&[b'a', b'b', END_OF_FRAME, b'c', b'd']));

        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], b"ab");
        assert!(!buffer.is_capturing());
    }

    #[test]
    fn test_reset_clears_state() {
        let mut buffer = FrameBuffer::new();

        buffer.push(&[START_OF_FRAME, b'p', b'a', b'r']);
        assert!(buffer.is_capturing());
        assert_eq!(buffer.len(), 3);

        buffer.reset();

        assert!(!buffer.is_capturing());
        assert!(buffer.is_empty());

        // Tail of the abandoned frame is now noise.
        let frames = buffer.push(&[b't', END_OF_FRAME]);
        assert!(frames.is_empty());
    }

    #[test]
    fn test_unterminated_frame_is_bounded() {
        let mut buffer = FrameBuffer::with_max_payload(1024);
        let filler = vec![b'x'; 512];

        assert!(buffer.push(&[START_OF_FRAME]).is_empty());
        for _ in 0..64 {
            assert!(buffer.push(&filler).is_empty());
            assert!(buffer.len() <= 1024);
        }

        assert!(!buffer.is_capturing());
        assert!(buffer.is_empty());
        assert_eq!(buffer.oversized_frames(), 1);
    }

    #[test]
    fn test_oversized_frame_in_one_chunk_is_dropped() {
        let mut buffer = FrameBuffer::with_max_payload(4);
        let mut wire = build_frame(b"too long").to_vec();
        wire.extend_from_slice(&build_frame(b"ok"));

        let frames = buffer.push(&wire);

        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], b"ok");
        assert_eq!(buffer.oversized_frames(), 1);
    }

    #[test]
    fn test_payload_at_limit_is_kept() {
        let mut buffer = FrameBuffer::with_max_payload(5);
        let wire = build_frame(b"exact");

        let frames = feed_in_pieces(&mut buffer, &wire, 2);

        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], b"exact");
        assert_eq!(buffer.oversized_frames(), 0);
        assert_eq!(buffer.max_payload_size(), 5);
    }

    #[test]
    fn test_next_frame_after_overflow() {
        let mut buffer = FrameBuffer::with_max_payload(3);

        buffer.push(&[START_OF_FRAME, b'a', b'b']);
        buffer.push(&[b'c', b'd']);
        // Tail of the dropped frame, then a fresh one.
        let frames = buffer.push(&[b'e', END_OF_FRAME, START_OF_FRAME, b'f', END_OF_FRAME]);

        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], b"f");
    }

    #[test]
    fn test_feed_is_lazy() {
        let mut buffer = FrameBuffer::new();
        let mut wire = build_frame(b"first").to_vec();
        wire.extend_from_slice(&build_frame(b"second"));

        let first = buffer.feed(&wire).next();

        assert_eq!(first.as_deref(), Some(&b"first"[..]));
        // The second frame was never scanned.
        assert!(!buffer.is_capturing());
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_identical_sentinels_yield_empty_frames() {
        let mut buffer = FrameBuffer::with_sentinels(b'|', b'|');

        let frames = buffer.push(b"a|b|c");

        assert_eq!(frames.len(), 2);
        assert!(frames.iter().all(|f| f.is_empty()));
    }

    #[test]
    fn test_custom_sentinels_roundtrip() {
        let mut buffer = FrameBuffer::with_sentinels(b'<', b'>');

        let wire = buffer.pack(b"payload");
        let frames = feed_in_pieces(&mut buffer, &wire, 3);

        assert_eq!(&wire[..], b"<payload>");
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], b"payload");
    }
}
