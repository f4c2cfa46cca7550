//! Frame assembly from a decompressed byte stream.
//!
//! The decompressed stream is a plain concatenation of frames with no
//! framing of its own, so frame boundaries are recovered purely by
//! counting bytes. Chunk boundaries carry no meaning.

use bytes::{Bytes, BytesMut};

// ── FrameAssembler ───────────────────────────────────────────────

/// Accumulates decompressed bytes and slices off whole frames.
///
/// After every [`drain`](Self::drain) the pending buffer holds fewer than
/// `window_bytes` bytes.
#[derive(Debug)]
pub struct FrameAssembler {
    window_bytes: usize,
    buffer: BytesMut,
}

impl FrameAssembler {
    /// Create an assembler for frames of `window_bytes` bytes.
    ///
    /// # Panics
    ///
    /// Panics if `window_bytes` is zero.
    pub fn new(window_bytes: usize) -> Self {
        assert!(window_bytes > 0, "window_bytes must be positive");
        Self {
            window_bytes,
            buffer: BytesMut::with_capacity(window_bytes * 2),
        }
    }

    /// Bytes in one frame.
    pub fn window_bytes(&self) -> usize {
        self.window_bytes
    }

    /// Bytes buffered towards the next frame.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Append a decompressed chunk.
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    /// Remove and return the next whole frame, if one is buffered.
    pub fn next_frame(&mut self) -> Option<Bytes> {
        if self.buffer.len() < self.window_bytes {
            return None;
        }
        Some(self.buffer.split_to(self.window_bytes).freeze())
    }

    /// Iterate over every whole frame currently buffered, in stream order.
    pub fn drain(&mut self) -> Drain<'_> {
        Drain { assembler: self }
    }

    /// Append `chunk` and hand every completed frame to `emit`, in order.
    ///
    /// Returns the number of frames emitted.
    pub fn on_bytes<F>(&mut self, chunk: &[u8], mut emit: F) -> usize
    where
        F: FnMut(Bytes),
    {
        self.push(chunk);
        let mut emitted = 0;
        for frame in self.drain() {
            emit(frame);
            emitted += 1;
        }
        emitted
    }
}

/// Iterator returned by [`FrameAssembler::drain`].
pub struct Drain<'a> {
    assembler: &'a mut FrameAssembler,
}

impl Iterator for Drain<'_> {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        self.assembler.next_frame()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stream(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 31 % 253) as u8).collect()
    }

    fn collect(asm: &mut FrameAssembler, chunks: &[&[u8]]) -> Vec<Bytes> {
        let mut frames = Vec::new();
        for chunk in chunks {
            asm.on_bytes(chunk, |f| frames.push(f));
        }
        frames
    }

    #[test]
    fn exact_multiple_yields_k_frames() {
        let window = 100;
        let data = stream(window * 3);
        let mut asm = FrameAssembler::new(window);
        let frames = collect(&mut asm, &[&data]);

        assert_eq!(frames.len(), 3);
        for (i, frame) in frames.iter().enumerate() {
            assert_eq!(&frame[..], &data[i * window..(i + 1) * window]);
        }
        assert_eq!(asm.pending(), 0);
    }

    #[test]
    fn one_byte_short_yields_nothing_until_completed() {
        let window = 64;
        let data = stream(window);
        let mut asm = FrameAssembler::new(window);

        assert_eq!(asm.on_bytes(&data[..window - 1], |_| panic!("early frame")), 0);
        assert_eq!(asm.pending(), window - 1);

        let mut frames = Vec::new();
        asm.on_bytes(&data[window - 1..], |f| frames.push(f));
        assert_eq!(frames.len(), 1);
        assert_eq!(&frames[0][..], &data[..]);
    }

    #[test]
    fn chunking_does_not_change_frames() {
        let window = 50;
        let data = stream(window * 4 + 17);

        let mut whole = FrameAssembler::new(window);
        let expected = collect(&mut whole, &[&data]);

        let splits: [&[usize]; 3] = [&[1, 49, 50, 101], &[7, 7, 7, 200], &[0, 0, 150, 151]];
        for cuts in splits {
            let mut chunks: Vec<&[u8]> = Vec::new();
            let mut start = 0;
            for &cut in cuts {
                chunks.push(&data[start..cut]);
                start = cut;
            }
            chunks.push(&data[start..]);

            let mut asm = FrameAssembler::new(window);
            assert_eq!(collect(&mut asm, &chunks), expected, "cuts {cuts:?}");
            assert_eq!(asm.pending(), 17);
        }
    }

    #[test]
    fn two_windows_in_three_uneven_chunks() {
        let window = 1000;
        let data = stream(window * 2);
        let mut asm = FrameAssembler::new(window);
        let frames = collect(&mut asm, &[&data[..333], &data[333..1500], &data[1500..]]);

        assert_eq!(frames.len(), 2);
        assert_eq!(&frames[0][..], &data[..window]);
        assert_eq!(&frames[1][..], &data[window..]);
    }

    #[test]
    fn remainder_stays_below_window() {
        let window = 10;
        let mut asm = FrameAssembler::new(window);
        for len in [3usize, 25, 9, 1, 40] {
            asm.push(&stream(len));
            asm.drain().for_each(drop);
            assert!(asm.pending() < window);
        }
    }
}
