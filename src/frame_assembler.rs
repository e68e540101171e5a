//! Reassembles [`UsbPacket`]s from the raw serial byte stream.
//!
//! Bytes are fed in one at a time. Anything before a start byte is dropped.
//! Once a header and the declared payload have been buffered the CRC is
//! checked; on a mismatch the buffered bytes are searched for another start
//! byte and, if one is found, everything before it is discarded so that a
//! packet which began in the middle of the corrupted one can still be
//! recovered.
//!
//! The scratch buffer never holds more than one maximum sized packet. A
//! declared length above [`MAX_PAYLOAD`] can never validate, so it is
//! rejected as soon as the length byte arrives. A failed frame without a
//! second start byte resets the assembler, which bounds every framing
//! attempt to [`MAX_PACKET`] bytes.
//!
//! A resync can leave several complete packets in the scratch buffer at
//! once. [`FrameAssembler::feed`] returns only the first of them; the rest
//! are handed out by [`FrameAssembler::next_buffered`] without waiting for
//! more input.

use crate::packet::{UsbPacket, HEADER_LEN, MAX_PACKET, MAX_PAYLOAD, START_BYTE};
use log::{debug, trace};

/// A byte-at-a-time packet decoder.
#[derive(Debug, Clone)]
pub struct FrameAssembler {
    scratch: [u8; MAX_PACKET],
    cursor: usize,
    rejected: u64,
    resyncs: u64,
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameAssembler {
    /// Instantiates an assembler waiting for its first start byte.
    pub fn new() -> Self {
        Self {
            scratch: [0; MAX_PACKET],
            cursor: 0,
            rejected: 0,
            resyncs: 0,
        }
    }

    /// Consumes one byte. Returns a packet when `byte` completes one whose
    /// CRC checks out.
    pub fn feed(&mut self, byte: u8) -> Option<UsbPacket> {
        if self.cursor == 0 && byte != START_BYTE {
            return None;
        }

        if self.cursor < MAX_PACKET {
            self.scratch[self.cursor] = byte;
        }
        self.cursor += 1;

        self.try_complete()
    }

    /// Returns the next complete packet already sitting in the scratch
    /// buffer. Call it until it yields `None` after every packet returned by
    /// [`Self::feed`].
    pub fn next_buffered(&mut self) -> Option<UsbPacket> {
        self.try_complete()
    }

    /// Feeds every byte of `bytes`, collecting the packets they complete.
    pub fn feed_all(&mut self, bytes: &[u8]) -> Vec<UsbPacket> {
        let mut packets = Vec::new();
        for &b in bytes {
            if let Some(packet) = self.feed(b) {
                packets.push(packet);
                while let Some(packet) = self.next_buffered() {
                    packets.push(packet);
                }
            }
        }
        packets
    }

    /// Drops any partially received packet.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Number of bytes of the packet currently being assembled.
    pub fn pending(&self) -> usize {
        self.buffered()
    }

    /// Number of framed packets thrown away for a bad CRC or length.
    pub fn rejected(&self) -> u64 {
        self.rejected
    }

    /// Number of times a start byte inside a rejected frame was used to
    /// regain synchronization.
    pub fn resyncs(&self) -> u64 {
        self.resyncs
    }

    fn buffered(&self) -> usize {
        self.cursor.min(MAX_PACKET)
    }

    fn try_complete(&mut self) -> Option<UsbPacket> {
        while self.cursor >= HEADER_LEN {
            let length = self.scratch[3] as usize;

            if length <= MAX_PAYLOAD {
                let frame_len = HEADER_LEN + length;
                if self.cursor < frame_len {
                    return None;
                }
                if let Some(packet) = UsbPacket::from_frame(&self.scratch[..frame_len]) {
                    trace!("Assembled packet {:02X?}", &self.scratch[..frame_len]);
                    self.consume(frame_len);
                    self.skip_to_start();
                    return Some(packet);
                }
                debug!(
                    "CRC mismatch on {} byte frame {:02X?}",
                    frame_len,
                    &self.scratch[..frame_len]
                );
            } else {
                debug!("Declared payload length {} is out of range", length);
            }
            self.rejected += 1;

            let next_start = self.scratch[1..self.buffered()]
                .iter()
                .position(|&b| b == START_BYTE);
            match next_start {
                Some(offset) => {
                    self.resyncs += 1;
                    self.consume(offset + 1);
                }
                None => {
                    self.cursor = 0;
                    return None;
                }
            }
        }

        None
    }

    // Drops buffered bytes that precede the next start byte.
    fn skip_to_start(&mut self) {
        match self.scratch[..self.buffered()]
            .iter()
            .position(|&b| b == START_BYTE)
        {
            Some(0) => {}
            Some(offset) => self.consume(offset),
            None => self.cursor = 0,
        }
    }

    // Shifts the scratch buffer left by `n` bytes.
    fn consume(&mut self, n: usize) {
        let buffered = self.buffered();
        if n >= buffered {
            self.cursor = 0;
            return;
        }
        self.scratch.copy_within(n..buffered, 0);
        self.cursor = buffered - n;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, Rng, SeedableRng};

    fn packet(command: u8, payload: &[u8]) -> UsbPacket {
        UsbPacket::new(command, payload).unwrap()
    }

    #[test]
    fn single_packet_roundtrip() {
        let original = packet(0x01, &[0x20, 0x01, 0x02, 0x10, 0x00, 0x05]);
        let mut assembler = FrameAssembler::new();

        let bytes = original.encode();
        let (last, head) = bytes.split_last().unwrap();
        for &b in head {
            assert_eq!(assembler.feed(b), None);
        }
        assert_eq!(assembler.feed(*last), Some(original));
        assert_eq!(assembler.pending(), 0);
    }

    #[test]
    fn empty_payload() {
        let original = packet(0x61, &[]);
        let mut assembler = FrameAssembler::new();
        assert_eq!(assembler.feed_all(&original.encode()), vec![original]);
    }

    #[test]
    fn leading_garbage_is_skipped() {
        let original = packet(0x01, &[1, 2, 3, 4]);
        let mut bytes = vec![0x00, 0x13, 0xFF, 0x42];
        bytes.extend(original.encode());

        let mut assembler = FrameAssembler::new();
        assert_eq!(assembler.feed_all(&bytes), vec![original]);
    }

    #[test]
    fn recovers_after_corrupted_crc() {
        let first = packet(0x01, &[0x20, 0x00, 0x10]);
        let second = packet(0x01, &[0x24, 0x00, 0x20]);
        let mut corrupted = packet(0x01, &[0x20, 0x00, 0x30]).encode();
        corrupted[1] ^= 0xFF;
        assert_ne!(corrupted[1], START_BYTE);

        let mut bytes = first.encode();
        bytes.extend(&corrupted);
        bytes.extend(second.encode());

        let mut assembler = FrameAssembler::new();
        assert_eq!(assembler.feed_all(&bytes), vec![first, second]);
        assert_eq!(assembler.rejected(), 1);
    }

    #[test]
    fn recovers_packet_that_started_inside_a_truncated_one() {
        // Declares ten payload bytes but only three made it onto the wire
        let truncated = [START_BYTE, 0x00, 0x01, 10, 1, 2, 3];
        let hidden = packet(0x01, &[7, 8]);
        let after = packet(0x01, &[9]);

        let mut bytes = truncated.to_vec();
        bytes.extend(hidden.encode());
        bytes.extend(after.encode());

        let mut assembler = FrameAssembler::new();
        assert_eq!(assembler.feed_all(&bytes), vec![hidden, after]);
        assert_eq!(assembler.resyncs(), 1);
    }

    #[test]
    fn every_packet_recovered_by_a_resync_is_released_at_once() {
        let a = packet(0x01, &[0x20, 0x00, 0x01]);
        let b = packet(0x01, &[0x24, 0x00, 0x02]);
        let c = packet(0x01, &[0x60, 0x01, 0x2C]);

        // A header declaring 22 payload bytes swallows a, b and c whole
        let mut bytes = vec![START_BYTE, 0x00, 0x01, 22];
        bytes.extend(a.encode());
        bytes.extend(b.encode());
        bytes.extend(c.encode());
        bytes.extend([0x11; 7]);

        let mut assembler = FrameAssembler::new();
        assert_eq!(assembler.feed_all(&bytes), vec![a.clone(), b.clone(), c.clone()]);
        assert_eq!(assembler.pending(), 0);
        assert_eq!(assembler.rejected(), 1);
        assert_eq!(assembler.resyncs(), 1);

        // Byte by byte, the same packets wait in the buffer for the caller
        let mut assembler = FrameAssembler::new();
        let mut got = Vec::new();
        for &byte in &bytes {
            if let Some(p) = assembler.feed(byte) {
                got.push(p);
                assert_eq!(assembler.next_buffered(), Some(b.clone()));
                assert_eq!(assembler.next_buffered(), Some(c.clone()));
                assert_eq!(assembler.next_buffered(), None);
            }
        }
        assert_eq!(got, vec![a]);
        assert_eq!(assembler.rejected(), 1);
    }

    #[test]
    fn next_buffered_waits_for_a_partial_packet() {
        let good = packet(0x01, &[1, 2, 3]);
        let bytes = good.encode();

        let mut assembler = FrameAssembler::new();
        assert_eq!(assembler.next_buffered(), None);
        assembler.feed_all(&bytes[..5]);
        assert_eq!(assembler.next_buffered(), None);
        assert_eq!(assembler.pending(), 5);
        assert_eq!(assembler.feed_all(&bytes[5..]), vec![good]);
    }

    #[test]
    fn oversized_length_is_rejected_immediately() {
        let good = packet(0x01, &[5, 6]);
        let mut bytes = vec![START_BYTE, 0x00, 0x01, 200];
        bytes.extend(good.encode());

        let mut assembler = FrameAssembler::new();
        assert_eq!(assembler.feed_all(&bytes), vec![good]);
        assert_eq!(assembler.rejected(), 1);
    }

    #[test]
    fn all_zero_stream_yields_nothing() {
        let mut assembler = FrameAssembler::new();
        assert!(assembler.feed_all(&[0u8; 4096]).is_empty());
        assert_eq!(assembler.pending(), 0);
    }

    #[test]
    fn start_bytes_only_never_stall() {
        let good = packet(0x01, &[1]);
        let mut bytes = vec![START_BYTE; 300];
        bytes.extend(good.encode());

        let mut assembler = FrameAssembler::new();
        let packets = assembler.feed_all(&bytes);
        assert!(packets.len() <= 1);
        assert!(assembler.pending() <= MAX_PACKET);

        // Whatever was swallowed, the stream is decodable again afterwards
        assert_eq!(assembler.feed_all(&good.encode()).last(), Some(&good));
    }

    #[test]
    fn random_bytes_only_yield_valid_packets() {
        let mut rng = StdRng::seed_from_u64(0xC0FFEE);
        let mut assembler = FrameAssembler::new();

        for _ in 0..200_000 {
            // Bias towards the start byte so that framing is exercised a lot
            let b = if rng.gen_bool(0.05) { START_BYTE } else { rng.gen() };
            if let Some(p) = assembler.feed(b) {
                let bytes = p.encode();
                assert_eq!(UsbPacket::from_frame(&bytes), Some(p));
            }
            assert!(assembler.pending() <= MAX_PACKET);
        }
    }

    #[test]
    fn reset_discards_partial_packet() {
        let good = packet(0x01, &[1, 2, 3]);
        let bytes = good.encode();

        let mut assembler = FrameAssembler::new();
        assembler.feed_all(&bytes[..4]);
        assert_eq!(assembler.pending(), 4);
        assembler.reset();
        assert_eq!(assembler.pending(), 0);
        assert_eq!(assembler.feed_all(&bytes), vec![good]);
    }
}
