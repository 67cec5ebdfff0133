//! Resynchronizing framer for the 58-byte rack telemetry wire format.
//!
//! Frames carry no length prefix; framing relies entirely on re-anchoring
//! at the ASCII MAC identifier that opens every frame. Devices may resume a
//! TCP stream mid-frame after a restart, and junk bytes may precede the
//! first valid frame, so the decoder scans the accumulator for the first
//! MAC-shaped substring and discards whatever precedes it rather than
//! tearing down the connection.
//!
//! Structural assumption of the wire format: a frame payload never legally
//! contains a MAC-pattern-like byte sequence, so anchoring on the first
//! match is correct even in misaligned data.

use bytes::{Buf, BytesMut};

/// Total size of one telemetry frame on the wire.
pub const FRAME_LEN: usize = 58;

/// Length of the ASCII MAC identifier that opens a frame.
pub const MAC_LEN: usize = 17;

/// Byte offsets of each field within a frame. All multi-byte fields are
/// little-endian. Keeping the layout in one table makes an offset change a
/// one-place edit.
pub mod layout {
    pub const MAC: usize = 0; // 17 ASCII bytes, xx:xx:xx:xx:xx:xx
    pub const HUMIDITY: usize = 17; // f32
    pub const INSIDE_TEMPERATURE: usize = 21; // f32
    pub const OUTSIDE_TEMPERATURE: usize = 25; // f32
    pub const LOCK_STATUS: usize = 29;
    pub const DOOR_STATUS: usize = 30;
    pub const WATER_LOGGING: usize = 31;
    pub const WATER_LEAKAGE: usize = 32;
    pub const OUTPUT_VOLTAGE: usize = 33; // f32
    pub const INPUT_VOLTAGE: usize = 37; // f32
    pub const BATTERY_BACKUP: usize = 41; // f32
    pub const ALARM_ACTIVE: usize = 45;
    pub const FIRE_ALARM: usize = 46;
    pub const FAN_LEVEL_RUNNING: usize = 47; // ..=50, one byte per level
    pub const CONTROL: usize = 51;
    pub const FAN_STATUS: usize = 52; // u16, six 2-bit health fields
    pub const EXTENDED_STATUS: usize = 54; // u32
}

// ---

/// One validated 58-byte frame pulled out of the stream.
///
/// Transient by design: consumed immediately by the telemetry translator,
/// never retained past one decode iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RawFrame([u8; FRAME_LEN]);

impl RawFrame {
    pub fn mac_bytes(&self) -> &[u8] {
        &self.0[layout::MAC..MAC_LEN]
    }

    pub fn byte_at(&self, offset: usize) -> u8 {
        self.0[offset]
    }

    pub fn f32_at(&self, offset: usize) -> f32 {
        let bytes: [u8; 4] = self.0[offset..offset + 4].try_into().unwrap();
        f32::from_le_bytes(bytes)
    }

    pub fn u16_at(&self, offset: usize) -> u16 {
        let bytes: [u8; 2] = self.0[offset..offset + 2].try_into().unwrap();
        u16::from_le_bytes(bytes)
    }

    pub fn u32_at(&self, offset: usize) -> u32 {
        let bytes: [u8; 4] = self.0[offset..offset + 4].try_into().unwrap();
        u32::from_le_bytes(bytes)
    }

    #[cfg(test)]
    pub fn from_bytes(bytes: [u8; FRAME_LEN]) -> Self {
        RawFrame(bytes)
    }
}

/// Per-connection decode statistics, surfaced through tracing.
#[derive(Debug, Default, Clone, Copy)]
pub struct DecoderStats {
    pub frames: u64,
    pub discarded_bytes: u64,
    pub malformed_frames: u64,
}

/// Stateful per-connection frame decoder.
///
/// Feed arbitrary chunks with [`push`](FrameDecoder::push), then drain whole
/// frames with [`next_frame`](FrameDecoder::next_frame) until it returns
/// `None`. The decode sequence is independent of how the stream was split
/// into chunks.
pub struct FrameDecoder {
    buf: BytesMut,
    stats: DecoderStats,
}

impl FrameDecoder {
    pub fn new() -> Self {
        FrameDecoder {
            buf: BytesMut::with_capacity(4 * FRAME_LEN),
            stats: DecoderStats::default(),
        }
    }

    /// Append newly arrived bytes to the accumulator.
    pub fn push(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub fn stats(&self) -> DecoderStats {
        self.stats
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Attempt to extract the next complete frame.
    ///
    /// Resynchronization:
    /// - junk before the first MAC-shaped substring is discarded;
    /// - if no MAC shape appears anywhere, the accumulator is corrupt noise
    ///   and is discarded except for a tail shorter than one MAC, which may
    ///   still be the prefix of an identifier split across chunks;
    /// - an anchored identifier that is MAC-shaped but fails strict hex
    ///   validation marks the frame malformed; it is skipped whole
    ///   (58 bytes, not 1) so the same garbage is not re-matched.
    pub fn next_frame(&mut self) -> Option<RawFrame> {
        loop {
            if self.buf.len() < FRAME_LEN {
                return None;
            }

            let Some(start) = find_mac(&self.buf) else {
                let keep = MAC_LEN - 1;
                let discard = self.buf.len() - keep;
                tracing::warn!("no MAC found in buffer, discarding {discard} bytes");
                self.stats.discarded_bytes += discard as u64;
                self.buf.advance(discard);
                return None;
            };

            if start > 0 {
                tracing::warn!("discarding {start} bytes of junk before MAC");
                self.stats.discarded_bytes += start as u64;
                self.buf.advance(start);
                continue;
            }

            if !is_strict_mac(&self.buf[..MAC_LEN]) {
                tracing::warn!("dropping frame with malformed MAC");
                self.stats.malformed_frames += 1;
                self.stats.discarded_bytes += FRAME_LEN as u64;
                self.buf.advance(FRAME_LEN);
                continue;
            }

            let mut frame = [0u8; FRAME_LEN];
            frame.copy_from_slice(&self.buf[..FRAME_LEN]);
            self.buf.advance(FRAME_LEN);
            self.stats.frames += 1;
            return Some(RawFrame(frame));
        }
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}

// ---

/// Find the first offset where a MAC-shaped 17-byte window begins.
///
/// Shape checks only the colon skeleton; the decode loop re-validates the
/// anchored window strictly and skips the whole frame when it fails.
fn find_mac(buf: &[u8]) -> Option<usize> {
    if buf.len() < MAC_LEN {
        return None;
    }
    (0..=buf.len() - MAC_LEN).find(|&i| is_mac_shaped(&buf[i..i + MAC_LEN]))
}

/// Colon skeleton of `XX:XX:XX:XX:XX:XX`: separators in place, no stray
/// colons elsewhere.
fn is_mac_shaped(window: &[u8]) -> bool {
    window.len() == MAC_LEN
        && window
            .iter()
            .enumerate()
            .all(|(i, &b)| (b == b':') == (i % 3 == 2))
}

/// Validate a 17-byte window as exactly `XX:XX:XX:XX:XX:XX` hex.
fn is_strict_mac(window: &[u8]) -> bool {
    if window.len() != MAC_LEN {
        return false;
    }
    window.iter().enumerate().all(|(i, &b)| {
        if i % 3 == 2 {
            b == b':'
        } else {
            b.is_ascii_hexdigit()
        }
    })
}
