//! ==============================================================================
//! parser.rs - serial frame parser
//! ==============================================================================
//!
//! purpose:
//!     turns the raw serial byte stream into readings. the remote sensor
//!     prints "<temp>,<hum>\r\n" (sometimes wrapped in braces) every ~10s.
//!     chunks arrive with arbitrary boundaries, so bytes are accumulated as
//!     upper-case hex pairs until a 0D 0A terminator shows up.
//!
//! frame handling:
//!     - the hex pairs before the terminator are decoded back to characters
//!     - anything that is not ascii alphanumeric, '.' or ',' is dropped
//!     - the rest is split on the comma and parsed as two floats
//!     - a frame that does not parse produces nothing (the sensor has no
//!       checksum, garbage lines are normal)
//!
//! relationships:
//!     - driven by: serial.rs (reader loop feeds chunks)
//!     - produces: domain.rs Reading (handed to cache.rs by the reader loop)
//!
//! ==============================================================================

use crate::domain::Reading;
use tracing::{debug, warn};

/// hex form of the "\r\n" frame terminator
const TERMINATOR_HEX: &str = "0D0A";

/// default cap on raw bytes buffered while waiting for a terminator
pub const DEFAULT_MAX_BUFFER_BYTES: usize = 1024;

pub struct FrameParser {
    /// upper-case hex pairs seen since the last terminator
    buffer: String,
    max_buffer_bytes: usize,
}

impl FrameParser {
    pub fn new(max_buffer_bytes: usize) -> Self {
        Self {
            buffer: String::new(),
            max_buffer_bytes: max_buffer_bytes.max(1),
        }
    }

    /// feed a chunk of serial bytes
    ///
    /// returns every reading completed by this chunk, in arrival order.
    /// malformed frames are consumed and silently dropped.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<Reading> {
        self.buffer.push_str(&hex::encode_upper(chunk));

        let mut readings = Vec::new();
        while let Some(end) = find_terminator(&self.buffer) {
            let frame: String = self.buffer.drain(..end + TERMINATOR_HEX.len()).collect();
            let text = decode_readable(&frame[..end]);
            match parse_frame(&text) {
                Some((temperature, humidity)) => {
                    readings.push(Reading::now(temperature, humidity));
                }
                None => debug!(frame = %text, "discarding malformed frame"),
            }
        }

        if self.buffered_bytes() > self.max_buffer_bytes {
            warn!(
                buffered = self.buffered_bytes(),
                cap = self.max_buffer_bytes,
                "no frame terminator within cap, dropping buffered bytes"
            );
            self.buffer.clear();
        }

        readings
    }

    /// raw bytes currently waiting for a terminator
    pub fn buffered_bytes(&self) -> usize {
        self.buffer.len() / 2
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BUFFER_BYTES)
    }
}

/// position of the first terminator that starts on a byte boundary
fn find_terminator(hex_pairs: &str) -> Option<usize> {
    hex_pairs
        .match_indices(TERMINATOR_HEX)
        .map(|(i, _)| i)
        .find(|i| i % 2 == 0)
}

/// hex pairs -> readable string, keeping only digits, letters, '.' and ','
fn decode_readable(hex_pairs: &str) -> String {
    hex::decode(hex_pairs)
        .unwrap_or_default()
        .into_iter()
        .filter(|b| b.is_ascii_alphanumeric() || *b == b'.' || *b == b',')
        .map(char::from)
        .collect()
}

/// "<temp>,<hum>" -> (temp, hum)
fn parse_frame(text: &str) -> Option<(f64, f64)> {
    let (temp, hum) = text.split_once(',')?;
    let temperature: f64 = temp.parse().ok()?;
    let humidity: f64 = hum.parse().ok()?;
    if !temperature.is_finite() || !humidity.is_finite() {
        return None;
    }
    Some((temperature, humidity))
}

// ==============================================================================
// tests
// ==============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_frame() {
        let mut parser = FrameParser::default();
        let readings = parser.feed(b"21.5,40.0\r\n");
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].temperature, 21.5);
        assert_eq!(readings[0].humidity, 40.0);
        assert_eq!(readings[0].id, 0);
        assert_eq!(parser.buffered_bytes(), 0);
    }

    #[test]
    fn test_frame_split_across_chunks() {
        let mut parser = FrameParser::default();
        let mut readings = Vec::new();
        for b in b"22.25,55.5\r\n" {
            readings.extend(parser.feed(&[*b]));
        }
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].temperature, 22.25);
        assert_eq!(readings[0].humidity, 55.5);
    }

    #[test]
    fn test_terminator_split_between_chunks() {
        let mut parser = FrameParser::default();
        assert!(parser.feed(b"18.0,60.0\r").is_empty());
        assert_eq!(parser.buffered_bytes(), 10);
        let readings = parser.feed(b"\n");
        assert_eq!(readings.len(), 1);
        assert_eq!(parser.buffered_bytes(), 0);
    }

    #[test]
    fn test_malformed_frame_is_discarded() {
        let mut parser = FrameParser::default();
        assert!(parser.feed(b"ab,3.0\r\n").is_empty());
        assert_eq!(parser.buffered_bytes(), 0);

        // the parser keeps working afterwards
        let readings = parser.feed(b"1.0,2.0\r\n");
        assert_eq!(readings.len(), 1);
    }

    #[test]
    fn test_missing_comma_and_empty_frames() {
        let mut parser = FrameParser::default();
        assert!(parser.feed(b"21.5\r\n").is_empty());
        assert!(parser.feed(b"\r\n").is_empty());
        assert!(parser.feed(b",\r\n").is_empty());
        assert!(parser.feed(b"1.0,2.0,3.0\r\n").is_empty());
    }

    #[test]
    fn test_non_finite_values_are_discarded() {
        let mut parser = FrameParser::default();
        assert!(parser.feed(b"NaN,40.0\r\n").is_empty());
        assert!(parser.feed(b"21.0,inf\r\n").is_empty());
    }

    #[test]
    fn test_decorations_are_dropped() {
        let mut parser = FrameParser::default();
        let readings = parser.feed(b"{ 23.4 , 45.6 }\r\n");
        assert_eq!(readings.len(), 1);
        assert_eq!(readings[0].temperature, 23.4);
        assert_eq!(readings[0].humidity, 45.6);
    }

    #[test]
    fn test_several_frames_in_one_chunk() {
        let mut parser = FrameParser::default();
        let readings = parser.feed(b"1.0,2.0\r\nxx,yy\r\n3.0,4.0\r\n5.0,");
        assert_eq!(readings.len(), 2);
        assert_eq!(readings[0].temperature, 1.0);
        assert_eq!(readings[1].temperature, 3.0);
        // "5.0," is still waiting for its terminator
        assert_eq!(parser.buffered_bytes(), 4);
    }

    #[test]
    fn test_misaligned_terminator_pattern_is_ignored() {
        // 0x30 0xD0 0xA1 encodes to "30D0A1" which contains "0D0A" at an odd index
        let mut parser = FrameParser::default();
        assert!(parser.feed(&[0x30, 0xD0, 0xA1]).is_empty());
        assert_eq!(parser.buffered_bytes(), 3);
    }

    #[test]
    fn test_overflow_clears_buffer() {
        let mut parser = FrameParser::new(8);
        assert!(parser.feed(b"123456789").is_empty());
        assert_eq!(parser.buffered_bytes(), 0);

        let readings = parser.feed(b"1.5,2.5\r\n");
        assert_eq!(readings.len(), 1);
    }

    #[test]
    fn test_reset() {
        let mut parser = FrameParser::default();
        parser.feed(b"12.0,");
        parser.reset();
        assert_eq!(parser.buffered_bytes(), 0);
        assert!(parser.feed(b"\r\n").is_empty());
    }
}
