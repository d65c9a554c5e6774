//! Core sample and stream-layout types.
//!
//! Samples are fixed-point 16-bit signed integers throughout: the front end's
//! DAC consumes 12-bit values in an i16 container ("SC16 Q11"), and nothing
//! in the transmit path needs floating point. Buffers are interleaved
//! I,Q,I,Q,… in channel order defined by [`ChannelLayout`].

use serde::{Deserialize, Serialize};

/// One I or Q component, fixed-point signed 16-bit.
pub type Sample = i16;

/// An interleaved I,Q buffer for a single channel. Length is always
/// `2 * buffer_size_samples`.
pub type SampleBuffer = Vec<Sample>;

/// How many transmit channels share one hardware transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelLayout {
    /// Single TX channel.
    Tx1,
    /// Two TX channels, samples interleaved per time slot.
    Tx2,
}

impl ChannelLayout {
    /// Layout for the given channel count, if supported by the front end.
    pub fn for_channel_count(n: usize) -> Option<Self> {
        match n {
            1 => Some(ChannelLayout::Tx1),
            2 => Some(ChannelLayout::Tx2),
            _ => None,
        }
    }

    /// Number of channels packed into one transfer.
    pub fn channel_count(&self) -> usize {
        match self {
            ChannelLayout::Tx1 => 1,
            ChannelLayout::Tx2 => 2,
        }
    }
}

/// On-the-wire sample format handed to the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SampleFormat {
    /// Signed 16-bit I and Q, little-endian, interpreted as Q11 fixed point.
    #[default]
    Sc16Q11,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_for_channel_count() {
        assert_eq!(ChannelLayout::for_channel_count(1), Some(ChannelLayout::Tx1));
        assert_eq!(ChannelLayout::for_channel_count(2), Some(ChannelLayout::Tx2));
        assert_eq!(ChannelLayout::for_channel_count(0), None);
        assert_eq!(ChannelLayout::for_channel_count(3), None);
    }

    #[test]
    fn test_layout_channel_count_roundtrip() {
        for n in 1..=2 {
            assert_eq!(ChannelLayout::for_channel_count(n).unwrap().channel_count(), n);
        }
    }
}
