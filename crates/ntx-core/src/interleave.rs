//! # Transfer-Buffer Interleaving
//!
//! Merges per-channel interleaved I,Q buffers into the single hardware-bound
//! transfer buffer. The wire format is a contract with the front end and must
//! be reproduced exactly: slot-major, channel-minor, I before Q. For two
//! channels the transfer reads
//!
//! ```text
//! ch0.I[0], ch0.Q[0], ch1.I[0], ch1.Q[0], ch0.I[1], ch0.Q[1], …
//! ```
//!
//! For a single channel the merge is the identity transform.
//!
//! Mismatched input lengths are a programming error, not a runtime
//! condition, and panic.

use crate::types::{Sample, SampleBuffer};

/// Merge per-channel buffers into one transfer buffer, allocating the output.
///
/// # Panics
///
/// Panics if `channels` is empty, if any buffer has an odd length, or if the
/// buffer lengths differ.
pub fn interleave_channels(channels: &[&[Sample]]) -> SampleBuffer {
    let mut out = Vec::new();
    interleave_into(channels, &mut out);
    out
}

/// Merge per-channel buffers into `out`, clearing it first. Lets the
/// streaming loop reuse one transfer allocation across iterations.
///
/// # Panics
///
/// Same preconditions as [`interleave_channels`].
pub fn interleave_into(channels: &[&[Sample]], out: &mut SampleBuffer) {
    assert!(!channels.is_empty(), "interleave requires at least one channel");
    let len = channels[0].len();
    assert!(len % 2 == 0, "channel buffers hold I,Q pairs; odd length {}", len);
    for (c, ch) in channels.iter().enumerate() {
        assert!(
            ch.len() == len,
            "channel {} buffer length {} differs from channel 0 length {}",
            c,
            ch.len(),
            len
        );
    }

    out.clear();
    out.reserve(len * channels.len());
    if channels.len() == 1 {
        out.extend_from_slice(channels[0]);
        return;
    }
    for slot in 0..len / 2 {
        for ch in channels {
            out.push(ch[2 * slot]);
            out.push(ch[2 * slot + 1]);
        }
    }
}

/// Split a transfer buffer back into per-channel buffers. Inverse of
/// [`interleave_channels`]; used to verify transmitted transfers.
///
/// # Panics
///
/// Panics if `num_channels` is zero or the buffer length is not a multiple
/// of `2 * num_channels`.
pub fn deinterleave_channels(transfer: &[Sample], num_channels: usize) -> Vec<SampleBuffer> {
    assert!(num_channels > 0, "deinterleave requires at least one channel");
    assert!(
        transfer.len() % (2 * num_channels) == 0,
        "transfer length {} is not a whole number of {}-channel slots",
        transfer.len(),
        num_channels
    );

    let slots = transfer.len() / (2 * num_channels);
    let mut out = vec![Vec::with_capacity(2 * slots); num_channels];
    for slot in 0..slots {
        for (c, ch) in out.iter_mut().enumerate() {
            let base = 2 * (slot * num_channels + c);
            ch.push(transfer[base]);
            ch.push(transfer[base + 1]);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_channel_slot_major_order() {
        // ch0: I=10,12 Q=11,13  ch1: I=20,22 Q=21,23
        let ch0 = vec![10, 11, 12, 13];
        let ch1 = vec![20, 21, 22, 23];
        let out = interleave_channels(&[&ch0, &ch1]);
        assert_eq!(out, vec![10, 11, 20, 21, 12, 13, 22, 23]);
    }

    #[test]
    fn test_two_channel_lengths_and_slots() {
        let n = 8;
        let ch0: Vec<i16> = (0..2 * n as i16).collect();
        let ch1: Vec<i16> = (100..100 + 2 * n as i16).collect();
        let out = interleave_channels(&[&ch0, &ch1]);
        assert_eq!(out.len(), 4 * n);
        for s in 0..n {
            let quad = &out[4 * s..4 * s + 4];
            assert_eq!(quad, [ch0[2 * s], ch0[2 * s + 1], ch1[2 * s], ch1[2 * s + 1]]);
        }
    }

    #[test]
    fn test_single_channel_is_identity() {
        let ch0 = vec![1, -2, 3, -4, 5, -6];
        assert_eq!(interleave_channels(&[&ch0]), ch0);
    }

    #[test]
    #[should_panic(expected = "length")]
    fn test_mismatched_lengths_panic() {
        let ch0 = vec![1, 2, 3, 4];
        let ch1 = vec![5, 6];
        interleave_channels(&[&ch0, &ch1]);
    }

    #[test]
    #[should_panic(expected = "at least one channel")]
    fn test_empty_input_panics() {
        interleave_channels(&[]);
    }

    #[test]
    fn test_deinterleave_inverts_interleave() {
        let ch0 = vec![1, 2, 3, 4, 5, 6];
        let ch1 = vec![-1, -2, -3, -4, -5, -6];
        let transfer = interleave_channels(&[&ch0, &ch1]);
        let split = deinterleave_channels(&transfer, 2);
        assert_eq!(split, vec![ch0, ch1]);
    }

    #[test]
    fn test_interleave_into_reuses_buffer() {
        let ch0 = vec![1, 2];
        let ch1 = vec![3, 4];
        let mut out = vec![9; 64];
        interleave_into(&[&ch0, &ch1], &mut out);
        assert_eq!(out, vec![1, 2, 3, 4]);
    }
}
