//! Sample organization.
//!
//! Converts a raw frame into a complex data cube:
//!
//! 1. [`deinterleave`] pairs the board's interleaved 16-bit I/Q words into
//!    complex samples.
//! 2. [`reshape`] views the sequence as `(chirps, rx, samples)`.
//! 3. [`separate_transmit_channels`] undoes time-division multiplexing so
//!    each transmit antenna becomes its own group of virtual channels.
//!
//! [`organize_frame`] runs all three for a [`CapturedFrame`].

use ndarray::{Array3, ArrayView2, Axis, Slice};
use num_complex::Complex32;
use tracing::trace;

use crate::types::{CapturedFrame, FrameGeometry};
use crate::{CaptureError, Result};

/// Reconstruct complex samples from the board's raw word order.
///
/// Raw words come in groups of four, `[I0, I1, Q0, Q1]`, producing two complex
/// samples: `out[2n] = raw[4n] + j*raw[4n+2]` and
/// `out[2n+1] = raw[4n+1] + j*raw[4n+3]`.
pub fn deinterleave(raw: &[i16]) -> Result<Vec<Complex32>> {
    if raw.len() % 4 != 0 {
        return Err(CaptureError::shape_mismatch(
            "deinterleave",
            "a multiple of 4 raw samples",
            raw.len(),
        ));
    }

    let mut out = Vec::with_capacity(raw.len() / 2);
    for group in raw.chunks_exact(4) {
        out.push(Complex32::new(f32::from(group[0]), f32::from(group[2])));
        out.push(Complex32::new(f32::from(group[1]), f32::from(group[3])));
    }
    Ok(out)
}

/// Inverse of [`deinterleave`].
///
/// Components are rounded and saturated to `i16`.
pub fn interleave(samples: &[Complex32]) -> Result<Vec<i16>> {
    if samples.len() % 2 != 0 {
        return Err(CaptureError::shape_mismatch(
            "interleave",
            "an even number of complex samples",
            samples.len(),
        ));
    }

    let mut raw = Vec::with_capacity(samples.len() * 2);
    for pair in samples.chunks_exact(2) {
        raw.extend_from_slice(&[
            to_word(pair[0].re),
            to_word(pair[1].re),
            to_word(pair[0].im),
            to_word(pair[1].im),
        ]);
    }
    Ok(raw)
}

fn to_word(value: f32) -> i16 {
    value.round() as i16
}

/// View complex samples as a `(chirps, rx, samples)` cube.
///
/// The element count must match exactly; nothing is truncated or padded.
pub fn reshape(
    samples: Vec<Complex32>,
    chirps: usize,
    rx_channels: usize,
    samples_per_chirp: usize,
) -> Result<Array3<Complex32>> {
    let expected = chirps
        .checked_mul(rx_channels)
        .and_then(|n| n.checked_mul(samples_per_chirp))
        .ok_or_else(|| CaptureError::invalid_geometry("cube dimensions overflow"))?;
    if samples.len() != expected {
        return Err(CaptureError::shape_mismatch(
            format!("reshape to ({}, {}, {})", chirps, rx_channels, samples_per_chirp),
            expected,
            samples.len(),
        ));
    }

    Array3::from_shape_vec((chirps, rx_channels, samples_per_chirp), samples)
        .map_err(|e| CaptureError::shape_mismatch("reshape", expected, e))
}

/// Regroup TDM chirps into virtual channels.
///
/// For each transmit offset `tx` in `0..num_tx`, takes every `num_tx`-th entry
/// along `chirp_axis` starting at `tx`, then concatenates the groups along
/// `virtual_axis` in transmit order. With the default layout this turns
/// `(chirps * tx, rx, samples)` into `(chirps, tx * rx, samples)`.
pub fn separate_transmit_channels(
    cube: &Array3<Complex32>,
    num_tx: usize,
    chirp_axis: usize,
    virtual_axis: usize,
) -> Result<Array3<Complex32>> {
    if num_tx == 0 {
        return Err(CaptureError::shape_mismatch(
            "separate_transmit_channels",
            "num_tx >= 1",
            num_tx,
        ));
    }
    for (name, axis) in [("chirp_axis", chirp_axis), ("virtual_axis", virtual_axis)] {
        if axis >= cube.ndim() {
            return Err(CaptureError::shape_mismatch(
                format!("separate_transmit_channels {}", name),
                format!("axis < {}", cube.ndim()),
                axis,
            ));
        }
    }

    let chirps = cube.len_of(Axis(chirp_axis));
    if chirps % num_tx != 0 {
        return Err(CaptureError::shape_mismatch(
            "separate_transmit_channels",
            format!("chirp count divisible by {}", num_tx),
            chirps,
        ));
    }
    if num_tx == 1 {
        return Ok(cube.clone());
    }

    let groups: Vec<_> = (0..num_tx)
        .map(|tx| cube.slice_axis(Axis(chirp_axis), Slice::new(tx as isize, None, num_tx as isize)))
        .collect();

    ndarray::concatenate(Axis(virtual_axis), &groups)
        .map_err(|e| {
            CaptureError::shape_mismatch("separate_transmit_channels", "equal group shapes", e)
        })
}

/// A frame as `(chirps, virtual_channels, samples)` complex samples.
#[derive(Debug, Clone, PartialEq)]
pub struct OrganizedFrame {
    pub frame_number: u64,
    pub packets_received: u32,
    pub lost_packets: u32,
    pub cube: Array3<Complex32>,
}

impl OrganizedFrame {
    pub fn chirps(&self) -> usize {
        self.cube.len_of(Axis(0))
    }

    pub fn virtual_channels(&self) -> usize {
        self.cube.len_of(Axis(1))
    }

    pub fn samples_per_chirp(&self) -> usize {
        self.cube.len_of(Axis(2))
    }

    /// `(chirps, samples)` view of one virtual channel.
    pub fn channel(&self, index: usize) -> Option<ArrayView2<'_, Complex32>> {
        (index < self.virtual_channels()).then(|| self.cube.index_axis(Axis(1), index))
    }

    pub fn is_complete(&self) -> bool {
        self.lost_packets == 0
    }
}

/// Decode, deinterleave, reshape and separate transmit channels.
pub fn organize_frame(frame: &CapturedFrame, geometry: &FrameGeometry) -> Result<OrganizedFrame> {
    if geometry.iq_components != 2 || geometry.bytes_per_sample != 2 {
        return Err(CaptureError::invalid_geometry(format!(
            "only complex 16-bit samples can be organized (iq_components={}, bytes_per_sample={})",
            geometry.iq_components, geometry.bytes_per_sample
        )));
    }
    let expected_bytes = geometry.bytes_per_frame();
    if frame.data.len() as u64 != expected_bytes {
        return Err(CaptureError::shape_mismatch(
            "frame buffer bytes",
            expected_bytes,
            frame.data.len(),
        ));
    }

    let samples = deinterleave(&frame.samples())?;
    let cube = reshape(
        samples,
        geometry.physical_chirps(),
        geometry.rx_channels as usize,
        geometry.samples_per_chirp as usize,
    )?;
    let cube = separate_transmit_channels(&cube, geometry.tx_channels as usize, 0, 1)?;
    trace!("Organized frame {} into {:?}", frame.frame_number, cube.shape());

    Ok(OrganizedFrame {
        frame_number: frame.frame_number,
        packets_received: frame.packets_received,
        lost_packets: frame.lost_packets,
        cube,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{ramp_samples, samples_to_bytes};
    use proptest::prelude::*;

    fn c(re: f32, im: f32) -> Complex32 {
        Complex32::new(re, im)
    }

    #[test]
    fn deinterleave_pairs_iq_words() {
        let raw = [1, 2, 3, 4, 5, 6, 7, 8];
        let out = deinterleave(&raw).unwrap();
        assert_eq!(out, vec![c(1.0, 3.0), c(2.0, 4.0), c(5.0, 7.0), c(6.0, 8.0)]);
    }

    #[test]
    fn deinterleave_rejects_partial_group() {
        let result = deinterleave(&[1, 2, 3, 4, 5, 6]);
        assert!(matches!(result, Err(CaptureError::ShapeMismatch { .. })));
    }

    #[test]
    fn reshape_never_pads_or_truncates() {
        let samples = vec![c(0.0, 0.0); 2 * 4 * 8];
        assert_eq!(reshape(samples.clone(), 2, 4, 8).unwrap().shape(), &[2, 4, 8]);
        assert!(matches!(
            reshape(samples.clone(), 2, 4, 9),
            Err(CaptureError::ShapeMismatch { .. })
        ));
        assert!(matches!(reshape(samples, 2, 4, 7), Err(CaptureError::ShapeMismatch { .. })));
    }

    #[test]
    fn single_transmitter_is_identity() {
        let samples: Vec<_> = (0..3 * 2 * 4).map(|i| c(i as f32, -(i as f32))).collect();
        let cube = reshape(samples, 3, 2, 4).unwrap();
        assert_eq!(separate_transmit_channels(&cube, 1, 0, 1).unwrap(), cube);
    }

    #[test]
    fn tdm_chirps_become_virtual_channels() {
        // Chirp k carries value k on every sample; tx = k % 2.
        let samples: Vec<_> = (0..4).flat_map(|k| vec![c(k as f32, 0.0); 3 * 2]).collect();
        let cube = reshape(samples, 4, 3, 2).unwrap();

        let separated = separate_transmit_channels(&cube, 2, 0, 1).unwrap();
        assert_eq!(separated.shape(), &[2, 6, 2]);
        for chirp in 0..2 {
            for channel in 0..6 {
                let tx = channel / 3;
                let expected = (chirp * 2 + tx) as f32;
                assert_eq!(
                    separated[[chirp, channel, 0]].re,
                    expected,
                    "chirp {} channel {}",
                    chirp,
                    channel
                );
            }
        }
    }

    #[test]
    fn separation_validates_arguments() {
        let cube = reshape(vec![c(0.0, 0.0); 6 * 2 * 2], 6, 2, 2).unwrap();
        assert!(separate_transmit_channels(&cube, 0, 0, 1).is_err());
        assert!(separate_transmit_channels(&cube, 4, 0, 1).is_err());
        assert!(separate_transmit_channels(&cube, 2, 3, 1).is_err());
        assert!(separate_transmit_channels(&cube, 2, 0, 5).is_err());
        assert_eq!(separate_transmit_channels(&cube, 3, 0, 1).unwrap().shape(), &[2, 6, 2]);
    }

    #[test]
    fn organize_reference_geometry() {
        let geometry = FrameGeometry::new(8, 4, 2, 64).unwrap();
        let raw = ramp_samples(geometry.raw_samples_per_frame() as usize);
        let frame = CapturedFrame {
            data: samples_to_bytes(&raw),
            frame_number: 5,
            start_sequence: 81,
            start_byte_count: 5 * 16384,
            packets_received: 16,
            lost_packets: 0,
        };

        let organized = frame.organize(&geometry).unwrap();
        assert_eq!(organized.cube.shape(), &[8, 8, 64]);
        assert_eq!(organized.frame_number, 5);
        assert!(organized.is_complete());

        // First complex sample of physical chirp 1 (tx 1 of chirp loop 0),
        // rx 0 sits at raw offset 1 * 4 * 64 * 2.
        let base = (4 * 64 * 2) as f32;
        assert_eq!(organized.cube[[0, 4, 0]], c(base, base + 2.0));
        assert_eq!(organized.cube[[0, 0, 1]], c(1.0, 3.0));
        assert_eq!(organized.channel(4).unwrap().shape(), &[8, 64]);
        assert!(organized.channel(8).is_none());
    }

    #[test]
    fn organize_rejects_wrong_frame_size() {
        let geometry = FrameGeometry::new(8, 4, 2, 64).unwrap();
        let frame = CapturedFrame {
            data: vec![0; 1024],
            frame_number: 0,
            start_sequence: 1,
            start_byte_count: 0,
            packets_received: 1,
            lost_packets: 15,
        };
        assert!(matches!(
            organize_frame(&frame, &geometry),
            Err(CaptureError::ShapeMismatch { .. })
        ));
    }

    proptest! {
        #[test]
        fn interleave_inverts_deinterleave(
            groups in prop::collection::vec(any::<[i16; 4]>(), 0..256),
        ) {
            let raw: Vec<i16> = groups.into_iter().flatten().collect();
            let complex = deinterleave(&raw).unwrap();
            prop_assert_eq!(complex.len(), raw.len() / 2);
            prop_assert_eq!(interleave(&complex).unwrap(), raw);
        }
    }
}
