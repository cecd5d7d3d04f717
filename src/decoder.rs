/*
 Copyright (c) 2024 clone206

 This file is part of st2surround

 st2surround is free software: you can redistribute it and/or modify it
 under the terms of the GNU General Public License as published by the
 Free Software Foundation, either version 3 of the License, or
 (at your option) any later version.

 st2surround is distributed in the hope that it will be useful, but
 WITHOUT ANY WARRANTY; without even the implied warranty of
 MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 GNU General Public License for more details.
 You should have received a copy of the GNU General Public License
 along with st2surround. If not, see <https://www.gnu.org/licenses/>.
*/

use std::f64::consts::PI;
use std::sync::Arc;

use realfft::num_complex::Complex;
use realfft::{ComplexToReal, RealFftPlanner, RealToComplex};

use crate::channel_map::{self, ChannelId, ChannelSetup, SetupMap, GRID_RES};
use crate::position;
use crate::soundfield::{clamp_unit, transform_circular_wrap, transform_focus};
use crate::{MyError, MyResult};

const EPSILON: f64 = 1e-6;

/// Frequency-domain stereo to multichannel decoder.
///
/// Consumes fixed blocks of N interleaved stereo frames and emits
/// blocks of N interleaved multichannel frames, delayed by N/2 frames.
/// Each spectral bin is located on the soundfield square from the
/// stereo amplitude and phase cues, steered through the soundfield
/// transforms, and distributed over the speakers of the configured
/// setup via the channel allocation grid. All buffers are sized at
/// construction; decoding allocates nothing.
///
/// One instance is single-threaded state. Parameters may be changed
/// between blocks without reinitialization.
pub struct SurroundDecoder {
    n: usize,
    channels: usize,
    setup: ChannelSetup,
    map: &'static SetupMap,

    // soundfield & rendering parameters
    circular_wrap: f64,
    shift: f64,
    depth: f64,
    focus: f64,
    center_image: f64,
    front_separation: f64,
    rear_separation: f64,
    lo_cut: f64, // LFE band edges, in bins
    hi_cut: f64,
    use_lfe: bool,

    forward: Arc<dyn RealToComplex<f64>>,
    inverse: Arc<dyn ComplexToReal<f64>>,

    wnd: Vec<f64>,                   // sqrt-Hann, normalized for 50% overlap-add
    lt: Vec<f64>,                    // windowed left total (forward FFT scratch)
    rt: Vec<f64>,                    // windowed right total
    dst: Vec<f64>,                   // time-domain synthesis scratch
    lf: Vec<Complex<f64>>,           // left spectrum, N/2+1 bins
    rf: Vec<Complex<f64>>,           // right spectrum
    signal: Vec<Vec<Complex<f64>>>,  // per-channel synthesis spectra
    fwd_scratch: Vec<Complex<f64>>,
    inv_scratch: Vec<Complex<f64>>,

    buffer_empty: bool,
    inbuf: Vec<f32>,  // 3N values; two half-overlapped analysis windows
    outbuf: Vec<f32>, // (N + N/2) * C values, interleaved
}

impl SurroundDecoder {
    /// Create a decoder for `setup` with a processing block size of
    /// `block_size` frames (a power of two, at least 64; typically
    /// 2048 or 4096).
    pub fn new(setup: ChannelSetup, block_size: usize) -> MyResult<Self> {
        if !block_size.is_power_of_two() || block_size < 64 {
            return Err(MyError::Message(format!(
                "Block size must be a power of two >= 64 (got {})",
                block_size
            )));
        }
        let n = block_size;
        let map = channel_map::setup_map(setup);
        let channels = map.channels.len();

        let mut planner = RealFftPlanner::<f64>::new();
        let forward = planner.plan_fft_forward(n);
        let inverse = planner.plan_fft_inverse(n);
        let forward_scratch = forward.make_scratch_vec();
        let inverse_scratch = inverse.make_scratch_vec();

        // sqrt-Hann with 1/sqrt(N) folded in; applied on analysis and
        // synthesis, it makes the unnormalized transform pair and the
        // 50% overlap-add come out at unity gain.
        let wnd = (0..n)
            .map(|k| (0.5 * (1.0 - (2.0 * PI * k as f64 / n as f64).cos()) / n as f64).sqrt())
            .collect();

        let mut decoder = Self {
            n,
            channels,
            setup,
            map,
            circular_wrap: 90.0,
            shift: 0.0,
            depth: 1.0,
            focus: 0.0,
            center_image: 1.0,
            front_separation: 1.0,
            rear_separation: 1.0,
            lo_cut: 0.0,
            hi_cut: 0.0,
            use_lfe: false,
            forward,
            inverse,
            wnd,
            lt: vec![0.0; n],
            rt: vec![0.0; n],
            dst: vec![0.0; n],
            lf: vec![Complex::new(0.0, 0.0); n / 2 + 1],
            rf: vec![Complex::new(0.0, 0.0); n / 2 + 1],
            signal: vec![vec![Complex::new(0.0, 0.0); n / 2 + 1]; channels],
            fwd_scratch: forward_scratch,
            inv_scratch: inverse_scratch,
            buffer_empty: true,
            inbuf: vec![0.0; 3 * n],
            outbuf: vec![0.0; (n + n / 2) * channels],
        };

        // default band matches a 40..90 Hz LFE at 44.1 kHz
        decoder.set_low_cutoff(40.0 / 22050.0)?;
        decoder.set_high_cutoff(90.0 / 22050.0)?;
        Ok(decoder)
    }

    pub fn setup(&self) -> ChannelSetup {
        self.setup
    }

    /// Processing block size in frames.
    pub fn block_size(&self) -> usize {
        self.n
    }

    /// Number of output channels for this decoder's setup.
    pub fn channels(&self) -> usize {
        self.channels
    }

    /// Output channel count of a setup, LFE included.
    pub fn num_channels(setup: ChannelSetup) -> usize {
        setup.num_channels()
    }

    /// Channel identifier at output slot `i` of a setup.
    pub fn channel_at(setup: ChannelSetup, i: usize) -> Option<ChannelId> {
        setup.channel_at(i)
    }

    /// Decode one block of N stereo frames (2N interleaved values).
    /// Returns N multichannel frames, lagging the input by N/2 frames;
    /// the first N/2 frames carry tail energy of the previous block.
    ///
    /// # Panics
    ///
    /// Panics if `input` is not exactly 2N values long.
    pub fn decode(&mut self, input: &[f32]) -> &[f32] {
        assert_eq!(input.len(), 2 * self.n, "decode expects N stereo frames");
        // append the new half-overlapping window pair
        self.inbuf[self.n..3 * self.n].copy_from_slice(input);
        // process both analysis windows of this block
        self.buffered_decode(0);
        self.buffered_decode(self.n);
        // keep the trailing half block for overlap with the next call
        self.inbuf.copy_within(2 * self.n..3 * self.n, 0);
        self.buffer_empty = false;
        &self.outbuf[..self.n * self.channels]
    }

    /// Zero all internal buffers.
    pub fn flush(&mut self) {
        self.inbuf.fill(0.0);
        self.outbuf.fill(0.0);
        self.buffer_empty = true;
    }

    /// Frames of outgoing latency currently buffered: 0 before the
    /// first block (or after a flush), N/2 afterwards.
    pub fn buffered(&self) -> usize {
        if self.buffer_empty {
            0
        } else {
            self.n / 2
        }
    }

    /// Angle of the front soundstage in degrees; 90 is neutral.
    pub fn set_circular_wrap(&mut self, degrees: f64) -> MyResult<()> {
        if !(0.0..=360.0).contains(&degrees) {
            return Err(param_error("circular_wrap", "0..360 degrees", degrees));
        }
        self.circular_wrap = degrees;
        Ok(())
    }

    /// Forward/backward offset of the soundstage; 0 is neutral.
    pub fn set_shift(&mut self, shift: f64) -> MyResult<()> {
        if !(-1.0..=1.0).contains(&shift) {
            return Err(param_error("shift", "-1..1", shift));
        }
        self.shift = shift;
        Ok(())
    }

    /// Backward stretch of the soundstage; 1 is neutral.
    pub fn set_depth(&mut self, depth: f64) -> MyResult<()> {
        if !(0.0..=5.0).contains(&depth) {
            return Err(param_error("depth", "0..5", depth));
        }
        self.depth = depth;
        Ok(())
    }

    /// Localization of sound events; 0 is neutral, positive sharpens.
    pub fn set_focus(&mut self, focus: f64) -> MyResult<()> {
        if !(-1.0..=1.0).contains(&focus) {
            return Err(param_error("focus", "-1..1", focus));
        }
        self.focus = focus;
        Ok(())
    }

    /// Presence of the center speaker. Stored for setup presets; the
    /// center image itself is baked into the allocation grids.
    pub fn set_center_image(&mut self, center_image: f64) -> MyResult<()> {
        if !(0.0..=1.0).contains(&center_image) {
            return Err(param_error("center_image", "0..1", center_image));
        }
        self.center_image = center_image;
        Ok(())
    }

    pub fn center_image(&self) -> f64 {
        self.center_image
    }

    /// Front stereo width; 1 is neutral.
    pub fn set_front_separation(&mut self, separation: f64) -> MyResult<()> {
        if !separation.is_finite() || separation < 0.0 {
            return Err(param_error("front_separation", ">= 0", separation));
        }
        self.front_separation = separation;
        Ok(())
    }

    /// Rear stereo width; 1 is neutral.
    pub fn set_rear_separation(&mut self, separation: f64) -> MyResult<()> {
        if !separation.is_finite() || separation < 0.0 {
            return Err(param_error("rear_separation", ">= 0", separation));
        }
        self.rear_separation = separation;
        Ok(())
    }

    /// Lower edge of the LFE crossfade band, as a fraction of the
    /// Nyquist frequency.
    pub fn set_low_cutoff(&mut self, cutoff: f64) -> MyResult<()> {
        if !(0.0..=1.0).contains(&cutoff) {
            return Err(param_error("low_cutoff", "0..1", cutoff));
        }
        self.lo_cut = cutoff * (self.n / 2) as f64;
        Ok(())
    }

    /// Upper edge of the LFE crossfade band, as a fraction of the
    /// Nyquist frequency.
    pub fn set_high_cutoff(&mut self, cutoff: f64) -> MyResult<()> {
        if !(0.0..=1.0).contains(&cutoff) {
            return Err(param_error("high_cutoff", "0..1", cutoff));
        }
        self.hi_cut = cutoff * (self.n / 2) as f64;
        Ok(())
    }

    /// Enable or disable redirecting low frequencies into the LFE.
    /// Has no effect on setups without an LFE channel.
    pub fn set_bass_redirection(&mut self, use_lfe: bool) {
        self.use_lfe = use_lfe;
    }

    // Decode one analysis window starting at `offset` values into the
    // input buffer and overlap-add it into the output buffer.
    fn buffered_decode(&mut self, offset: usize) {
        let n = self.n;
        let channels = self.channels;
        let full_range = self.map.full_range();

        // demultiplex and apply the window function
        for k in 0..n {
            self.lt[k] = self.wnd[k] * self.inbuf[offset + 2 * k] as f64;
            self.rt[k] = self.wnd[k] * self.inbuf[offset + 2 * k + 1] as f64;
        }

        // map into the spectral domain
        self.forward
            .process_with_scratch(&mut self.lt, &mut self.lf, &mut self.fwd_scratch)
            .expect("forward FFT buffers are sized at construction");
        self.forward
            .process_with_scratch(&mut self.rt, &mut self.rf, &mut self.fwd_scratch)
            .expect("forward FFT buffers are sized at construction");

        // DC and Nyquist stay silent; the inverse transform uses the
        // synthesis rows as scratch, so they must be re-zeroed, as must
        // the LFE bins above the crossfade band.
        let zero = Complex::new(0.0, 0.0);
        for row in self.signal.iter_mut() {
            row[0] = zero;
            row[n / 2] = zero;
        }
        if self.map.has_lfe {
            self.signal[channels - 1].fill(zero);
        }

        // compute the multichannel signal in the spectral domain
        for f in 1..n / 2 {
            let amp_l = self.lf[f].norm();
            let amp_r = self.rf[f].norm();
            let phase_l = self.lf[f].arg();
            let phase_r = self.rf[f].arg();

            // amplitude & phase difference features
            let amp_diff = clamp_unit(if amp_l + amp_r < EPSILON {
                0.0
            } else {
                (amp_r - amp_l) / (amp_r + amp_l)
            });
            let mut phase_diff = (phase_l - phase_r).abs();
            if phase_diff > PI {
                phase_diff = 2.0 * PI - phase_diff;
            }

            // decode into a soundfield position and steer it
            let (mut x, mut y) = position::locate(amp_diff, phase_diff);
            transform_circular_wrap(&mut x, &mut y, self.circular_wrap);
            y = clamp_unit(y - self.shift);
            y = clamp_unit(1.0 - (1.0 - y) * self.depth);
            transform_focus(&mut x, &mut y, self.focus);
            x = clamp_unit(
                x * (self.front_separation * (1.0 + y) / 2.0
                    + self.rear_separation * (1.0 - y) / 2.0),
            );

            let amp_total = (amp_l * amp_l + amp_r * amp_r).sqrt();
            let sum = self.lf[f] + self.rf[f];
            // left / center-mix / right phases, selected per channel
            let phase_of = [phase_l, sum.arg(), phase_r];

            let (i, fx) = map_to_grid(x);
            let (j, fy) = map_to_grid(y);
            for c in 0..full_range {
                let a = &self.map.grid[c];
                let gain = (1.0 - fx) * (1.0 - fy) * a[j][i]
                    + fx * (1.0 - fy) * a[j][i + 1]
                    + (1.0 - fx) * fy * a[j + 1][i]
                    + fx * fy * a[j + 1][i + 1];
                self.signal[c][f] = Complex::from_polar(
                    amp_total * gain,
                    phase_of[self.map.phase[c].index()],
                );
            }

            // optionally redirect bass into the LFE channel
            if self.use_lfe && self.map.has_lfe && (f as f64) < self.hi_cut {
                let lfe_level = if (f as f64) < self.lo_cut {
                    1.0
                } else {
                    0.5 * (1.0
                        + (PI * (f as f64 - self.lo_cut) / (self.hi_cut - self.lo_cut)).cos())
                };
                self.signal[channels - 1][f] =
                    Complex::from_polar(lfe_level * amp_total, phase_of[1]);
                for c in 0..full_range {
                    self.signal[c][f] *= 1.0 - lfe_level;
                }
            }
        }

        // advance the output buffer: shift the trailing 2/3 into the
        // leading 2/3 and clear the freed tail
        let hop = channels * n / 2;
        self.outbuf.copy_within(hop.., 0);
        let len = self.outbuf.len();
        self.outbuf[len - hop..].fill(0.0);

        // back-transform each channel and overlap-add, remultiplexed
        for c in 0..channels {
            self.inverse
                .process_with_scratch(&mut self.signal[c], &mut self.dst, &mut self.inv_scratch)
                .expect("inverse FFT buffers are sized at construction");
            for k in 0..n {
                self.outbuf[channels * (k + n / 2) + c] += (self.wnd[k] * self.dst[k]) as f32;
            }
        }
    }
}

fn param_error(name: &str, range: &str, got: f64) -> MyError {
    MyError::Message(format!("{} must be in {} (got {})", name, range, got))
}

// Index and fractional offset into the allocation grid for one
// soundfield coordinate in [-1, 1].
fn map_to_grid(v: f64) -> (usize, f64) {
    let gp = (v + 1.0) * 0.5 * (GRID_RES - 1) as f64;
    let i = gp.floor().min((GRID_RES - 2) as f64);
    (i as usize, gp - i)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const RATE: f64 = 48000.0;

    fn stereo_block(n: usize, mut f: impl FnMut(usize) -> (f32, f32)) -> Vec<f32> {
        let mut block = vec![0.0; 2 * n];
        for k in 0..n {
            let (l, r) = f(k);
            block[2 * k] = l;
            block[2 * k + 1] = r;
        }
        block
    }

    // per-channel RMS of interleaved output frames
    fn channel_rms(output: &[f32], channels: usize) -> Vec<f64> {
        let frames = output.len() / channels;
        let mut acc = vec![0.0f64; channels];
        for t in 0..frames {
            for c in 0..channels {
                acc[c] += (output[t * channels + c] as f64).powi(2);
            }
        }
        acc.iter().map(|&e| (e / frames as f64).sqrt()).collect()
    }

    // run `blocks` through a fresh decoder and concatenate the output
    fn run(
        setup: ChannelSetup,
        n: usize,
        configure: impl Fn(&mut SurroundDecoder),
        blocks: &[Vec<f32>],
    ) -> Vec<f32> {
        let mut dec = SurroundDecoder::new(setup, n).unwrap();
        configure(&mut dec);
        let mut out = Vec::new();
        for block in blocks {
            out.extend_from_slice(dec.decode(block));
        }
        out
    }

    #[test]
    fn rejects_bad_block_sizes() {
        assert!(SurroundDecoder::new(ChannelSetup::Surround51, 1000).is_err());
        assert!(SurroundDecoder::new(ChannelSetup::Surround51, 32).is_err());
        assert!(SurroundDecoder::new(ChannelSetup::Surround51, 0).is_err());
        assert!(SurroundDecoder::new(ChannelSetup::Surround51, 64).is_ok());
    }

    #[test]
    fn rejects_out_of_range_parameters() {
        let mut dec = SurroundDecoder::new(ChannelSetup::Surround51, 256).unwrap();
        assert!(dec.set_circular_wrap(-1.0).is_err());
        assert!(dec.set_circular_wrap(360.5).is_err());
        assert!(dec.set_shift(1.5).is_err());
        assert!(dec.set_depth(5.1).is_err());
        assert!(dec.set_focus(-1.01).is_err());
        assert!(dec.set_center_image(2.0).is_err());
        assert!(dec.set_front_separation(-0.1).is_err());
        assert!(dec.set_rear_separation(f64::NAN).is_err());
        assert!(dec.set_low_cutoff(1.1).is_err());
        assert!(dec.set_high_cutoff(-0.1).is_err());

        assert!(dec.set_circular_wrap(360.0).is_ok());
        assert!(dec.set_depth(5.0).is_ok());
        assert!(dec.set_front_separation(3.0).is_ok());
        assert!(dec.set_low_cutoff(0.0).is_ok());
        assert!(dec.set_high_cutoff(1.0).is_ok());
    }

    #[test]
    fn setters_are_idempotent() {
        let mut a = SurroundDecoder::new(ChannelSetup::Surround51, 256).unwrap();
        let mut b = SurroundDecoder::new(ChannelSetup::Surround51, 256).unwrap();
        a.set_depth(2.0).unwrap();
        b.set_depth(2.0).unwrap();
        b.set_depth(2.0).unwrap();
        let block = stereo_block(256, |k| ((k as f32 * 0.1).sin(), (k as f32 * 0.07).cos()));
        assert_eq!(a.decode(&block), b.decode(&block));
    }

    #[test]
    #[should_panic(expected = "N stereo frames")]
    fn wrong_block_length_panics() {
        let mut dec = SurroundDecoder::new(ChannelSetup::Surround51, 256).unwrap();
        dec.decode(&[0.0; 100]);
    }

    #[test]
    fn silence_in_silence_out() {
        let n = 2048;
        let zeros = vec![0.0f32; 2 * n];
        let out = run(
            ChannelSetup::Surround51,
            n,
            |_| {},
            &[zeros.clone(), zeros.clone()],
        );
        assert!(out.iter().all(|&v| v == 0.0));
    }

    #[test]
    fn buffered_reports_latency_and_flush_clears_it() {
        let n = 512;
        let mut dec = SurroundDecoder::new(ChannelSetup::Surround51, n).unwrap();
        assert_eq!(dec.buffered(), 0);
        let block = stereo_block(n, |k| ((k as f32 * 0.03).sin(), 0.0));
        dec.decode(&block);
        assert_eq!(dec.buffered(), n / 2);
        dec.decode(&block);
        assert_eq!(dec.buffered(), n / 2);
        dec.flush();
        assert_eq!(dec.buffered(), 0);
        // after a flush the decoder behaves like a fresh instance
        let out = dec.decode(&vec![0.0; 2 * n]).to_vec();
        assert!(out.iter().all(|&v| v == 0.0));
        assert_eq!(dec.buffered(), n / 2);
    }

    #[test]
    fn first_block_output_depends_only_on_first_block() {
        let n = 512;
        let b1 = stereo_block(n, |k| ((k as f32 * 0.11).sin() * 0.5, (k as f32 * 0.05).sin()));
        let b2 = stereo_block(n, |k| ((k as f32 * 0.02).cos(), 0.3));
        let b2_alt = stereo_block(n, |k| (-(k as f32 * 0.09).sin(), 0.1));

        let mut a = SurroundDecoder::new(ChannelSetup::Surround51, n).unwrap();
        let mut b = SurroundDecoder::new(ChannelSetup::Surround51, n).unwrap();
        let a1 = a.decode(&b1).to_vec();
        let b1_out = b.decode(&b1).to_vec();
        assert_eq!(a1, b1_out);

        let a2 = a.decode(&b2).to_vec();
        let b2_out = b.decode(&b2_alt).to_vec();
        assert_ne!(a2, b2_out);
    }

    #[test]
    fn hard_left_impulse_lands_on_front_left() {
        let n = 2048;
        let mut impulse = vec![0.0f32; 2 * n];
        impulse[2 * (n / 2)] = 1.0; // left channel, frame N/2
        let zeros = vec![0.0f32; 2 * n];
        let out = run(ChannelSetup::Surround51, n, |_| {}, &[impulse, zeros]);

        let channels = 6;
        // the impulse re-emerges N/2 frames late: emitted frame N
        let peak_frame = n;
        let fl_peak = out[peak_frame * channels].abs();
        assert!(fl_peak > 0.9, "front-left peak {}", fl_peak);

        let rms = channel_rms(&out, channels);
        assert!(rms[2] < 0.05 * fl_peak as f64, "front_right {}", rms[2]); // front_right
        assert!(rms[3] < 0.05 * fl_peak as f64, "back_left {}", rms[3]);
        assert!(rms[4] < 0.05 * fl_peak as f64, "back_right {}", rms[4]);
    }

    #[test]
    fn in_phase_sine_centers_with_flanks_six_db_down() {
        let n = 2048;
        let omega = 2.0 * std::f64::consts::PI * 1000.0 / RATE;
        let blocks: Vec<Vec<f32>> = (0..4)
            .map(|b| {
                stereo_block(n, |k| {
                    let s = ((b * n + k) as f64 * omega).sin() as f32 * 0.5;
                    (s, s)
                })
            })
            .collect();
        let out = run(ChannelSetup::Surround51, n, |_| {}, &blocks);

        // skip the first block (latency ramp-in)
        let channels = 6;
        let rms = channel_rms(&out[n * channels..], channels);
        let (fl, c, fr) = (rms[0], rms[1], rms[2]);
        assert!((c / fl - 2.0).abs() < 0.1, "center/left ratio {}", c / fl);
        assert!((c / fr - 2.0).abs() < 0.1, "center/right ratio {}", c / fr);
        assert!(rms[3] < 0.1 * c, "back_left {}", rms[3]);
        assert!(rms[4] < 0.1 * c, "back_right {}", rms[4]);
        assert!(rms[5] == 0.0, "lfe silent without bass redirection");
    }

    #[test]
    fn anti_phase_sine_steers_to_the_rear() {
        let n = 2048;
        let omega = 2.0 * std::f64::consts::PI * 700.0 / RATE;
        let blocks: Vec<Vec<f32>> = (0..4)
            .map(|b| {
                stereo_block(n, |k| {
                    let s = ((b * n + k) as f64 * omega).sin() as f32 * 0.5;
                    (s, -s)
                })
            })
            .collect();
        let out = run(ChannelSetup::Surround51, n, |_| {}, &blocks);

        let channels = 6;
        let rms = channel_rms(&out[n * channels..], channels);
        let (bl, br) = (rms[3], rms[4]);
        assert!(bl > 0.2 && br > 0.2, "rears {} {}", bl, br);
        assert!((bl / br - 1.0).abs() < 0.05, "rear balance {}", bl / br);
        assert!(rms[1] < 0.05 * bl, "center {}", rms[1]);
        assert!(rms[0] < 0.05 * bl, "front_left {}", rms[0]);
        assert!(rms[2] < 0.05 * bl, "front_right {}", rms[2]);
    }

    #[test]
    fn bass_redirection_collects_low_frequencies_in_the_lfe() {
        let n = 4096;
        let omega = 2.0 * std::f64::consts::PI * 30.0 / RATE;
        let blocks: Vec<Vec<f32>> = (0..4)
            .map(|b| {
                stereo_block(n, |k| {
                    let s = ((b * n + k) as f64 * omega).sin() as f32 * 0.5;
                    (s, s)
                })
            })
            .collect();
        let nyquist = RATE / 2.0;
        let out = run(
            ChannelSetup::Surround51,
            n,
            |dec| {
                dec.set_bass_redirection(true);
                dec.set_low_cutoff(40.0 / nyquist).unwrap();
                dec.set_high_cutoff(90.0 / nyquist).unwrap();
            },
            &blocks,
        );

        let channels = 6;
        let rms = channel_rms(&out[n * channels..], channels);
        let lfe = rms[5];
        assert!(lfe > 0.2, "lfe {}", lfe);
        for (c, &level) in rms.iter().enumerate().take(5) {
            assert!(level < 0.3 * lfe, "channel {} leaks {} vs lfe {}", c, level, lfe);
        }
    }

    #[test]
    fn circular_wrap_180_doubles_a_panned_source_angle() {
        let n = 2048;
        let omega = 2.0 * std::f64::consts::PI * 3000.0 / RATE;
        let blocks: Vec<Vec<f32>> = (0..4)
            .map(|b| {
                stereo_block(n, |k| {
                    (0.0, ((b * n + k) as f64 * omega).sin() as f32 * 0.5)
                })
            })
            .collect();
        // cs_7point1 order: fl, c, fr, scl, scr, bl, br, lfe
        let out = run(
            ChannelSetup::Surround71,
            n,
            |dec| dec.set_circular_wrap(180.0).unwrap(),
            &blocks,
        );

        let channels = 8;
        let rms = channel_rms(&out[n * channels..], channels);
        let scr = rms[4];
        assert!(scr > 0.2, "side_center_right {}", scr);
        assert!(scr > 2.0 * rms[2], "front_right {}", rms[2]);
        assert!(scr > 2.0 * rms[6], "back_right {}", rms[6]);
        assert!(rms[0] < 0.1 * scr, "front_left {}", rms[0]);
        assert!(rms[3] < 0.1 * scr, "side_center_left {}", rms[3]);
    }

    #[test]
    fn broadband_energy_is_preserved() {
        let n = 512;
        let blocks = 40;
        let mut rng = StdRng::seed_from_u64(0x5157_2601);
        let mut input_energy = 0.0f64;
        let mut dec = SurroundDecoder::new(ChannelSetup::Surround51, n).unwrap();
        let mut output_energy = 0.0f64;

        for _ in 0..blocks {
            let block = stereo_block(n, |_| {
                let s = (rng.gen::<f64>() - 0.5) as f32;
                (s, s)
            });
            input_energy += block.iter().map(|&v| (v as f64).powi(2)).sum::<f64>();
            output_energy += dec
                .decode(&block)
                .iter()
                .map(|&v| (v as f64).powi(2))
                .sum::<f64>();
        }
        // flush out the overlap tail
        let zeros = vec![0.0f32; 2 * n];
        for _ in 0..2 {
            output_energy += dec
                .decode(&zeros)
                .iter()
                .map(|&v| (v as f64).powi(2))
                .sum::<f64>();
        }

        let ratio = output_energy / input_energy;
        assert!((ratio - 1.0).abs() < 0.01, "energy ratio {}", ratio);
    }

    #[test]
    fn static_channel_queries_match_the_setup() {
        assert_eq!(SurroundDecoder::num_channels(ChannelSetup::Surround71), 8);
        assert_eq!(
            SurroundDecoder::channel_at(ChannelSetup::Surround71, 7),
            Some(ChannelId::Lfe)
        );
        assert_eq!(SurroundDecoder::channel_at(ChannelSetup::Surround71, 8), None);
        let dec = SurroundDecoder::new(ChannelSetup::Stereo3, 128).unwrap();
        assert_eq!(dec.channels(), 3);
        assert_eq!(dec.block_size(), 128);
        assert_eq!(dec.setup(), ChannelSetup::Stereo3);
    }
}
