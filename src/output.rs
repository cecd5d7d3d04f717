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

use std::io::{self, Write};
use std::path::PathBuf;

use log::{info, warn};

use crate::audio_file::{AudioFile, AudioFileFormat, AudioSample};
use crate::{MyError, MyResult};

/// Sink for decoded multichannel frames: packed samples on stdout, or
/// an accumulated WAV file saved at the end of the stream. Applies the
/// dB level trim and accounts for clipping either way.
pub struct OutputContext {
    pub bits: i32,
    pub channels_num: u32,
    pub rate: u32,
    pub bytes_per_sample: i32,
    pub output: char, // 's' stdout, 'w' wav
    pub path: Option<PathBuf>,
    pub scale_factor: f64,

    file: Option<AudioFile<f32>>,
    stdout_buf: Vec<u8>,
    clipped_samples: u64,
    peak: f64,
    frames_written: u64,
}

impl OutputContext {
    pub fn new(
        out_bits: i32,
        out_type: char,
        out_vol: f64,
        out_path: Option<PathBuf>,
    ) -> MyResult<Self> {
        if ![16, 24, 32].contains(&out_bits) {
            return Err("Unsupported bit depth".into());
        }

        let output = out_type.to_ascii_lowercase();
        if !['s', 'w'].contains(&output) {
            return Err("Unrecognized output type".into());
        }

        if output == 's' && out_path.is_some() {
            return Err("Cannot specify output path when outputting to stdout".into());
        }

        if let Some(p) = &out_path {
            if !p.exists() {
                return Err(MyError::Message(format!(
                    "Specified output path does not exist: {}",
                    p.display()
                )));
            }
        }

        let bytes_per_sample = out_bits / 8;

        Ok(Self {
            bits: out_bits,
            channels_num: 0,
            rate: 0,
            bytes_per_sample,
            output,
            path: out_path,
            scale_factor: 10.0f64.powf(out_vol / 20.0),
            file: None,
            stdout_buf: Vec::new(),
            clipped_samples: 0,
            peak: 0.0,
            frames_written: 0,
        })
    }

    /// Fix the channel count and rate before the first block.
    pub fn init(&mut self, rate: u32, channels_num: u32) {
        self.rate = rate;
        self.channels_num = channels_num;
        self.clipped_samples = 0;
        self.peak = 0.0;
        self.frames_written = 0;
        if self.output == 'w' {
            let mut file: AudioFile<f32> = AudioFile::new();
            file.set_num_channels(channels_num as usize);
            file.set_bit_depth(self.bits);
            file.set_sample_rate(rate);
            self.file = Some(file);
        }
    }

    /// Consume interleaved multichannel frames.
    pub fn push_block(&mut self, samples: &[f32]) -> MyResult<()> {
        let channels = self.channels_num as usize;
        debug_assert!(channels > 0 && samples.len() % channels == 0);

        if self.output == 's' {
            self.stdout_buf.clear();
            self.stdout_buf
                .reserve(samples.len() * self.bytes_per_sample as usize);
        }

        for (idx, &raw) in samples.iter().enumerate() {
            let scaled = raw as f64 * self.scale_factor;
            if scaled.abs() > self.peak {
                self.peak = scaled.abs();
            }
            let mut v = scaled as f32;
            if !(-1.0..=1.0).contains(&v) {
                self.clipped_samples += 1;
                v = v.clamp(-1.0, 1.0);
            }

            if self.output == 's' {
                self.pack_sample(v);
            } else if let Some(file) = &mut self.file {
                file.samples[idx % channels].push(v);
            }
        }

        self.frames_written += (samples.len() / channels) as u64;
        if self.output == 's' {
            let stdout = io::stdout();
            let mut lock = stdout.lock();
            lock.write_all(&self.stdout_buf)?;
            lock.flush()?;
        }
        Ok(())
    }

    fn pack_sample(&mut self, v: f32) {
        match self.bits {
            16 => self.stdout_buf.extend_from_slice(&v.to_i16().to_le_bytes()),
            24 => {
                let value = v.to_i24();
                self.stdout_buf.extend_from_slice(&[
                    (value & 0xFF) as u8,
                    ((value >> 8) & 0xFF) as u8,
                    ((value >> 16) & 0xFF) as u8,
                ]);
            }
            _ => self.stdout_buf.extend_from_slice(&v.to_le_bytes()),
        }
    }

    /// Save the file (if any) and report peak/clip statistics.
    pub fn finish(&mut self, out_path: Option<&PathBuf>) -> MyResult<()> {
        if self.output == 'w' {
            let path = out_path.ok_or("No output path derived")?;
            if path.exists() {
                std::fs::remove_file(path).map_err(|e| {
                    MyError::Message(format!(
                        "Failed to remove existing file '{}': {}",
                        path.display(),
                        e
                    ))
                })?;
            }
            let file = self.file.as_ref().ok_or("Output file never initialized")?;
            file.save(path, AudioFileFormat::Wave)
                .map_err(|e| MyError::Message(e.to_string()))?;
            file.print_summary();
            info!("Wrote to file: {}", path.display());
        }

        if self.clipped_samples > 0 {
            warn!(
                "{} samples clipped (peak {:.2} dBFS); consider lowering --level",
                self.clipped_samples,
                20.0 * self.peak.log10()
            );
        }
        Ok(())
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    pub fn clipped_samples(&self) -> u64 {
        self.clipped_samples
    }

    /// Peak output level in dBFS, after the level trim.
    pub fn peak_dbfs(&self) -> f64 {
        20.0 * self.peak.log10()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validates_construction() {
        assert!(OutputContext::new(20, 's', 0.0, None).is_err());
        assert!(OutputContext::new(16, 'x', 0.0, None).is_err());
        assert!(OutputContext::new(16, 's', 0.0, Some(PathBuf::from("/tmp"))).is_err());
        assert!(OutputContext::new(24, 'w', -3.0, None).is_ok());
    }

    #[test]
    fn level_trim_scales_and_counts_clipping() {
        let mut ctx = OutputContext::new(32, 'w', 6.0, None).unwrap();
        ctx.init(48000, 2);
        // +6 dB pushes 0.9 past full scale
        ctx.push_block(&[0.9, 0.1, -0.9, 0.2]).unwrap();
        assert_eq!(ctx.clipped_samples(), 2);
        assert_eq!(ctx.frames_written(), 2);
        assert!(ctx.peak_dbfs() > 0.0);

        let file = ctx.file.as_ref().unwrap();
        assert_eq!(file.samples[0], vec![1.0, -1.0]);
        assert!((file.samples[1][0] - 0.1995262).abs() < 1e-4);
    }

    #[test]
    fn accumulates_planar_channels_in_order() {
        let mut ctx = OutputContext::new(24, 'w', 0.0, None).unwrap();
        ctx.init(44100, 3);
        ctx.push_block(&[0.1, 0.2, 0.3, 0.4, 0.5, 0.6]).unwrap();
        let file = ctx.file.as_ref().unwrap();
        assert_eq!(file.samples[0], vec![0.1, 0.4]);
        assert_eq!(file.samples[1], vec![0.2, 0.5]);
        assert_eq!(file.samples[2], vec![0.3, 0.6]);
    }
}
