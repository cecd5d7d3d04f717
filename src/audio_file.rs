use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use log::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioFileFormat {
    Wave,
}

/// In-memory multichannel audio accumulator with a RIFF/WAVE writer.
/// Samples are kept planar (one vector per channel) and interleaved
/// on save.
#[derive(Clone)]
pub struct AudioFile<T> {
    pub samples: Vec<Vec<T>>,
    sample_rate: u32,
    bit_depth: i32,
    num_channels: usize,
}

impl<T> AudioFile<T>
where
    T: AudioSample,
{
    pub fn new() -> Self {
        Self {
            samples: vec![],
            sample_rate: 44100,
            bit_depth: 16,
            num_channels: 0,
        }
    }

    pub fn set_num_channels(&mut self, channels: usize) {
        self.num_channels = channels;
        self.samples.resize(channels, Vec::new());
    }

    pub fn set_bit_depth(&mut self, depth: i32) {
        self.bit_depth = depth;
    }

    pub fn set_sample_rate(&mut self, rate: u32) {
        self.sample_rate = rate;
    }

    pub fn frames(&self) -> usize {
        self.samples.first().map_or(0, |channel| channel.len())
    }

    pub fn save<P: AsRef<Path>>(&self, path: P, format: AudioFileFormat) -> io::Result<()> {
        match format {
            AudioFileFormat::Wave => self.save_wave_file(path),
        }
    }

    fn save_wave_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let mut file = BufWriter::new(File::create(path)?);
        let channels = self.num_channels as u16;
        let bytes_per_sample = (self.bit_depth / 8) as u16;
        let block_align = channels * bytes_per_sample;
        let data_size = (self.frames() * block_align as usize) as u32;

        // RIFF header
        file.write_all(b"RIFF")?;
        file.write_all(&(data_size + 36).to_le_bytes())?;
        file.write_all(b"WAVE")?;

        // fmt chunk; 3 = IEEE float, 1 = integer PCM
        file.write_all(b"fmt ")?;
        file.write_all(&16u32.to_le_bytes())?;
        let format_tag: u16 = if T::is_float() { 3 } else { 1 };
        file.write_all(&format_tag.to_le_bytes())?;
        file.write_all(&channels.to_le_bytes())?;
        file.write_all(&self.sample_rate.to_le_bytes())?;
        let byte_rate = self.sample_rate * block_align as u32;
        file.write_all(&byte_rate.to_le_bytes())?;
        file.write_all(&block_align.to_le_bytes())?;
        file.write_all(&(self.bit_depth as u16).to_le_bytes())?;

        // data chunk, interleaved
        file.write_all(b"data")?;
        file.write_all(&data_size.to_le_bytes())?;
        for i in 0..self.frames() {
            for channel in 0..self.num_channels {
                let sample = self.samples[channel][i];
                match self.bit_depth {
                    16 => file.write_all(&sample.to_i16().to_le_bytes())?,
                    24 => {
                        let value = sample.to_i24();
                        file.write_all(&[
                            (value & 0xFF) as u8,
                            ((value >> 8) & 0xFF) as u8,
                            ((value >> 16) & 0xFF) as u8,
                        ])?
                    }
                    32 if T::is_float() => file.write_all(&sample.to_f32().to_le_bytes())?,
                    32 => file.write_all(&sample.to_i32().to_le_bytes())?,
                    _ => {
                        return Err(io::Error::new(
                            io::ErrorKind::InvalidInput,
                            "Unsupported bit depth",
                        ))
                    }
                }
            }
        }
        file.flush()
    }

    pub fn print_summary(&self) {
        info!(
            "Wrote {} channels x {} frames, {} bit @ {} Hz",
            self.num_channels,
            self.frames(),
            self.bit_depth,
            self.sample_rate
        );
    }
}

pub trait AudioSample: Copy + Send + Sync {
    fn to_i16(self) -> i16;
    fn to_i24(self) -> i32;
    fn to_i32(self) -> i32;
    fn to_f32(self) -> f32;
    fn is_float() -> bool;
}

impl AudioSample for f32 {
    fn to_i16(self) -> i16 {
        (self.clamp(-1.0, 1.0) * 32767.0) as i16
    }
    fn to_i24(self) -> i32 {
        (self.clamp(-1.0, 1.0) * 8388607.0) as i32
    }
    fn to_i32(self) -> i32 {
        (self.clamp(-1.0, 1.0) * 2147483647.0) as i32
    }
    fn to_f32(self) -> f32 {
        self
    }
    fn is_float() -> bool {
        true
    }
}
