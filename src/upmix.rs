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

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, info};

use crate::channel_map::ChannelSetup;
use crate::chunker::StreamChunker;
use crate::decoder::SurroundDecoder;
use crate::input::InputContext;
use crate::output::OutputContext;
use crate::sample_queue::SampleQueue;
use crate::{MyError, MyResult};

/// User-facing soundfield preset. Cutoffs are in Hz; everything else
/// matches the decoder setters.
#[derive(Debug, Clone)]
pub struct UpmixParams {
    pub setup: ChannelSetup,
    pub center_image: f64,
    pub shift: f64,
    pub depth: f64,
    pub circular_wrap: f64,
    pub focus: f64,
    pub front_sep: f64,
    pub rear_sep: f64,
    pub bass_lo: f64,
    pub bass_hi: f64,
    pub use_lfe: bool,
}

impl Default for UpmixParams {
    fn default() -> Self {
        Self {
            setup: ChannelSetup::Surround51,
            center_image: 0.7,
            shift: 0.0,
            depth: 1.0,
            circular_wrap: 90.0,
            focus: 0.0,
            front_sep: 1.0,
            rear_sep: 1.0,
            bass_lo: 40.0,
            bass_hi: 90.0,
            use_lfe: false,
        }
    }
}

impl UpmixParams {
    /// Push the preset into a decoder. The setters validate ranges, so
    /// a bad value surfaces here, before any audio moves.
    pub fn apply(&self, decoder: &mut SurroundDecoder, sample_rate: u32) -> MyResult<()> {
        decoder.set_circular_wrap(self.circular_wrap)?;
        decoder.set_shift(self.shift)?;
        decoder.set_depth(self.depth)?;
        decoder.set_focus(self.focus)?;
        decoder.set_center_image(self.center_image)?;
        decoder.set_front_separation(self.front_sep)?;
        decoder.set_rear_separation(self.rear_sep)?;
        let nyquist = sample_rate as f64 / 2.0;
        decoder.set_low_cutoff(self.bass_lo / nyquist)?;
        decoder.set_high_cutoff(self.bass_hi / nyquist)?;
        decoder.set_bass_redirection(self.use_lfe);
        Ok(())
    }
}

pub struct UpmixStats {
    pub frames: u64,
    pub clipped_samples: u64,
    pub elapsed: Duration,
    /// Decoded audio seconds per wall-clock second.
    pub speed: f64,
}

/// Orchestrates one conversion: a reader thread feeds a sample queue,
/// the calling thread re-chunks and decodes, and a writer thread
/// drains decoded frames into the output. The decoder's N/2-frame
/// latency is trimmed so the output has exactly as many frames as the
/// input.
pub struct UpmixContext {
    in_ctx: InputContext,
    out_ctx: OutputContext,
    params: UpmixParams,
    block_size: usize,
}

impl UpmixContext {
    pub fn new(
        in_ctx: InputContext,
        out_ctx: OutputContext,
        params: UpmixParams,
        block_size: usize,
    ) -> Self {
        Self {
            in_ctx,
            out_ctx,
            params,
            block_size,
        }
    }

    // Like the input file, next to it, with a .wav extension; or
    // inside the chosen output directory; "output.wav" for stdin.
    fn derive_output_path(&self) -> PathBuf {
        let file_name = match &self.in_ctx.file_path {
            Some(p) => {
                let stem = p
                    .file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "output".to_string());
                format!("{}.upmix.wav", stem)
            }
            None => "output.wav".to_string(),
        };
        let dir = self
            .out_ctx
            .path
            .clone()
            .or_else(|| {
                self.in_ctx
                    .file_path
                    .as_ref()
                    .and_then(|p| p.parent().map(Path::to_path_buf))
            })
            .unwrap_or_default();
        dir.join(file_name)
    }

    pub fn run(mut self, progress: Option<&dyn Fn(u64)>) -> MyResult<UpmixStats> {
        let n = self.block_size;
        let rate = self.in_ctx.sample_rate;

        let mut decoder = SurroundDecoder::new(self.params.setup, n)?;
        self.params.apply(&mut decoder, rate)?;
        let channels = decoder.channels();

        self.out_ctx.init(rate, channels as u32);
        let out_path = if self.out_ctx.output == 'w' {
            Some(self.derive_output_path())
        } else {
            None
        };

        info!(
            "Input: {} ({} Hz, {})",
            if self.in_ctx.std_in {
                "stdin"
            } else {
                self.in_ctx.input.as_str()
            },
            rate,
            self.in_ctx.sample_format.describe()
        );
        info!(
            "Setup: {} ({} channels), block {} frames, latency {} frames",
            self.params.setup.name(),
            channels,
            n,
            n / 2
        );
        debug!(
            "Channels: {}",
            self.params
                .setup
                .channels()
                .iter()
                .map(|c| c.name())
                .collect::<Vec<_>>()
                .join(", ")
        );
        if let Some(p) = &out_path {
            info!("Output: {}", p.display());
        } else {
            info!("Output: stdout ({} bit)", self.out_ctx.bits);
        }

        let chunk_len = 2 * n; // one decoder block, in values
        let in_q = Arc::new(SampleQueue::with_capacity(4 * chunk_len));
        let out_q = Arc::new(SampleQueue::with_capacity(4 * n * channels));

        // reader thread: input bytes -> f32 frames -> in_q
        let reader_q = Arc::clone(&in_q);
        let in_ctx = self.in_ctx;
        let reader_handle = thread::spawn(move || {
            let result = (|| -> MyResult<u64> {
                let mut reader = in_ctx.open_reader()?;
                let mut scratch = Vec::new();
                let mut block = Vec::new();
                let mut frames_total = 0u64;
                loop {
                    let frames = in_ctx.read_block(&mut *reader, &mut scratch, &mut block, n)?;
                    if frames == 0 {
                        break;
                    }
                    frames_total += frames as u64;
                    reader_q.push_slice(&block);
                }
                Ok(frames_total)
            })();
            reader_q.close();
            result
        });

        // writer thread: out_q -> frames -> output sink
        let writer_q = Arc::clone(&out_q);
        let mut out_ctx = self.out_ctx;
        let writer_handle = thread::spawn(move || {
            let result = (|| -> MyResult<()> {
                let mut pending: Vec<f32> = Vec::new();
                loop {
                    let chunk = writer_q.pop_chunk(4 * channels * 1024);
                    if chunk.is_empty() {
                        break;
                    }
                    pending.extend_from_slice(&chunk);
                    let whole = pending.len() - pending.len() % channels;
                    out_ctx.push_block(&pending[..whole])?;
                    pending.drain(..whole);
                }
                Ok(())
            })();
            writer_q.close();
            (result, out_ctx)
        });

        // decode on this thread, trimming the latency from the head
        // and clamping the tail to the input length once it is known
        let wall_start = Instant::now();
        let latency = n / 2;
        let frame_limit = Arc::new(AtomicU64::new(u64::MAX));
        let synth_q = Arc::clone(&out_q);
        let limit = Arc::clone(&frame_limit);
        let mut skipped = 0usize;
        let mut emitted = 0u64;
        let mut chunker = StreamChunker::new(
            move |chunk: &[f32]| {
                let out = decoder.decode(chunk);
                let mut offset = 0usize;
                let mut frames = n;
                if skipped < latency {
                    let drop = (latency - skipped).min(frames);
                    offset = drop;
                    frames -= drop;
                    skipped += drop;
                }
                let remaining = limit.load(Ordering::Acquire).saturating_sub(emitted);
                let frames = frames.min(remaining as usize);
                if frames > 0 {
                    synth_q.push_slice(&out[offset * channels..(offset + frames) * channels]);
                    emitted += frames as u64;
                }
            },
            chunk_len,
        );

        let mut consumed_values = 0u64;
        loop {
            let chunk = in_q.pop_chunk(chunk_len);
            if chunk.is_empty() {
                break;
            }
            consumed_values += chunk.len() as u64;
            chunker.append(&chunk);
            if let Some(cb) = progress {
                cb(consumed_values / 2);
            }
        }
        let frames_in = consumed_values / 2;
        frame_limit.store(frames_in, Ordering::Release);

        // zero-pad the partial block, plus one block to push the
        // remaining latency out of the decoder
        let pad = (chunk_len - chunker.buffered() % chunk_len) % chunk_len + chunk_len;
        chunker.append(&vec![0.0f32; pad]);
        out_q.close();

        let frames_read = reader_handle
            .join()
            .map_err(|_| MyError::Message("Input thread panicked".to_string()))??;
        let (write_result, mut out_ctx) = writer_handle
            .join()
            .map_err(|_| MyError::Message("Output thread panicked".to_string()))?;
        write_result?;
        let elapsed = wall_start.elapsed();

        out_ctx.finish(out_path.as_ref())?;

        let audio_seconds = frames_read as f64 / rate as f64;
        let speed = audio_seconds / elapsed.as_secs_f64().max(1e-9);
        info!(
            "Decoded {} frames in {:.1?} ({:.2}x realtime)",
            frames_read, elapsed, speed
        );

        Ok(UpmixStats {
            frames: frames_read,
            clipped_samples: out_ctx.clipped_samples(),
            elapsed,
            speed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_file::{AudioFile, AudioFileFormat};
    use std::env;
    use std::fs;

    #[test]
    fn default_params_apply_cleanly() {
        let mut decoder = SurroundDecoder::new(ChannelSetup::Surround51, 512).unwrap();
        UpmixParams::default().apply(&mut decoder, 48000).unwrap();
    }

    #[test]
    fn cutoffs_above_nyquist_are_rejected_at_the_boundary() {
        let mut decoder = SurroundDecoder::new(ChannelSetup::Surround51, 512).unwrap();
        let params = UpmixParams {
            bass_hi: 30000.0,
            ..Default::default()
        };
        assert!(params.apply(&mut decoder, 48000).is_err());
    }

    #[test]
    fn wav_pipeline_preserves_the_frame_count() {
        let dir = env::temp_dir().join(format!("st2surround_upmix_{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let in_path = dir.join("in.wav");

        // 3000 frames: not a block multiple, exercises the zero-pad tail
        let frames = 3000usize;
        let mut file: AudioFile<f32> = AudioFile::new();
        file.set_num_channels(2);
        file.set_bit_depth(32);
        file.set_sample_rate(48000);
        for i in 0..frames {
            let s = (i as f32 * 0.02).sin() * 0.5;
            file.samples[0].push(s);
            file.samples[1].push(s);
        }
        file.save(&in_path, AudioFileFormat::Wave).unwrap();

        let in_ctx = InputContext::new(in_path.to_string_lossy().into_owned(), 0).unwrap();
        let out_ctx = OutputContext::new(24, 'w', 0.0, Some(dir.clone())).unwrap();
        let upmix = UpmixContext::new(in_ctx, out_ctx, UpmixParams::default(), 1024);
        let stats = upmix.run(None).unwrap();
        assert_eq!(stats.frames, frames as u64);

        // inspect the produced header: 6 channels, same frame count
        let out_path = dir.join("in.upmix.wav");
        let bytes = fs::read(&out_path).unwrap();
        assert_eq!(&bytes[..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WAVE");
        let channels = u16::from_le_bytes([bytes[22], bytes[23]]);
        assert_eq!(channels, 6);
        let bits = u16::from_le_bytes([bytes[34], bytes[35]]);
        assert_eq!(bits, 24);
        let data_size = u32::from_le_bytes([bytes[40], bytes[41], bytes[42], bytes[43]]);
        assert_eq!(data_size as usize, frames * 6 * 3);

        fs::remove_dir_all(&dir).ok();
    }
}
