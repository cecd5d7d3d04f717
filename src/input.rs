use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use log::debug;

use crate::{MyError, MyResult};

/// Sample encodings accepted from WAV input. Raw stdin input is
/// always 32-bit float.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    Int16,
    Int24,
    Int32,
    Float32,
}

impl SampleFormat {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::Int16 => 2,
            SampleFormat::Int24 => 3,
            SampleFormat::Int32 | SampleFormat::Float32 => 4,
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            SampleFormat::Int16 => "16 bit int",
            SampleFormat::Int24 => "24 bit int",
            SampleFormat::Int32 => "32 bit int",
            SampleFormat::Float32 => "32 bit float",
        }
    }
}

/// A stereo input source: either a WAV file (header parsed up front)
/// or raw interleaved float32 frames on stdin.
pub struct InputContext {
    pub std_in: bool,
    pub input: String,
    pub file_path: Option<PathBuf>,
    pub sample_rate: u32,
    pub sample_format: SampleFormat,
    /// Total stereo frames, when the input advertises a length.
    pub frames: Option<u64>,
    data_pos: u64,
    data_len: u64,
}

impl InputContext {
    pub fn new(input: String, stdin_rate: u32) -> MyResult<Self> {
        if input == "-" {
            if stdin_rate == 0 {
                return Err("A sample rate is required when reading from stdin".into());
            }
            debug!("Reading raw float32 stereo from stdin at {} Hz", stdin_rate);
            return Ok(Self {
                std_in: true,
                input,
                file_path: None,
                sample_rate: stdin_rate,
                sample_format: SampleFormat::Float32,
                frames: None,
                data_pos: 0,
                data_len: u64::MAX,
            });
        }

        let path = PathBuf::from(&input);
        let header = parse_wav_header(&path)?;
        if header.channels != 2 {
            return Err(MyError::Message(format!(
                "Expected a stereo input, got {} channels: {}",
                header.channels, input
            )));
        }
        let bytes_per_frame = 2 * header.format.bytes_per_sample() as u64;
        let frames = header.data_len / bytes_per_frame;
        debug!(
            "WAV input: {} Hz, {}, {} frames",
            header.sample_rate,
            header.format.describe(),
            frames
        );
        Ok(Self {
            std_in: false,
            input,
            file_path: Some(path),
            sample_rate: header.sample_rate,
            sample_format: header.format,
            frames: Some(frames),
            data_pos: header.data_pos,
            data_len: header.data_len,
        })
    }

    pub fn bytes_per_frame(&self) -> usize {
        2 * self.sample_format.bytes_per_sample()
    }

    /// Open the audio byte stream, positioned at the first frame.
    pub fn open_reader(&self) -> MyResult<Box<dyn Read + Send>> {
        if self.std_in {
            return Ok(Box::new(io::stdin()));
        }
        let path = self.file_path.as_ref().ok_or("No input path")?;
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(self.data_pos))?;
        // don't run past the data chunk into trailing metadata
        Ok(Box::new(file.take(self.data_len)))
    }

    /// Read up to `max_frames` stereo frames, converted to f32, into
    /// `out` (cleared first). Returns the number of frames read; 0
    /// means end of stream.
    pub fn read_block(
        &self,
        reader: &mut dyn Read,
        scratch: &mut Vec<u8>,
        out: &mut Vec<f32>,
        max_frames: usize,
    ) -> MyResult<usize> {
        let bytes_per_frame = self.bytes_per_frame();
        scratch.resize(max_frames * bytes_per_frame, 0);

        // read() may return short; keep going until full or EOF
        let mut filled = 0;
        while filled < scratch.len() {
            match reader.read(&mut scratch[filled..]) {
                Ok(0) => break,
                Ok(k) => filled += k,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            }
        }
        let frames = filled / bytes_per_frame;

        out.clear();
        out.reserve(frames * 2);
        for frame in scratch[..frames * bytes_per_frame].chunks_exact(bytes_per_frame) {
            let samp = self.sample_format.bytes_per_sample();
            out.push(decode_sample(&frame[..samp], self.sample_format));
            out.push(decode_sample(&frame[samp..], self.sample_format));
        }
        Ok(frames)
    }
}

fn decode_sample(bytes: &[u8], format: SampleFormat) -> f32 {
    match format {
        SampleFormat::Int16 => {
            i16::from_le_bytes([bytes[0], bytes[1]]) as f32 / 32768.0
        }
        SampleFormat::Int24 => {
            // sign-extend the 24-bit value through the top byte
            let v = i32::from_le_bytes([0, bytes[0], bytes[1], bytes[2]]) >> 8;
            v as f32 / 8388608.0
        }
        SampleFormat::Int32 => {
            i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f32 / 2147483648.0
        }
        SampleFormat::Float32 => f32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
    }
}

struct WavHeader {
    sample_rate: u32,
    channels: u16,
    format: SampleFormat,
    data_pos: u64,
    data_len: u64,
}

fn read_u16le<R: Read>(r: &mut R) -> io::Result<u16> {
    let mut b = [0u8; 2];
    r.read_exact(&mut b)?;
    Ok(u16::from_le_bytes(b))
}

fn read_u32le<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut b = [0u8; 4];
    r.read_exact(&mut b)?;
    Ok(u32::from_le_bytes(b))
}

// Minimal RIFF/WAVE parser: walks the chunk list for fmt and data,
// enough to locate the audio and learn its encoding.
fn parse_wav_header(path: &Path) -> MyResult<WavHeader> {
    let mut f = File::open(path)?;
    let file_size = f.metadata()?.len();

    let mut id = [0u8; 4];
    f.read_exact(&mut id)?;
    if &id != b"RIFF" {
        return Err(MyError::Message(format!(
            "Not a WAV file (missing RIFF): {}",
            path.display()
        )));
    }
    let _riff_size = read_u32le(&mut f)?;
    f.read_exact(&mut id)?;
    if &id != b"WAVE" {
        return Err(MyError::Message(format!(
            "Not a WAV file (missing WAVE): {}",
            path.display()
        )));
    }

    let mut fmt: Option<(u16, u16, u32, u16)> = None; // tag, channels, rate, bits
    let mut data: Option<(u64, u64)> = None;

    while f.read_exact(&mut id).is_ok() {
        let chunk_size = read_u32le(&mut f)? as u64;
        match &id {
            b"fmt " => {
                let tag = read_u16le(&mut f)?;
                let channels = read_u16le(&mut f)?;
                let rate = read_u32le(&mut f)?;
                let _byte_rate = read_u32le(&mut f)?;
                let _block_align = read_u16le(&mut f)?;
                let bits = read_u16le(&mut f)?;
                fmt = Some((tag, channels, rate, bits));
                // skip any extension bytes
                if chunk_size > 16 {
                    f.seek(SeekFrom::Current((chunk_size - 16) as i64))?;
                }
            }
            b"data" => {
                let pos = f.stream_position()?;
                // tolerate writers that leave a bogus size on streamed files
                let len = chunk_size.min(file_size - pos);
                data = Some((pos, len));
                f.seek(SeekFrom::Current(len as i64))?;
            }
            _ => {
                // chunks are word-aligned
                f.seek(SeekFrom::Current((chunk_size + (chunk_size & 1)) as i64))?;
            }
        }
        if fmt.is_some() && data.is_some() {
            break;
        }
    }

    let (tag, channels, rate, bits) = fmt.ok_or("WAV missing fmt chunk")?;
    let (data_pos, data_len) = data.ok_or("WAV missing data chunk")?;

    let format = match (tag, bits) {
        (1, 16) => SampleFormat::Int16,
        (1, 24) => SampleFormat::Int24,
        (1, 32) => SampleFormat::Int32,
        (3, 32) => SampleFormat::Float32,
        _ => {
            return Err(MyError::Message(format!(
                "Unsupported WAV encoding (format tag {}, {} bits)",
                tag, bits
            )))
        }
    };

    Ok(WavHeader {
        sample_rate: rate,
        channels,
        format,
        data_pos,
        data_len,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio_file::{AudioFile, AudioFileFormat};
    use std::env;

    fn temp_wav(tag: &str) -> PathBuf {
        env::temp_dir().join(format!("st2surround_input_test_{}_{}.wav", std::process::id(), tag))
    }

    fn write_stereo_wav(path: &Path, bit_depth: i32, frames: usize) -> Vec<f32> {
        let mut file: AudioFile<f32> = AudioFile::new();
        file.set_num_channels(2);
        file.set_bit_depth(bit_depth);
        file.set_sample_rate(48000);
        let mut expect = Vec::new();
        for i in 0..frames {
            let l = (i as f32 * 0.01).sin() * 0.8;
            let r = (i as f32 * 0.02).cos() * 0.4;
            file.samples[0].push(l);
            file.samples[1].push(r);
            expect.push(l);
            expect.push(r);
        }
        file.save(path, AudioFileFormat::Wave).unwrap();
        expect
    }

    fn round_trip(bit_depth: i32, tolerance: f32) {
        let path = temp_wav(&bit_depth.to_string());
        let expect = write_stereo_wav(&path, bit_depth, 300);

        let ctx = InputContext::new(path.to_string_lossy().into_owned(), 0).unwrap();
        assert_eq!(ctx.sample_rate, 48000);
        assert_eq!(ctx.frames, Some(300));

        let mut reader = ctx.open_reader().unwrap();
        let mut scratch = Vec::new();
        let mut out = Vec::new();
        let mut got = Vec::new();
        loop {
            let n = ctx.read_block(&mut *reader, &mut scratch, &mut out, 128).unwrap();
            if n == 0 {
                break;
            }
            got.extend_from_slice(&out);
        }
        assert_eq!(got.len(), expect.len());
        for (a, b) in got.iter().zip(expect.iter()) {
            assert!((a - b).abs() <= tolerance, "{} vs {}", a, b);
        }
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn wav_round_trip_16_bit() {
        round_trip(16, 1.0 / 16384.0);
    }

    #[test]
    fn wav_round_trip_24_bit() {
        round_trip(24, 1.0 / 2097152.0);
    }

    #[test]
    fn wav_round_trip_float() {
        round_trip(32, 0.0);
    }

    #[test]
    fn rejects_non_wav_input() {
        let path = temp_wav("bogus");
        std::fs::write(&path, b"definitely not audio").unwrap();
        assert!(InputContext::new(path.to_string_lossy().into_owned(), 0).is_err());
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn stdin_requires_a_rate() {
        assert!(InputContext::new("-".into(), 0).is_err());
        let ctx = InputContext::new("-".into(), 44100).unwrap();
        assert!(ctx.std_in);
        assert_eq!(ctx.sample_format, SampleFormat::Float32);
        assert_eq!(ctx.frames, None);
    }
}
