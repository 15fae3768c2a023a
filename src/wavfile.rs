//! WAV file I/O: header parsing and a 16-bit PCM writer for cut segments.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// WAV file header information
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WavHeader {
    pub sample_rate: u32,
    pub num_channels: u16,
    pub bits_per_sample: u16,
    pub data_size: u32,
}

impl WavHeader {
    /// Number of sample frames in the data chunk.
    pub fn frame_count(&self) -> u64 {
        let frame_bytes = self.num_channels as u64 * (self.bits_per_sample as u64 / 8);
        if frame_bytes == 0 {
            return 0;
        }
        self.data_size as u64 / frame_bytes
    }
}

fn invalid(message: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message.to_string())
}

/// Read and parse a WAV file header.
///
/// Leaves the reader positioned at the first byte of sample data. Chunks
/// between `fmt ` and `data` (LIST, ID3 and the like) are skipped.
///
/// # Arguments
/// * `reader` - Reader positioned at the start of the WAV file
///
/// # Returns
/// Parsed WAV header information
pub fn read_wav_header<R: Read + Seek>(reader: &mut R) -> io::Result<WavHeader> {
    let mut buf = [0u8; 36];
    reader.read_exact(&mut buf)?;

    if &buf[0..4] != b"RIFF" || &buf[8..12] != b"WAVE" || &buf[12..16] != b"fmt " {
        return Err(invalid("not a valid WAV file"));
    }

    let fmt_size = u32::from_le_bytes([buf[16], buf[17], buf[18], buf[19]]);
    let num_channels = u16::from_le_bytes([buf[22], buf[23]]);
    let sample_rate = u32::from_le_bytes([buf[24], buf[25], buf[26], buf[27]]);
    let bits_per_sample = u16::from_le_bytes([buf[34], buf[35]]);

    // fmt chunk body starts at 20
    reader.seek(SeekFrom::Start(20 + fmt_size as u64))?;

    loop {
        let mut chunk_header = [0u8; 8];
        if reader.read_exact(&mut chunk_header).is_err() {
            return Err(invalid("could not find data chunk"));
        }

        let chunk_size = u32::from_le_bytes([chunk_header[4], chunk_header[5], chunk_header[6], chunk_header[7]]);

        if &chunk_header[0..4] == b"data" {
            return Ok(WavHeader {
                sample_rate,
                num_channels,
                bits_per_sample,
                data_size: chunk_size,
            });
        }

        // Chunks are word aligned
        let padded = chunk_size as i64 + (chunk_size & 1) as i64;
        reader.seek(SeekFrom::Current(padded))?;
    }
}

/// Read a 16-bit PCM WAV file into its header and interleaved samples.
pub fn read_wav_pcm16(path: &Path) -> io::Result<(WavHeader, Vec<i16>)> {
    let mut reader = BufReader::new(File::open(path)?);
    let header = read_wav_header(&mut reader)?;
    if header.bits_per_sample != 16 {
        return Err(invalid("only 16-bit PCM is supported"));
    }

    let mut data = vec![0u8; header.data_size as usize];
    reader.read_exact(&mut data)?;
    let samples = data
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect();
    Ok((header, samples))
}

/// Streaming 16-bit PCM WAV writer.
///
/// The header is written up front with a zero data size and patched by
/// [`WavWriter::finalize`].
pub struct WavWriter<W: Write + Seek> {
    out: W,
    data_size: u64,
    rate: u32,
    channels: u16,
}

impl WavWriter<BufWriter<File>> {
    /// Create (or truncate) `path` and write a placeholder header.
    pub fn create(path: &Path, rate: u32, channels: u16) -> io::Result<Self> {
        WavWriter::new(BufWriter::new(File::create(path)?), rate, channels)
    }
}

impl<W: Write + Seek> WavWriter<W> {
    pub fn new(mut out: W, rate: u32, channels: u16) -> io::Result<Self> {
        write_wav_header(&mut out, 0, rate, channels)?;
        Ok(WavWriter {
            out,
            data_size: 0,
            rate,
            channels,
        })
    }

    /// Append interleaved samples.
    pub fn write_samples(&mut self, samples: &[i16]) -> io::Result<()> {
        for &sample in samples {
            self.out.write_all(&sample.to_le_bytes())?;
        }
        self.data_size += samples.len() as u64 * 2;
        Ok(())
    }

    /// Patch the header with the final sizes and hand back the writer.
    pub fn finalize(mut self) -> io::Result<W> {
        let data_size = u32::try_from(self.data_size)
            .map_err(|_| invalid("segment exceeds the 4 GiB WAV limit"))?;
        self.out.seek(SeekFrom::Start(0))?;
        write_wav_header(&mut self.out, data_size, self.rate, self.channels)?;
        self.out.seek(SeekFrom::End(0))?;
        self.out.flush()?;
        Ok(self.out)
    }
}

fn write_wav_header<W: Write>(out: &mut W, data_size: u32, rate: u32, channels: u16) -> io::Result<()> {
    let bits_per_sample: u16 = 16;
    let byte_rate = rate * channels as u32 * (bits_per_sample / 8) as u32;
    let block_align = channels * (bits_per_sample / 8);

    out.write_all(b"RIFF")?;
    out.write_all(&data_size.saturating_add(36).to_le_bytes())?;
    out.write_all(b"WAVE")?;
    out.write_all(b"fmt ")?;
    out.write_all(&16u32.to_le_bytes())?; // fmt chunk size
    out.write_all(&1u16.to_le_bytes())?; // audio format (1 = PCM)
    out.write_all(&channels.to_le_bytes())?;
    out.write_all(&rate.to_le_bytes())?;
    out.write_all(&byte_rate.to_le_bytes())?;
    out.write_all(&block_align.to_le_bytes())?;
    out.write_all(&bits_per_sample.to_le_bytes())?;
    out.write_all(b"data")?;
    out.write_all(&data_size.to_le_bytes())?;
    Ok(())
}
