//! WAV decoding into fixed-size PCM chunks

use std::io::Cursor;

use hound::{SampleFormat, WavReader};

use super::{AudioFormat, DecodeError};

/// Frames per chunk handed to the output streams
pub const CHUNK_FRAMES: usize = 1024;

/// Parse a WAV buffer into its format and a lazy chunk cursor
///
/// # Errors
///
/// Returns `DecodeError::Malformed` if the header is invalid, the layout is
/// unsupported, or the `data` chunk is shorter than it declares
pub fn decode(buffer: &[u8]) -> Result<(AudioFormat, PcmChunks<'_>), DecodeError> {
    let reader = WavReader::new(Cursor::new(buffer)).map_err(|e| malformed(e.to_string()))?;
    let spec = reader.spec();

    if spec.channels == 0 {
        return Err(malformed("zero channels"));
    }
    if spec.sample_rate == 0 {
        return Err(malformed("zero sample rate"));
    }

    // hound reports valid bits; the payload is laid out in container width
    let sample_width = container_width(buffer, spec.channels)?;
    let valid = match spec.sample_format {
        SampleFormat::Float => spec.bits_per_sample == 32 && sample_width == 4,
        SampleFormat::Int => spec.bits_per_sample >= 1 && spec.bits_per_sample <= sample_width * 8,
    };
    if !valid || sample_width > 4 {
        return Err(malformed(format!(
            "unsupported sample layout: {} bit {:?} in {sample_width} byte container",
            spec.bits_per_sample, spec.sample_format
        )));
    }

    let format = AudioFormat {
        sample_width,
        channels: spec.channels,
        sample_rate: spec.sample_rate,
        float: spec.sample_format == SampleFormat::Float,
    };

    let samples = reader.len() as usize;
    if samples % usize::from(spec.channels) != 0 {
        return Err(malformed("payload is not a whole number of frames"));
    }

    // hound trusts the declared data length; check it against what is present
    let data_start = usize::try_from(reader.into_inner().position())
        .map_err(|_| malformed("data offset out of range"))?;
    let declared = samples * usize::from(sample_width);
    let available = buffer.len().saturating_sub(data_start);
    if declared > available {
        return Err(malformed(format!(
            "truncated payload: {available} of {declared} bytes"
        )));
    }

    tracing::trace!(
        sample_width,
        valid_bits = spec.bits_per_sample,
        channels = format.channels,
        sample_rate = format.sample_rate,
        bytes = declared,
        "decoded wav header"
    );

    let chunks = PcmChunks {
        payload: &buffer[data_start..data_start + declared],
        chunk_len: CHUNK_FRAMES * format.frame_size(),
    };

    Ok((format, chunks))
}

/// Bytes per sample as stored, from the `fmt ` chunk's block alignment
fn container_width(buffer: &[u8], channels: u16) -> Result<u16, DecodeError> {
    let mut offset: usize = 12;

    while let Some(header) = offset.checked_add(8).and_then(|end| buffer.get(offset..end)) {
        let size = u32::from_le_bytes([header[4], header[5], header[6], header[7]]) as usize;
        let body = offset + 8;

        if &header[..4] == b"fmt " {
            let block_align = buffer
                .get(body + 12..body + 14)
                .map(|b| u16::from_le_bytes([b[0], b[1]]))
                .ok_or_else(|| malformed("fmt chunk too short"))?;

            if block_align == 0 || block_align % channels != 0 {
                return Err(malformed(format!(
                    "block align {block_align} does not fit {channels} channels"
                )));
            }
            return Ok(block_align / channels);
        }

        // Chunks are padded to an even length
        offset = body.saturating_add(size).saturating_add(size & 1);
    }

    Err(malformed("missing fmt chunk"))
}

fn malformed(reason: impl Into<String>) -> DecodeError {
    DecodeError::Malformed(reason.into())
}

/// Forward-only cursor over the PCM payload of one WAV buffer
///
/// Yields borrowed slices of up to [`CHUNK_FRAMES`] frames in the
/// container's own byte layout; the final chunk may be shorter.
pub struct PcmChunks<'a> {
    payload: &'a [u8],
    chunk_len: usize,
}

impl<'a> Iterator for PcmChunks<'a> {
    type Item = &'a [u8];

    fn next(&mut self) -> Option<Self::Item> {
        if self.payload.is_empty() {
            return None;
        }

        let (chunk, rest) = self.payload.split_at(self.chunk_len.min(self.payload.len()));
        self.payload = rest;
        Some(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wav(spec: hound::WavSpec, samples: &[i16]) -> Vec<u8> {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for &s in samples {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    fn mono16(rate: u32) -> hound::WavSpec {
        hound::WavSpec {
            channels: 1,
            sample_rate: rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        }
    }

    fn drain(chunks: &mut PcmChunks<'_>) -> Vec<Vec<u8>> {
        chunks.map(<[u8]>::to_vec).collect()
    }

    #[test]
    fn test_format_matches_header() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 24000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let data = wav(spec, &[0, 1, 2, 3]);
        let (format, _) = decode(&data).unwrap();

        assert_eq!(
            format,
            AudioFormat {
                sample_width: 2,
                channels: 2,
                sample_rate: 24000,
                float: false,
            }
        );
        assert_eq!(format.frame_size(), 4);
    }

    #[test]
    fn test_chunks_reproduce_payload() {
        // 2500 frames: two full chunks and a short tail
        let samples: Vec<i16> = (0..2500).map(|i| (i * 7 - 9000) as i16).collect();
        let data = wav(mono16(24000), &samples);
        let (_, mut chunks) = decode(&data).unwrap();

        let out = drain(&mut chunks);
        assert_eq!(out.len(), 3);
        assert_eq!(out[0].len(), CHUNK_FRAMES * 2);
        assert_eq!(out[2].len(), (2500 - 2 * CHUNK_FRAMES) * 2);

        let payload: Vec<u8> = out.concat();
        assert_eq!(payload, data[data.len() - 5000..].to_vec());
        assert!(chunks.next().is_none());
    }

    #[test]
    fn test_empty_payload_ends_immediately() {
        let data = wav(mono16(24000), &[]);
        let (_, mut chunks) = decode(&data).unwrap();
        assert!(chunks.next().is_none());
    }

    #[test]
    fn test_eight_bit_bytes_preserved() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 8,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for s in [-128i8, -1, 0, 127] {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        let data = cursor.into_inner();
        let (format, mut chunks) = decode(&data).unwrap();

        assert_eq!(format.sample_width, 1);
        assert_eq!(drain(&mut chunks).concat(), data[data.len() - 4..].to_vec());
    }

    #[test]
    fn test_wide_container_keeps_stored_bytes() {
        // 24 valid bits stored in 4-byte containers (WAVE_FORMAT_EXTENSIBLE)
        let spec = hound::WavSpecEx {
            spec: hound::WavSpec {
                channels: 2,
                sample_rate: 48000,
                bits_per_sample: 24,
                sample_format: hound::SampleFormat::Int,
            },
            bytes_per_sample: 4,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new_with_spec_ex(&mut cursor, spec).unwrap();
            for s in [0x12_3456i32, -1, -0x80_0000, 0x7f_ffff] {
                writer.write_sample(s).unwrap();
            }
            writer.finalize().unwrap();
        }
        let data = cursor.into_inner();
        let (format, mut chunks) = decode(&data).unwrap();

        assert_eq!(format.sample_width, 4);
        assert_eq!(format.frame_size(), 8);
        assert_eq!(drain(&mut chunks).concat(), data[data.len() - 16..].to_vec());
    }

    #[test]
    fn test_wide_container_truncation_detected() {
        let spec = hound::WavSpecEx {
            spec: hound::WavSpec {
                channels: 1,
                sample_rate: 48000,
                bits_per_sample: 24,
                sample_format: hound::SampleFormat::Int,
            },
            bytes_per_sample: 4,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new_with_spec_ex(&mut cursor, spec).unwrap();
            for _ in 0..8 {
                writer.write_sample(1000i32).unwrap();
            }
            writer.finalize().unwrap();
        }
        let data = cursor.into_inner();

        // Short by fewer bytes than a 3-byte reading would tolerate
        let err = decode(&data[..data.len() - 4]).err().unwrap();
        assert!(err.to_string().contains("truncated"));
    }

    #[test]
    fn test_missing_fmt_chunk() {
        assert!(container_width(b"RIFF\x04\0\0\0WAVE", 1).is_err());
    }

    #[test]
    fn test_malformed_header() {
        let mut header = [0u8; 44];
        header[..4].copy_from_slice(b"RIFX");
        assert!(matches!(decode(&header), Err(DecodeError::Malformed(_))));
    }

    #[test]
    fn test_truncated_payload() {
        let samples: Vec<i16> = vec![100; 400];
        let data = wav(mono16(16000), &samples);
        let truncated = &data[..data.len() - 100];

        let err = decode(truncated).err().unwrap();
        assert!(err.to_string().contains("truncated"));
    }
}
