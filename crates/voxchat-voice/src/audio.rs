//! Audio payloads moved between the caller and the pipeline stages.
//!
//! An [`AudioBlob`] is opaque bytes plus a format tag. WAV payloads get their
//! sample rate and channel count probed from the RIFF header; other encodings
//! are passed through to the engine untouched.

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

/// Container encodings accepted on the inbound boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioEncoding {
    Wav,
    Mp3,
    Ogg,
    M4a,
}

impl AudioEncoding {
    pub const ALL: [AudioEncoding; 4] = [
        AudioEncoding::Wav,
        AudioEncoding::Mp3,
        AudioEncoding::Ogg,
        AudioEncoding::M4a,
    ];

    /// File extension without the leading dot.
    pub fn extension(self) -> &'static str {
        match self {
            AudioEncoding::Wav => "wav",
            AudioEncoding::Mp3 => "mp3",
            AudioEncoding::Ogg => "ogg",
            AudioEncoding::M4a => "m4a",
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            AudioEncoding::Wav => "audio/wav",
            AudioEncoding::Mp3 => "audio/mpeg",
            AudioEncoding::Ogg => "audio/ogg",
            AudioEncoding::M4a => "audio/mp4",
        }
    }

    /// Parse `"wav"`, `".WAV"`, etc.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.trim().trim_start_matches('.');
        Self::ALL
            .into_iter()
            .find(|e| e.extension().eq_ignore_ascii_case(ext))
    }

    /// Encoding implied by an uploaded file name (`voice.wav` -> `Wav`).
    pub fn from_filename(name: &str) -> Option<Self> {
        Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .and_then(Self::from_extension)
    }
}

/// Format tag carried next to the bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioFormat {
    pub encoding: AudioEncoding,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channels: Option<u16>,
}

impl AudioFormat {
    pub fn new(encoding: AudioEncoding) -> Self {
        Self {
            encoding,
            sample_rate: None,
            channels: None,
        }
    }

    pub fn wav(sample_rate: u32, channels: u16) -> Self {
        Self {
            encoding: AudioEncoding::Wav,
            sample_rate: Some(sample_rate),
            channels: Some(channels),
        }
    }
}

/// Immutable audio payload. Moved from stage to stage, never shared.
#[derive(Clone, PartialEq, Eq)]
pub struct AudioBlob {
    bytes: Vec<u8>,
    format: AudioFormat,
}

impl std::fmt::Debug for AudioBlob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AudioBlob")
            .field("len", &self.bytes.len())
            .field("format", &self.format)
            .finish()
    }
}

impl AudioBlob {
    pub fn new(bytes: Vec<u8>, format: AudioFormat) -> Self {
        Self { bytes, format }
    }

    /// Wrap caller-supplied bytes. WAV headers are probed when readable; an
    /// unreadable header is left for the STT adapter to reject.
    pub fn from_upload(bytes: Vec<u8>, encoding: AudioEncoding) -> Self {
        let format = match encoding {
            AudioEncoding::Wav => probe_wav(&bytes).unwrap_or(AudioFormat::new(encoding)),
            other => AudioFormat::new(other),
        };
        Self { bytes, format }
    }

    /// Wrap engine output that must be a readable WAV stream.
    pub fn from_wav_bytes(bytes: Vec<u8>) -> EngineResult<Self> {
        let format = probe_wav(&bytes)
            .map_err(|e| EngineError::Rejected(format!("not a decodable WAV stream: {}", e)))?;
        Ok(Self { bytes, format })
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn format(&self) -> AudioFormat {
        self.format
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Cheap input check run by STT adapters before handing bytes to an engine:
    /// the payload must be non-empty and, for WAV, carry a parseable header.
    pub fn ensure_decodable(&self) -> EngineResult<()> {
        if self.bytes.is_empty() {
            return Err(EngineError::Rejected("empty audio payload".to_string()));
        }
        if self.format.encoding == AudioEncoding::Wav {
            probe_wav(&self.bytes).map_err(|e| {
                EngineError::Rejected(format!("audio payload is not a decodable WAV stream: {}", e))
            })?;
        }
        Ok(())
    }

    /// Decode a WAV payload to mono f32 samples in [-1.0, 1.0]. Multi-channel
    /// input is averaged down. Returns `(samples, sample_rate)`.
    pub fn decode_wav_mono_f32(&self) -> EngineResult<(Vec<f32>, u32)> {
        if self.format.encoding != AudioEncoding::Wav {
            return Err(EngineError::Rejected(format!(
                "expected WAV audio, got {}",
                self.format.encoding.extension()
            )));
        }
        let reader = hound::WavReader::new(Cursor::new(&self.bytes[..]))
            .map_err(|e| EngineError::Rejected(format!("WAV decode failed: {}", e)))?;
        let spec = reader.spec();
        let channels = spec.channels.max(1) as usize;

        let interleaved: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<Result<_, _>>()
                .map_err(|e| EngineError::Rejected(format!("WAV decode failed: {}", e)))?,
            hound::SampleFormat::Int => {
                let scale = (1i64 << (spec.bits_per_sample.saturating_sub(1) as u32)) as f32;
                reader
                    .into_samples::<i32>()
                    .map(|s| s.map(|v| v as f32 / scale))
                    .collect::<Result<_, _>>()
                    .map_err(|e| EngineError::Rejected(format!("WAV decode failed: {}", e)))?
            }
        };

        let mono = if channels == 1 {
            interleaved
        } else {
            interleaved
                .chunks(channels)
                .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
                .collect()
        };
        Ok((mono, spec.sample_rate))
    }
}

fn probe_wav(bytes: &[u8]) -> Result<AudioFormat, hound::Error> {
    let reader = hound::WavReader::new(Cursor::new(bytes))?;
    let spec = reader.spec();
    Ok(AudioFormat::wav(spec.sample_rate, spec.channels))
}

/// Encode mono f32 PCM as 16-bit WAV.
pub fn encode_wav_pcm16(samples: &[f32], sample_rate: u32) -> EngineResult<AudioBlob> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut buf = Vec::with_capacity(44 + samples.len() * 2);
    {
        let mut writer = hound::WavWriter::new(Cursor::new(&mut buf), spec)
            .map_err(|e| EngineError::Internal(format!("WAV encode failed: {}", e)))?;
        for &s in samples {
            let clamped = s.clamp(-1.0, 1.0);
            writer
                .write_sample((clamped * 32767.0).round() as i16)
                .map_err(|e| EngineError::Internal(format!("WAV encode failed: {}", e)))?;
        }
        writer
            .finalize()
            .map_err(|e| EngineError::Internal(format!("WAV encode failed: {}", e)))?;
    }
    Ok(AudioBlob::new(buf, AudioFormat::wav(sample_rate, 1)))
}

/// Silent mono WAV of the given length.
pub fn silence_wav(duration: Duration, sample_rate: u32) -> EngineResult<AudioBlob> {
    let n = (duration.as_secs_f64() * sample_rate as f64).round() as usize;
    encode_wav_pcm16(&vec![0.0; n], sample_rate)
}
