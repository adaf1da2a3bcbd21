use std::fmt;

use serde::{Deserialize, Serialize};

/// Container format of an audio byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AudioFormat {
    #[serde(rename = "vorbis")]
    OggVorbis,
    #[serde(rename = "mp3")]
    Mp3,
    #[serde(rename = "flac")]
    Flac,
    #[serde(rename = "aac")]
    Aac,
    #[serde(rename = "alac")]
    Alac,
    #[serde(rename = "unknown")]
    Unknown,
}

impl AudioFormat {
    /// MIME type sent as `Content-Type` for this container.
    pub fn mime_type(&self) -> &'static str {
        match self {
            AudioFormat::OggVorbis => "audio/ogg",
            AudioFormat::Mp3 => "audio/mpeg",
            AudioFormat::Flac => "audio/flac",
            AudioFormat::Aac | AudioFormat::Alac => "audio/mp4",
            AudioFormat::Unknown => "application/octet-stream",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            AudioFormat::OggVorbis => "ogg",
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Flac => "flac",
            AudioFormat::Aac | AudioFormat::Alac => "m4a",
            AudioFormat::Unknown => "bin",
        }
    }

    /// MP4 tags live in `moov`, whose size change moves every chunk offset:
    /// the whole file must be known before the tag can be written.
    pub fn requires_full_buffer(&self) -> bool {
        matches!(self, AudioFormat::Aac | AudioFormat::Alac)
    }

    /// Parses the names accepted in configuration files and query strings.
    ///
    /// ```
    /// use lavamedia::AudioFormat;
    /// assert_eq!(AudioFormat::from_name("opus"), Some(AudioFormat::OggVorbis));
    /// assert_eq!(AudioFormat::from_name("HiRes"), Some(AudioFormat::Flac));
    /// assert_eq!(AudioFormat::from_name("wav"), None);
    /// ```
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "vorbis" | "ogg" | "oggvorbis" | "opus" => Some(AudioFormat::OggVorbis),
            "mp3" => Some(AudioFormat::Mp3),
            "flac" | "hires" => Some(AudioFormat::Flac),
            "aac" | "m4a" => Some(AudioFormat::Aac),
            "alac" => Some(AudioFormat::Alac),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AudioFormat::OggVorbis => "vorbis",
            AudioFormat::Mp3 => "mp3",
            AudioFormat::Flac => "flac",
            AudioFormat::Aac => "aac",
            AudioFormat::Alac => "alac",
            AudioFormat::Unknown => "unknown",
        }
    }
}

impl fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
