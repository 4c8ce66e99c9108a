use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Text encoding used for stored documents and for secret bytes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum TextEncoding {
    #[default]
    Utf8,
    Utf16Le,
    Utf16Be,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodingError {
    #[error("unsupported text encoding: {0}")]
    Unsupported(String),
    #[error("invalid {encoding} data: {reason}")]
    Invalid {
        encoding: TextEncoding,
        reason: String,
    },
}

impl TextEncoding {
    /// Canonical lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            TextEncoding::Utf8 => "utf-8",
            TextEncoding::Utf16Le => "utf-16le",
            TextEncoding::Utf16Be => "utf-16be",
        }
    }

    pub fn encode(self, text: &str) -> Vec<u8> {
        match self {
            TextEncoding::Utf8 => text.as_bytes().to_vec(),
            TextEncoding::Utf16Le => text.encode_utf16().flat_map(u16::to_le_bytes).collect(),
            TextEncoding::Utf16Be => text.encode_utf16().flat_map(u16::to_be_bytes).collect(),
        }
    }

    pub fn decode(self, bytes: &[u8]) -> Result<String, EncodingError> {
        match self {
            TextEncoding::Utf8 => String::from_utf8(bytes.to_vec()).map_err(|e| self.invalid(e)),
            TextEncoding::Utf16Le => self.decode_utf16(bytes, u16::from_le_bytes),
            TextEncoding::Utf16Be => self.decode_utf16(bytes, u16::from_be_bytes),
        }
    }

    fn decode_utf16(
        self,
        bytes: &[u8],
        unit: fn([u8; 2]) -> u16,
    ) -> Result<String, EncodingError> {
        if bytes.len() % 2 != 0 {
            return Err(self.invalid("odd number of bytes"));
        }
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| unit([pair[0], pair[1]]))
            .collect();
        String::from_utf16(&units).map_err(|e| self.invalid(e))
    }

    fn invalid(self, reason: impl ToString) -> EncodingError {
        EncodingError::Invalid {
            encoding: self,
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for TextEncoding {
    type Err = EncodingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| !matches!(c, '-' | '_'))
            .collect();
        match normalized.as_str() {
            "utf8" => Ok(TextEncoding::Utf8),
            "utf16le" => Ok(TextEncoding::Utf16Le),
            "utf16be" => Ok(TextEncoding::Utf16Be),
            _ => Err(EncodingError::Unsupported(s.to_string())),
        }
    }
}

impl TryFrom<String> for TextEncoding {
    type Error = EncodingError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TextEncoding> for String {
    fn from(value: TextEncoding) -> Self {
        value.name().to_string()
    }
}
