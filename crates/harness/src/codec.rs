//! Transfer of the ROM image into the page.
//!
//! The image crosses the process boundary as base64 text. Inside the page it
//! is decoded back to raw bytes and then widened into a string holding one
//! character per byte, which is the form `loadROM` accepts. Host side
//! equivalents of the page decoder live here so the transform can be checked
//! without a browser.

use base64::prelude::*;

/// Page side decoder. Defines `decodeRom(text)` returning a byte string.
pub const PAGE_DECODER: &str = r#"function decodeRom(text) {
    const binary = atob(text);
    const bytes = new Uint8Array(binary.length);
    for (let i = 0; i < binary.length; i++) {
      bytes[i] = binary.charCodeAt(i) & 0xff;
    }
    let out = "";
    for (let i = 0; i < bytes.length; i++) {
      out += String.fromCharCode(bytes[i]);
    }
    return out;
  }"#;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    Base64(base64::DecodeError),
    WideChar { index: usize, ch: char },
}

impl std::error::Error for DecodeError {}

impl std::fmt::Display for DecodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DecodeError::Base64(e) => e.fmt(f),
            DecodeError::WideChar { index, ch } => {
                write!(f, "character {ch:?} at {index} does not fit in a byte")
            }
        }
    }
}

impl From<base64::DecodeError> for DecodeError {
    fn from(value: base64::DecodeError) -> Self {
        Self::Base64(value)
    }
}

pub fn encode(bytes: &[u8]) -> String {
    BASE64_STANDARD.encode(bytes)
}

/// Mirror of [`PAGE_DECODER`]: base64 text to a one-char-per-byte string.
pub fn decode(text: &str) -> Result<String, DecodeError> {
    let bytes = BASE64_STANDARD.decode(text)?;
    Ok(bytes.into_iter().map(char::from).collect())
}

/// Narrows a byte string back into raw bytes.
pub fn byte_string_to_bytes(s: &str) -> Result<Vec<u8>, DecodeError> {
    s.chars()
        .enumerate()
        .map(|(index, ch)| u8::try_from(ch).map_err(|_| DecodeError::WideChar { index, ch }))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transfer(bytes: &[u8]) -> Vec<u8> {
        let text = encode(bytes);
        let byte_string = decode(&text).unwrap();
        assert_eq!(byte_string.chars().count(), bytes.len());
        byte_string_to_bytes(&byte_string).unwrap()
    }

    #[test]
    fn empty_image() {
        assert_eq!(encode(&[]), "");
        assert!(transfer(&[]).is_empty());
    }

    #[test]
    fn every_byte_value_survives() {
        let bytes: Vec<u8> = (0..=255).collect();
        assert_eq!(transfer(&bytes), bytes);
    }

    #[test]
    fn rom_sized_image_survives() {
        // 16 byte header + 32KiB PRG + 8KiB CHR
        let bytes: Vec<u8> = (0..16 + 0x8000 + 0x2000)
            .map(|i: u32| (i.wrapping_mul(2654435761) >> 13) as u8)
            .collect();
        assert_eq!(transfer(&bytes), bytes);
    }

    #[test]
    fn high_bytes_are_not_utf8_encoded() {
        let byte_string = decode(&encode(&[0xff, 0x80])).unwrap();
        assert_eq!(byte_string, "\u{ff}\u{80}");
    }

    #[test]
    fn rejects_wide_characters() {
        assert_eq!(
            byte_string_to_bytes("a\u{100}"),
            Err(DecodeError::WideChar {
                index: 1,
                ch: '\u{100}'
            })
        );
    }

    #[test]
    fn rejects_invalid_base64() {
        assert!(matches!(decode("not base64!"), Err(DecodeError::Base64(_))));
    }
}
