//! Payload validation against the declared resource format.
//!
//! Validation only checks that the bytes are what they claim to be. Decoding
//! and transformation belong to the presentation layer.

use super::errors::FetchError;
use super::types::ResourceFormat;

/// Checks a received payload before it is persisted.
pub trait PayloadValidator: Send + Sync {
    /// Return `Err(FetchError::InvalidPayload)` when `payload` is not a valid
    /// instance of `format`.
    fn validate(&self, format: ResourceFormat, payload: &[u8]) -> Result<(), FetchError>;
}

/// Validator that recognizes container signatures ("magic bytes").
#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureValidator;

impl SignatureValidator {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

/// ISO base media file (`....ftyp<brand>`), returning the brand.
fn iso_bmff_brand(payload: &[u8]) -> Option<&[u8]> {
    (payload.len() >= 12 && &payload[4..8] == b"ftyp").then(|| &payload[8..12])
}

/// RIFF container (`RIFF....<form>`), returning the form type.
fn riff_form(payload: &[u8]) -> Option<&[u8]> {
    (payload.len() >= 12 && payload.starts_with(b"RIFF")).then(|| &payload[8..12])
}

fn is_image(payload: &[u8]) -> bool {
    payload.starts_with(b"\x89PNG\r\n\x1a\n")
        || payload.starts_with(&[0xFF, 0xD8, 0xFF])
        || payload.starts_with(b"GIF87a")
        || payload.starts_with(b"GIF89a")
        || payload.starts_with(b"BM")
        || matches!(riff_form(payload), Some(b"WEBP"))
        || matches!(
            iso_bmff_brand(payload),
            Some(b"avif" | b"avis" | b"heic" | b"heix" | b"mif1")
        )
}

fn is_audio(payload: &[u8]) -> bool {
    // MPEG audio frame sync: 11 set bits.
    let mpeg_frame = payload.len() >= 2 && payload[0] == 0xFF && payload[1] & 0xE0 == 0xE0;

    payload.starts_with(b"ID3")
        || mpeg_frame
        || payload.starts_with(b"fLaC")
        || payload.starts_with(b"OggS")
        || matches!(riff_form(payload), Some(b"WAVE"))
        || matches!(iso_bmff_brand(payload), Some(b"M4A " | b"M4B "))
}

fn is_video(payload: &[u8]) -> bool {
    // EBML header (Matroska / WebM).
    payload.starts_with(&[0x1A, 0x45, 0xDF, 0xA3])
        || payload.starts_with(b"OggS")
        || matches!(riff_form(payload), Some(b"AVI "))
        || iso_bmff_brand(payload).is_some()
        // MPEG transport stream sync byte at packet boundaries.
        || (payload.len() > 188 && payload[0] == 0x47 && payload[188] == 0x47)
}

impl PayloadValidator for SignatureValidator {
    fn validate(&self, format: ResourceFormat, payload: &[u8]) -> Result<(), FetchError> {
        let valid = match format {
            ResourceFormat::File => return Ok(()),
            ResourceFormat::Image => is_image(payload),
            ResourceFormat::Audio => is_audio(payload),
            ResourceFormat::Video => is_video(payload),
        };

        if payload.is_empty() {
            return Err(FetchError::invalid_payload(format!(
                "empty payload declared as {format}"
            )));
        }
        if valid {
            Ok(())
        } else {
            Err(FetchError::invalid_payload(format!(
                "payload does not match any known {format} signature"
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    #[test]
    fn test_file_accepts_anything() {
        let v = SignatureValidator::new();
        assert!(v.validate(ResourceFormat::File, b"").is_ok());
        assert!(v.validate(ResourceFormat::File, b"hello").is_ok());
    }

    #[test]
    fn test_image_signatures() {
        let v = SignatureValidator::new();
        assert!(v.validate(ResourceFormat::Image, PNG).is_ok());
        assert!(v.validate(ResourceFormat::Image, &[0xFF, 0xD8, 0xFF, 0xE0]).is_ok());
        assert!(v.validate(ResourceFormat::Image, b"GIF89a....").is_ok());
        assert!(v.validate(ResourceFormat::Image, b"RIFF\0\0\0\0WEBPVP8 ").is_ok());
    }

    #[test]
    fn test_html_error_page_is_not_an_image() {
        let v = SignatureValidator::new();
        let err = v
            .validate(ResourceFormat::Image, b"<!doctype html><title>404</title>")
            .unwrap_err();
        assert!(matches!(err, FetchError::InvalidPayload { .. }));
    }

    #[test]
    fn test_empty_media_is_invalid() {
        let v = SignatureValidator::new();
        let err = v.validate(ResourceFormat::Audio, b"").unwrap_err();
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn test_audio_and_video_signatures() {
        let v = SignatureValidator::new();
        assert!(v.validate(ResourceFormat::Audio, b"ID3\x04\0\0").is_ok());
        assert!(v.validate(ResourceFormat::Audio, &[0xFF, 0xFB, 0x90, 0x00]).is_ok());
        assert!(v.validate(ResourceFormat::Video, b"\0\0\0\x18ftypmp42\0\0").is_ok());
        assert!(v.validate(ResourceFormat::Video, &[0x1A, 0x45, 0xDF, 0xA3, 0x01]).is_ok());
        assert!(v.validate(ResourceFormat::Video, PNG).is_err());
    }
}
