//! Base64 data URL encoding for inline media assets.
//!
//! Legacy rows carry media as `data:<mime>;base64,<payload>` strings; the
//! migration coordinator and the media read fallback both decode them.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::error::{Result, StorageError};

/// Decode a `data:<mime>;base64,<payload>` string into its MIME type and
/// raw bytes.
pub fn decode(data_url: &str) -> Result<(String, Vec<u8>)> {
    let rest = data_url
        .strip_prefix("data:")
        .ok_or_else(|| StorageError::InvalidEncoding("missing data: prefix".to_string()))?;

    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| StorageError::InvalidEncoding("missing payload separator".to_string()))?;

    let mime = header
        .strip_suffix(";base64")
        .ok_or_else(|| StorageError::InvalidEncoding("not base64-encoded".to_string()))?;

    let bytes = STANDARD
        .decode(payload)
        .map_err(|e| StorageError::InvalidEncoding(format!("bad base64 payload: {e}")))?;

    Ok((mime.to_string(), bytes))
}

/// Inverse of [`decode`].
pub fn encode(mime: &str, bytes: &[u8]) -> String {
    format!("data:{mime};base64,{}", STANDARD.encode(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip() {
        let url = encode("image/png", b"\x89PNG\r\n");
        let (mime, bytes) = decode(&url).unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(bytes, b"\x89PNG\r\n");
    }

    #[test]
    fn rejects_missing_prefix() {
        assert!(matches!(
            decode("image/png;base64,AAAA"),
            Err(StorageError::InvalidEncoding(_))
        ));
    }

    #[test]
    fn rejects_non_base64_encoding() {
        assert!(matches!(
            decode("data:text/plain,hello"),
            Err(StorageError::InvalidEncoding(_))
        ));
    }

    #[test]
    fn rejects_bad_payload() {
        assert!(matches!(
            decode("data:image/png;base64,!!!not-base64!!!"),
            Err(StorageError::InvalidEncoding(_))
        ));
    }
}
