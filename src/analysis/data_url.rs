//! Data-URL helpers for image payloads.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

/// MIME type of encoded stills.
pub const JPEG_MIME: &str = "image/jpeg";

const BASE64_MARKER: &str = "base64,";

/// Render `bytes` as `data:<mime>;base64,<payload>`.
pub fn to_data_url(mime: &str, bytes: &[u8]) -> String {
    format!("data:{};{}{}", mime, BASE64_MARKER, STANDARD.encode(bytes))
}

/// Remove a leading `data:...;base64,` header, leaving the bare payload.
///
/// Payloads without a data-URL header are returned unchanged.
pub fn strip_data_url_prefix(payload: &str) -> &str {
    if !payload.starts_with("data:") {
        return payload;
    }
    match payload.find(BASE64_MARKER) {
        Some(idx) => &payload[idx + BASE64_MARKER.len()..],
        None => payload,
    }
}

/// Decode a base64 payload, tolerating a data-URL header.
pub fn decode_payload(payload: &str) -> Result<Vec<u8>, base64::DecodeError> {
    STANDARD.decode(strip_data_url_prefix(payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_removes_header() {
        assert_eq!(strip_data_url_prefix("data:image/jpeg;base64,AAEC"), "AAEC");
        assert_eq!(strip_data_url_prefix("data:image/png;base64,"), "");
    }

    #[test]
    fn test_strip_leaves_bare_payload_alone() {
        assert_eq!(strip_data_url_prefix("AAEC"), "AAEC");
        // Only a leading header counts
        assert_eq!(
            strip_data_url_prefix("AAECbase64,data"),
            "AAECbase64,data"
        );
    }

    #[test]
    fn test_encode_strip_decode_round_trip() {
        let raw: Vec<u8> = (0..=255).collect();
        let url = to_data_url(JPEG_MIME, &raw);
        assert!(url.starts_with("data:image/jpeg;base64,"));

        let stripped = strip_data_url_prefix(&url);
        assert!(!stripped.contains("base64,"));
        assert_eq!(STANDARD.decode(stripped).unwrap(), raw);
        assert_eq!(decode_payload(&url).unwrap(), raw);
    }
}
