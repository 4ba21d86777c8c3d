//! `data:` URL handling, the text-safe form images take when handed
//! between the pipeline and its callers.

use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use thiserror::Error;

/// MIME type assumed for bare base64 payloads.
pub const DEFAULT_MIME: &str = "image/png";

#[derive(Debug, Error)]
pub enum DataUrlError {
    #[error("malformed data URL")]
    Malformed,
    #[error("invalid base64 payload: {0}")]
    Base64(#[from] base64::DecodeError),
}

/// A decoded image payload with its declared MIME type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataUrl {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl DataUrl {
    /// Parses `data:<mime>;base64,<payload>`, or a bare base64 string which
    /// is then assumed to be PNG.
    pub fn parse(input: &str) -> Result<Self, DataUrlError> {
        let input = input.trim();
        let Some(rest) = input.strip_prefix("data:") else {
            return Ok(Self {
                mime_type: DEFAULT_MIME.to_string(),
                bytes: B64.decode(input)?,
            });
        };

        let (header, payload) = rest.split_once(',').ok_or(DataUrlError::Malformed)?;
        let mime_type = header
            .strip_suffix(";base64")
            .filter(|m| !m.is_empty())
            .ok_or(DataUrlError::Malformed)?;

        Ok(Self {
            mime_type: mime_type.to_string(),
            bytes: B64.decode(payload)?,
        })
    }

    /// Renders the payload back into a `data:` URL.
    pub fn encode(mime_type: &str, bytes: &[u8]) -> String {
        format!("data:{};base64,{}", mime_type, B64.encode(bytes))
    }
}

/// Serde adapter storing byte buffers as standard base64 strings.
pub mod serde_base64 {
    use super::B64;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&B64.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        B64.decode(text.as_bytes()).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_data_url() {
        let url = DataUrl::parse("data:image/jpeg;base64,/9j/AA==").unwrap();
        assert_eq!(url.mime_type, "image/jpeg");
        assert_eq!(url.bytes, vec![0xFF, 0xD8, 0xFF, 0x00]);
    }

    #[test]
    fn test_bare_base64_defaults_to_png() {
        let url = DataUrl::parse("iVBORw==").unwrap();
        assert_eq!(url.mime_type, DEFAULT_MIME);
        assert_eq!(url.bytes, vec![0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn test_encode_then_parse() {
        let encoded = DataUrl::encode("image/png", &[1, 2, 3]);
        assert!(encoded.starts_with("data:image/png;base64,"));
        assert_eq!(DataUrl::parse(&encoded).unwrap().bytes, vec![1, 2, 3]);
    }

    #[test]
    fn test_rejects_non_base64_header() {
        assert!(matches!(
            DataUrl::parse("data:text/plain,hello"),
            Err(DataUrlError::Malformed)
        ));
        assert!(matches!(
            DataUrl::parse("data:image/png;base64"),
            Err(DataUrlError::Malformed)
        ));
    }

    #[test]
    fn test_rejects_bad_payload() {
        assert!(matches!(
            DataUrl::parse("data:image/png;base64,@@@"),
            Err(DataUrlError::Base64(_))
        ));
    }
}
