//! Serde helpers for binary fields stored in JSON documents.

use base64::{engine::general_purpose::STANDARD, Engine as _};

/// Serialize `Vec<u8>` as standard base64.
pub mod base64_bytes {
    use super::*;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}

/// Encode bytes as standard base64.
pub fn to_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode standard base64.
pub fn from_base64(encoded: &str) -> phantomvault_common::Result<Vec<u8>> {
    STANDARD
        .decode(encoded.as_bytes())
        .map_err(|e| phantomvault_common::Error::Serialization(format!("Invalid base64: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize)]
    struct Blob {
        #[serde(with = "base64_bytes")]
        data: Vec<u8>,
    }

    #[test]
    fn test_base64_field_serialization() {
        let blob = Blob { data: vec![0, 1, 254, 255] };
        let json = serde_json::to_string(&blob).unwrap();
        assert_eq!(json, r#"{"data":"AAH+/w=="}"#);
        let back: Blob = serde_json::from_str(&json).unwrap();
        assert_eq!(back.data, vec![0, 1, 254, 255]);
    }

    #[test]
    fn test_invalid_base64_rejected() {
        assert!(from_base64("not base64!!").is_err());
    }
}
