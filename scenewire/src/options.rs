use serde::{Deserialize, Serialize};

use crate::encoding::dict::DictionaryMode;

fn default_tolerance() -> f32 {
    0.001
}

/// Which set of compression strategies the binary writer binds by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressionProfile {
    /// Raw IEEE everywhere; cheapest to decode.
    #[serde(rename = "fastest")]
    Fastest,
    /// Delta-zlib on integer arrays; everything round-trips exactly.
    #[serde(rename = "smallestNonlossy")]
    SmallestNonlossy,
    /// Adds quantized-zlib float arrays, bounded by `quantize_tolerance`.
    #[serde(rename = "smallestLossy")]
    SmallestLossy,
}

impl Default for CompressionProfile {
    fn default() -> Self {
        Self::Fastest
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportOptions {
    #[serde(default)]
    pub dictionary: DictionaryMode,
    #[serde(default)]
    pub compression: CompressionProfile,
    /// Skip fields whose value equals the schema default. The decoder
    /// reconstructs them from the same versioned schema.
    #[serde(rename = "removeDefaults", default)]
    pub remove_defaults: bool,
    /// Largest acceptable error for lossy float quantization.
    #[serde(rename = "quantizeTolerance", default = "default_tolerance")]
    pub quantize_tolerance: f32,
}

impl ExportOptions {
    pub fn from_json(json: &str) -> serde_json::Result<ExportOptions> {
        serde_json::from_str(json)
    }
}

impl Default for ExportOptions {
    fn default() -> Self {
        Self::from_json("{}").unwrap()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = ExportOptions::default();
        assert_eq!(options.dictionary, DictionaryMode::FromContent);
        assert_eq!(options.compression, CompressionProfile::Fastest);
        assert!(!options.remove_defaults);
        assert_eq!(options.quantize_tolerance, 0.001);
    }

    #[test]
    fn test_from_json() {
        let options = ExportOptions::from_json(
            r#"{
                "dictionary": "canonical",
                "compression": "smallestLossy",
                "removeDefaults": true,
                "quantizeTolerance": 0.01
            }"#,
        )
        .unwrap();
        assert_eq!(options.dictionary, DictionaryMode::Canonical);
        assert_eq!(options.compression, CompressionProfile::SmallestLossy);
        assert!(options.remove_defaults);
        assert_eq!(options.quantize_tolerance, 0.01);
    }
}
