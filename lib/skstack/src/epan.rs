use serde_derive::{Deserialize, Serialize};
use std::error::Error;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;

/// Beacon descriptor of a candidate PAN, accumulated from an EPANDESC block
/// and cached on disk so later runs can skip the active scan. Complete once
/// all six attributes are present.
#[derive(Debug, Clone, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields, default)]
pub struct Epan {
    /// Logical channel number.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<u8>,
    /// Channel page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_page: Option<u8>,
    /// PAN id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pan_id: Option<u16>,
    /// Responding MAC address, as printed by the module.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mac_address: Option<String>,
    /// Received signal quality.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lqi: Option<u8>,
    /// Pairing id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pair_id: Option<String>,
}

impl Epan {
    pub fn is_complete(&self) -> bool {
        self.channel.is_some()
            && self.channel_page.is_some()
            && self.pan_id.is_some()
            && self.mac_address.is_some()
            && self.lqi.is_some()
            && self.pair_id.is_some()
    }

    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(self).map_err(StoreError::Format)?;
        fs::write(path, json).map_err(StoreError::Io)
    }

    pub fn load(path: &Path) -> Result<Epan, StoreError> {
        let json = fs::read_to_string(path).map_err(StoreError::Io)?;
        serde_json::from_str(&json).map_err(StoreError::Format)
    }
}

/// Failure loading or saving the cached descriptor.
#[derive(Debug)]
pub enum StoreError {
    Io(io::Error),
    Format(serde_json::Error),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            StoreError::Io(err) => write!(f, "descriptor file error: {}", err),
            StoreError::Format(err) => write!(f, "descriptor format error: {}", err),
        }
    }
}

impl Error for StoreError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StoreError::Io(err) => Some(err),
            StoreError::Format(err) => Some(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> Epan {
        Epan {
            channel: Some(0x39),
            channel_page: Some(0x09),
            pan_id: Some(0x8888),
            mac_address: Some("001D129012345678".into()),
            lqi: Some(0xCA),
            pair_id: Some("01234567".into()),
        }
    }

    #[test]
    fn test_completeness() {
        let mut epan = complete();
        assert!(epan.is_complete());

        epan.pair_id = None;
        assert!(!epan.is_complete());
    }

    #[test]
    fn test_json_uses_camel_case() {
        let json = serde_json::to_string(&complete()).unwrap();

        assert!(json.contains("\"channelPage\""));
        assert!(json.contains("\"panId\""));
        assert!(json.contains("\"macAddress\""));
        assert!(json.contains("\"pairId\""));
    }

    #[test]
    fn test_json_roundtrip() {
        let epan = complete();
        let json = serde_json::to_string(&epan).unwrap();

        assert_eq!(serde_json::from_str::<Epan>(&json).unwrap(), epan);
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let json = r#"{"channel": 57, "bogus": 1}"#;

        assert!(serde_json::from_str::<Epan>(json).is_err());
    }

    #[test]
    fn test_missing_keys_stay_absent() {
        let epan: Epan = serde_json::from_str(r#"{"channel": 57}"#).unwrap();

        assert_eq!(epan.channel, Some(57));
        assert_eq!(epan.pan_id, None);
        assert!(!epan.is_complete());
    }
}
