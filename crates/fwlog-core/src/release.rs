// Copyright (c) 2026 The FWLog Authors
// SPDX-License-Identifier: Apache-2.0

//! Firmware release manifest.

use crate::b64;
use crate::error::{FwLogError, FwLogResult};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Artifact key that must be committed to for a release to be installable
/// on-device. Other artifact entries are optional commitments.
pub const FIRMWARE_ARTIFACT_NAME: &str = "armory-drive.imx";

/// Placeholder emitted when a producer does not know the platform. Consumers
/// must not reject a manifest because of it.
pub const PLATFORM_ID_UNSET: &str = "<unset>";

/// A firmware release statement: everything needed to reconstruct the
/// unsigned firmware image from source and to pin its artifacts.
///
/// Digest fields hold raw bytes; the JSON wire form encodes them in standard
/// base64.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirmwareRelease {
    /// Human readable description of the release.
    pub description: String,

    /// Hardware platform this release targets.
    pub platform_id: String,

    /// Release revision, e.g. a git tag like `"v2021.05.03"`.
    pub revision: String,

    /// SHA-256 digests of the named release artifacts.
    #[serde(with = "b64::byte_map")]
    pub artifact_sha256: BTreeMap<String, Vec<u8>>,

    /// Where an archive of the source used to build this release lives.
    pub source_url: String,

    /// SHA-256 digest of the archive at `source_url`.
    #[serde(with = "b64::bytes")]
    pub source_sha256: Vec<u8>,

    /// Toolchain used to build the release from source.
    pub tool_chain: String,

    /// Build arguments used to produce the firmware from source.
    pub build_args: BTreeMap<String, String>,
}

impl FirmwareRelease {
    /// The note body form: 2-space-indented JSON plus a trailing newline.
    pub fn to_note_body(&self) -> FwLogResult<String> {
        let json = serde_json::to_string_pretty(self).map_err(FwLogError::BadRelease)?;
        Ok(format!("{json}\n"))
    }

    /// Parses a note body produced by [`Self::to_note_body`].
    pub fn from_note_text(text: &str) -> FwLogResult<Self> {
        serde_json::from_str(text).map_err(FwLogError::BadRelease)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FirmwareRelease {
        FirmwareRelease {
            description: "A release".to_string(),
            platform_id: PLATFORM_ID_UNSET.to_string(),
            revision: "v2026.07.01".to_string(),
            artifact_sha256: BTreeMap::from([
                (FIRMWARE_ARTIFACT_NAME.to_string(), vec![0x11; 32]),
                ("recovery.imx".to_string(), vec![0x22; 32]),
            ]),
            source_url: "https://example.org/source.tar.gz".to_string(),
            source_sha256: vec![0x33; 32],
            tool_chain: "tamago1.24".to_string(),
            build_args: BTreeMap::from([("REV".to_string(), "abc1234".to_string())]),
        }
    }

    #[test]
    fn note_body_round_trip() {
        let release = sample();
        let body = release.to_note_body().unwrap();
        assert!(body.ends_with('\n'));
        assert_eq!(FirmwareRelease::from_note_text(&body).unwrap(), release);
    }

    #[test]
    fn wire_form_uses_snake_case_and_base64() {
        let body = sample().to_note_body().unwrap();
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(
            value["artifact_sha256"][FIRMWARE_ARTIFACT_NAME],
            serde_json::json!("ERERERERERERERERERERERERERERERERERERERERERE=")
        );
        assert_eq!(value["platform_id"], serde_json::json!(PLATFORM_ID_UNSET));
        assert!(value["source_sha256"].is_string());
        assert_eq!(value["build_args"]["REV"], serde_json::json!("abc1234"));
    }

    #[test]
    fn rejects_invalid_digest_encoding() {
        let body = r#"{
  "description": "",
  "platform_id": "",
  "revision": "",
  "artifact_sha256": { "armory-drive.imx": "*** not base64 ***" },
  "source_url": "",
  "source_sha256": "",
  "tool_chain": "",
  "build_args": {}
}"#;
        assert!(matches!(
            FirmwareRelease::from_note_text(body),
            Err(FwLogError::BadRelease(_))
        ));
    }
}
