// Copyright (c) 2026 The FWLog Authors
// SPDX-License-Identifier: Apache-2.0

//! Serde adapters for byte-valued fields that travel as standard base64.

use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use fwlog_verifier::{Hash32, HASH_SIZE};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serializer};
use std::collections::BTreeMap;

pub mod bytes {
    use super::*;

    pub fn serialize<S: Serializer>(value: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&B64.encode(value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        B64.decode(encoded.as_bytes()).map_err(D::Error::custom)
    }
}

pub mod byte_map {
    use super::*;

    pub fn serialize<S: Serializer>(
        value: &BTreeMap<String, Vec<u8>>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.collect_map(value.iter().map(|(name, bytes)| (name, B64.encode(bytes))))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<BTreeMap<String, Vec<u8>>, D::Error> {
        let encoded = BTreeMap::<String, String>::deserialize(deserializer)?;
        encoded
            .into_iter()
            .map(|(name, value)| {
                let bytes = B64.decode(value.as_bytes()).map_err(D::Error::custom)?;
                Ok((name, bytes))
            })
            .collect()
    }
}

pub mod hash_list {
    use super::*;

    pub fn serialize<S: Serializer>(value: &[Hash32], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(value.iter().map(|hash| B64.encode(hash)))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Vec<Hash32>, D::Error> {
        let encoded = Vec::<String>::deserialize(deserializer)?;
        encoded
            .into_iter()
            .map(|value| {
                let bytes = B64.decode(value.as_bytes()).map_err(D::Error::custom)?;
                Hash32::try_from(bytes.as_slice()).map_err(|_| {
                    D::Error::custom(format!("leaf hash must be {HASH_SIZE} bytes"))
                })
            })
            .collect()
    }
}
