// Copyright (c) 2026 The FWLog Authors
// SPDX-License-Identifier: Apache-2.0

//! Signed-note envelope codec.
//!
//! A note is UTF-8 text ending in a newline, a blank line, and one or more
//! signature lines of the form `— NAME BASE64`. The base64 payload is a
//! 4-byte key-hash prefix followed by the raw Ed25519 signature, so a
//! verifier set can route each signature by `(name, prefix)` without trial
//! verification.

use crate::error::{FwLogError, FwLogResult};
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};
use ed25519_dalek::{Signature, Signer as _, SigningKey, Verifier as _, VerifyingKey};
use rand::rngs::OsRng;
use rand::RngCore as _;
use sha2::{Digest, Sha256};
use std::collections::HashMap;

const ALG_ED25519: u8 = 0x01;
const SEED_SIZE: usize = 32;
const KEY_HASH_SIZE: usize = 4;

// Em dash (U+2014) plus space; matched bytewise, never via collation.
const SIG_PREFIX: &str = "\u{2014} ";

const PRIVATE_KEY_PREFIX: &str = "PRIVATE+KEY+";

/// One signature that verified during [`open`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedSignature {
    pub name: String,
    pub key_hash: u32,
}

/// A successfully opened note: the body text plus the signatures that
/// verified against the supplied verifier set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Note {
    pub text: String,
    pub sigs: Vec<VerifiedSignature>,
}

// First four bytes of SHA-256(name || '\n' || key_data), where key_data is
// the algorithm byte followed by the public key.
fn key_hash(name: &str, key_data: &[u8]) -> u32 {
    let mut hasher = Sha256::new();
    hasher.update(name.as_bytes());
    hasher.update(b"\n");
    hasher.update(key_data);
    let digest = hasher.finalize();
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

// Key names appear on signature lines, so they must not collide with the
// line grammar or the `+`-separated key serialization.
fn valid_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| !c.is_whitespace() && !c.is_control() && c != '+')
}

/// Verifies signatures produced under one named Ed25519 key.
#[derive(Debug, Clone)]
pub struct NoteVerifier {
    name: String,
    key_hash: u32,
    key: VerifyingKey,
}

impl NoteVerifier {
    /// Parses a public key string `NAME+HHHHHHHH+BASE64(alg || pubkey)`.
    pub fn from_public_key(encoded: &str) -> FwLogResult<Self> {
        let mut parts = encoded.split('+');
        let (Some(name), Some(hash_hex), Some(key_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(FwLogError::MalformedKey);
        };
        if !valid_name(name) || hash_hex.len() != 2 * KEY_HASH_SIZE {
            return Err(FwLogError::MalformedKey);
        }
        let declared_hash =
            u32::from_str_radix(hash_hex, 16).map_err(|_| FwLogError::MalformedKey)?;
        let key_data = B64
            .decode(key_b64.as_bytes())
            .map_err(|_| FwLogError::MalformedKey)?;
        let (&alg, public) = key_data.split_first().ok_or(FwLogError::MalformedKey)?;
        if alg != ALG_ED25519 {
            return Err(FwLogError::MalformedKey);
        }
        let public: [u8; 32] = public.try_into().map_err(|_| FwLogError::MalformedKey)?;
        let key = VerifyingKey::from_bytes(&public).map_err(|_| FwLogError::MalformedKey)?;
        if declared_hash != key_hash(name, &key_data) {
            return Err(FwLogError::MalformedKey);
        }
        Ok(Self {
            name: name.to_string(),
            key_hash: declared_hash,
            key,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key_hash(&self) -> u32 {
        self.key_hash
    }

    fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        let Ok(signature) = Signature::from_slice(signature) else {
            return false;
        };
        self.key.verify(message, &signature).is_ok()
    }
}

/// Signs note bodies under one named Ed25519 key.
#[derive(Debug)]
pub struct NoteSigner {
    name: String,
    key_hash: u32,
    key: SigningKey,
}

impl NoteSigner {
    /// Parses a private key string
    /// `PRIVATE+KEY+NAME+HHHHHHHH+BASE64(alg || seed)`. The embedded hash is
    /// the public key hash, so signatures route to the matching verifier.
    pub fn from_private_key(encoded: &str) -> FwLogResult<Self> {
        let rest = encoded
            .strip_prefix(PRIVATE_KEY_PREFIX)
            .ok_or(FwLogError::MalformedKey)?;
        let mut parts = rest.split('+');
        let (Some(name), Some(hash_hex), Some(key_b64), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(FwLogError::MalformedKey);
        };
        if !valid_name(name) || hash_hex.len() != 2 * KEY_HASH_SIZE {
            return Err(FwLogError::MalformedKey);
        }
        let declared_hash =
            u32::from_str_radix(hash_hex, 16).map_err(|_| FwLogError::MalformedKey)?;
        let key_data = B64
            .decode(key_b64.as_bytes())
            .map_err(|_| FwLogError::MalformedKey)?;
        let (&alg, seed) = key_data.split_first().ok_or(FwLogError::MalformedKey)?;
        if alg != ALG_ED25519 {
            return Err(FwLogError::MalformedKey);
        }
        let seed: [u8; SEED_SIZE] = seed.try_into().map_err(|_| FwLogError::MalformedKey)?;
        let key = SigningKey::from_bytes(&seed);
        let mut public_data = vec![ALG_ED25519];
        public_data.extend_from_slice(key.verifying_key().as_bytes());
        if declared_hash != key_hash(name, &public_data) {
            return Err(FwLogError::MalformedKey);
        }
        Ok(Self {
            name: name.to_string(),
            key_hash: declared_hash,
            key,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key_hash(&self) -> u32 {
        self.key_hash
    }

    fn sign(&self, message: &[u8]) -> Signature {
        self.key.sign(message)
    }
}

/// Generates a fresh Ed25519 keypair and returns the
/// `(private, public)` key strings for `name`.
pub fn generate_key(name: &str) -> FwLogResult<(String, String)> {
    if !valid_name(name) {
        return Err(FwLogError::MalformedKey);
    }
    let mut seed = [0u8; SEED_SIZE];
    OsRng.fill_bytes(&mut seed);
    let key = SigningKey::from_bytes(&seed);

    let mut public_data = vec![ALG_ED25519];
    public_data.extend_from_slice(key.verifying_key().as_bytes());
    let hash = key_hash(name, &public_data);

    let mut private_data = vec![ALG_ED25519];
    private_data.extend_from_slice(&seed);

    let private = format!(
        "{PRIVATE_KEY_PREFIX}{name}+{hash:08x}+{}",
        B64.encode(&private_data)
    );
    let public = format!("{name}+{hash:08x}+{}", B64.encode(&public_data));
    Ok((private, public))
}

/// A set of verifiers, routed by `(name, key_hash)`.
#[derive(Debug, Default)]
pub struct VerifierList {
    verifiers: HashMap<(String, u32), NoteVerifier>,
}

impl VerifierList {
    pub fn new(verifiers: impl IntoIterator<Item = NoteVerifier>) -> Self {
        let verifiers = verifiers
            .into_iter()
            .map(|v| ((v.name.clone(), v.key_hash), v))
            .collect();
        Self { verifiers }
    }

    fn route(&self, name: &str, key_hash: u32) -> Option<&NoteVerifier> {
        self.verifiers.get(&(name.to_string(), key_hash))
    }
}

impl From<NoteVerifier> for VerifierList {
    fn from(verifier: NoteVerifier) -> Self {
        Self::new([verifier])
    }
}

/// Opens a signed note, requiring at least one signature that verifies
/// against `verifiers`.
///
/// The policy is strict: a well-formed envelope whose signatures all come
/// from unknown keys fails with [`FwLogError::UnknownSigner`], and a matched
/// verifier that rejects fails with [`FwLogError::BadSignature`]. There is no
/// "opened but unverified" result.
pub fn open(msg: &[u8], verifiers: &VerifierList) -> FwLogResult<Note> {
    if msg.last() != Some(&b'\n') {
        return Err(FwLogError::BadNote);
    }
    let msg = std::str::from_utf8(msg).map_err(|_| FwLogError::BadNote)?;

    // The signature block starts after the last blank line; note bodies may
    // themselves contain blank lines.
    let split = msg.rfind("\n\n").ok_or(FwLogError::BadNote)?;
    let text = &msg[..split + 1];
    let sig_block = &msg[split + 2..];
    if sig_block.is_empty() {
        return Err(FwLogError::BadNote);
    }
    // The final newline is guaranteed above; everything between newlines
    // must be a well-formed signature line.
    let sig_lines = sig_block
        .strip_suffix('\n')
        .ok_or(FwLogError::BadNote)?
        .split('\n');

    let mut sigs = Vec::new();
    let mut first_unknown: Option<String> = None;
    for line in sig_lines {
        let rest = line.strip_prefix(SIG_PREFIX).ok_or(FwLogError::BadNote)?;
        let (name, sig_b64) = rest.split_once(' ').ok_or(FwLogError::BadNote)?;
        if !valid_name(name) {
            return Err(FwLogError::BadNote);
        }
        let payload = B64
            .decode(sig_b64.as_bytes())
            .map_err(|_| FwLogError::BadNote)?;
        if payload.len() <= KEY_HASH_SIZE {
            return Err(FwLogError::BadNote);
        }
        let (prefix, signature) = payload.split_at(KEY_HASH_SIZE);
        let hash = u32::from_be_bytes([prefix[0], prefix[1], prefix[2], prefix[3]]);

        match verifiers.route(name, hash) {
            Some(verifier) => {
                if !verifier.verify(text.as_bytes(), signature) {
                    return Err(FwLogError::BadSignature {
                        name: name.to_string(),
                    });
                }
                let verified = VerifiedSignature {
                    name: name.to_string(),
                    key_hash: hash,
                };
                if !sigs.contains(&verified) {
                    sigs.push(verified);
                }
            }
            None => {
                if first_unknown.is_none() {
                    first_unknown = Some(name.to_string());
                }
            }
        }
    }

    if sigs.is_empty() {
        let name = first_unknown.unwrap_or_default();
        return Err(FwLogError::UnknownSigner { name });
    }

    Ok(Note {
        text: text.to_string(),
        sigs,
    })
}

/// Signs `text` (which must end in a newline) and returns the full note
/// bytes: body, blank line, one signature line.
pub fn sign(text: &str, signer: &NoteSigner) -> FwLogResult<Vec<u8>> {
    if !text.ends_with('\n') {
        return Err(FwLogError::BadNote);
    }
    let signature = signer.sign(text.as_bytes());

    let mut payload = signer.key_hash().to_be_bytes().to_vec();
    payload.extend_from_slice(&signature.to_bytes());

    let note = format!(
        "{text}\n{SIG_PREFIX}{} {}\n",
        signer.name(),
        B64.encode(&payload)
    );
    Ok(note.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn keypair(name: &str) -> (NoteSigner, NoteVerifier) {
        let (private, public) = generate_key(name).unwrap();
        let signer = NoteSigner::from_private_key(&private).unwrap();
        let verifier = NoteVerifier::from_public_key(&public).unwrap();
        (signer, verifier)
    }

    #[test]
    fn generated_keys_agree_on_name_and_hash() {
        let (signer, verifier) = keypair("release-signer");
        assert_eq!(signer.name(), "release-signer");
        assert_eq!(verifier.name(), "release-signer");
        assert_eq!(signer.key_hash(), verifier.key_hash());
    }

    #[test]
    fn sign_open_round_trip() {
        let (signer, verifier) = keypair("log");
        let body = "a body\nwith two lines\n";
        let msg = sign(body, &signer).unwrap();
        let note = open(&msg, &VerifierList::from(verifier)).unwrap();
        assert_eq!(note.text, body);
        assert_eq!(note.sigs.len(), 1);
        assert_eq!(note.sigs[0].name, "log");
    }

    #[test]
    fn body_containing_blank_lines_survives() {
        let (signer, verifier) = keypair("log");
        let body = "first paragraph\n\nsecond paragraph\n";
        let msg = sign(body, &signer).unwrap();
        let note = open(&msg, &VerifierList::from(verifier)).unwrap();
        assert_eq!(note.text, body);
    }

    #[test]
    fn sign_requires_trailing_newline() {
        let (signer, _) = keypair("log");
        assert!(matches!(
            sign("no newline", &signer),
            Err(FwLogError::BadNote)
        ));
    }

    #[test]
    fn open_rejects_unknown_signer() {
        let (signer, _) = keypair("log");
        let (_, other_verifier) = keypair("someone-else");
        let msg = sign("body\n", &signer).unwrap();
        match open(&msg, &VerifierList::from(other_verifier)) {
            Err(FwLogError::UnknownSigner { name }) => assert_eq!(name, "log"),
            other => panic!("expected UnknownSigner, got {other:?}"),
        }
    }

    #[test]
    fn open_rejects_same_name_different_key_as_unknown() {
        // Same signer name, different key material: the key-hash prefix
        // must keep them apart.
        let (signer, _) = keypair("log");
        let (_, impostor_verifier) = keypair("log");
        let msg = sign("body\n", &signer).unwrap();
        assert!(matches!(
            open(&msg, &VerifierList::from(impostor_verifier)),
            Err(FwLogError::UnknownSigner { .. })
        ));
    }

    #[test]
    fn open_rejects_tampered_body() {
        let (signer, verifier) = keypair("log");
        let msg = sign("genuine body\n", &signer).unwrap();
        let tampered = String::from_utf8(msg)
            .unwrap()
            .replace("genuine", "doctored");
        match open(tampered.as_bytes(), &VerifierList::from(verifier)) {
            Err(FwLogError::BadSignature { name }) => assert_eq!(name, "log"),
            other => panic!("expected BadSignature, got {other:?}"),
        }
    }

    #[test]
    fn open_accepts_one_known_signature_among_unknown() {
        let (log_signer, log_verifier) = keypair("log");
        let (other_signer, _) = keypair("witness");
        let body = "body\n";

        let known = sign(body, &log_signer).unwrap();
        let unknown = sign(body, &other_signer).unwrap();
        // Splice the witness signature line onto the log-signed note.
        let unknown_line = String::from_utf8(unknown).unwrap();
        let witness_sig = unknown_line.rsplit_once("\n\n").unwrap().1;
        let mut combined = known;
        combined.extend_from_slice(witness_sig.as_bytes());

        let note = open(&combined, &VerifierList::from(log_verifier)).unwrap();
        assert_eq!(note.sigs.len(), 1);
        assert_eq!(note.sigs[0].name, "log");
    }

    #[test]
    fn open_rejects_malformed_framing() {
        let (signer, verifier) = keypair("log");
        let verifiers = VerifierList::from(verifier);
        let msg = String::from_utf8(sign("body\n", &signer).unwrap()).unwrap();

        // No blank line between body and signatures.
        let no_blank = msg.replacen("\n\n", "\n", 1);
        assert!(matches!(
            open(no_blank.as_bytes(), &verifiers),
            Err(FwLogError::BadNote)
        ));

        // Missing final newline.
        let clipped = &msg.as_bytes()[..msg.len() - 1];
        assert!(matches!(open(clipped, &verifiers), Err(FwLogError::BadNote)));

        // Signature line missing the em-dash prefix.
        let plain_dash = msg.replace('\u{2014}', "-");
        assert!(matches!(
            open(plain_dash.as_bytes(), &verifiers),
            Err(FwLogError::BadNote)
        ));

        // Trailing garbage after the signature block.
        let mut trailing = msg.clone().into_bytes();
        trailing.extend_from_slice(b"left over\n");
        assert!(matches!(
            open(&trailing, &verifiers),
            Err(FwLogError::BadNote)
        ));

        // Signature payload is not base64.
        let bad_b64 = "body\n\n\u{2014} log not!base64\n";
        assert!(matches!(
            open(bad_b64.as_bytes(), &verifiers),
            Err(FwLogError::BadNote)
        ));

        // Empty input and bare body.
        assert!(matches!(open(b"", &verifiers), Err(FwLogError::BadNote)));
        assert!(matches!(
            open(b"body\n", &verifiers),
            Err(FwLogError::BadNote)
        ));
    }

    #[test]
    fn key_string_parsing_rejects_corruption() {
        let (private, public) = generate_key("log").unwrap();

        assert!(NoteVerifier::from_public_key("").is_err());
        assert!(NoteVerifier::from_public_key("log").is_err());
        assert!(NoteVerifier::from_public_key("log+zzzz+AAAA").is_err());
        // Declared hash does not match the key material.
        let mut wrong_hash = public.clone();
        wrong_hash.replace_range(
            public.find('+').unwrap() + 1..public.find('+').unwrap() + 9,
            "00000000",
        );
        assert!(NoteVerifier::from_public_key(&wrong_hash).is_err());

        assert!(NoteSigner::from_private_key(&public).is_err());
        assert!(NoteSigner::from_private_key("PRIVATE+KEY+log").is_err());
        let truncated = &private[..private.len() - 4];
        assert!(NoteSigner::from_private_key(truncated).is_err());
    }

    #[test]
    fn invalid_names_rejected() {
        assert!(generate_key("").is_err());
        assert!(generate_key("has space").is_err());
        assert!(generate_key("has+plus").is_err());
        assert!(generate_key("has\nnewline").is_err());
    }

    proptest! {
        #[test]
        fn open_never_panics(data in proptest::collection::vec(any::<u8>(), 0..512)) {
            let _ = open(&data, &VerifierList::default());
        }
    }
}
