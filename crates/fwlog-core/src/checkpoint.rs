// Copyright (c) 2026 The FWLog Authors
// SPDX-License-Identifier: Apache-2.0

//! Checkpoint body codec.
//!
//! A checkpoint commits a log to `(origin, size, root)` and travels as the
//! body of a signed note. The textual form is exactly three
//! newline-terminated lines with nothing after them.

use crate::error::{FwLogError, FwLogResult};
use base64::{engine::general_purpose::STANDARD as B64, Engine as _};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Checkpoint {
    /// Identity of the log issuing this checkpoint. Checkpoints with
    /// different origins are unrelated.
    pub origin: String,
    /// Number of leaves committed to.
    pub size: u64,
    /// Merkle root over the first `size` leaves.
    pub root: Vec<u8>,
}

impl Checkpoint {
    /// Parses the three-line body form:
    ///
    /// ```text
    /// origin
    /// decimal size
    /// base64 root
    /// ```
    ///
    /// Anything after the root's newline, including further newlines, is
    /// rejected.
    pub fn unmarshal(data: &[u8]) -> FwLogResult<Self> {
        let malformed = |reason| FwLogError::MalformedCheckpoint { reason };

        let text = std::str::from_utf8(data).map_err(|_| malformed("not UTF-8"))?;
        let mut lines = text.splitn(4, '\n');
        let (Some(origin), Some(size), Some(root), Some(rest)) =
            (lines.next(), lines.next(), lines.next(), lines.next())
        else {
            return Err(malformed("too few lines"));
        };

        if origin.is_empty() {
            return Err(malformed("empty origin"));
        }
        // u64::from_str would accept a leading '+'; the wire form is digits
        // only.
        if size.is_empty() || !size.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed("size is not a decimal number"));
        }
        let size: u64 = size
            .parse()
            .map_err(|_| malformed("size out of 64-bit range"))?;
        let root = B64
            .decode(root.as_bytes())
            .map_err(|_| malformed("root hash is not base64"))?;
        if !rest.is_empty() {
            return Err(malformed("unexpected trailing data"));
        }

        Ok(Self {
            origin: origin.to_string(),
            size,
            root,
        })
    }

    pub fn marshal(&self) -> Vec<u8> {
        format!("{}\n{}\n{}\n", self.origin, self.size, B64.encode(&self.root)).into_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn unmarshal_reference_table() {
        struct Case {
            desc: &'static str,
            input: &'static str,
            want: Option<Checkpoint>,
        }
        let cases = [
            Case {
                desc: "valid one",
                input: "ArmoryDrive Log v0\n123\nYmFuYW5hcw==\n",
                want: Some(Checkpoint {
                    origin: "ArmoryDrive Log v0".to_string(),
                    size: 123,
                    root: b"bananas".to_vec(),
                }),
            },
            Case {
                desc: "valid with trailing data",
                input: "ArmoryDrive Log v0\n9944\ndGhlIHZpZXcgZnJvbSB0aGUgdHJlZSB0b3BzIGlzIGdyZWF0IQ==\nHere's some associated data.\n",
                want: None,
            },
            Case {
                desc: "trailing data lines",
                input: "ArmoryDrive Log v0\n9944\ndGhlIHZpZXcgZnJvbSB0aGUgdHJlZSB0b3BzIGlzIGdyZWF0IQ==\nlots\nof\nlines\n",
                want: None,
            },
            Case {
                desc: "valid with trailing newlines",
                input: "ArmoryDrive Log v0\n9944\ndGhlIHZpZXcgZnJvbSB0aGUgdHJlZSB0b3BzIGlzIGdyZWF0IQ==\n\n\n\n",
                want: None,
            },
            Case {
                desc: "invalid - insufficient lines",
                input: "Head\n9944\n",
                want: None,
            },
            Case {
                desc: "invalid - empty header",
                input: "\n9944\ndGhlIHZpZXcgZnJvbSB0aGUgdHJlZSB0b3BzIGlzIGdyZWF0IQ==\n",
                want: None,
            },
            Case {
                desc: "invalid - missing newline on roothash",
                input: "ArmoryDrive Log v0\n123\nYmFuYW5hcw==",
                want: None,
            },
            Case {
                desc: "invalid size - not a number",
                input: "ArmoryDrive Log v0\nbananas\ndGhlIHZpZXcgZnJvbSB0aGUgdHJlZSB0b3BzIGlzIGdyZWF0IQ==\n",
                want: None,
            },
            Case {
                desc: "invalid size - negative",
                input: "ArmoryDrive Log v0\n-34\ndGhlIHZpZXcgZnJvbSB0aGUgdHJlZSB0b3BzIGlzIGdyZWF0IQ==\n",
                want: None,
            },
            Case {
                desc: "invalid size - too large",
                input: "ArmoryDrive Log v0\n3438945738945739845734895735\ndGhlIHZpZXcgZnJvbSB0aGUgdHJlZSB0b3BzIGlzIGdyZWF0IQ==\n",
                want: None,
            },
            Case {
                desc: "invalid roothash - not base64",
                input: "ArmoryDrive Log v0\n123\nThisIsn'tBase64\n",
                want: None,
            },
        ];

        for case in cases {
            let got = Checkpoint::unmarshal(case.input.as_bytes());
            match (&case.want, got) {
                (Some(want), Ok(got)) => assert_eq!(want, &got, "{}", case.desc),
                (None, Err(_)) => {}
                (want, got) => panic!("{}: want {want:?}, got {got:?}", case.desc),
            }
        }
    }

    #[test]
    fn marshal_round_trip() {
        let cp = Checkpoint {
            origin: "Firmware Log v1".to_string(),
            size: 604,
            root: vec![0xab; 32],
        };
        let encoded = cp.marshal();
        assert_eq!(Checkpoint::unmarshal(&encoded).unwrap(), cp);
    }

    #[test]
    fn size_rejects_plus_sign_and_padding_relaxation() {
        assert!(Checkpoint::unmarshal(b"Log\n+123\nYmFuYW5hcw==\n").is_err());
        // Unpadded base64 for "bananas" must be rejected.
        assert!(Checkpoint::unmarshal(b"Log\n123\nYmFuYW5hcw\n").is_err());
    }

    #[test]
    fn zero_size_checkpoint_parses() {
        let cp = Checkpoint::unmarshal(b"Log\n0\n\n").unwrap();
        assert_eq!(cp.size, 0);
        assert!(cp.root.is_empty());
    }

    proptest! {
        #[test]
        fn unmarshal_never_panics(data in proptest::collection::vec(any::<u8>(), 0..256)) {
            let _ = Checkpoint::unmarshal(&data);
        }
    }
}
