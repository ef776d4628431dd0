// SPDX-License-Identifier: Apache-2.0

//! Workload identity carried in pod names.
//!
//! A process guid is an application guid plus an application version guid.
//! Pod names embed it in a shortened, filename-safe form: each guid's 16 raw
//! bytes as unpadded lower-case base-32, joined by `-`.

use std::fmt;
use std::str::FromStr;

use data_encoding::{BASE32, BASE32_NOPAD};
use uuid::Uuid;

use crate::receivers::container_logs::error::IdentityError;

const SEGMENT_SEPARATOR: char = '-';
const BASE32_BLOCK: usize = 8;
const HYPHENATED_UUID_LEN: usize = 36;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProcessGuid {
    app_guid: Uuid,
    app_version: Uuid,
}

impl ProcessGuid {
    pub fn new(app_guid: Uuid, app_version: Uuid) -> Self {
        Self {
            app_guid,
            app_version,
        }
    }

    pub fn app_guid(&self) -> Uuid {
        self.app_guid
    }

    pub fn app_version(&self) -> Uuid {
        self.app_version
    }

    /// Application id as it appears on emitted log entries.
    pub fn app_id(&self) -> String {
        self.app_guid.hyphenated().to_string()
    }

    /// The filename-safe form embedded in pod names.
    pub fn shortened(&self) -> String {
        format!(
            "{}{}{}",
            encode_segment(&self.app_guid),
            SEGMENT_SEPARATOR,
            encode_segment(&self.app_version)
        )
    }

    /// Inverse of [`ProcessGuid::shortened`].
    ///
    /// Matching is case-insensitive. Any failure collapses into
    /// [`IdentityError::InvalidIdentityEncoding`]; the message is for logs only.
    pub fn decode(shortened: &str) -> Result<Self, IdentityError> {
        let upper = shortened.to_uppercase();
        let segments: Vec<&str> = upper.split(SEGMENT_SEPARATOR).collect();
        let [app_guid, app_version] = segments.as_slice() else {
            return Err(invalid(format!(
                "expected 2 segments, found {}",
                segments.len()
            )));
        };

        Ok(Self {
            app_guid: decode_segment(app_guid, "appGuid")?,
            app_version: decode_segment(app_version, "appVersion")?,
        })
    }
}

impl fmt::Display for ProcessGuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-{}",
            self.app_guid.hyphenated(),
            self.app_version.hyphenated()
        )
    }
}

/// Parses the long form `<app guid>-<app version guid>`.
impl FromStr for ProcessGuid {
    type Err = IdentityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (app_guid, app_version) = match s.split_at_checked(HYPHENATED_UUID_LEN) {
            Some((guid, rest)) => match rest.strip_prefix(SEGMENT_SEPARATOR) {
                Some(version) => (guid, version),
                None => return Err(invalid(format!("malformed process guid {}", s))),
            },
            None => return Err(invalid(format!("process guid {} is too short", s))),
        };

        let parse = |part: &str| {
            Uuid::parse_str(part).map_err(|e| invalid(format!("{}: {}", part, e)))
        };
        Ok(Self::new(parse(app_guid)?, parse(app_version)?))
    }
}

/// Shortened form of an application guid and version, as embedded in pod names.
pub fn encode(app_guid: Uuid, app_version: Uuid) -> String {
    ProcessGuid::new(app_guid, app_version).shortened()
}

fn invalid(reason: String) -> IdentityError {
    IdentityError::InvalidIdentityEncoding(reason)
}

fn encode_segment(guid: &Uuid) -> String {
    BASE32_NOPAD.encode(guid.as_bytes()).to_lowercase()
}

fn decode_segment(segment: &str, what: &str) -> Result<Uuid, IdentityError> {
    if segment.is_empty() {
        return Err(invalid(format!("empty {} segment", what)));
    }

    let padded = pad(segment);
    let raw = BASE32
        .decode(padded.as_bytes())
        .map_err(|e| invalid(format!("unable to decode {}: {}", what, e)))?;

    Uuid::from_slice(&raw).map_err(|e| invalid(format!("unable to parse {}: {}", what, e)))
}

/// Right-pads with `=` up to the next multiple of the base-32 block size.
fn pad(segment: &str) -> String {
    let missing = (BASE32_BLOCK - segment.len() % BASE32_BLOCK) % BASE32_BLOCK;
    let mut padded = String::with_capacity(segment.len() + missing);
    padded.push_str(segment);
    padded.extend(std::iter::repeat_n('=', missing));
    padded
}

#[cfg(test)]
mod tests {
    use super::*;

    const APP_GUID: &str = "8d0f2b6a-3c1e-4f5a-9b7d-2e6c1a4f8b90";
    const APP_VERSION: &str = "1c9e4d7b-6a2f-4e8c-b3d5-7f0a9e2c6b14";

    fn process_guid() -> ProcessGuid {
        format!("{}-{}", APP_GUID, APP_VERSION).parse().unwrap()
    }

    #[test]
    fn test_round_trip() {
        let guid = process_guid();
        let shortened = guid.shortened();

        let decoded = ProcessGuid::decode(&shortened).unwrap();
        assert_eq!(decoded.app_guid().to_string(), APP_GUID);
        assert_eq!(decoded.app_version().to_string(), APP_VERSION);
        assert_eq!(decoded.app_id(), APP_GUID);
    }

    #[test]
    fn test_round_trip_many() {
        for i in 0..64u128 {
            let a = Uuid::from_u128(i.wrapping_mul(0x9e37_79b9_7f4a_7c15_f39c_c060_5ced_c834));
            let b = Uuid::from_u128(!i);
            let guid = ProcessGuid::new(a, b);
            assert_eq!(ProcessGuid::decode(&guid.shortened()).unwrap(), guid);
        }
    }

    #[test]
    fn test_encode_matches_shortened() {
        let guid = process_guid();
        assert_eq!(
            encode(guid.app_guid(), guid.app_version()),
            guid.shortened()
        );
    }

    #[test]
    fn test_shortened_is_filename_safe() {
        let shortened = process_guid().shortened();

        assert!(!shortened.contains('='));
        assert!(!shortened.contains('_'));
        assert_eq!(shortened.matches('-').count(), 1);
        assert_eq!(shortened, shortened.to_lowercase());
        // 16 bytes -> 26 base-32 characters per segment
        assert_eq!(shortened.len(), 26 * 2 + 1);
    }

    #[test]
    fn test_decode_accepts_upper_case() {
        let guid = process_guid();
        let decoded = ProcessGuid::decode(&guid.shortened().to_uppercase()).unwrap();
        assert_eq!(decoded, guid);
    }

    #[test]
    fn test_decode_rejects_wrong_segment_count() {
        let shortened = process_guid().shortened();
        let (first, _) = shortened.split_once('-').unwrap();

        assert!(ProcessGuid::decode(first).is_err());
        assert!(ProcessGuid::decode(&format!("{}-extra", shortened)).is_err());
        assert!(ProcessGuid::decode("").is_err());
    }

    #[test]
    fn test_decode_rejects_empty_segment() {
        let shortened = process_guid().shortened();
        let (first, _) = shortened.split_once('-').unwrap();

        assert!(ProcessGuid::decode(&format!("{}-", first)).is_err());
        assert!(ProcessGuid::decode(&format!("-{}", first)).is_err());
    }

    #[test]
    fn test_decode_rejects_invalid_base32() {
        // '1' and '8' are outside the base-32 alphabet
        assert!(ProcessGuid::decode("11111111-88888888").is_err());
    }

    #[test]
    fn test_decode_rejects_wrong_length_payload() {
        // Valid base-32, but decodes to 5 bytes instead of 16
        let short = BASE32_NOPAD.encode(b"hello").to_lowercase();
        let err = ProcessGuid::decode(&format!("{}-{}", short, short)).unwrap_err();
        assert!(matches!(err, IdentityError::InvalidIdentityEncoding(_)));
    }

    #[test]
    fn test_pad() {
        assert_eq!(pad("ABCDEFGH"), "ABCDEFGH");
        assert_eq!(pad("ABC"), "ABC=====");
        assert_eq!(pad(&"A".repeat(26)), format!("{}======", "A".repeat(26)));
    }

    #[test]
    fn test_long_form_parse_and_display() {
        let guid = process_guid();
        assert_eq!(guid.to_string(), format!("{}-{}", APP_GUID, APP_VERSION));
        assert!("not-a-guid".parse::<ProcessGuid>().is_err());
        assert!(format!("{}+{}", APP_GUID, APP_VERSION).parse::<ProcessGuid>().is_err());
    }
}
