//! Load-order independent form descriptors.
//!
//! A numeric form id encodes the position of its source file in the current
//! load order in its top byte. Saved snapshots must survive a change of load
//! order, so they reference forms by `(file name, 24-bit local id)` instead.
//! [`FormDesc`] is that pair, together with the codec to and from the
//! session's numeric ids and its stable string form:
//!
//! | Form | String |
//! |------|--------|
//! | local id `0x14` in `Skyrim.esm` | `14:Skyrim.esm` |
//! | runtime-created `0xff000abc` | `ff000abc` |

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::FormDescError;

/// Mask selecting the file-local part of a numeric form id.
const LOCAL_ID_MASK: u32 = 0x00FF_FFFF;

/// Number of bits the load-order index is shifted by.
const FILE_INDEX_SHIFT: u32 = 24;

/// Highest load-order index that can be encoded (0xFF is reserved for
/// runtime-created forms).
const MAX_FILE_INDEX: usize = 0xFE;

/// Stable identifier of a form, independent of the session's load order.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FormDesc {
    /// File-local id (24 bits) when `file` is set, the full id otherwise.
    pub short_form_id: u32,
    /// Source file name, empty for forms that do not come from a file.
    pub file: String,
}

impl FormDesc {
    /// Create a descriptor for a form defined in `file`.
    pub fn new(short_form_id: u32, file: impl Into<String>) -> Self {
        Self {
            short_form_id,
            file: file.into(),
        }
    }

    /// Create a descriptor for a form that is not backed by any file.
    pub const fn runtime(form_id: u32) -> Self {
        Self {
            short_form_id: form_id,
            file: String::new(),
        }
    }

    /// Whether the descriptor is file-qualified.
    pub const fn has_file(&self) -> bool {
        !self.file.is_empty()
    }

    /// Describe a numeric session id using the given load order.
    ///
    /// Ids whose top byte does not index into `load_order` (runtime-created
    /// ids in particular) produce a file-less descriptor that carries the
    /// whole id.
    pub fn from_form_id(form_id: u32, load_order: &[String]) -> Self {
        let index = form_id.checked_shr(FILE_INDEX_SHIFT).unwrap_or(0);
        let file = usize::try_from(index)
            .ok()
            .and_then(|i| load_order.get(i));
        match file {
            Some(file) => Self::new(form_id & LOCAL_ID_MASK, file.clone()),
            None => Self::runtime(form_id),
        }
    }

    /// Resolve the descriptor to a numeric session id using the given load
    /// order.
    ///
    /// # Errors
    ///
    /// Returns [`FormDescError::UnknownFile`] if the file is not loaded, or
    /// [`FormDescError::LoadOrderIndexOutOfRange`] if its position cannot be
    /// encoded.
    pub fn to_form_id(&self, load_order: &[String]) -> Result<u32, FormDescError> {
        if !self.has_file() {
            return Ok(self.short_form_id);
        }
        let index = load_order
            .iter()
            .position(|f| *f == self.file)
            .ok_or_else(|| FormDescError::UnknownFile(self.file.clone()))?;
        if index > MAX_FILE_INDEX {
            return Err(FormDescError::LoadOrderIndexOutOfRange { index });
        }
        let index = u32::try_from(index)
            .map_err(|_err| FormDescError::LoadOrderIndexOutOfRange { index })?;
        let high = index
            .checked_shl(FILE_INDEX_SHIFT)
            .ok_or(FormDescError::LoadOrderIndexOutOfRange {
                index: MAX_FILE_INDEX,
            })?;
        Ok(high | (self.short_form_id & LOCAL_ID_MASK))
    }
}

impl fmt::Display for FormDesc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.has_file() {
            write!(f, "{:x}:{}", self.short_form_id, self.file)
        } else {
            write!(f, "{:x}", self.short_form_id)
        }
    }
}

impl FromStr for FormDesc {
    type Err = FormDescError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() {
            return Err(FormDescError::Empty);
        }
        let (id_part, file) = s.split_once(':').unwrap_or((s, ""));
        let short_form_id =
            u32::from_str_radix(id_part, 16).map_err(|_err| FormDescError::InvalidHex {
                input: s.to_owned(),
            })?;
        if !file.is_empty() && short_form_id > LOCAL_ID_MASK {
            return Err(FormDescError::LocalIdOutOfRange { id: short_form_id });
        }
        Ok(Self::new(short_form_id, file))
    }
}

impl Serialize for FormDesc {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for FormDesc {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn load_order() -> Vec<String> {
        vec![
            "Skyrim.esm".to_owned(),
            "Update.esm".to_owned(),
            "Dawnguard.esm".to_owned(),
        ]
    }

    #[test]
    fn string_form_matches_examples() {
        assert_eq!(FormDesc::new(0x14, "Skyrim.esm").to_string(), "14:Skyrim.esm");
        assert_eq!(FormDesc::runtime(0xff00_0abc).to_string(), "ff000abc");
    }

    #[test]
    fn parse_accepts_both_forms() {
        let qualified: FormDesc = "1a2b:Dawnguard.esm".parse().unwrap();
        assert_eq!(qualified, FormDesc::new(0x1a2b, "Dawnguard.esm"));

        let bare: FormDesc = "ff000001".parse().unwrap();
        assert_eq!(bare, FormDesc::runtime(0xff00_0001));
    }

    #[test]
    fn parse_rejects_garbage() {
        assert_eq!("".parse::<FormDesc>(), Err(FormDescError::Empty));
        assert!(matches!(
            "zz:Skyrim.esm".parse::<FormDesc>(),
            Err(FormDescError::InvalidHex { .. })
        ));
        assert_eq!(
            "1000000:Skyrim.esm".parse::<FormDesc>(),
            Err(FormDescError::LocalIdOutOfRange { id: 0x0100_0000 })
        );
    }

    #[test]
    fn numeric_codec_uses_load_order_position() {
        let order = load_order();
        let desc = FormDesc::from_form_id(0x0200_1a2b, &order);
        assert_eq!(desc, FormDesc::new(0x1a2b, "Dawnguard.esm"));
        assert_eq!(desc.to_form_id(&order).unwrap(), 0x0200_1a2b);
    }

    #[test]
    fn descriptor_survives_load_order_change() {
        let before = load_order();
        let desc = FormDesc::from_form_id(0x0200_1a2b, &before);

        let after = vec!["Skyrim.esm".to_owned(), "Dawnguard.esm".to_owned()];
        assert_eq!(desc.to_form_id(&after).unwrap(), 0x0100_1a2b);
    }

    #[test]
    fn runtime_ids_bypass_load_order() {
        let order = load_order();
        let desc = FormDesc::from_form_id(0xff00_0010, &order);
        assert!(!desc.has_file());
        assert_eq!(desc.to_form_id(&[]).unwrap(), 0xff00_0010);
    }

    #[test]
    fn unknown_file_is_an_error() {
        let desc = FormDesc::new(0x10, "Missing.esp");
        assert_eq!(
            desc.to_form_id(&load_order()),
            Err(FormDescError::UnknownFile("Missing.esp".to_owned()))
        );
    }

    #[test]
    fn serde_uses_string_form() {
        let desc = FormDesc::new(0x3c, "Skyrim.esm");
        let json = serde_json::to_string(&desc).unwrap();
        assert_eq!(json, "\"3c:Skyrim.esm\"");
        let back: FormDesc = serde_json::from_str(&json).unwrap();
        assert_eq!(back, desc);
    }
}
