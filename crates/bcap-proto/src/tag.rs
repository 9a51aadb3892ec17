//! VARIANT type tags.
//!
//! The low 12 bits of the 16-bit tag identify the element type; bit 13
//! (`0x2000`) marks an array of that element type. The remaining bits are
//! reserved by the upstream VARIANT type system and are not interpreted
//! here.

use crate::error::{hresult, Error, Result};

/// Bit marking a tag as an array of its element type.
pub const ARRAY_FLAG: u16 = 0x2000;

/// A single VARIANT element type (the tag with [`ARRAY_FLAG`] stripped).
///
/// These are the standard COM VARTYPE codes; only the subset this protocol
/// actually puts on the wire is modeled; everything else decodes to
/// `E_CAO_VARIANT_TYPE_NO_SUPPORT`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ElementType {
    /// VT_EMPTY
    Empty = 0,
    /// VT_NULL (decodes identically to `Empty`)
    Null = 1,
    /// VT_I2
    I2 = 2,
    /// VT_I4
    I4 = 3,
    /// VT_R4
    R4 = 4,
    /// VT_R8
    R8 = 5,
    /// VT_CY, carried as a raw 64-bit integer
    Currency = 6,
    /// VT_DATE
    Date = 7,
    /// VT_BSTR
    Bstr = 8,
    /// VT_ERROR
    Error = 10,
    /// VT_BOOL
    Bool = 11,
    /// VT_VARIANT, used only as the element type of a heterogeneous array
    Variant = 12,
    /// VT_I1
    I1 = 16,
    /// VT_UI1
    Ui1 = 17,
    /// VT_UI2
    Ui2 = 18,
    /// VT_UI4
    Ui4 = 19,
    /// VT_I8
    I8 = 20,
    /// VT_UI8
    Ui8 = 21,
}

impl ElementType {
    /// Decode a raw 12-bit type code. `None` for a type this library does
    /// not model.
    #[must_use]
    pub fn from_u16(v: u16) -> Option<Self> {
        Some(match v {
            0 => Self::Empty,
            1 => Self::Null,
            2 => Self::I2,
            3 => Self::I4,
            4 => Self::R4,
            5 => Self::R8,
            6 => Self::Currency,
            7 => Self::Date,
            8 => Self::Bstr,
            10 => Self::Error,
            11 => Self::Bool,
            12 => Self::Variant,
            16 => Self::I1,
            17 => Self::Ui1,
            18 => Self::Ui2,
            19 => Self::Ui4,
            20 => Self::I8,
            21 => Self::Ui8,
            _ => return None,
        })
    }

    /// Raw 12-bit type code.
    #[must_use]
    pub const fn to_u16(self) -> u16 {
        self as u16
    }

    /// Decode a raw 12-bit type code, failing with
    /// `E_CAO_VARIANT_TYPE_NO_SUPPORT` for unrecognized codes.
    pub fn require(v: u16) -> Result<Self> {
        Self::from_u16(v).ok_or_else(|| {
            Error::new(
                hresult::E_CAO_VARIANT_TYPE_NO_SUPPORT,
                format!("unsupported VARIANT element type 0x{v:04X}"),
            )
        })
    }

    /// Fixed on-wire size in bytes for this element type, or `None` for a
    /// variable-length type (`Bstr`, `Variant`).
    #[must_use]
    pub const fn fixed_size(self) -> Option<usize> {
        match self {
            Self::Empty | Self::Null => Some(0),
            Self::I1 | Self::Ui1 => Some(1),
            Self::I2 | Self::Ui2 | Self::Bool => Some(2),
            Self::I4 | Self::Ui4 | Self::R4 | Self::Error => Some(4),
            Self::I8 | Self::Ui8 | Self::R8 | Self::Currency | Self::Date => Some(8),
            Self::Bstr | Self::Variant => None,
        }
    }
}

/// A full 16-bit wire tag: an [`ElementType`] plus whether [`ARRAY_FLAG`] is
/// set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tag {
    /// The element type this tag carries (or is an array of).
    pub element: ElementType,
    /// Whether `ARRAY_FLAG` is set on the wire.
    pub is_array: bool,
}

impl Tag {
    /// Construct a scalar tag.
    #[must_use]
    pub const fn scalar(element: ElementType) -> Self {
        Self { element, is_array: false }
    }

    /// Construct an array tag.
    #[must_use]
    pub const fn array(element: ElementType) -> Self {
        Self { element, is_array: true }
    }

    /// Decode a raw 16-bit tag.
    pub fn from_u16(raw: u16) -> Result<Self> {
        let is_array = raw & ARRAY_FLAG != 0;
        let element = ElementType::require(raw & !ARRAY_FLAG)?;
        Ok(Self { element, is_array })
    }

    /// Encode to the raw 16-bit wire representation.
    #[must_use]
    pub fn to_u16(self) -> u16 {
        let base = self.element.to_u16();
        if self.is_array {
            base | ARRAY_FLAG
        } else {
            base
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn array_flag_round_trips() {
        let tag = Tag::array(ElementType::I4);
        let raw = tag.to_u16();
        assert_eq!(raw, 3 | ARRAY_FLAG);
        assert_eq!(Tag::from_u16(raw).unwrap(), tag);
    }

    #[test]
    fn scalar_tag_round_trips() {
        let tag = Tag::scalar(ElementType::Bstr);
        assert_eq!(Tag::from_u16(tag.to_u16()).unwrap(), tag);
    }

    #[test]
    fn unknown_element_type_rejected() {
        assert!(ElementType::from_u16(9).is_none()); // VT_DISPATCH, unsupported
        assert!(Tag::from_u16(9).is_err());
    }
}
