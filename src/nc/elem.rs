//! Typed TLV elements.
//!
//! Wire format of one element:
//! ```text
//! ┌──────────┬─────────────┬──────────────────┐
//! │ Type (1B)│ Length (2B) │ Value (Length B) │
//! │          │ LE u16      │                  │
//! └──────────┴─────────────┴──────────────────┘
//! ```
//!
//! Decoding never copies: a [`ParamElem`] is a view into the receive
//! buffer and cannot outlive the callback it was handed to.  Encoding is
//! done through [`Param`] values written by the command builder.

use heapless::Vec as HVec;

use crate::config::MAX_ELEMS;

/// Element header size (type + LE length).
pub const ELEM_HDR_LEN: usize = 3;

/// Length of a MAC address element.
pub const MAC_ADDR_LEN: usize = 6;

/// Element type codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ElemType {
    /// Placeholder carrying no value; used for query parameters.
    Invalid = 0,
    Bool = 1,
    /// Signed little-endian integer, 1/2/4/8 bytes.
    Integer = 2,
    /// Unsigned little-endian integer, 1/2/4/8 bytes.
    IntegerUnsigned = 3,
    /// 16.16 value: integer part `u16`, fractional part `i16`.
    IntegerFrac = 4,
    String = 5,
    ByteArray = 6,
    MacAddr = 7,
}

impl ElemType {
    pub fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Invalid),
            1 => Some(Self::Bool),
            2 => Some(Self::Integer),
            3 => Some(Self::IntegerUnsigned),
            4 => Some(Self::IntegerFrac),
            5 => Some(Self::String),
            6 => Some(Self::ByteArray),
            7 => Some(Self::MacAddr),
            _ => None,
        }
    }
}

/// Fractional integer, as used for indexed parameter ids.
///
/// `f == -1` conventionally marks the "count" entry of a list.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FractInt {
    pub i: u16,
    pub f: i16,
}

impl FractInt {
    pub const fn new(i: u16, f: i16) -> Self {
        Self { i, f }
    }

    /// Packed form, `(i << 16) | f`.
    pub const fn to_bits(self) -> u32 {
        ((self.i as u32) << 16) | (self.f as u16 as u32)
    }

    pub const fn from_bits(bits: u32) -> Self {
        Self {
            i: (bits >> 16) as u16,
            f: bits as u16 as i16,
        }
    }
}

/// 48-bit hardware address.
pub type MacAddr = [u8; MAC_ADDR_LEN];

// ── Decoding ──────────────────────────────────────────────────

/// One decoded element, borrowing its value from the receive buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParamElem<'a> {
    pub ty: ElemType,
    pub value: &'a [u8],
}

/// Elements of one response or event.
pub type ElemList<'a> = HVec<ParamElem<'a>, MAX_ELEMS>;

/// Copy an element's value into `out` if it has the expected type.
///
/// Returns the number of bytes written.  Zero means "absent": the element
/// was missing, of another type, empty, or `out` had no room.  In every
/// zero case `out` is left untouched.
///
/// Integers are sign- or zero-extended to 64 bits and the low
/// `out.len().min(8)` bytes are written little-endian.  Fractional
/// integers are written as their packed 32-bit form.
pub fn read_param_elem(elem: Option<&ParamElem<'_>>, expected: ElemType, out: &mut [u8]) -> usize {
    let Some(elem) = elem else {
        return 0;
    };
    if out.is_empty() || elem.value.is_empty() {
        return 0;
    }

    match expected {
        ElemType::Bool => {
            if elem.ty != ElemType::Bool {
                return 0;
            }
            out[0] = u8::from(elem.value[0] != 0);
            1
        }
        ElemType::Integer | ElemType::IntegerUnsigned => {
            let Some(wide) = widen_integer(elem) else {
                return 0;
            };
            let n = out.len().min(8);
            out[..n].copy_from_slice(&wide.to_le_bytes()[..n]);
            n
        }
        ElemType::IntegerFrac => {
            if elem.ty != ElemType::IntegerFrac || elem.value.len() != 4 || out.len() < 4 {
                return 0;
            }
            let i = u16::from_le_bytes([elem.value[0], elem.value[1]]);
            let f = i16::from_le_bytes([elem.value[2], elem.value[3]]);
            out[..4].copy_from_slice(&FractInt::new(i, f).to_bits().to_le_bytes());
            4
        }
        ElemType::String | ElemType::ByteArray => {
            if elem.ty != expected {
                return 0;
            }
            let n = elem.value.len().min(out.len());
            out[..n].copy_from_slice(&elem.value[..n]);
            n
        }
        ElemType::MacAddr => {
            if elem.ty != ElemType::MacAddr || elem.value.len() != MAC_ADDR_LEN || out.len() < MAC_ADDR_LEN {
                return 0;
            }
            out[..MAC_ADDR_LEN].copy_from_slice(elem.value);
            MAC_ADDR_LEN
        }
        ElemType::Invalid => 0,
    }
}

/// Integer element extended to 64 bits according to its signedness.
fn widen_integer(elem: &ParamElem<'_>) -> Option<u64> {
    let v = elem.value;
    if !matches!(v.len(), 1 | 2 | 4 | 8) {
        return None;
    }
    let mut raw = [0u8; 8];
    raw[..v.len()].copy_from_slice(v);
    match elem.ty {
        ElemType::IntegerUnsigned => Some(u64::from_le_bytes(raw)),
        ElemType::Integer => {
            let shift = 64 - 8 * v.len() as u32;
            Some(((i64::from_le_bytes(raw) << shift) >> shift) as u64)
        }
        _ => None,
    }
}

impl<'a> ParamElem<'a> {
    pub fn as_bool(&self) -> Option<bool> {
        let mut out = [0u8; 1];
        (read_param_elem(Some(self), ElemType::Bool, &mut out) == 1).then_some(out[0] != 0)
    }

    pub fn as_i64(&self) -> Option<i64> {
        let mut out = [0u8; 8];
        (read_param_elem(Some(self), ElemType::Integer, &mut out) == 8).then(|| i64::from_le_bytes(out))
    }

    pub fn as_u64(&self) -> Option<u64> {
        self.as_i64().map(|v| v as u64)
    }

    pub fn as_frac(&self) -> Option<FractInt> {
        let mut out = [0u8; 4];
        (read_param_elem(Some(self), ElemType::IntegerFrac, &mut out) == 4)
            .then(|| FractInt::from_bits(u32::from_le_bytes(out)))
    }

    /// String or byte-array payload, borrowed.
    pub fn as_bytes(&self) -> Option<&'a [u8]> {
        matches!(self.ty, ElemType::String | ElemType::ByteArray).then_some(self.value)
    }

    pub fn as_mac(&self) -> Option<MacAddr> {
        let mut out = [0u8; MAC_ADDR_LEN];
        (read_param_elem(Some(self), ElemType::MacAddr, &mut out) == MAC_ADDR_LEN).then_some(out)
    }
}

/// Split `raw` into exactly `count` elements.
///
/// Returns `None` if `count` exceeds [`MAX_ELEMS`], an element runs past
/// the end, carries an unknown type, or bytes are left over.
pub fn unpack_elements(count: usize, raw: &[u8]) -> Option<ElemList<'_>> {
    if count > MAX_ELEMS {
        return None;
    }

    let mut elems = ElemList::new();
    let mut offset = 0;

    for _ in 0..count {
        let hdr = raw.get(offset..offset + ELEM_HDR_LEN)?;
        let ty = ElemType::from_u8(hdr[0])?;
        let len = u16::from_le_bytes([hdr[1], hdr[2]]) as usize;
        offset += ELEM_HDR_LEN;

        let value = raw.get(offset..offset + len)?;
        offset += len;

        elems.push(ParamElem { ty, value }).ok()?;
    }

    (offset == raw.len()).then_some(elems)
}

// ── Encoding ──────────────────────────────────────────────────

/// One parameter to be TLV-encoded into a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param<'a> {
    /// Explicit "no value" placeholder (a query).
    Invalid,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Frac(FractInt),
    Str(&'a [u8]),
    Bytes(&'a [u8]),
    Mac(MacAddr),
}

impl Param<'_> {
    /// Total encoded size including the element header.
    pub fn encoded_len(&self) -> usize {
        ELEM_HDR_LEN + self.value_len()
    }

    fn value_len(&self) -> usize {
        match self {
            Self::Invalid => 0,
            Self::Bool(_) => 1,
            Self::Int(v) => signed_width(*v),
            Self::Uint(v) => unsigned_width(*v),
            Self::Frac(_) => 4,
            Self::Str(s) | Self::Bytes(s) => s.len(),
            Self::Mac(_) => MAC_ADDR_LEN,
        }
    }

    fn elem_type(&self) -> ElemType {
        match self {
            Self::Invalid => ElemType::Invalid,
            Self::Bool(_) => ElemType::Bool,
            Self::Int(_) => ElemType::Integer,
            Self::Uint(_) => ElemType::IntegerUnsigned,
            Self::Frac(_) => ElemType::IntegerFrac,
            Self::Str(_) => ElemType::String,
            Self::Bytes(_) => ElemType::ByteArray,
            Self::Mac(_) => ElemType::MacAddr,
        }
    }

    /// Write the element into `out`.  Returns bytes written, or `None` if
    /// `out` is too small or the value exceeds the 16-bit length field.
    pub fn encode(&self, out: &mut [u8]) -> Option<usize> {
        let len = self.value_len();
        let total = ELEM_HDR_LEN + len;
        if total > out.len() || len > usize::from(u16::MAX) {
            return None;
        }

        out[0] = self.elem_type() as u8;
        out[1..3].copy_from_slice(&(len as u16).to_le_bytes());
        let value = &mut out[ELEM_HDR_LEN..total];

        match self {
            Self::Invalid => {}
            Self::Bool(b) => value[0] = u8::from(*b),
            Self::Int(v) => value.copy_from_slice(&v.to_le_bytes()[..len]),
            Self::Uint(v) => value.copy_from_slice(&v.to_le_bytes()[..len]),
            Self::Frac(fi) => {
                value[..2].copy_from_slice(&fi.i.to_le_bytes());
                value[2..].copy_from_slice(&fi.f.to_le_bytes());
            }
            Self::Str(s) | Self::Bytes(s) => value.copy_from_slice(s),
            Self::Mac(m) => value.copy_from_slice(m),
        }

        Some(total)
    }
}

fn signed_width(v: i64) -> usize {
    if i8::try_from(v).is_ok() {
        1
    } else if i16::try_from(v).is_ok() {
        2
    } else if i32::try_from(v).is_ok() {
        4
    } else {
        8
    }
}

fn unsigned_width(v: u64) -> usize {
    if v <= u64::from(u8::MAX) {
        1
    } else if v <= u64::from(u16::MAX) {
        2
    } else if v <= u64::from(u32::MAX) {
        4
    } else {
        8
    }
}
