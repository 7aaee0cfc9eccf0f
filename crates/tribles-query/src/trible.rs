//! Fixed-width record layout.
//!
//! A trible is the 64-byte concatenation `entity ‖ attribute ‖ value`:
//!
//! - entity: 16 bytes (an [`Id`])
//! - attribute: 16 bytes (an [`Id`])
//! - value: 32 bytes (a [`Value`])
//!
//! All fields compare as unsigned byte strings. Index orderings, cursor
//! seeks and the direction flags of a query all rely on that order.
//!
//! An id stored in the value position is left-padded with zeros, so the
//! high half of the value (`bytes 32..48` of the trible) is zero and the
//! low half carries the id.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::QueryError;

pub const ID_SIZE: usize = 16;
pub const VALUE_SIZE: usize = 32;
pub const TRIBLE_SIZE: usize = ID_SIZE + ID_SIZE + VALUE_SIZE;

const E_START: usize = 0;
const A_START: usize = ID_SIZE;
const V_START: usize = ID_SIZE + ID_SIZE;
const V2_START: usize = V_START + ID_SIZE;

// ============================================================================
// Ids and values
// ============================================================================

/// A 16-byte entity or attribute identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Id(pub [u8; ID_SIZE]);

impl Id {
    pub const fn new(raw: [u8; ID_SIZE]) -> Self {
        Self(raw)
    }

    /// Big-endian encoding of `n`, so numeric order matches byte order.
    pub const fn from_u128(n: u128) -> Self {
        Self(n.to_be_bytes())
    }

    pub const fn raw(&self) -> &[u8; ID_SIZE] {
        &self.0
    }
}

impl TryFrom<&[u8]> for Id {
    type Error = QueryError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let raw: [u8; ID_SIZE] = bytes
            .try_into()
            .map_err(|_| QueryError::InvalidWidth {
                expected: ID_SIZE,
                actual: bytes.len(),
            })?;
        Ok(Self(raw))
    }
}

/// A 32-byte value; the unit every query slot is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Value(pub [u8; VALUE_SIZE]);

impl Value {
    pub const ZERO: Value = Value([0; VALUE_SIZE]);

    pub const fn new(raw: [u8; VALUE_SIZE]) -> Self {
        Self(raw)
    }

    /// Embed an id the way it is stored in a trible's value position.
    pub fn from_id(id: Id) -> Self {
        let mut raw = [0u8; VALUE_SIZE];
        raw[ID_SIZE..].copy_from_slice(&id.0);
        Self(raw)
    }

    pub fn from_u128(n: u128) -> Self {
        let mut raw = [0u8; VALUE_SIZE];
        raw[ID_SIZE..].copy_from_slice(&n.to_be_bytes());
        Self(raw)
    }

    /// Left-pad an infix of at most 32 bytes into a value.
    pub(crate) fn from_infix(infix: &[u8]) -> Self {
        debug_assert!(infix.len() <= VALUE_SIZE);
        let mut raw = [0u8; VALUE_SIZE];
        raw[VALUE_SIZE - infix.len()..].copy_from_slice(infix);
        Self(raw)
    }

    /// The id carried by this value, if its high half is zero.
    pub fn as_id(&self) -> Option<Id> {
        if self.0[..ID_SIZE].iter().any(|&b| b != 0) {
            return None;
        }
        Id::try_from(&self.0[ID_SIZE..]).ok()
    }

    pub const fn raw(&self) -> &[u8; VALUE_SIZE] {
        &self.0
    }
}

impl TryFrom<&[u8]> for Value {
    type Error = QueryError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let raw: [u8; VALUE_SIZE] = bytes
            .try_into()
            .map_err(|_| QueryError::InvalidWidth {
                expected: VALUE_SIZE,
                actual: bytes.len(),
            })?;
        Ok(Self(raw))
    }
}

impl From<Id> for Value {
    fn from(id: Id) -> Self {
        Value::from_id(id)
    }
}

fn write_hex(f: &mut fmt::Formatter<'_>, bytes: &[u8]) -> fmt::Result {
    for b in bytes {
        write!(f, "{b:02x}")?;
    }
    Ok(())
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(f, &self.0)
    }
}

// ============================================================================
// Tribles
// ============================================================================

/// One `(entity, attribute, value)` fact.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Trible([u8; TRIBLE_SIZE]);

impl Trible {
    pub fn new(entity: Id, attribute: Id, value: Value) -> Self {
        let mut raw = [0u8; TRIBLE_SIZE];
        raw[E_START..A_START].copy_from_slice(&entity.0);
        raw[A_START..V_START].copy_from_slice(&attribute.0);
        raw[V_START..].copy_from_slice(&value.0);
        Self(raw)
    }

    pub const fn from_raw(raw: [u8; TRIBLE_SIZE]) -> Self {
        Self(raw)
    }

    pub const fn raw(&self) -> &[u8; TRIBLE_SIZE] {
        &self.0
    }

    pub fn e(&self) -> &[u8] {
        &self.0[E_START..A_START]
    }

    pub fn a(&self) -> &[u8] {
        &self.0[A_START..V_START]
    }

    pub fn v(&self) -> &[u8] {
        &self.0[V_START..]
    }

    /// High half of the value.
    pub fn v1(&self) -> &[u8] {
        &self.0[V_START..V2_START]
    }

    /// Low half of the value; the id when the value embeds one.
    pub fn v2(&self) -> &[u8] {
        &self.0[V2_START..]
    }

    pub fn v1_zero(&self) -> bool {
        self.v1().iter().all(|&b| b == 0)
    }

    pub fn entity(&self) -> Id {
        Id(self.0[E_START..A_START].try_into().unwrap_or_default())
    }

    pub fn attribute(&self) -> Id {
        Id(self.0[A_START..V_START].try_into().unwrap_or_default())
    }

    pub fn value(&self) -> Value {
        let mut raw = [0u8; VALUE_SIZE];
        raw.copy_from_slice(self.v());
        Value(raw)
    }
}

impl TryFrom<&[u8]> for Trible {
    type Error = QueryError;

    fn try_from(bytes: &[u8]) -> Result<Self, Self::Error> {
        let raw: [u8; TRIBLE_SIZE] = bytes
            .try_into()
            .map_err(|_| QueryError::InvalidWidth {
                expected: TRIBLE_SIZE,
                actual: bytes.len(),
            })?;
        Ok(Self(raw))
    }
}

impl fmt::Debug for Trible {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Trible({} {} {})", self.entity(), self.attribute(), self.value())
    }
}

/// Equality of two 16-byte id fields.
pub fn equal_id(a: &[u8], b: &[u8]) -> bool {
    a.len() == ID_SIZE && a == b
}
