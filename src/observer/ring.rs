use arrayref::array_ref;
use base64::{engine::general_purpose::STANDARD, Engine};
use libm::{cos, sin};
use std::f64::consts::{PI, TAU};
use std::fmt;

use super::error::Error;

/// Width of a ring identifier in bytes.
pub const IDENTIFIER_LEN: usize = 16;

/// Size of the identifier space, `256^16`. A power of two, so it is exact as
/// an `f64`.
pub const MAX_POS: f64 = 340282366920938463463374607431768211456.0;

/// Angle of identifier zero: the top of the ring in screen coordinates.
pub const TOP: f64 = 3. * PI / 2.;

/// Largest `f64` strictly below one. Identifiers close enough to `MAX_POS`
/// round up to a full turn when converted, so turns are clamped here to keep
/// them inside `[0, 1)`.
const BELOW_ONE: f64 = 1. - f64::EPSILON / 2.;

/// A fixed width position in the store's modular identifier space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Identifier([u8; IDENTIFIER_LEN]);

impl Identifier {
    pub fn from_bytes(bytes: [u8; IDENTIFIER_LEN]) -> Self {
        Self(bytes)
    }

    pub fn from_value(value: u128) -> Self {
        Self(value.to_be_bytes())
    }

    /// Takes an identifier from a slice that must be exactly
    /// `IDENTIFIER_LEN` bytes long.
    pub fn from_slice(slice: &[u8]) -> Result<Self, Error> {
        if slice.len() != IDENTIFIER_LEN {
            Err(Error::IdentifierWidth(slice.len()))?
        }
        Ok(Self(*array_ref![slice, 0, IDENTIFIER_LEN]))
    }

    /// Decodes the standard base64 rendering used on the wire.
    pub fn from_base64(encoded: &str) -> Result<Self, Error> {
        Self::from_slice(&STANDARD.decode(encoded)?)
    }

    pub fn from_hex(encoded: &str) -> Result<Self, Error> {
        Self::from_slice(&hex::decode(encoded)?)
    }

    pub fn to_base64(&self) -> String {
        STANDARD.encode(self.0)
    }

    /// The identifier read as a big-endian unsigned integer.
    pub fn value(&self) -> u128 {
        u128::from_be_bytes(self.0)
    }

    /// Zero padded lowercase hex, always 32 characters.
    pub fn to_hex(&self) -> String {
        format!("{:032x}", self.value())
    }

    /// Position of the identifier as a fraction of a full turn, in `[0, 1)`.
    ///
    /// The integer is held exactly in a `u128` and `MAX_POS` is a power of
    /// two, so the division only moves the binary exponent. The single
    /// rounding step is the `u128` to `f64` conversion, bounded by 2^-53 of
    /// the value, far below the 10^-3 radians a drawing can show.
    pub fn turn(&self) -> f64 {
        ((self.value() as f64) / MAX_POS).min(BELOW_ONE)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:032x}", self.value())
    }
}

/// Angle of an identifier in `[0, 2π)`. Identifier zero sits at the top and
/// larger identifiers proceed clockwise (screen coordinates, y pointing
/// down).
pub fn angle(identifier: &Identifier) -> f64 {
    (TOP + identifier.turn() * TAU).rem_euclid(TAU)
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn from(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl fmt::Display for Point {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "({:.1},{:.1})", self.x, self.y)
    }
}

/// Maps identifiers onto a circle of fixed center and radius.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RingCoordinate {
    pub center: Point,
    pub radius: f64,
}

impl RingCoordinate {
    pub fn new(center: Point, radius: f64) -> Self {
        Self { center, radius }
    }

    pub fn angle(&self, identifier: &Identifier) -> f64 {
        angle(identifier)
    }

    pub fn point(&self, identifier: &Identifier) -> Point {
        let angle = angle(identifier);
        Point {
            x: self.center.x + self.radius * cos(angle),
            y: self.center.y + self.radius * sin(angle),
        }
    }
}

impl Default for RingCoordinate {
    fn default() -> Self {
        Self::new(Point::from(1000., 1000.), 800.)
    }
}
