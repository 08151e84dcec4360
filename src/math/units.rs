//! Physical quantity newtypes for the thermodynamic and wind diagnostics.
//!
//! Values are stored in SI units (pressure in Pa, temperature in K); the
//! constructors and accessors name the unit so conversions are explicit.

use std::fmt;
use std::ops::{Add, Sub};

/// Air pressure, stored in pascals
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct Pressure(f64);

impl Pressure {
    /// Reference pressure of the potential temperature definition (1000 hPa)
    pub const REFERENCE: Self = Self(100_000.0);

    #[inline]
    pub const fn from_pascals(pa: f64) -> Self {
        Self(pa)
    }

    #[inline]
    pub fn from_hectopascals(hpa: f64) -> Self {
        Self(hpa * 100.0)
    }

    #[inline]
    pub fn pascals(self) -> f64 {
        self.0
    }

    #[inline]
    pub fn hectopascals(self) -> f64 {
        self.0 / 100.0
    }
}

impl fmt::Display for Pressure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}hPa", self.hectopascals())
    }
}

/// Absolute temperature, stored in kelvin
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct Temperature(f64);

impl Temperature {
    pub const ZERO_CELSIUS: Self = Self(273.15);

    #[inline]
    pub const fn from_kelvin(k: f64) -> Self {
        Self(k)
    }

    #[inline]
    pub fn from_celsius(c: f64) -> Self {
        Self(c + 273.15)
    }

    #[inline]
    pub fn kelvin(self) -> f64 {
        self.0
    }

    #[inline]
    pub fn celsius(self) -> f64 {
        self.0 - 273.15
    }
}

impl Add<f64> for Temperature {
    type Output = Self;
    fn add(self, kelvin: f64) -> Self {
        Self(self.0 + kelvin)
    }
}

impl Sub for Temperature {
    type Output = f64;
    fn sub(self, other: Self) -> f64 {
        self.0 - other.0
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}K", self.0)
    }
}

/// Horizontal wind speed (m s-1), never negative
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct Speed(f64);

impl Speed {
    #[inline]
    pub fn new(meters_per_second: f64) -> Self {
        debug_assert!(
            meters_per_second.is_nan() || meters_per_second >= 0.0,
            "Speed must be non-negative, got {}",
            meters_per_second
        );
        Self(meters_per_second)
    }

    #[inline]
    pub fn meters_per_second(self) -> f64 {
        self.0
    }
}

/// Compass direction in degrees, normalised to [0, 360)
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct Direction(f64);

impl Direction {
    pub const NORTH: Self = Self(0.0);

    /// Wrap any angle into [0, 360); NaN stays NaN
    pub fn from_degrees(deg: f64) -> Self {
        let wrapped = deg.rem_euclid(360.0);
        // rem_euclid can round up to exactly 360 for tiny negative inputs
        if wrapped >= 360.0 {
            Self(0.0)
        } else {
            Self(wrapped)
        }
    }

    #[inline]
    pub fn degrees(self) -> f64 {
        self.0
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.1}°", self.0)
    }
}

/// Mass of water vapour per mass of moist air (kg kg-1)
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct SpecificHumidity(f64);

impl SpecificHumidity {
    #[inline]
    pub const fn new(kg_per_kg: f64) -> Self {
        Self(kg_per_kg)
    }

    #[inline]
    pub fn kg_per_kg(self) -> f64 {
        self.0
    }

    /// Equivalent mixing ratio w = q / (1 - q)
    pub fn mixing_ratio(self) -> MixingRatio {
        MixingRatio(self.0 / (1.0 - self.0))
    }
}

/// Mass of water vapour per mass of dry air (kg kg-1)
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct MixingRatio(f64);

impl MixingRatio {
    #[inline]
    pub fn kg_per_kg(self) -> f64 {
        self.0
    }
}

/// Relative humidity as a fraction (1.0 = saturated)
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
#[repr(transparent)]
pub struct RelativeHumidity(f64);

impl RelativeHumidity {
    #[inline]
    pub const fn from_fraction(fraction: f64) -> Self {
        Self(fraction)
    }

    #[inline]
    pub fn fraction(self) -> f64 {
        self.0
    }
}
