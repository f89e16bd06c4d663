//! Galois field GF(2^8) arithmetic for PAR Reed-Solomon coding
//!
//! PAR v1 works over GF(2^8) with the irreducible polynomial
//! 0x11D (x⁸ + x⁴ + x³ + x² + 1). The generator element has order 255,
//! so a 256-entry log table and a 512-entry exp table (the upper half
//! duplicating the lower) cover every sum of two logs without a modulo
//! in the multiply path.

use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Sub, SubAssign};

/// PAR GF(2^8) field polynomial: 0x11D (x⁸ + x⁴ + x³ + x² + 1)
const GF8_GENERATOR: u32 = 0x11D;
const BITS: usize = 8;
const COUNT: usize = 1 << BITS;
const LIMIT: usize = COUNT - 1;

/// Galois field lookup tables for fast arithmetic
pub struct GaloisTable {
    pub log: [u8; COUNT],
    pub exp: [u8; COUNT * 2],
}

impl Default for GaloisTable {
    fn default() -> Self {
        Self::new()
    }
}

impl GaloisTable {
    pub fn new() -> Self {
        let mut table = GaloisTable {
            log: [0; COUNT],
            exp: [0; COUNT * 2],
        };
        table.build_tables();
        table
    }

    fn build_tables(&mut self) {
        let mut b = 1u32;

        for l in 0..LIMIT {
            self.log[b as usize] = l as u8;
            self.exp[l] = b as u8;

            b <<= 1;
            if b & COUNT as u32 != 0 {
                b ^= GF8_GENERATOR;
            }
        }

        // exp[255..510] mirrors exp[0..255] so log[a] + log[b] indexes
        // directly without reduction.
        for l in LIMIT..COUNT * 2 {
            self.exp[l] = self.exp[l - LIMIT];
        }
    }
}

/// Galois field GF(2^8) element
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Galois8 {
    value: u8,
}

impl Galois8 {
    /// Zero constant for compile-time usage
    pub const ZERO: Self = Self { value: 0 };

    /// One constant for compile-time usage
    pub const ONE: Self = Self { value: 1 };

    #[inline]
    pub const fn new(value: u8) -> Self {
        Self { value }
    }

    #[inline]
    pub const fn is_zero(self) -> bool {
        self.value == 0
    }

    pub fn value(&self) -> u8 {
        self.value
    }

    /// Power operation; exponents are taken modulo the group order 255
    pub fn pow(&self, exponent: u64) -> Self {
        if self.value == 0 {
            return Self::new(0);
        }

        let table = Self::table();
        let log_val = table.log[self.value as usize] as u64;
        let result_log = (log_val * (exponent % LIMIT as u64)) % LIMIT as u64;
        Self::new(table.exp[result_log as usize])
    }

    /// Get logarithm value
    pub fn log(&self) -> u8 {
        Self::table().log[self.value as usize]
    }

    /// Get the global table (direct static initialization, no unsafe)
    pub(crate) fn table() -> &'static GaloisTable {
        use std::sync::OnceLock;
        static TABLE: OnceLock<GaloisTable> = OnceLock::new();
        TABLE.get_or_init(GaloisTable::new)
    }
}

/// Build the 256-byte multiplication lookup table for a fixed factor:
/// `lut[x] = x * factor` in GF(2^8).
///
/// The streaming codec applies one of these per (output, input) pair so
/// the inner loop is a table lookup and an XOR.
pub fn make_lut(factor: Galois8) -> [u8; 256] {
    let mut lut = [0u8; 256];
    if factor.is_zero() {
        return lut;
    }
    let table = Galois8::table();
    let lf = table.log[factor.value as usize] as usize;
    for (x, slot) in lut.iter_mut().enumerate().skip(1) {
        *slot = table.exp[lf + table.log[x] as usize];
    }
    lut
}

// Addition (XOR in Galois fields)
impl Add for Galois8 {
    type Output = Self;

    #[allow(clippy::suspicious_arithmetic_impl)] // XOR is addition in Galois fields
    fn add(self, rhs: Self) -> Self::Output {
        Self::new(self.value ^ rhs.value)
    }
}

impl AddAssign for Galois8 {
    #[allow(clippy::suspicious_op_assign_impl)] // XOR is addition in Galois fields
    fn add_assign(&mut self, rhs: Self) {
        self.value ^= rhs.value;
    }
}

// Subtraction (same as addition in GF(2^n))
impl Sub for Galois8 {
    type Output = Self;

    #[allow(clippy::suspicious_arithmetic_impl)] // XOR is subtraction in Galois fields
    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.value ^ rhs.value)
    }
}

impl SubAssign for Galois8 {
    #[allow(clippy::suspicious_op_assign_impl)] // XOR is subtraction in Galois fields
    fn sub_assign(&mut self, rhs: Self) {
        self.value ^= rhs.value;
    }
}

// Multiplication using log/exp tables
impl Mul for Galois8 {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self::Output {
        if self.value == 0 || rhs.value == 0 {
            return Self::new(0);
        }

        let table = Galois8::table();
        let log_sum =
            table.log[self.value as usize] as usize + table.log[rhs.value as usize] as usize;
        Self::new(table.exp[log_sum])
    }
}

impl MulAssign for Galois8 {
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}

// Division using log/exp tables. Division involving zero yields zero;
// all field operations here are total (the solver never divides by a
// zero pivot).
impl Div for Galois8 {
    type Output = Self;

    fn div(self, rhs: Self) -> Self::Output {
        if self.value == 0 || rhs.value == 0 {
            return Self::new(0);
        }

        let table = Galois8::table();
        let log_diff = table.log[self.value as usize] as usize + LIMIT
            - table.log[rhs.value as usize] as usize;
        Self::new(table.exp[log_diff])
    }
}

impl DivAssign for Galois8 {
    fn div_assign(&mut self, rhs: Self) {
        *self = *self / rhs;
    }
}

impl From<u8> for Galois8 {
    fn from(value: u8) -> Self {
        Self::new(value)
    }
}

impl From<Galois8> for u8 {
    fn from(val: Galois8) -> Self {
        val.value
    }
}

impl std::fmt::Display for Galois8 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.value)
    }
}
