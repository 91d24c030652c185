//! Signed rational arithmetic for clean-aperture (clap) geometry
//!
//! Clean-aperture boxes carry crop geometry as numerator/denominator
//! pairs. Values are reduced on construction to a bounded range, then
//! rounded onto integer pixel coordinates with explicit direction.

use crate::error::{HeifError, Result};
use whereat::At;

/// Largest magnitude a reduced numerator or denominator may keep.
///
/// Keeps cross-multiplied comparisons and rounding inside i64
/// intermediates.
pub const MAX_FRACTION_VALUE: i32 = 0x10000;

/// A signed rational number with a positive denominator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fraction {
    /// Numerator (sign of the fraction)
    pub numerator: i32,
    /// Denominator, always > 0 after construction
    pub denominator: i32,
}

impl Fraction {
    /// Build a fraction, normalizing the sign onto the numerator and
    /// halving both terms until they fit [`MAX_FRACTION_VALUE`].
    ///
    /// # Errors
    ///
    /// Fails with [`HeifError::InvalidFraction`] on a zero denominator or
    /// on `i32::MIN` terms that cannot be negated.
    pub fn new(numerator: i32, denominator: i32) -> Result<Self> {
        if denominator == 0 {
            return Err(At::from(HeifError::InvalidFraction("zero denominator")));
        }
        if numerator == i32::MIN || denominator == i32::MIN {
            return Err(At::from(HeifError::InvalidFraction("value out of range")));
        }
        let (mut num, mut den) = if denominator < 0 {
            (-numerator, -denominator)
        } else {
            (numerator, denominator)
        };
        // Lossy halving reduction, same bound the container math assumes.
        while num.unsigned_abs() > MAX_FRACTION_VALUE as u32
            || den.unsigned_abs() > MAX_FRACTION_VALUE as u32
        {
            num /= 2;
            den /= 2;
            if den == 0 {
                return Err(At::from(HeifError::InvalidFraction(
                    "reduction collapsed denominator",
                )));
            }
        }
        Ok(Self {
            numerator: num,
            denominator: den,
        })
    }

    /// Build from unsigned wire fields, rejecting values that do not fit i32.
    pub fn from_wire(numerator: u32, denominator: u32) -> Result<Self> {
        let num = i32::try_from(numerator)
            .map_err(|_| At::from(HeifError::InvalidFraction("numerator exceeds i32")))?;
        let den = i32::try_from(denominator)
            .map_err(|_| At::from(HeifError::InvalidFraction("denominator exceeds i32")))?;
        Self::new(num, den)
    }

    /// Round toward negative infinity.
    #[must_use]
    pub fn round_down(self) -> i32 {
        self.numerator.div_euclid(self.denominator)
    }

    /// Round toward positive infinity.
    #[must_use]
    pub fn round_up(self) -> i32 {
        let q = self.numerator.div_euclid(self.denominator);
        if self.numerator.rem_euclid(self.denominator) != 0 {
            q + 1
        } else {
            q
        }
    }

    /// Round to nearest, half away from zero for the positive range.
    #[must_use]
    pub fn round(self) -> i32 {
        let num = i64::from(self.numerator) * 2 + i64::from(self.denominator);
        let den = i64::from(self.denominator) * 2;
        #[allow(clippy::cast_possible_truncation)]
        {
            num.div_euclid(den) as i32
        }
    }

    /// Exact rational equality (cross-multiplied, ignores representation).
    #[must_use]
    pub fn same_value(self, other: Self) -> bool {
        i64::from(self.numerator) * i64::from(other.denominator)
            == i64::from(other.numerator) * i64::from(self.denominator)
    }
}
