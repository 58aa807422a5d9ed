//! Lossy float re-packing for the quantized-zlib strategy.
//!
//! A value keeps its IEEE sign and 8-bit exponent but its mantissa is
//! rounded to a reduced bit budget, chosen per array from an error
//! tolerance and validated against it before use. With the full 23-bit
//! mantissa the transform is exact.

pub const MANTISSA_BITS: u32 = 23;
pub const EXPONENT_BITS: u32 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FloatQuantizer {
    man_bits: u32,
}

impl FloatQuantizer {
    pub fn new(man_bits: u32) -> FloatQuantizer {
        FloatQuantizer {
            man_bits: man_bits.min(MANTISSA_BITS),
        }
    }

    pub fn mantissa_bits(&self) -> u32 {
        self.man_bits
    }

    /// Total bits of one encoded value: sign + exponent + mantissa.
    pub fn code_bits(&self) -> u32 {
        1 + EXPONENT_BITS + self.man_bits
    }

    pub fn encode(&self, value: f32) -> u64 {
        let bits = value.to_bits();
        let shift = MANTISSA_BITS - self.man_bits;
        if shift == 0 {
            return bits as u64;
        }

        let sign = bits >> 31;
        let mut mag = bits & 0x7fff_ffff;
        // round to nearest; the add carries into the exponent when the
        // mantissa overflows, which is exactly IEEE rounding
        mag = mag.saturating_add(1 << (shift - 1));
        if mag >= 0x7f80_0000 {
            // clamp below infinity
            mag = 0x7f80_0000 - (1 << shift);
        }

        ((sign as u64) << (EXPONENT_BITS + self.man_bits)) | (mag >> shift) as u64
    }

    pub fn decode(&self, code: u64) -> f32 {
        let shift = MANTISSA_BITS - self.man_bits;
        if shift == 0 {
            return f32::from_bits(code as u32);
        }

        let sign = (code >> (EXPONENT_BITS + self.man_bits)) & 1;
        let mag = (code & ((1 << (EXPONENT_BITS + self.man_bits)) - 1)) as u32;

        f32::from_bits((sign as u32) << 31 | mag << shift)
    }

    /// The narrowest mantissa whose round trip stays within `tolerance`
    /// for every value. A non-positive tolerance demands exactness.
    pub fn choose(values: &[f32], tolerance: f32) -> FloatQuantizer {
        if tolerance <= 0.0 {
            return FloatQuantizer::new(MANTISSA_BITS);
        }

        for man_bits in 0..MANTISSA_BITS {
            let candidate = FloatQuantizer::new(man_bits);
            let fits = values
                .iter()
                .all(|v| (candidate.decode(candidate.encode(*v)) - v).abs() <= tolerance);
            if fits {
                return candidate;
            }
        }

        FloatQuantizer::new(MANTISSA_BITS)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_full_mantissa_is_exact() {
        let q = FloatQuantizer::new(MANTISSA_BITS);
        for v in [0.0f32, -0.0, 1.0, -1.5, 3.14159, 1.0e-20, 7.5e20] {
            assert_eq!(q.decode(q.encode(v)), v);
        }
        assert_eq!(q.code_bits(), 32);
    }

    #[test]
    fn test_zero_survives_any_budget() {
        for man_bits in 0..=MANTISSA_BITS {
            let q = FloatQuantizer::new(man_bits);
            assert_eq!(q.decode(q.encode(0.0)), 0.0);
        }
    }

    #[test]
    fn test_sign_is_kept() {
        let q = FloatQuantizer::new(8);
        assert!(q.decode(q.encode(-2.5)) < 0.0);
        assert!(q.decode(q.encode(2.5)) > 0.0);
    }

    #[test]
    fn test_round_trip_within_tolerance() {
        let values: Vec<f32> = (0..100).map(|i| (i as f32) * 0.173 - 8.5).collect();
        let tolerance = 0.001;
        let q = FloatQuantizer::choose(&values, tolerance);
        assert!(q.mantissa_bits() < MANTISSA_BITS);
        for v in &values {
            assert!((q.decode(q.encode(*v)) - v).abs() <= tolerance);
        }
    }

    #[test]
    fn test_choose_exact_when_demanded() {
        let q = FloatQuantizer::choose(&[1.0, 2.0], 0.0);
        assert_eq!(q.mantissa_bits(), MANTISSA_BITS);
    }

    #[test]
    fn test_rounding_carries_into_exponent() {
        // 1.9999999 rounds up to 2.0 with a tiny mantissa budget
        let q = FloatQuantizer::new(2);
        let decoded = q.decode(q.encode(1.999_999_9));
        assert_eq!(decoded, 2.0);
    }
}
