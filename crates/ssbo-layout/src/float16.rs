//! IEEE 754 binary16 conversion for `float16_t` components.

/// Converts to the nearest binary16 value, ties to even.
pub fn f32_to_f16(value: f32) -> u16 {
    let bits = value.to_bits();
    let sign = ((bits >> 16) & 0x8000) as u16;
    let exp = ((bits >> 23) & 0xff) as i32;
    let mantissa = bits & 0x007f_ffff;

    if exp == 0xff {
        let nan_bits = if mantissa != 0 {
            0x0200 | (mantissa >> 13) as u16
        } else {
            0
        };
        return sign | 0x7c00 | nan_bits;
    }

    let half_exp = exp - 127 + 15;
    if half_exp >= 0x1f {
        return sign | 0x7c00;
    }

    if half_exp <= 0 {
        // Subnormal, or too small for even the smallest subnormal.
        if half_exp < -10 {
            return sign;
        }
        let mantissa = mantissa | 0x0080_0000;
        let shift = (14 - half_exp) as u32;
        let half_mantissa = mantissa >> shift;
        let round_bit = 1 << (shift - 1);
        let remainder = mantissa & ((1 << shift) - 1);
        let rounded = if remainder > round_bit || (remainder == round_bit && half_mantissa & 1 != 0) {
            half_mantissa + 1
        } else {
            half_mantissa
        };
        return sign | rounded as u16;
    }

    let mut half = ((half_exp as u32) << 10) | (mantissa >> 13);
    let remainder = mantissa & 0x1fff;
    // A carry out of the mantissa correctly bumps the exponent, up to infinity.
    if remainder > 0x1000 || (remainder == 0x1000 && half & 1 != 0) {
        half += 1;
    }
    sign | half as u16
}

pub fn f16_to_f32(half: u16) -> f32 {
    let sign = u32::from(half & 0x8000) << 16;
    let exp = u32::from((half >> 10) & 0x1f);
    let mantissa = u32::from(half & 0x03ff);

    let bits = match (exp, mantissa) {
        (0, 0) => sign,
        (0, _) => {
            let shift = mantissa.leading_zeros() - 21;
            let exp = 127 - 14 - shift;
            sign | (exp << 23) | (((mantissa << shift) & 0x03ff) << 13)
        }
        (0x1f, 0) => sign | 0x7f80_0000,
        (0x1f, _) => sign | 0x7fc0_0000 | (mantissa << 13),
        _ => sign | ((exp + 127 - 15) << 23) | (mantissa << 13),
    };
    f32::from_bits(bits)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_integers_are_exact() {
        for v in -9..=9 {
            let v = v as f32;
            assert_eq!(f16_to_f32(f32_to_f16(v)), v);
        }
        assert_eq!(f32_to_f16(1.0), 0x3c00);
        assert_eq!(f32_to_f16(-2.0), 0xc000);
        assert_eq!(f32_to_f16(0.0), 0);
    }

    #[test]
    fn rounds_to_nearest_even() {
        // 2049 lies halfway between 2048 and 2050.
        assert_eq!(f16_to_f32(f32_to_f16(2049.0)), 2048.0);
        assert_eq!(f16_to_f32(f32_to_f16(2051.0)), 2052.0);
    }

    #[test]
    fn specials() {
        assert_eq!(f32_to_f16(f32::INFINITY), 0x7c00);
        assert_eq!(f32_to_f16(1.0e6), 0x7c00);
        assert!(f16_to_f32(f32_to_f16(f32::NAN)).is_nan());

        let smallest = f16_to_f32(0x0001);
        assert_eq!(smallest, 2.0f32.powi(-24));
        assert_eq!(f32_to_f16(smallest), 0x0001);
        assert_eq!(f16_to_f32(0x0200), 2.0f32.powi(-15));
    }
}
