//! Lossy one-byte floating point encoding used for field norms.
//!
//! The "315" layout keeps three mantissa bits and a zero point of 15 in the
//! exponent, so values around 1.0 and below retain useful resolution.

const MANTISSA_BITS: i32 = 3;
const ZERO_EXP: i32 = 15;
const F_ZERO: i32 = (63 - ZERO_EXP) << MANTISSA_BITS;

/// Encode a float into a single byte. Negative values and zero map to 0,
/// tiny positive values to 1, and overflow saturates at 255.
pub fn float_to_byte315(f: f32) -> u8 {
    let bits = f.to_bits() as i32;
    let small = bits >> (24 - MANTISSA_BITS);
    if small < F_ZERO {
        return if bits <= 0 { 0 } else { 1 };
    }
    if small >= F_ZERO + 0x100 {
        return 255;
    }
    (small - F_ZERO) as u8
}

/// Decode a byte produced by [`float_to_byte315`].
pub fn byte315_to_float(b: u8) -> f32 {
    if b == 0 {
        return 0.0;
    }
    let mut bits = (b as u32) << (24 - MANTISSA_BITS);
    bits += ((63 - ZERO_EXP) as u32) << 24;
    f32::from_bits(bits)
}
