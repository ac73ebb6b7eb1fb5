/// [Szudzik pairing function][szudzik-pairing], wrapping on overflow.
///
/// ```text
/// (a, b) -> if (a<b) then (b^2 + a) else (a^2 + a + b)
/// ```
///
/// For large inputs the result is no longer injective, so tables built on it must
/// disambiguate colliding entries by equality.
///
/// [szudzik-pairing]: http://szudzik.com/ElegantPairing.pdf
pub fn pairing_szudzik(a: u64, b: u64) -> u64 {
    if a < b {
        b.wrapping_mul(b).wrapping_add(a)
    } else {
        a.wrapping_mul(a).wrapping_add(a).wrapping_add(b)
    }
}

/// [Pairing function][pairing] for two `u64` values.
///
/// [pairing]: https://en.wikipedia.org/wiki/Pairing_function
pub fn pairing2(a: u64, b: u64) -> u64 {
    pairing_szudzik(a, b)
}

/// Pairing function for three `u64` values.
pub fn pairing3(a: u64, b: u64, c: u64) -> u64 {
    pairing2(pairing2(a, b), c)
}

/// Folds a sequence of values with [`pairing2`].
pub fn pairing_all(init: u64, values: impl IntoIterator<Item = u64>) -> u64 {
    values.into_iter().fold(init, pairing2)
}

/// Zig-zag encoding: maps signed integers to unsigned ones, keeping small magnitudes small.
pub fn zigzag(x: i64) -> u64 {
    ((x << 1) ^ (x >> 63)) as u64
}

pub trait MyHash {
    /// Structural hash, not necessarily perfect.
    fn hash(&self) -> u64;
}

impl MyHash for (u64, u64) {
    fn hash(&self) -> u64 {
        pairing2(self.0, self.1)
    }
}

impl MyHash for (u64, u64, u64) {
    fn hash(&self) -> u64 {
        pairing3(self.0, self.1, self.2)
    }
}

/// Wraps `x` into a signed two's-complement integer of `width` bits.
pub fn bv_normalize(x: i128, width: u32) -> i64 {
    debug_assert!((1..=64).contains(&width));
    let modulus = 1i128 << width;
    let mut r = x.rem_euclid(modulus);
    if r >= modulus / 2 {
        r -= modulus;
    }
    r as i64
}

/// Smallest signed value of `width` bits.
pub fn bv_signed_min(width: u32) -> i64 {
    (-(1i128 << (width - 1))) as i64
}

/// Largest signed value of `width` bits.
pub fn bv_signed_max(width: u32) -> i64 {
    ((1i128 << (width - 1)) - 1) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_szudzik() {
        // a\b  0  1  2  3  4
        // ------------------
        // 0    0  1  4  9 16
        // 1    2  3  5 10 17
        // 2    6  7  8 11 18
        assert_eq!(pairing_szudzik(0, 0), 0);
        assert_eq!(pairing_szudzik(0, 1), 1);
        assert_eq!(pairing_szudzik(1, 0), 2);
        assert_eq!(pairing_szudzik(1, 1), 3);
        assert_eq!(pairing_szudzik(0, 2), 4);
        assert_eq!(pairing_szudzik(2, 1), 7);
        assert_eq!(pairing_szudzik(4, 0), 20);
    }

    #[test]
    fn test_szudzik_wraps() {
        // Must not panic on overflow.
        let _ = pairing_szudzik(u64::MAX, 1);
        let _ = pairing_szudzik(1, u64::MAX);
    }

    #[test]
    fn test_zigzag() {
        assert_eq!(zigzag(0), 0);
        assert_eq!(zigzag(-1), 1);
        assert_eq!(zigzag(1), 2);
        assert_eq!(zigzag(-2), 3);
    }

    #[test]
    fn test_bv_normalize() {
        assert_eq!(bv_normalize(7, 4), 7);
        assert_eq!(bv_normalize(8, 4), -8);
        assert_eq!(bv_normalize(-9, 4), 7);
        assert_eq!(bv_normalize(i64::MAX as i128 + 1, 64), i64::MIN);
        assert_eq!(bv_normalize(255, 8), -1);
    }

    #[test]
    fn test_bv_bounds() {
        assert_eq!(bv_signed_min(1), -1);
        assert_eq!(bv_signed_max(1), 0);
        assert_eq!(bv_signed_min(4), -8);
        assert_eq!(bv_signed_max(4), 7);
    }
}
