//! Binary-angle measures (BAM). A full turn equals `2^n` for an n-bit BAM;
//! addition and subtraction wrap the circle for free using the integer's
//! native wrapping arithmetic. Subtraction always goes through the signed
//! type of the same width so the result is "the short way around" (spec §9).

macro_rules! bam_type {
    ($name:ident, $uint:ty, $int:ty, $bits:expr) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub $uint);

        impl $name {
            pub const BITS: u32 = $bits;

            #[inline]
            pub fn from_raw(raw: $uint) -> Self {
                $name(raw)
            }

            #[inline]
            pub fn raw(&self) -> $uint {
                self.0
            }

            /// Lossless conversion from degrees at this width's resolution.
            pub fn from_degrees(deg: f64) -> Self {
                let turns = deg.rem_euclid(360.0) / 360.0;
                let scale = 2f64.powi($bits);
                $name(((turns * scale).round() as i64).rem_euclid(scale as i64) as $uint)
            }

            pub fn to_degrees(&self) -> f64 {
                let scale = 2f64.powi($bits);
                (self.0 as f64 / scale) * 360.0
            }

            /// Wrapping addition: a full turn wraps back to zero.
            #[inline]
            pub fn add(&self, other: $name) -> $name {
                $name(self.0.wrapping_add(other.0))
            }

            /// Signed short-way-around subtraction, `self - other`, returned
            /// as a signed delta of the same bit width.
            #[inline]
            pub fn sub_signed(&self, other: $name) -> $int {
                self.0.wrapping_sub(other.0) as $int
            }

            /// Absolute angular distance in raw units, always `<= half a turn`.
            pub fn abs_distance(&self, other: $name) -> $uint {
                self.sub_signed(other).unsigned_abs()
            }
        }
    };
}

bam_type!(Bam8, u8, i8, 8);
bam_type!(Bam16, u16, i16, 16);
bam_type!(Bam32, u32, i32, 32);

impl Bam16 {
    pub fn to_bam8(&self) -> Bam8 {
        Bam8((self.0 >> 8) as u8)
    }
}

impl Bam8 {
    pub fn to_bam16(&self) -> Bam16 {
        Bam16((self.0 as u16) << 8)
    }
}

impl Bam32 {
    pub fn to_bam16(&self) -> Bam16 {
        Bam16((self.0 >> 16) as u16)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn bam32_degree_round_trip_is_lossless() {
        for deg in [0.0, 45.0, 90.0, 180.0, 270.0, 359.999_999_9] {
            let b = Bam32::from_degrees(deg);
            let back = b.to_degrees();
            assert!((back - deg).abs() < 1.0e-5 || (back - (deg - 360.0)).abs() < 1.0e-5);
        }
    }

    #[test]
    fn addition_wraps() {
        let a = Bam8::from_degrees(350.0);
        let b = Bam8::from_degrees(20.0);
        let sum = a.add(b);
        assert_relative_eq!(sum.to_degrees(), 10.0, epsilon = 1.5);
    }

    #[test]
    fn subtraction_is_short_way_around() {
        let a = Bam8::from_degrees(10.0);
        let b = Bam8::from_degrees(350.0);
        // a - b should be +20 degrees (short way), not -340.
        let delta = a.sub_signed(b);
        let delta_deg = delta as f64 * 360.0 / 256.0;
        assert_relative_eq!(delta_deg, 20.0, epsilon = 1.5);
    }

    #[test]
    fn abs_distance_is_bounded_by_half_turn() {
        let a = Bam8(0);
        let b = Bam8(128);
        assert_eq!(a.abs_distance(b), 128);
    }
}
