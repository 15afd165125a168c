use std::fmt::{Display, Formatter};

use rand::Rng;

/// Modulus of the sequence number space. All sequence arithmetic wraps here,
///  so a transfer longer than this many bytes reuses numbers.
pub const MAX_SEQ: u16 = 25600;

const HALF_RING: u16 = MAX_SEQ / 2;

/// A position in the wrap-around sequence space.
///
/// Comparisons follow the half-ring convention: `a` is *forward of* `b` iff
///  the wrap-adjusted distance from `b` to `a` is nonzero and below
///  `MAX_SEQ / 2`. Two numbers exactly half the ring apart are ordered by
///  their raw values, so the relation is total and antisymmetric for every
///  pair of distinct numbers.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub struct SeqNumber(u16);

impl Display for SeqNumber {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl SeqNumber {
    pub fn from_raw(value: u16) -> SeqNumber {
        SeqNumber(value % MAX_SEQ)
    }

    pub fn to_raw(&self) -> u16 {
        self.0
    }

    /// Random initial sequence number for a handshake.
    pub fn random() -> SeqNumber {
        SeqNumber(rand::thread_rng().gen_range(0..MAX_SEQ))
    }

    /// `(self + n) mod MAX_SEQ` - advancing over `n` payload bytes.
    pub fn plus(&self, n: usize) -> SeqNumber {
        SeqNumber(((self.0 as usize + n) % MAX_SEQ as usize) as u16)
    }

    pub fn next(&self) -> SeqNumber {
        self.plus(1)
    }

    /// Wrap-adjusted distance from `base` forward to `self`, in `0..MAX_SEQ`.
    pub fn offset_from(&self, base: SeqNumber) -> u16 {
        (self.0 + MAX_SEQ - base.0) % MAX_SEQ
    }

    /// Strictly forward of `other` under the half-ring rule.
    pub fn is_after(&self, other: SeqNumber) -> bool {
        let offset = self.offset_from(other);
        if offset == 0 {
            return false;
        }
        if offset == HALF_RING {
            // exactly opposite points on the ring look forward from both
            // sides; break the tie on the raw value so that exactly one
            // direction wins
            return self.0 > other.0;
        }
        offset < HALF_RING
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::zero(0, 0)]
    #[case::in_range(12345, 12345)]
    #[case::modulus(MAX_SEQ, 0)]
    #[case::above_modulus(MAX_SEQ + 7, 7)]
    fn test_from_raw(#[case] raw: u16, #[case] expected: u16) {
        assert_eq!(SeqNumber::from_raw(raw).to_raw(), expected);
    }

    #[rstest]
    #[case::no_wrap(100, 24, 124)]
    #[case::to_modulus(25599, 1, 0)]
    #[case::across_modulus(25000, 1200, 600)]
    #[case::full_ring(42, MAX_SEQ as usize, 42)]
    #[case::payload_sized(25500, 512, 412)]
    fn test_plus(#[case] base: u16, #[case] n: usize, #[case] expected: u16) {
        assert_eq!(SeqNumber::from_raw(base).plus(n).to_raw(), expected);
    }

    #[rstest]
    #[case::equal(500, 500, 0)]
    #[case::forward(612, 100, 512)]
    #[case::wrapped(88, 25500, 188)]
    #[case::behind(100, 612, MAX_SEQ - 512)]
    fn test_offset_from(#[case] a: u16, #[case] base: u16, #[case] expected: u16) {
        assert_eq!(
            SeqNumber::from_raw(a).offset_from(SeqNumber::from_raw(base)),
            expected
        );
    }

    #[rstest]
    #[case::equal(500, 500, false)]
    #[case::one_ahead(501, 500, true)]
    #[case::one_behind(499, 500, false)]
    #[case::ahead_across_wrap(5, 25595, true)]
    #[case::behind_across_wrap(25595, 5, false)]
    #[case::half_ring_tie_broken_by_raw_value(12800, 0, true)]
    #[case::half_ring_tie_other_direction(0, 12800, false)]
    #[case::past_half_ring_is_behind(12801, 0, false)]
    fn test_is_after(#[case] a: u16, #[case] b: u16, #[case] expected: bool) {
        assert_eq!(
            SeqNumber::from_raw(a).is_after(SeqNumber::from_raw(b)),
            expected
        );
    }

    /// within half the ring the relation is antisymmetric
    #[rstest]
    #[case(100, 612)]
    #[case(25599, 3)]
    #[case(0, 12800)]
    fn test_antisymmetric(#[case] a: u16, #[case] b: u16) {
        let a = SeqNumber::from_raw(a);
        let b = SeqNumber::from_raw(b);
        assert_ne!(a.is_after(b), b.is_after(a));
    }

    #[test]
    fn test_random_in_range() {
        for _ in 0..1000 {
            assert!(SeqNumber::random().to_raw() < MAX_SEQ);
        }
    }
}
