//! The computation unit: pure functions with no host awareness.

/// Add two 32-bit integers with two's-complement wraparound.
///
/// Overflow never traps or saturates: `add(i32::MAX, 1) == i32::MIN`.
#[inline]
pub const fn add(a: i32, b: i32) -> i32 {
    a.wrapping_add(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_values() {
        assert_eq!(add(1, 2), 3);
        assert_eq!(add(-1, 1), 0);
        assert_eq!(add(0, 0), 0);
    }

    #[test]
    fn wraps_at_the_edges() {
        assert_eq!(add(i32::MAX, 1), i32::MIN);
        assert_eq!(add(i32::MIN, -1), i32::MAX);
        assert_eq!(add(i32::MIN, i32::MIN), 0);
    }

    #[test]
    fn is_commutative() {
        for (a, b) in [(7, -3), (i32::MAX, 12), (i32::MIN, 99)] {
            assert_eq!(add(a, b), add(b, a));
        }
    }
}
