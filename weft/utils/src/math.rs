use std::cmp;

fn bits_helper(n: u64, i: u64) -> u64 {
    if n == 0 {
        i
    } else {
        bits_helper(n / 2, i + 1)
    }
}

/// Number of bits needed to represent a number.
pub fn bits_needed_for(n: u64) -> u64 {
    cmp::max(bits_helper(n - 1, 0), 1)
}

#[cfg(test)]
mod tests {
    use super::bits_needed_for;

    #[test]
    fn widths() {
        assert_eq!(bits_needed_for(1), 1);
        assert_eq!(bits_needed_for(2), 1);
        assert_eq!(bits_needed_for(3), 2);
        assert_eq!(bits_needed_for(4), 2);
        assert_eq!(bits_needed_for(5), 3);
        assert_eq!(bits_needed_for(256), 8);
        assert_eq!(bits_needed_for(257), 9);
    }
}
