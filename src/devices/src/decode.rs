use common::{GridError, GridResult};

/// Converts raw register words into a scaled physical value. One word is the
/// value itself; two words form a 32-bit quantity with the first word as the
/// high half. Anything else is a register-spec error and must fail loudly
/// instead of producing a plausible-looking wrong number.
pub fn decode(words: &[u16], multiplier: f64) -> GridResult<f64> {
    match *words {
        [word] => Ok(f64::from(word) * multiplier),
        [high, low] => {
            let combined = (u32::from(high) << 16) | u32::from(low);
            Ok(f64::from(combined) * multiplier)
        }
        _ => Err(GridError::Config(format!(
            "register length {} not supported, expected 1 or 2",
            words.len()
        ))),
    }
}

/// Display form: fixed three decimal places.
pub fn format_value(value: f64) -> String {
    format!("{value:.3}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_word() {
        assert_eq!(format_value(decode(&[5021], 0.01).unwrap()), "50.210");
        assert_eq!(format_value(decode(&[4999], 1.0).unwrap()), "4999.000");
    }

    #[test]
    fn test_two_words_big_endian() {
        // [1, 0] is 1 << 16 = 65536.
        let value = decode(&[1, 0], 0.1).unwrap();
        assert_eq!(value, 6553.6);
        assert_eq!(format_value(value), "6553.600");
    }

    #[test]
    fn test_two_words_low_half() {
        let value = decode(&[0, 50], 0.1).unwrap();
        assert_eq!(format_value(value), "5.000");
    }

    #[test]
    fn test_unsupported_lengths() {
        assert!(decode(&[], 1.0).is_err());
        assert!(decode(&[1, 2, 3], 1.0).is_err());
    }

    #[test]
    fn test_formatting_rounds() {
        assert_eq!(format_value(0.0005), "0.001");
        assert_eq!(format_value(1234.0), "1234.000");
    }
}
