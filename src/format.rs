use compact_str::{format_compact, CompactString};

use crate::stack::Value;

/// Magnitudes below this are displayed as zero.
const UNDERFLOW: Value = 1e-20;

/// Digits given up by exponential notation to make room for the exponent.
const EXPONENT_WIDTH: usize = 4;

/// Largest precision honoured; wider requests are clamped.
pub const MAX_PRECISION: usize = 300;

/// Format `value` for a display that fits roughly `precision + 2` characters.
///
/// Values strictly between `10^-precision` and `10^precision` are written in
/// fixed notation with trailing zeros removed, anything else in exponential
/// notation. Non-finite values are never passed in: the stack faults before
/// they can reach a display.
pub fn format_value(value: Value, precision: usize) -> CompactString {
    let precision = precision.clamp(1, MAX_PRECISION);
    let abs = value.abs();
    let threshold = 10f64.powi(precision as i32);

    if abs < UNDERFLOW {
        CompactString::new("0")
    } else if 1.0 / threshold < abs && abs < threshold {
        fixed(value, precision)
    } else {
        exponential(value, precision.saturating_sub(EXPONENT_WIDTH))
    }
}

fn fixed(value: Value, precision: usize) -> CompactString {
    let mut formatted = round_half_up(value, precision);
    formatted.truncate(precision + 2);

    while formatted.len() > 1 {
        match formatted.as_bytes()[formatted.len() - 1] {
            b'0' => {
                formatted.pop();
            }
            b'.' => {
                formatted.pop();
                break;
            }
            _ => break,
        }
    }
    formatted
}

/// Fixed notation with `precision` fractional digits, ties rounded away
/// from zero. `{:.*}` alone rounds ties to even.
fn round_half_up(value: Value, precision: usize) -> CompactString {
    let exact = format_compact!(
        "{:.*}",
        precision.max(exact_fraction_digits(value)),
        value.abs()
    );
    let Some(point) = exact.find('.') else {
        return format_compact!("{:.*}", precision, value);
    };
    let keep = point + 1 + precision;
    let mut digits = exact.as_bytes()[..keep].to_vec();

    if exact.as_bytes().get(keep).map_or(false, |d| *d >= b'5') {
        let mut carry = true;
        for d in digits.iter_mut().rev() {
            match *d {
                b'.' => continue,
                b'9' => *d = b'0',
                _ => {
                    *d += 1;
                    carry = false;
                    break;
                }
            }
        }
        if carry {
            digits.insert(0, b'1');
        }
    }

    let mut formatted = CompactString::new(if value < 0.0 { "-" } else { "" });
    formatted.extend(digits.into_iter().map(char::from));
    formatted
}

/// Fractional decimal digits needed to write `value` exactly.
fn exact_fraction_digits(value: Value) -> usize {
    let bits = value.to_bits();
    let biased = ((bits >> 52) & 0x7ff) as i64;
    let mut mantissa = bits & ((1 << 52) - 1);
    let exponent = if biased == 0 {
        -1074
    } else {
        mantissa |= 1 << 52;
        biased - 1075
    };
    if mantissa == 0 {
        return 0;
    }
    let exponent = exponent + i64::from(mantissa.trailing_zeros());
    if exponent < 0 {
        (-exponent) as usize
    } else {
        0
    }
}

fn exponential(value: Value, digits: usize) -> CompactString {
    let formatted = format_compact!("{:.*e}", digits, value);
    match formatted.split_once('e') {
        Some((mantissa, exponent)) if !exponent.starts_with('-') => {
            format_compact!("{}e+{}", mantissa, exponent)
        }
        _ => formatted,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_underflow() {
        assert_eq!(format_value(1e-25, 6), "0");
        assert_eq!(format_value(-1e-21, 9), "0");
        assert_eq!(format_value(0.0, 9), "0");
    }

    #[test]
    fn test_trims_trailing_zeros() {
        assert_eq!(format_value(3.0, 4), "3");
        assert_eq!(format_value(1.2500, 4), "1.25");
        assert_eq!(format_value(10.0, 4), "10");
        assert_eq!(format_value(-2.5, 9), "-2.5");
        assert_eq!(format_value(100.0, 9), "100");
    }

    #[test]
    fn test_fixed_width_is_bounded() {
        assert_eq!(format_value(1.0 / 3.0, 9), "0.333333333");
        assert_eq!(format_value(123456789.5, 9), "123456789.5");
        assert_eq!(format_value(-123456789.5, 9), "-123456789");
        assert!(format_value(2f64.sqrt(), 11).len() <= 13);
    }

    #[test]
    fn test_ties_round_away_from_zero() {
        assert_eq!(format_value(0.0009765625, 9), "0.000976563");
        assert_eq!(format_value(0.125, 2), "0.13");
        assert_eq!(format_value(-0.125, 2), "-0.13");
        assert_eq!(format_value(9.9996, 3), "10");
        assert_eq!(format_value(0.375, 2), "0.38");
    }

    #[test]
    fn test_exact_fraction_digits() {
        assert_eq!(exact_fraction_digits(0.0), 0);
        assert_eq!(exact_fraction_digits(12.0), 0);
        assert_eq!(exact_fraction_digits(0.5), 1);
        assert_eq!(exact_fraction_digits(0.0009765625), 10);
    }

    #[test]
    fn test_precision_is_clamped() {
        assert_eq!(format_value(2.5, usize::MAX), "2.5");
        assert_eq!(format_value(2.5, 0), "2.5");
    }

    #[test]
    fn test_exponential() {
        assert_eq!(format_value(12345678901.0, 9), "1.23457e+10");
        assert_eq!(format_value(-1e12, 9), "-1.00000e+12");
        assert_eq!(format_value(1.5e-12, 9), "1.50000e-12");
        // the bound itself is not in the fixed range
        assert_eq!(format_value(1e9, 9), "1.00000e+9");
    }

    #[test]
    fn test_parses_back_close_to_value() {
        for value in [0.1, -7.25, 42.0, 1.23456789012, 98765.4321, -999999.999, 1e-5] {
            let formatted = format_value(value, 9);
            let parsed: Value = formatted.parse().unwrap();
            let digits = formatted.split('.').nth(1).map_or(0, str::len);
            let unit = 10f64.powi(-(digits as i32));
            assert!(
                (parsed - value).abs() <= unit,
                "{value} formatted as {formatted}"
            );
        }
    }
}
