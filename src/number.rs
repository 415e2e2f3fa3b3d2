//! Overflow-aware arithmetic over exact integers and floats.
//!
//! Binary operations first pick a common representation: two integers stay integers,
//! anything else is computed in floating point. Integer `add`, `sub` and `mul` never trap;
//! on signed overflow the operation is redone in floating point, silently losing precision.

use std::cmp::Ordering;
use std::fmt;

/// Type alias for the exact representation
pub type IntType = i64;

#[derive(Debug, Clone, Copy)]
pub enum Number {
    Int(IntType),
    Float(f64),
}

// Integer fast path with float fallback on overflow
macro_rules! promoting_op {
    ($name:ident, $checked:ident, $op:tt) => {
        pub fn $name(self, other: Number) -> Number {
            match (self, other) {
                (Number::Int(a), Number::Int(b)) => match a.$checked(b) {
                    Some(n) => Number::Int(n),
                    None => Number::Float(a as f64 $op b as f64),
                },
                (a, b) => Number::Float(a.as_f64() $op b.as_f64()),
            }
        }
    };
}

impl Number {
    promoting_op!(add, checked_add, +);
    promoting_op!(sub, checked_sub, -);
    promoting_op!(mul, checked_mul, *);

    /// Truncating integer division. `None` for an integer zero divisor and for
    /// `i64::MIN / -1`; float division follows IEEE rules.
    pub fn div(self, other: Number) -> Option<Number> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a.checked_div(b).map(Number::Int),
            (a, b) => Some(Number::Float(a.as_f64() / b.as_f64())),
        }
    }

    /// Integer remainder takes the sign of the dividend; float remainder is
    /// `b * (a/b - floor(a/b))` and takes the sign of the divisor.
    pub fn rem(self, other: Number) -> Option<Number> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => a.checked_rem(b).map(Number::Int),
            (a, b) => {
                let (a, b) = (a.as_f64(), b.as_f64());
                let quotient = a / b;
                Some(Number::Float(b * (quotient - quotient.floor())))
            }
        }
    }

    pub fn floor(self) -> Number {
        match self {
            Number::Float(f) => Number::Int(f.floor() as IntType),
            int => int,
        }
    }

    pub fn ceil(self) -> Number {
        match self {
            Number::Float(f) => Number::Int(f.ceil() as IntType),
            int => int,
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(n) => n as f64,
            Number::Float(f) => f,
        }
    }

    /// Ordering under the promotion rule; `None` when a NaN is involved
    pub fn compare(self, other: Number) -> Option<Ordering> {
        match (self, other) {
            (Number::Int(a), Number::Int(b)) => Some(a.cmp(&b)),
            (a, b) => a.as_f64().partial_cmp(&b.as_f64()),
        }
    }

    pub fn num_eq(self, other: Number) -> bool {
        self.compare(other) == Some(Ordering::Equal)
    }

    pub fn lt(self, other: Number) -> bool {
        self.compare(other) == Some(Ordering::Less)
    }

    pub fn lte(self, other: Number) -> bool {
        matches!(
            self.compare(other),
            Some(Ordering::Less | Ordering::Equal)
        )
    }

    pub fn gt(self, other: Number) -> bool {
        other.lt(self)
    }

    pub fn gte(self, other: Number) -> bool {
        other.lte(self)
    }
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.num_eq(*other)
    }
}

impl From<IntType> for Number {
    fn from(n: IntType) -> Self {
        Number::Int(n)
    }
}

impl From<f64> for Number {
    fn from(f: f64) -> Self {
        Number::Float(f)
    }
}

/// Parse a numeral prefix of `text`, returning the value and the number of bytes consumed.
///
/// Accepts an optional leading `-` followed by digits and dots. The integer part is
/// accumulated as `n * 10 + digit` through the promoting operations, so very long
/// numerals turn into floats. Each `.` switches to float and restarts the fractional
/// scale at 0.1; fractional digits are added as `digit * scale` with `scale *= 0.1`.
/// The incremental accumulation means `0.3` reads as `3 * 0.1`, not as the nearest
/// double to 0.3. Returns `None` when no digit is present.
pub fn parse_numeral(text: &str) -> Option<(Number, usize)> {
    let bytes = text.as_bytes();
    let negative = bytes.first() == Some(&b'-');
    let mut pos = usize::from(negative);

    let mut n = Number::Int(0);
    let mut scale: Option<f64> = None;
    let mut digits = 0usize;

    while let Some(&c) = bytes.get(pos) {
        match c {
            b'.' => {
                scale = Some(0.1);
                n = Number::Float(n.as_f64());
            }
            b'0'..=b'9' => {
                let digit = Number::Int(IntType::from(c - b'0'));
                n = match scale {
                    Some(s) => {
                        scale = Some(s * 0.1);
                        n.add(digit.mul(Number::Float(s)))
                    }
                    None => n.mul(Number::Int(10)).add(digit),
                };
                digits += 1;
            }
            _ => break,
        }
        pos += 1;
    }

    if digits == 0 {
        return None;
    }

    let sign = if negative { -1 } else { 1 };
    Some((n.mul(Number::Int(sign)), pos))
}

/// Render a float the way C's `%g` does: six significant digits, trailing zeros
/// removed, scientific notation when the decimal exponent is below -4 or at least 6.
pub fn format_general(f: f64) -> String {
    const PRECISION: i32 = 6;

    if f.is_nan() {
        return if f.is_sign_negative() { "-nan" } else { "nan" }.to_owned();
    }
    if f.is_infinite() {
        return if f < 0.0 { "-inf" } else { "inf" }.to_owned();
    }
    if f == 0.0 {
        return if f.is_sign_negative() { "-0" } else { "0" }.to_owned();
    }

    // Rounding to the target precision decides the exponent, so let the formatter do it
    let sci = format!("{:.*e}", (PRECISION - 1) as usize, f);
    let (mantissa, exp) = match sci.split_once('e') {
        Some((m, e)) => (m, e.parse::<i32>().unwrap_or(0)),
        None => (sci.as_str(), 0),
    };

    if exp < -4 || exp >= PRECISION {
        let mantissa = trim_fraction(mantissa);
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{mantissa}e{sign}{:02}", exp.abs())
    } else {
        let decimals = (PRECISION - 1 - exp) as usize;
        trim_fraction(&format!("{f:.decimals$}")).to_owned()
    }
}

fn trim_fraction(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(n) => write!(f, "{n}"),
            Number::Float(x) => write!(f, "{}", format_general(*x)),
        }
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn is_float(n: Number) -> bool {
        matches!(n, Number::Float(_))
    }

    #[test]
    fn test_promotion_rules() {
        assert!(matches!(Number::Int(2).add(Number::Int(3)), Number::Int(5)));
        assert!(is_float(Number::Int(2).add(Number::Float(0.5))));
        assert_eq!(Number::Int(2).add(Number::Float(0.5)), Number::Float(2.5));
        assert_eq!(Number::Float(1.5).mul(Number::Int(2)), Number::Int(3));

        let promoted = Number::Int(i64::MAX).add(Number::Int(1));
        assert!(is_float(promoted));
        assert_eq!(promoted.as_f64(), 9_223_372_036_854_775_808.0);

        assert!(is_float(Number::Int(i64::MIN).sub(Number::Int(1))));
        assert!(is_float(Number::Int(i64::MAX).mul(Number::Int(2))));
    }

    #[test]
    fn test_division_and_remainder() {
        let cases = vec![
            (Number::Int(7).div(Number::Int(2)), Some(Number::Int(3))),
            (Number::Int(-7).div(Number::Int(2)), Some(Number::Int(-3))),
            (Number::Int(7).div(Number::Int(0)), None),
            (Number::Int(i64::MIN).div(Number::Int(-1)), None),
            (Number::Float(7.0).div(Number::Int(2)), Some(Number::Float(3.5))),
            (Number::Int(7).rem(Number::Int(3)), Some(Number::Int(1))),
            (Number::Int(-7).rem(Number::Int(3)), Some(Number::Int(-1))),
            (Number::Int(7).rem(Number::Int(0)), None),
            (Number::Float(7.5).rem(Number::Int(2)), Some(Number::Float(1.5))),
            (Number::Float(-1.0).rem(Number::Int(2)), Some(Number::Float(1.0))),
        ];
        for (i, (actual, expected)) in cases.into_iter().enumerate() {
            assert_eq!(actual, expected, "case #{}", i + 1);
        }

        assert!(Number::Float(1.0).div(Number::Int(0)).unwrap().as_f64().is_infinite());
    }

    #[test]
    fn test_comparisons() {
        assert!(Number::Int(1).lt(Number::Float(1.5)));
        assert!(Number::Float(2.0).num_eq(Number::Int(2)));
        assert!(Number::Int(2).lte(Number::Int(2)));
        assert!(Number::Int(3).gt(Number::Int(2)));
        assert!(Number::Float(2.0).gte(Number::Int(2)));
        assert!(!Number::Float(f64::NAN).num_eq(Number::Float(f64::NAN)));
        assert!(!Number::Float(f64::NAN).lt(Number::Int(0)));
    }

    #[test]
    fn test_floor_ceil() {
        assert!(matches!(Number::Float(2.7).floor(), Number::Int(2)));
        assert!(matches!(Number::Float(2.1).ceil(), Number::Int(3)));
        assert!(matches!(Number::Float(-2.1).floor(), Number::Int(-3)));
        assert!(matches!(Number::Int(5).floor(), Number::Int(5)));
    }

    #[test]
    fn test_parse_numeral() {
        let (n, len) = parse_numeral("42").unwrap();
        assert!(matches!(n, Number::Int(42)));
        assert_eq!(len, 2);

        let (n, len) = parse_numeral("-17)").unwrap();
        assert!(matches!(n, Number::Int(-17)));
        assert_eq!(len, 3);

        // Incremental fractional accumulation is observable in the last bit
        let (n, _) = parse_numeral("0.3").unwrap();
        assert!(matches!(n, Number::Float(f) if f == 3.0 * 0.1));
        assert!(matches!(n, Number::Float(f) if f != 0.3));

        let (n, _) = parse_numeral("2.5").unwrap();
        assert!(matches!(n, Number::Float(f) if f == 2.5));

        // A second dot restarts the fractional scale
        let (n, len) = parse_numeral("1.2.3").unwrap();
        assert_eq!(len, 5);
        assert!(matches!(n, Number::Float(f) if f == 1.0 + 2.0 * 0.1 + 3.0 * 0.1));

        let (n, _) = parse_numeral("9223372036854775807").unwrap();
        assert!(matches!(n, Number::Int(i64::MAX)));
        let (n, _) = parse_numeral("9223372036854775808").unwrap();
        assert!(is_float(n));
        let (n, _) = parse_numeral("-9223372036854775808").unwrap();
        assert!(matches!(n, Number::Float(f) if f == -9_223_372_036_854_775_808.0));

        let (n, _) = parse_numeral("5.").unwrap();
        assert!(matches!(n, Number::Float(f) if f == 5.0));

        assert!(parse_numeral("-").is_none());
        assert!(parse_numeral("abc").is_none());
        assert!(parse_numeral(".").is_none());
    }

    #[test]
    fn test_format_general() {
        let cases = vec![
            (0.5, "0.5"),
            (2.5, "2.5"),
            (3.0 * 0.1, "0.3"),
            (100_000.0, "100000"),
            (1_000_000.0, "1e+06"),
            (1_234_567.0, "1.23457e+06"),
            (9_223_372_036_854_775_808.0, "9.22337e+18"),
            (0.0001, "0.0001"),
            (0.00001, "1e-05"),
            (-1.5e-7, "-1.5e-07"),
            (123.456, "123.456"),
            (1.0 / 3.0, "0.333333"),
            (2.0, "2"),
            (0.0, "0"),
            (-0.0, "-0"),
            (f64::INFINITY, "inf"),
            (f64::NEG_INFINITY, "-inf"),
            (999_999.7, "1e+06"),
            (1e100, "1e+100"),
        ];
        for (f, expected) in cases {
            assert_eq!(format_general(f), expected, "formatting {f:?}");
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(Number::Int(-3).to_string(), "-3");
        assert_eq!(Number::Float(1.5).to_string(), "1.5");
        assert_eq!(Number::Float(4.0).to_string(), "4");
    }

    proptest! {
        #[test]
        fn prop_add_sub_mul_exact_or_close(a in any::<i64>(), b in any::<i64>()) {
            let checks = [
                (Number::Int(a).add(Number::Int(b)), i128::from(a) + i128::from(b)),
                (Number::Int(a).sub(Number::Int(b)), i128::from(a) - i128::from(b)),
                (Number::Int(a).mul(Number::Int(b)), i128::from(a) * i128::from(b)),
            ];
            for (result, exact) in checks {
                match result {
                    Number::Int(n) => prop_assert_eq!(i128::from(n), exact),
                    Number::Float(f) => {
                        prop_assert!(i64::try_from(exact).is_err());
                        let expected = exact as f64;
                        prop_assert!((f - expected).abs() <= expected.abs() * 1e-15);
                    }
                }
            }
        }

        #[test]
        fn prop_integer_numerals_read_exactly(n in 0i64..=i64::MAX) {
            let text = n.to_string();
            let (parsed, len) = parse_numeral(&text).unwrap();
            prop_assert_eq!(len, text.len());
            prop_assert!(matches!(parsed, Number::Int(m) if m == n));
        }
    }
}
