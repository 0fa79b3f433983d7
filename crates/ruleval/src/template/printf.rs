//! Go-style value formatting for `print`, `printf`, `println` and the
//! humanize family.
//!
//! Nil formats as the empty string everywhere, consistent with how missing
//! label values render.

use std::fmt::Write as _;
use std::iter::Peekable;
use std::str::Chars;

use crate::template::value::Value;

/// Formats a float the way Go's `%g` verb does.
///
/// With `prec` of `None` the shortest round-trip digits are used and the
/// exponent form kicks in at 1e+06 or below 1e-04, matching `%v`.
pub(crate) fn format_float(v: f64, prec: Option<usize>) -> String {
    if v.is_nan() {
        return "NaN".to_string();
    }
    if v.is_infinite() {
        return if v > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }

    let (digits, exp) = decimal_digits(v, prec);
    let eprec = prec.map_or(6, |p| p.max(1) as i32);
    let body = if exp < -4 || exp >= eprec {
        exp_form(&digits, exp)
    } else {
        fixed_form(&digits, exp)
    };

    if v < 0.0 { format!("-{body}") } else { body }
}

/// Formats a float with `%e` semantics: exactly `prec` fractional digits.
fn format_exp(v: f64, prec: usize, upper: bool) -> String {
    if !v.is_finite() {
        return format_float(v, None);
    }
    let s = format!("{:.*e}", prec, v);
    let (mantissa, exp) = s.split_once('e').unwrap_or((s.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let e = if upper { 'E' } else { 'e' };
    let sign = if exp < 0 { '-' } else { '+' };
    format!("{mantissa}{e}{sign}{:02}", exp.abs())
}

/// Formats a float with `%f` semantics.
fn format_fixed(v: f64, prec: usize) -> String {
    if !v.is_finite() {
        return format_float(v, None);
    }
    format!("{v:.prec$}")
}

/// Significant decimal digits of `|v|` (trailing zeros removed) and the
/// decimal exponent of the first digit.
fn decimal_digits(v: f64, prec: Option<usize>) -> (String, i32) {
    let s = match prec {
        Some(p) => format!("{:.*e}", p.max(1) - 1, v.abs()),
        None => format!("{:e}", v.abs()),
    };
    let (mantissa, exp) = s.split_once('e').unwrap_or((s.as_str(), "0"));
    let exp: i32 = exp.parse().unwrap_or(0);
    let digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();
    let digits = digits.trim_end_matches('0');
    if digits.is_empty() {
        ("0".to_string(), 0)
    } else {
        (digits.to_string(), exp)
    }
}

fn exp_form(digits: &str, exp: i32) -> String {
    let (first, rest) = digits.split_at(1);
    let sign = if exp < 0 { '-' } else { '+' };
    if rest.is_empty() {
        format!("{first}e{sign}{:02}", exp.abs())
    } else {
        format!("{first}.{rest}e{sign}{:02}", exp.abs())
    }
}

fn fixed_form(digits: &str, exp: i32) -> String {
    if exp < 0 {
        let zeros = "0".repeat((-exp - 1) as usize);
        return format!("0.{zeros}{digits}");
    }
    let int_len = exp as usize + 1;
    if digits.len() <= int_len {
        format!("{digits}{}", "0".repeat(int_len - digits.len()))
    } else {
        let (int_part, frac) = digits.split_at(int_len);
        format!("{int_part}.{frac}")
    }
}

/// Quotes a string with Go escaping rules.
pub(crate) fn go_quote(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '\x07' => out.push_str("\\a"),
            '\x08' => out.push_str("\\b"),
            '\x0b' => out.push_str("\\v"),
            '\x0c' => out.push_str("\\f"),
            c if c.is_control() => {
                if (c as u32) < 0x80 {
                    let _ = write!(out, "\\x{:02x}", c as u32);
                } else {
                    let _ = write!(out, "\\u{:04x}", c as u32);
                }
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn is_stringish(v: &Value) -> bool {
    matches!(v, Value::Str(_) | Value::Nil)
}

/// Concatenates operands, adding spaces between operands when neither is a
/// string.
pub(crate) fn sprint(args: &[Value]) -> String {
    let mut out = String::new();
    for (i, arg) in args.iter().enumerate() {
        if i > 0 && !is_stringish(&args[i - 1]) && !is_stringish(arg) {
            out.push(' ');
        }
        let _ = write!(out, "{arg}");
    }
    out
}

/// Joins operands with spaces and appends a newline.
pub(crate) fn sprintln(args: &[Value]) -> String {
    let mut out = args
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" ");
    out.push('\n');
    out
}

#[derive(Debug, Default)]
struct Spec {
    minus: bool,
    plus: bool,
    space: bool,
    zero: bool,
    width: Option<usize>,
    precision: Option<usize>,
}

/// Largest width or precision accepted, as in Go's `fmt`.
const MAX_WIDTH: usize = 1_000_000;

/// A width or precision read from the format string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Number {
    Absent,
    Value(usize),
    /// The literal grew past [`MAX_WIDTH`] before its last digit.
    Overflow,
}

fn read_number(chars: &mut Peekable<Chars<'_>>) -> Number {
    let mut n = Number::Absent;
    while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
        let current = match n {
            Number::Value(v) if v > MAX_WIDTH => return Number::Overflow,
            Number::Value(v) => v,
            _ => 0,
        };
        n = Number::Value(current * 10 + d as usize);
        chars.next();
    }
    n
}

/// Takes a `*` width or precision operand. Only integers within
/// [`MAX_WIDTH`] are accepted; the operand is consumed either way.
fn int_from_arg(args: &[Value], next_arg: &mut usize) -> Option<i64> {
    let arg = args.get(*next_arg)?;
    *next_arg += 1;
    match arg {
        Value::Int(i) if i.unsigned_abs() <= MAX_WIDTH as u64 => Some(*i),
        _ => None,
    }
}

/// Formats according to a Go format string.
///
/// Mismatched verbs, missing operands and extra operands are rendered inline
/// (`%!d(string=x)`, `%!d(MISSING)`, `%!(EXTRA ...)`) rather than failing.
/// `*` takes the width or precision from an operand; operands that are not
/// integers within 1e6 render `%!(BADWIDTH)` or `%!(BADPREC)`. A literal
/// width or precision that overflows consumes the rest of the format, which
/// then renders as `%!(NOVERB)`.
pub(crate) fn sprintf(format: &str, args: &[Value]) -> String {
    let mut out = String::with_capacity(format.len());
    let mut next_arg = 0;
    let mut chars = format.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }

        let mut spec = Spec::default();
        while let Some(&flag) = chars.peek() {
            match flag {
                '-' => spec.minus = true,
                '+' => spec.plus = true,
                ' ' => spec.space = true,
                '0' => spec.zero = true,
                '#' => {}
                _ => break,
            }
            chars.next();
        }
        if chars.peek() == Some(&'*') {
            chars.next();
            match int_from_arg(args, &mut next_arg) {
                Some(w) if w < 0 => {
                    spec.minus = true;
                    spec.zero = false;
                    spec.width = Some(w.unsigned_abs() as usize);
                }
                Some(w) => spec.width = Some(w as usize),
                None => out.push_str("%!(BADWIDTH)"),
            }
        } else {
            match read_number(&mut chars) {
                Number::Absent => {}
                Number::Value(w) => spec.width = Some(w),
                Number::Overflow => {
                    chars.by_ref().for_each(drop);
                    out.push_str("%!(NOVERB)");
                    break;
                }
            }
        }
        if chars.peek() == Some(&'.') {
            chars.next();
            if chars.peek() == Some(&'*') {
                chars.next();
                match int_from_arg(args, &mut next_arg) {
                    Some(p) if p < 0 => {}
                    Some(p) => spec.precision = Some(p as usize),
                    None => out.push_str("%!(BADPREC)"),
                }
            } else {
                match read_number(&mut chars) {
                    Number::Absent => spec.precision = Some(0),
                    Number::Value(p) => spec.precision = Some(p),
                    Number::Overflow => {
                        chars.by_ref().for_each(drop);
                        out.push_str("%!(NOVERB)");
                        break;
                    }
                }
            }
        }

        let Some(verb) = chars.next() else {
            out.push_str("%!(NOVERB)");
            break;
        };
        if verb == '%' {
            out.push('%');
            continue;
        }
        let Some(arg) = args.get(next_arg) else {
            let _ = write!(out, "%!{verb}(MISSING)");
            continue;
        };
        next_arg += 1;
        out.push_str(&format_arg(&spec, verb, arg));
    }

    if next_arg < args.len() {
        out.push_str("%!(EXTRA ");
        for (i, arg) in args[next_arg..].iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let _ = write!(out, "{}={arg}", arg.type_name());
        }
        out.push(')');
    }
    out
}

fn format_arg(spec: &Spec, verb: char, arg: &Value) -> String {
    let empty = Value::Str(String::new());
    let arg = if matches!(arg, Value::Nil) { &empty } else { arg };

    let formatted = match (verb, arg) {
        ('v', Value::Float(f)) => Some((format_float(*f, spec.precision), true)),
        ('v', Value::Int(i)) => Some((i.to_string(), true)),
        ('v', other) => Some((other.to_string(), false)),
        ('d', Value::Int(i)) => Some((i.to_string(), true)),
        ('f' | 'F', Value::Float(f)) => Some((format_fixed(*f, spec.precision.unwrap_or(6)), true)),
        ('e' | 'E', Value::Float(f)) => {
            Some((format_exp(*f, spec.precision.unwrap_or(6), verb == 'E'), true))
        }
        ('g', Value::Float(f)) => Some((format_float(*f, spec.precision), true)),
        ('G', Value::Float(f)) => Some((format_float(*f, spec.precision).to_uppercase(), true)),
        ('s', Value::Str(s)) => {
            let s = match spec.precision {
                Some(p) => s.chars().take(p).collect(),
                None => s.clone(),
            };
            Some((s, false))
        }
        ('s', v @ (Value::List(_) | Value::Map(_))) => Some((v.to_string(), false)),
        ('q', Value::Str(s)) => Some((go_quote(s), false)),
        ('t', Value::Bool(b)) => Some((b.to_string(), false)),
        ('x', Value::Int(i)) => Some((signed_radix(*i, |u| format!("{u:x}")), true)),
        ('X', Value::Int(i)) => Some((signed_radix(*i, |u| format!("{u:X}")), true)),
        ('o', Value::Int(i)) => Some((signed_radix(*i, |u| format!("{u:o}")), true)),
        ('b', Value::Int(i)) => Some((signed_radix(*i, |u| format!("{u:b}")), true)),
        ('x', Value::Str(s)) => Some((s.bytes().map(|b| format!("{b:02x}")).collect(), false)),
        ('X', Value::Str(s)) => Some((s.bytes().map(|b| format!("{b:02X}")).collect(), false)),
        ('c', Value::Int(i)) => u32::try_from(*i)
            .ok()
            .and_then(char::from_u32)
            .map(|c| (c.to_string(), false)),
        _ => None,
    };

    match formatted {
        Some((s, numeric)) => pad(with_sign(s, spec, numeric), spec, numeric),
        None => format!("%!{verb}({}={arg})", arg.type_name()),
    }
}

fn signed_radix(i: i64, render: impl Fn(u64) -> String) -> String {
    let digits = render(i.unsigned_abs());
    if i < 0 { format!("-{digits}") } else { digits }
}

fn with_sign(s: String, spec: &Spec, numeric: bool) -> String {
    if !numeric || s.starts_with('-') || s.starts_with('+') {
        return s;
    }
    if spec.plus {
        format!("+{s}")
    } else if spec.space {
        format!(" {s}")
    } else {
        s
    }
}

fn pad(s: String, spec: &Spec, numeric: bool) -> String {
    let len = s.chars().count();
    let Some(width) = spec.width.filter(|w| *w > len) else {
        return s;
    };
    let fill = width - len;

    if spec.minus {
        return format!("{s}{}", " ".repeat(fill));
    }
    if spec.zero {
        if numeric && s.starts_with(['-', '+', ' ']) {
            let (sign, rest) = s.split_at(1);
            return format!("{sign}{}{rest}", "0".repeat(fill));
        }
        return format!("{}{s}", "0".repeat(fill));
    }
    format!("{}{s}", " ".repeat(fill))
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case(0.0, "0" ; "zero")]
    #[test_case(1.5, "1.5" ; "fraction")]
    #[test_case(100.0, "100" ; "integral")]
    #[test_case(123_456.0, "123456" ; "below exponent threshold")]
    #[test_case(1_000_000.0, "1e+06" ; "million")]
    #[test_case(1_234_567.0, "1.234567e+06" ; "large")]
    #[test_case(0.0001, "0.0001" ; "small fixed")]
    #[test_case(0.00001, "1e-05" ; "small exponent")]
    #[test_case(-2.25, "-2.25" ; "negative")]
    #[test_case(f64::NAN, "NaN" ; "nan")]
    #[test_case(f64::INFINITY, "+Inf" ; "inf")]
    #[test_case(f64::NEG_INFINITY, "-Inf" ; "negative inf")]
    fn shortest_float(v: f64, expected: &str) {
        assert_eq!(format_float(v, None), expected);
    }

    #[test_case(1234.0, "1234" ; "four digits")]
    #[test_case(12345.0, "1.234e+04" ; "five digits")]
    #[test_case(1.0, "1" ; "trailing zeros trimmed")]
    #[test_case(0.5, "0.5" ; "half")]
    #[test_case(2.0 / 3.0, "0.6667" ; "rounded")]
    #[test_case(999.99, "1000" ; "rounds up")]
    fn precision_four(v: f64, expected: &str) {
        assert_eq!(format_float(v, Some(4)), expected);
    }

    #[test_case("%.2f", vec![Value::Float(3.14159)], "3.14" ; "fixed precision")]
    #[test_case("%d items", vec![Value::Int(3)], "3 items" ; "integer")]
    #[test_case("%s=%v", vec![Value::from("a"), Value::Float(0.5)], "a=0.5" ; "string and value")]
    #[test_case("%5d|%-5d|%05d", vec![Value::Int(42), Value::Int(42), Value::Int(-42)], "   42|42   |-0042" ; "widths")]
    #[test_case("%+d", vec![Value::Int(5)], "+5" ; "plus flag")]
    #[test_case("%x %X", vec![Value::Int(255), Value::Int(255)], "ff FF" ; "hex")]
    #[test_case("%q", vec![Value::from("a\"b")], "\"a\\\"b\"" ; "quoted")]
    #[test_case("%e", vec![Value::Float(1234.5)], "1.234500e+03" ; "exponent")]
    #[test_case("%t", vec![Value::Bool(true)], "true" ; "bool")]
    #[test_case("100%%", vec![], "100%" ; "literal percent")]
    #[test_case("%.3s", vec![Value::from("abcdef")], "abc" ; "string precision")]
    #[test_case("%s", vec![Value::Nil], "" ; "nil as empty")]
    fn printf_formats(format: &str, args: Vec<Value>, expected: &str) {
        assert_eq!(sprintf(format, &args), expected);
    }

    #[test]
    fn printf_bad_verb() {
        assert_eq!(sprintf("%d", &[Value::from("x")]), "%!d(string=x)");
        assert_eq!(sprintf("%f", &[Value::Int(1)]), "%!f(int=1)");
    }

    #[test]
    fn printf_missing_and_extra() {
        assert_eq!(sprintf("%s %s", &[Value::from("a")]), "a %!s(MISSING)");
        assert_eq!(sprintf("x", &[Value::Int(1)]), "x%!(EXTRA int=1)");
    }

    #[test_case("%99999999999999999999d", vec![Value::Int(1)], "%!(NOVERB)%!(EXTRA int=1)" ; "overflowing width")]
    #[test_case("a%.99999999999999999999f tail", vec![Value::Float(1.0)], "a%!(NOVERB)%!(EXTRA float64=1)" ; "overflowing precision")]
    #[test_case("%*d", vec![Value::Int(4), Value::Int(7)], "   7" ; "star width")]
    #[test_case("%*d", vec![Value::Int(-4), Value::Int(7)], "7   " ; "negative star width")]
    #[test_case("%.*f", vec![Value::Int(2), Value::Float(3.14159)], "3.14" ; "star precision")]
    #[test_case("%*d", vec![Value::Int(10_000_000), Value::Int(7)], "%!(BADWIDTH)7" ; "star width too large")]
    #[test_case("%*d", vec![Value::from("x"), Value::Int(7)], "%!(BADWIDTH)7" ; "star width not an int")]
    #[test_case("%.*d", vec![Value::Float(1.0), Value::Int(7)], "%!(BADPREC)7" ; "star precision not an int")]
    fn printf_width_bounds(format: &str, args: Vec<Value>, expected: &str) {
        assert_eq!(sprintf(format, &args), expected);
    }

    #[test]
    fn printf_largest_width_is_rendered() {
        let out = sprintf("%1000000d", &[Value::Int(1)]);
        assert_eq!(out.len(), 1_000_000);
        assert!(out.ends_with(" 1"));
    }

    #[test]
    fn sprint_spacing() {
        assert_eq!(sprint(&[Value::Int(1), Value::Int(2)]), "1 2");
        assert_eq!(sprint(&[Value::from("a"), Value::Int(2)]), "a2");
        assert_eq!(sprint(&[Value::from("a"), Value::from("b")]), "ab");
    }

    #[test]
    fn sprintln_spacing() {
        assert_eq!(sprintln(&[Value::from("a"), Value::from("b")]), "a b\n");
    }

    #[test]
    fn quote_escapes() {
        assert_eq!(go_quote("a\nb\t\\"), "\"a\\nb\\t\\\\\"");
        assert_eq!(go_quote("\x01"), "\"\\x01\"");
    }
}
