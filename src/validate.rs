//! Operator-input validation and fallback policy.
//!
//! Rates and volumes arrive as free text from the presentation layer and
//! must be normalized before anything touches the bus. The two fields use
//! deliberately different fallbacks: a rate that does not validate is sent
//! as the literal zero command (and the visible field is reset to `"0"` so
//! the display matches what the device was told), while a volume that does
//! not parse as a decimal falls back to a fixed 50.0 default.
//!
//! A rate is accepted only if, after trimming and stripping one optional
//! leading sign, every remaining character is a decimal digit. This
//! rejects fractional rates such as `12.5`; that limitation is inherited
//! from the reference controller and is kept so a fleet tuned against it
//! behaves identically.

use log::warn;

/// Rate command substituted when the operator-entered rate is rejected.
pub const ZERO_RATE: &str = "0";

/// Volume (in device units) substituted when the entered volume fails to
/// parse as a decimal number.
pub const DEFAULT_VOLUME: f64 = 50.0;

/// Outcome of normalizing a rate field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRate {
    /// The rate command to send, `"0"` if the input was rejected.
    pub command: String,
    /// True when the fallback was applied and the visible field must be
    /// reset to `"0"`.
    pub fell_back: bool,
}

/// Outcome of normalizing a volume field.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedVolume {
    /// The volume to program, `50.0` if the input was rejected.
    pub value: f64,
    /// True when the fallback was applied.
    pub fell_back: bool,
}

/// True when `s`, less one optional leading sign, is a non-empty run of
/// ASCII digits.
fn looks_numeric(s: &str) -> bool {
    let digits = s.strip_prefix(['+', '-']).unwrap_or(s);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Normalize an operator-entered flow rate.
pub fn parse_rate(raw: &str) -> ParsedRate {
    let trimmed = raw.trim();
    if looks_numeric(trimmed) {
        ParsedRate {
            command: trimmed.to_string(),
            fell_back: false,
        }
    } else {
        if !trimmed.is_empty() {
            warn!("Rejected rate input '{}', substituting {}", trimmed, ZERO_RATE);
        }
        ParsedRate {
            command: ZERO_RATE.to_string(),
            fell_back: true,
        }
    }
}

/// Normalize an operator-entered delivery volume.
pub fn parse_volume(raw: &str) -> ParsedVolume {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => ParsedVolume {
            value,
            fell_back: false,
        },
        _ => {
            warn!(
                "Rejected volume input '{}', substituting {}",
                raw.trim(),
                DEFAULT_VOLUME
            );
            ParsedVolume {
                value: DEFAULT_VOLUME,
                fell_back: true,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_rate_accepted() {
        let parsed = parse_rate(" 100 ");
        assert_eq!(parsed.command, "100");
        assert!(!parsed.fell_back);
    }

    #[test]
    fn test_signed_rates_accepted() {
        assert_eq!(parse_rate("-250").command, "-250");
        assert_eq!(parse_rate("+7").command, "+7");
        assert!(!parse_rate("5").fell_back);
    }

    #[test]
    fn test_fractional_rate_falls_back_to_zero() {
        let parsed = parse_rate("12.5");
        assert_eq!(parsed.command, ZERO_RATE);
        assert!(parsed.fell_back);
    }

    #[test]
    fn test_garbage_and_empty_rates_fall_back() {
        for raw in ["abc", "", "   ", "10 ul", "--3", "+"] {
            let parsed = parse_rate(raw);
            assert_eq!(parsed.command, ZERO_RATE, "input {:?}", raw);
            assert!(parsed.fell_back, "input {:?}", raw);
        }
    }

    #[test]
    fn test_decimal_volume_accepted() {
        let parsed = parse_volume(" 12.5 ");
        assert_eq!(parsed.value, 12.5);
        assert!(!parsed.fell_back);
    }

    #[test]
    fn test_bad_volume_falls_back_to_default() {
        for raw in ["abc", "", "1.2.3", "NaN"] {
            let parsed = parse_volume(raw);
            assert_eq!(parsed.value, DEFAULT_VOLUME, "input {:?}", raw);
            assert!(parsed.fell_back, "input {:?}", raw);
        }
    }
}
