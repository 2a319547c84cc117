use chrono::Duration;

// ============== Durations ==============

/// Parse a Go-style duration string (`300ms`, `2h`, `1h30m`, `1.5h`).
///
/// Accepts an optional sign followed by one or more `<number><unit>` pairs,
/// units being `ns`, `us`/`µs`/`μs`, `ms`, `s`, `m`, `h`. A bare `0` is the
/// zero duration. Returns `None` for anything else, including overflow.
pub fn parse_duration(input: &str) -> Option<Duration> {
    let (negative, mut rest) = match input.as_bytes().first() {
        Some(b'-') => (true, &input[1..]),
        Some(b'+') => (false, &input[1..]),
        _ => (false, input),
    };

    if rest == "0" {
        return Some(Duration::zero());
    }
    if rest.is_empty() {
        return None;
    }

    let mut total: i128 = 0;
    while !rest.is_empty() {
        let int_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        let (int_part, after) = rest.split_at(int_len);

        let (frac_part, after) = match after.strip_prefix('.') {
            Some(a) => {
                let n = a.bytes().take_while(u8::is_ascii_digit).count();
                a.split_at(n)
            }
            None => ("", after),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return None;
        }

        let unit_len = after
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(after.len());
        let (unit, tail) = after.split_at(unit_len);
        let scale = unit_nanos(unit)?;

        let whole: i128 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().ok()?
        };
        let mut value = whole.checked_mul(scale)?;

        if !frac_part.is_empty() {
            // Digits past nanosecond precision cannot change the result.
            let digits = &frac_part[..frac_part.len().min(18)];
            let numer: i128 = digits.parse().ok()?;
            let denom = 10i128.pow(digits.len() as u32);
            value = value.checked_add(numer * scale / denom)?;
        }

        total = total.checked_add(value)?;
        rest = tail;
    }

    if negative {
        total = -total;
    }
    let nanos = i64::try_from(total).ok()?;
    Some(Duration::nanoseconds(nanos))
}

fn unit_nanos(unit: &str) -> Option<i128> {
    let n = match unit {
        "ns" => 1,
        "us" | "µs" | "μs" => 1_000,
        "ms" => 1_000_000,
        "s" => 1_000_000_000,
        "m" => 60 * 1_000_000_000,
        "h" => 3_600 * 1_000_000_000,
        _ => return None,
    };
    Some(n)
}

// ============== Text Helpers ==============

/// Truncate to `keep` characters plus `...` when `text` is longer than `max` characters.
pub fn truncate_chars(text: &str, max: usize, keep: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let head: String = text.chars().take(keep).collect();
    format!("{head}...")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_units() {
        assert_eq!(parse_duration("2h"), Some(Duration::hours(2)));
        assert_eq!(parse_duration("90s"), Some(Duration::seconds(90)));
        assert_eq!(parse_duration("300ms"), Some(Duration::milliseconds(300)));
        assert_eq!(parse_duration("15m"), Some(Duration::minutes(15)));
    }

    #[test]
    fn parses_compound_and_fractional() {
        assert_eq!(parse_duration("1h30m"), Some(Duration::minutes(90)));
        assert_eq!(parse_duration("1.5h"), Some(Duration::minutes(90)));
        assert_eq!(parse_duration(".5s"), Some(Duration::milliseconds(500)));
        assert_eq!(parse_duration("-2m"), Some(Duration::minutes(-2)));
        assert_eq!(parse_duration("0"), Some(Duration::zero()));
    }

    #[test]
    fn rejects_garbage() {
        for bad in ["", "notaduration", "10", "h", "2d", "1h30", ".s", "-", "5 s"] {
            assert_eq!(parse_duration(bad), None, "{bad:?} should be rejected");
        }
    }

    #[test]
    fn rejects_overflow() {
        assert_eq!(parse_duration("99999999999999999999h"), None);
    }

    #[test]
    fn truncate_keeps_short_text() {
        assert_eq!(truncate_chars("short", 50, 47), "short");
        let exact = "x".repeat(50);
        assert_eq!(truncate_chars(&exact, 50, 47), exact);
    }

    #[test]
    fn truncate_counts_chars_not_bytes() {
        let long = "é".repeat(60);
        let out = truncate_chars(&long, 50, 47);
        assert_eq!(out.chars().count(), 50);
        assert!(out.ends_with("..."));
    }
}
