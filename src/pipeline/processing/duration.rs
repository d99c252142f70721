use regex::Regex;
use std::sync::OnceLock;

static DURATION_RE: OnceLock<Option<Regex>> = OnceLock::new();

fn duration_regex() -> Option<&'static Regex> {
    DURATION_RE
        .get_or_init(|| {
            Regex::new(r"^P(?:(\d+)W)?(?:(\d+)D)?(?:T(?:(\d+)H)?(?:(\d+)M)?(?:(\d+)(?:\.\d+)?S)?)?$")
                .ok()
        })
        .as_ref()
}

/// Convert an ISO-8601 duration such as `PT1H2M3S` into whole seconds.
///
/// Missing components count as zero. Anything that is not a duration,
/// including the empty string, yields 0. Fractional seconds are truncated.
pub fn parse_duration_seconds(raw: &str) -> u64 {
    let Some(re) = duration_regex() else {
        return 0;
    };
    let Some(caps) = re.captures(raw.trim()) else {
        return 0;
    };
    // A component too large for u64, or a total that overflows, is malformed
    let part = |idx: usize| -> Option<u64> {
        match caps.get(idx) {
            Some(m) => m.as_str().parse::<u64>().ok(),
            None => Some(0),
        }
    };
    let total = [(1, 7 * 86_400u64), (2, 86_400), (3, 3_600), (4, 60), (5, 1)]
        .into_iter()
        .try_fold(0u64, |acc, (idx, unit)| {
            part(idx)?.checked_mul(unit)?.checked_add(acc)
        });
    total.unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_duration() {
        assert_eq!(parse_duration_seconds("PT1H2M3S"), 3723);
    }

    #[test]
    fn test_partial_components() {
        assert_eq!(parse_duration_seconds("PT45S"), 45);
        assert_eq!(parse_duration_seconds("PT2H"), 7200);
        assert_eq!(parse_duration_seconds("PT10M"), 600);
        assert_eq!(parse_duration_seconds("PT1H30S"), 3630);
    }

    #[test]
    fn test_day_and_week_components() {
        assert_eq!(parse_duration_seconds("P1DT1S"), 86_401);
        assert_eq!(parse_duration_seconds("P1W"), 604_800);
        // Live streams report a zero-day duration
        assert_eq!(parse_duration_seconds("P0D"), 0);
    }

    #[test]
    fn test_fractional_seconds_truncate() {
        assert_eq!(parse_duration_seconds("PT1.75S"), 1);
    }

    #[test]
    fn test_malformed_is_zero() {
        assert_eq!(parse_duration_seconds("garbage"), 0);
        assert_eq!(parse_duration_seconds(""), 0);
        assert_eq!(parse_duration_seconds("1H2M"), 0);
        assert_eq!(parse_duration_seconds("PT1X"), 0);
    }

    #[test]
    fn test_overflowing_components_are_zero() {
        assert_eq!(parse_duration_seconds("P99999999999999W"), 0);
        assert_eq!(parse_duration_seconds("PT99999999999999999999S"), 0);
        assert_eq!(parse_duration_seconds("P30000000000000DT18446744073709551615S"), 0);
        assert_eq!(parse_duration_seconds("PT18446744073709551615S"), u64::MAX);
    }
}
