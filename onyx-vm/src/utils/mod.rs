use crate::types::value::OnyxValue;

const MAX_DEBUG_LEN: usize = 120;

/// One-line rendering of `value` for log messages, cut at a fixed width.
pub fn format_value_summary(value: &OnyxValue) -> String {
    let repr = value.repr();
    if repr.chars().count() > MAX_DEBUG_LEN {
        let mut truncated: String = repr.chars().take(MAX_DEBUG_LEN).collect();
        truncated.push_str("...");
        truncated
    } else {
        repr
    }
}

/// Summaries of every argument, comma separated.
pub fn format_args_summary(args: &[OnyxValue]) -> String {
    args.iter()
        .map(format_value_summary)
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_long_values_are_truncated() {
        let long = OnyxValue::from("x".repeat(500));
        let summary = format_value_summary(&long);
        assert!(summary.ends_with("..."));
        assert!(summary.chars().count() <= MAX_DEBUG_LEN + 3);
    }

    #[test]
    fn test_short_values_are_kept() {
        assert_eq!(format_value_summary(&OnyxValue::Integer(42)), OnyxValue::Integer(42).repr());
    }
}
