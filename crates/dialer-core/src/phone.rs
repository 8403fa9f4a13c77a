//! North American number formatting for display and dialing

fn digits(input: &str) -> String {
    input.chars().filter(|c| c.is_ascii_digit()).collect()
}

fn national(input: &str) -> Option<String> {
    let digits = digits(input);
    match digits.len() {
        10 => Some(digits),
        11 if digits.starts_with('1') => Some(digits[1..].to_string()),
        _ => None,
    }
}

/// `+1 AAA-PPP-SSSS` for 10 digit numbers (or 11 with a leading 1). Anything
/// else is returned as given.
pub fn format_number(input: &str) -> String {
    match national(input) {
        Some(n) => format!("+1 {}-{}-{}", &n[0..3], &n[3..6], &n[6..]),
        None => input.to_string(),
    }
}

/// E.164 form `+1XXXXXXXXXX`, or the input unchanged when it is not a
/// North American number.
pub fn normalize_number(input: &str) -> String {
    match national(input) {
        Some(n) => format!("+1{}", n),
        None => input.to_string(),
    }
}
