//! Feed round labels look like `"<competition free text> - <integer>"`.

pub const LABEL_SEPARATOR: &str = " - ";

/// Round number carried by a feed label: the integer after the final
/// `" - "`. A label without the separator is parsed whole.
pub fn parse_round_number(label: &str) -> Option<i32> {
    label
        .rsplit(LABEL_SEPARATOR)
        .next()
        .and_then(|token| token.trim().parse::<i32>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_integer_is_the_round_number() {
        assert_eq!(parse_round_number("Regular Season - 12"), Some(12));
        assert_eq!(parse_round_number("League - 1"), Some(1));
    }

    #[test]
    fn last_separator_wins() {
        assert_eq!(parse_round_number("Group A - Stage 2 - 3"), Some(3));
    }

    #[test]
    fn surrounding_whitespace_is_ignored() {
        assert_eq!(parse_round_number("Regular Season - 7 "), Some(7));
    }

    #[test]
    fn bare_number_parses() {
        assert_eq!(parse_round_number("5"), Some(5));
    }

    #[test]
    fn non_integer_tokens_do_not_parse() {
        assert_eq!(parse_round_number("Knockout Round Play-offs"), None);
        assert_eq!(parse_round_number("Quarter-finals"), None);
        assert_eq!(parse_round_number("Regular Season - 1st Leg"), None);
        assert_eq!(parse_round_number(""), None);
    }
}
