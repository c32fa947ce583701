use std::sync::LazyLock;

use regex::Regex;

/// Reply for questions the bot deliberately does not take on.
pub const TOPIC_DECLINE: &str = "Hey! I'm Maya. I skip math/coding asks, but happy to chat event stuff or any chill topic: food, games, life vibes.";

static MATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)math|calculate|calculation|equation|integral|derivative|algebra|geometry|calculus|solve\s+\d|\d+\s*[+\-*/^]\s*\d+",
    )
    .expect("math pattern")
});

static CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)code|program|script|algorithm|debug|bug|compile|javascript|python|java|c\+\+|c#|rust|typescript|ts|js|go\b|golang",
    )
    .expect("code pattern")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Topic {
    Math,
    Code,
    Other,
}

/// Heuristic: is this a math or programming request?
///
/// Plain substring regexes, so false positives ("ts" in "tents") are
/// expected and accepted.
pub fn classify(text: &str) -> Topic {
    if MATH.is_match(text) {
        Topic::Math
    } else if CODE.is_match(text) {
        Topic::Code
    } else {
        Topic::Other
    }
}

pub fn is_math_or_code(text: &str) -> bool {
    classify(text) != Topic::Other
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic() {
        assert_eq!(classify("can you solve 2+2"), Topic::Math);
        assert_eq!(classify("what is 12 * 7"), Topic::Math);
        assert_eq!(classify("Help with my ALGEBRA homework"), Topic::Math);
    }

    #[test]
    fn test_programming() {
        assert_eq!(classify("how do I debug this"), Topic::Code);
        assert_eq!(classify("write me some Python"), Topic::Code);
        assert_eq!(classify("is c++ hard"), Topic::Code);
    }

    #[test]
    fn test_other() {
        assert!(!is_math_or_code("who won yesterday?"));
        assert!(!is_math_or_code("favourite food?"));
    }

    #[test]
    fn test_known_false_positive_does_not_panic() {
        // "ts" inside "tents" trips the code family
        assert!(is_math_or_code("bring tents"));
    }
}
