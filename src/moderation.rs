//! Profanity gate run before anything else touches a message.

/// Built-in deny-list: English plus Hindi/Nepali slurs. Matched as
/// case-insensitive substrings, so short entries are deliberately broad.
pub const DEFAULT_BANNED_WORDS: &[&str] = &[
    "fuck", "shit", "bitch", "asshole", "bastard", "cunt", "dick", "piss", "damn",
    "mc", "g***u", "chutiya", "madarchod", "behenchod", "randi", "bhenchod", "gand",
    "kutte", "kutta", "launda", "laundi", "loda", "lund", "suar", "bhainsa", "boka",
    "saala", "sala", "harami", "lattu", "lora",
];

/// Sent privately to the author of a removed message.
pub const CONDUCT_NOTICE: &str = "Please keep the chat respectful. Your message was removed.";

#[derive(Debug, Clone)]
pub struct DenyList {
    words: Vec<String>,
}

impl DenyList {
    /// Built-in words plus `extra` (blank entries ignored).
    pub fn new<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut words: Vec<String> = DEFAULT_BANNED_WORDS.iter().map(|w| w.to_string()).collect();
        for w in extra {
            let w = w.as_ref().trim().to_lowercase();
            if !w.is_empty() && !words.contains(&w) {
                words.push(w);
            }
        }
        Self { words }
    }

    /// First deny-listed word found in `text`, if any.
    pub fn find(&self, text: &str) -> Option<&str> {
        let lowered = text.to_lowercase();
        self.words
            .iter()
            .find(|w| lowered.contains(w.as_str()))
            .map(String::as_str)
    }

    pub fn is_violation(&self, text: &str) -> bool {
        self.find(text).is_some()
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl Default for DenyList {
    fn default() -> Self {
        Self::new(std::iter::empty::<&str>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detects_case_insensitively() {
        let list = DenyList::default();
        assert!(list.is_violation("What the SHIT is this"));
        assert!(list.is_violation("tu CHUTIYA hai"));
    }

    #[test]
    fn test_substring_match() {
        let list = DenyList::default();
        assert_eq!(list.find("absolutely fucking great"), Some("fuck"));
    }

    #[test]
    fn test_clean_text() {
        let list = DenyList::default();
        assert!(!list.is_violation("when does the event start?"));
        assert!(!list.is_violation("what happens on day 1"));
    }

    #[test]
    fn test_extra_words() {
        let list = DenyList::new(["  Griefer ", "", "fuck"]);
        assert_eq!(list.len(), DEFAULT_BANNED_WORDS.len() + 1);
        assert!(list.is_violation("you GRIEFER"));
    }
}
