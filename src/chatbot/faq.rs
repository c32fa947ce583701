//! Canned answers for the questions people ask over and over.
//!
//! Rules are evaluated in order and the first rule with any matching
//! pattern wins. Order and trigger patterns are fixed; only the day and
//! rule text is taken from the current knowledge snapshot at build time.

use std::sync::Arc;

use rand::Rng;
use regex::Regex;

use crate::chatbot::knowledge::EventKnowledge;

/// Appended to some answers so the bot sounds a bit more local.
const SECONDARY_LANGUAGE_HINT: &str = "<i>Note: अपडेट भए तुरुन्तै यहाँ share गर्छु।</i>";

const DETAILS_PENDING: &str = "Details coming soon.";

/// One trigger-set → answer mapping.
#[derive(Debug, Clone)]
pub struct FaqRule {
    /// Short label used in logs and by `faq_probe`.
    pub name: &'static str,
    pub patterns: Vec<Regex>,
    pub answer: String,
}

impl FaqRule {
    fn new(name: &'static str, patterns: &[&str], answer: String) -> Self {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(&format!("(?i){p}")).expect("built-in FAQ pattern must compile"))
            .collect();
        Self { name, patterns, answer }
    }

    pub fn is_match(&self, lowered: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(lowered))
    }
}

/// Escape text for Telegram HTML.
pub fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            _ => out.push(c),
        }
    }
    out
}

fn day_answer(knowledge: &EventKnowledge, label: &str, title: &str, extra: Option<&str>) -> String {
    let desc = knowledge.day(label).map(html_escape);
    let mut answer = format!(
        "<b>Day {label} ({title}):</b>\n- {}",
        desc.as_deref().unwrap_or(DETAILS_PENDING)
    );
    if let Some(extra) = extra {
        answer.push_str("\n- ");
        answer.push_str(extra);
    }
    answer
}

/// Build the ordered rule table from a knowledge snapshot.
pub fn build(knowledge: &EventKnowledge) -> Vec<FaqRule> {
    let rule_list = if knowledge.rules.is_empty() {
        "- Rules will be announced soon.".to_string()
    } else {
        knowledge
            .rules
            .iter()
            .map(|r| format!("- {}", html_escape(r)))
            .collect::<Vec<_>>()
            .join("\n")
    };

    vec![
        FaqRule::new(
            "event_start",
            &[r"when.*event.*start", r"start time", r"kab.*shuru", r"shuru kab", r"kahile.*suru"],
            "<b>Event Start:</b> Not announced yet. Will drop it here as soon as it's out. 🙏".into(),
        ),
        FaqRule::new(
            "about",
            &[r"what is (this )?event", r"tell me about the event", r"minecraft civilization"],
            "<b>About Event:</b>\n- Multi-day Minecraft Civilization vibes\n- Flow: settle → diplomacy → battle → trade\n- Stay chill, have fun ✨".into(),
        ),
        FaqRule::new(
            "day_1",
            &[r"day\s*1\b", r"\bfirst day\b", r"\bday one\b"],
            day_answer(knowledge, "1", "Peace & Settlement", None),
        ),
        FaqRule::new(
            "day_2",
            &[r"day\s*2\b", r"\bsecond day\b", r"\bday two\b"],
            day_answer(knowledge, "2", "Diplomacy & Expansion", None),
        ),
        FaqRule::new(
            "day_3",
            &[r"day\s*3\b", r"\bthird day\b", r"\bday three\b", r"battle day", r"pvp day"],
            day_answer(knowledge, "3", "Battle", Some("PvP enabled, stay sharp!")),
        ),
        FaqRule::new(
            "day_4",
            &[r"day\s*4\b", r"\bfourth day\b", r"\bday four\b", r"trade day"],
            day_answer(knowledge, "4", "Trade & Alliance", None),
        ),
        FaqRule::new(
            "rules",
            &[r"rules?", r"what.*allowed", r"what.*not allowed"],
            format!("<b>Rules (pls keep it clean):</b>\n{rule_list}"),
        ),
        FaqRule::new(
            "pvp",
            &[r"pvp.*when", r"when.*pvp", r"pvp enabled"],
            "<b>PvP:</b> Only on Battle Day (Day 3). बाकी दिन chill pls. 😌".into(),
        ),
        FaqRule::new(
            "roles",
            &[r"roles?", r"assign.*role", r"what role"],
            "<b>Roles:</b> Assigned on Day 2 so squads stay organized. Teamwork ftw. 🫡".into(),
        ),
        FaqRule::new(
            "join",
            &[r"how.*join", r"can i join", r"participate"],
            "<b>Join:</b> Info will drop in the event channel soon. Hang tight and follow the steps once posted. 🙌".into(),
        ),
        FaqRule::new(
            "server_ip",
            &[r"server.*ip", r"server address", r"ip address"],
            "<b>Server IP:</b> Shared privately with confirmed participants closer to start time. 🔒".into(),
        ),
        FaqRule::new(
            "version",
            &[r"version", r"java or bedrock"],
            "<b>Version:</b> Java/Bedrock details will be announced with the server info. Sit tight. 🎮".into(),
        ),
        FaqRule::new(
            "voice",
            &[r"voice", r"\bvc\b", r"discord call"],
            "<b>Voice/VC:</b> Hop into event voice channels when staff says. Keep it chill. 🎙️".into(),
        ),
        FaqRule::new(
            "timezone",
            &[r"timezone", r"time zone"],
            "<b>Timezones:</b> Schedule will include TZ info so everyone can sync. Wait for the post. 🕒".into(),
        ),
        FaqRule::new(
            "duration",
            &[r"end time", r"when.*end", r"how long", r"duration"],
            "<b>Duration/End:</b> Will be shared with the start schedule. We'll keep you posted. 🗓️".into(),
        ),
    ]
}

/// Ordered FAQ table built from one knowledge snapshot, plus the hint policy.
#[derive(Debug, Clone)]
pub struct FaqMatcher {
    knowledge: Arc<EventKnowledge>,
    rules: Vec<FaqRule>,
    hint_probability: f64,
}

impl FaqMatcher {
    pub fn new(knowledge: Arc<EventKnowledge>, hint_probability: f64) -> Self {
        Self {
            rules: build(&knowledge),
            knowledge,
            hint_probability: hint_probability.clamp(0.0, 1.0),
        }
    }

    /// The snapshot these rules were built from.
    pub fn knowledge(&self) -> &Arc<EventKnowledge> {
        &self.knowledge
    }

    pub fn rules(&self) -> &[FaqRule] {
        &self.rules
    }

    /// Index of the first rule that matches, if any.
    pub fn find_rule(&self, text: &str) -> Option<usize> {
        let lowered = text.to_lowercase();
        self.rules.iter().position(|rule| rule.is_match(&lowered))
    }

    /// Answer for `text`, if a rule matches.
    pub fn find(&self, text: &str) -> Option<String> {
        let rule = &self.rules[self.find_rule(text)?];
        let mut answer = rule.answer.clone();
        if self.hint_probability > 0.0 && rand::thread_rng().gen_bool(self.hint_probability) {
            answer.push('\n');
            answer.push_str(SECONDARY_LANGUAGE_HINT);
        }
        Some(answer)
    }
}
