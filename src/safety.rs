//! Input guardrails. Cheap checks that run before any store or AI work.
//!
//! The rule chain has a fixed priority and the first match wins:
//! empty → too short → unsafe topic → repeated-character spam → off-topic
//! → no supported-domain keyword → valid. Unsafe content is checked before
//! off-topic content so a message that is both gets the more specific reply.
//!
//! All keyword lists are English only.

use regex::Regex;
use tracing::debug;

/// Maximum characters kept from an inbound message.
pub const MAX_INPUT_CHARS: usize = 5000;

/// Minimum characters for a message to be considered at all.
const MIN_INPUT_CHARS: usize = 3;

/// A run of this many identical characters marks the message as garbled.
const SPAM_RUN_LENGTH: usize = 11;

const UNSAFE_TERMS: &[&str] = &[
    // explicit
    "porn", "xxx", "sex", "nude", "naked",
    // hacking / piracy
    "hack", "crack", "pirate", "warez",
    // drugs
    "cocaine", "heroin", "marijuana", "drug",
    // weapons
    "weapon", "gun", "bomb", "explosive",
    // violence / self-harm
    "kill", "murder", "suicide",
    // fraud
    "scam", "fraud scheme", "money laundering",
    // gambling
    "casino", "gambling", "betting", "lottery",
];

const OFF_TOPIC_TERMS: &[&str] = &[
    // entertainment
    "movie", "film", "cinema", "song", "music", "singer", "actor", "actress", "celebrity",
    "bollywood", "hollywood",
    "game", "video game", "gaming", "xbox", "playstation", "pubg", "fortnite", "minecraft",
    "netflix", "amazon prime", "hotstar", "youtube", "tiktok", "instagram", "facebook",
    "twitter", "snapchat", "whatsapp",
    "tv show", "series", "episode", "season", "anime", "cartoon",
    // sports
    "cricket", "football", "soccer", "hockey", "tennis", "basketball", "badminton", "ipl",
    "world cup",
    "match", "player", "team", "tournament", "score", "champion", "league",
    // food
    "recipe", "cook", "cooking", "restaurant", "cafe", "pizza", "burger", "biryani", "chai",
    "coffee",
    "food delivery", "swiggy", "zomato", "uber eats", "dominos", "mcdonalds", "kfc",
    // shopping
    "shopping", "shop", "buy", "amazon", "flipkart", "myntra", "ajio", "meesho",
    "fashion", "clothes", "dress", "shoes", "jewelry", "makeup", "cosmetic",
    "mobile phone", "smartphone", "iphone", "samsung", "laptop", "headphone", "gadget",
    // travel
    "vacation", "holiday", "tour", "travel", "hotel", "resort", "flight", "ticket", "booking",
    "tourist", "destination", "beach", "mountain", "trip",
    // consumer apps
    "android app", "ios app", "download app", "mobile game", "whatsapp status",
    // relationships
    "boyfriend", "girlfriend", "relationship", "dating", "love", "marriage proposal", "crush",
    // astrology
    "horoscope", "astrology", "zodiac", "luck", "fortune", "kundli", "vastu",
];

/// Substrings that mark a message as belonging to a supported domain.
const DOMAIN_KEYWORDS: &[&str] = &[
    // health
    "health", "hospital", "doctor", "medical", "medicine", "disease", "illness", "treatment",
    "insurance", "ayushman", "clinic", "surgery", "patient", "healthcare", "covid",
    // agriculture
    "farm", "crop", "seed", "fertilizer", "agriculture", "kisan", "irrigation", "harvest",
    "soil", "pesticide", "tractor", "land", "cultivation", "organic", "farmer",
    // finance
    "bank", "loan", "money", "finance", "saving", "account", "credit", "debit", "payment",
    "investment", "pension", "subsidy", "mudra", "financial",
    // government schemes
    "scheme", "yojana", "government", "welfare", "benefit", "eligibility", "registration",
    "certificate", "document", "aadhar", "ration", "pradhan mantri", "ujjwala", "awas",
    // education
    "education", "school", "college", "scholarship", "student", "study", "exam", "degree",
    "course", "training", "skill", "learning", "admission", "fees",
    // legal / documentation
    "legal", "law", "court", "license", "permit", "passport", "voter", "pan", "rights",
    "complaint", "ration card",
    // climate
    "weather", "rain", "flood", "drought", "disaster", "climate", "cyclone", "emergency",
    "relief", "alert",
];

const EMPTY_MESSAGE: &str = "Please enter a message.";

const TOO_SHORT_MESSAGE: &str = "Hi there! 👋\n\nYour message seems a bit short. Could you please \
describe your question in a little more detail? I'm here to help!";

const UNSAFE_MESSAGE: &str = "I appreciate you reaching out! 😊\n\n\
However, I'm specifically designed to help with essential services like:\n\n\
🏥 Healthcare and medical support\n\
🌾 Agriculture and farming assistance\n\
💰 Banking and financial services\n\
🏛️ Government schemes and welfare\n\
📚 Education and scholarships\n\
📋 Legal documentation help\n\n\
How can I assist you with any of these topics today?";

const SPAM_MESSAGE: &str = "Hmm... 🤔\n\nI couldn't understand your message. Could you please \
write a clear question? I'm here to help with government services and essential information!";

const OFF_TOPIC_MESSAGE: &str = "Thanks for your question! 😊\n\n\
I noticed this might be about entertainment, shopping, or general topics. \
While I'd love to chat about everything, I'm specially trained to help with:\n\n\
🏥 Healthcare - Finding doctors, getting insurance, medical schemes\n\
🌾 Agriculture - Crop advice, farming loans, subsidies\n\
💰 Finance - Opening bank accounts, getting loans, financial planning\n\
🏛️ Government Schemes - PM-JAY, PM-KISAN, scholarships, and more\n\
📚 Education - School admission, scholarships, training programs\n\
🌦️ Climate & Disasters - Weather alerts, emergency support\n\n\
What can I help you with from these areas?";

const ONBOARDING_MESSAGE: &str = "Hello! 👋 I'm SahaayAI, your friendly assistant for essential services.\n\n\
I'm here to make your life easier by helping with:\n\n\
🏥 Healthcare - \"How do I get Ayushman Bharat card?\"\n\
🌾 Agriculture - \"What loans are available for farmers?\"\n\
💰 Finance - \"How can I open a Jan Dhan account?\"\n\
🏛️ Government Schemes - \"Am I eligible for PM-KISAN?\"\n\
📚 Education - \"What scholarships are available for students?\"\n\
🌦️ Climate Support - \"How to get flood relief assistance?\"\n\n\
Try asking me something like the examples above, and I'll do my best to help! 😊";

/// Why a message was turned away.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    Empty,
    TooShort,
    UnsafeContent,
    Spam,
    OffTopic,
    Irrelevant,
}

impl RejectReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectReason::Empty => "empty",
            RejectReason::TooShort => "too_short",
            RejectReason::UnsafeContent => "unsafe_content",
            RejectReason::Spam => "spam",
            RejectReason::OffTopic => "off_topic",
            RejectReason::Irrelevant => "irrelevant",
        }
    }

    /// The guidance shown to the user for this reason.
    pub fn user_message(&self) -> &'static str {
        match self {
            RejectReason::Empty => EMPTY_MESSAGE,
            RejectReason::TooShort => TOO_SHORT_MESSAGE,
            RejectReason::UnsafeContent => UNSAFE_MESSAGE,
            RejectReason::Spam => SPAM_MESSAGE,
            RejectReason::OffTopic => OFF_TOPIC_MESSAGE,
            RejectReason::Irrelevant => ONBOARDING_MESSAGE,
        }
    }
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of running the guardrail chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Valid,
    Rejected {
        reason: RejectReason,
        message: &'static str,
    },
}

impl Verdict {
    fn reject(reason: RejectReason) -> Self {
        Verdict::Rejected {
            reason,
            message: reason.user_message(),
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Verdict::Valid)
    }
}

/// Stateless guardrail filter. Build once and share.
pub struct GuardrailFilter {
    unsafe_topics: Regex,
    off_topic: Regex,
}

impl GuardrailFilter {
    pub fn new() -> Self {
        Self {
            unsafe_topics: word_pattern(UNSAFE_TERMS),
            off_topic: word_pattern(OFF_TOPIC_TERMS),
        }
    }

    /// Run the rule chain against `text`.
    pub fn validate(&self, text: &str) -> Verdict {
        let verdict = self.evaluate(text);
        if let Verdict::Rejected { reason, .. } = verdict {
            debug!(reason = %reason, "Guardrail rejected message");
        }
        verdict
    }

    fn evaluate(&self, text: &str) -> Verdict {
        if text.trim().is_empty() {
            return Verdict::reject(RejectReason::Empty);
        }
        if text.chars().count() < MIN_INPUT_CHARS {
            return Verdict::reject(RejectReason::TooShort);
        }

        let lower = text.to_lowercase();

        if self.unsafe_topics.is_match(&lower) {
            return Verdict::reject(RejectReason::UnsafeContent);
        }
        if has_repeated_run(text, SPAM_RUN_LENGTH) {
            return Verdict::reject(RejectReason::Spam);
        }
        if self.off_topic.is_match(&lower) {
            return Verdict::reject(RejectReason::OffTopic);
        }
        if !DOMAIN_KEYWORDS.iter().any(|k| lower.contains(k)) {
            return Verdict::reject(RejectReason::Irrelevant);
        }

        Verdict::Valid
    }
}

impl Default for GuardrailFilter {
    fn default() -> Self {
        Self::new()
    }
}

/// Compile a case-insensitive, word-bounded alternation over `terms`.
fn word_pattern(terms: &[&str]) -> Regex {
    let alternation = terms
        .iter()
        .map(|t| regex::escape(t))
        .collect::<Vec<_>>()
        .join("|");
    Regex::new(&format!(r"(?i)\b(?:{alternation})\b")).expect("guardrail keyword pattern")
}

/// True when some character other than a line feed repeats `run` or more
/// times in a row.
fn has_repeated_run(text: &str, run: usize) -> bool {
    let mut prev = None;
    let mut count = 0usize;
    for c in text.chars() {
        if c == '\n' {
            prev = None;
            count = 0;
            continue;
        }
        if Some(c) == prev {
            count += 1;
        } else {
            prev = Some(c);
            count = 1;
        }
        if count >= run {
            return true;
        }
    }
    false
}

/// Strip markup-ish characters, cap the length, and trim.
pub fn sanitize_input(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, '<' | '>' | '{' | '}' | '[' | ']' | '\\'))
        .take(MAX_INPUT_CHARS)
        .collect();
    cleaned.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reason(v: Verdict) -> Option<RejectReason> {
        match v {
            Verdict::Valid => None,
            Verdict::Rejected { reason, .. } => Some(reason),
        }
    }

    #[test]
    fn short_message_asks_for_detail() {
        let g = GuardrailFilter::new();
        assert_eq!(reason(g.validate("hi")), Some(RejectReason::TooShort));
        assert_eq!(reason(g.validate("   ")), Some(RejectReason::Empty));
    }

    #[test]
    fn crop_loan_is_valid() {
        let g = GuardrailFilter::new();
        assert_eq!(g.validate("I need a crop loan"), Verdict::Valid);
    }

    #[test]
    fn cricket_score_is_off_topic() {
        let g = GuardrailFilter::new();
        assert_eq!(
            reason(g.validate("what's the latest cricket score")),
            Some(RejectReason::OffTopic)
        );
    }

    #[test]
    fn unsafe_wins_over_off_topic() {
        let g = GuardrailFilter::new();
        let v = g.validate("where can I buy a gun for hunting");
        assert_eq!(reason(v), Some(RejectReason::UnsafeContent));
        if let Verdict::Rejected { message, .. } = v {
            assert_eq!(message, UNSAFE_MESSAGE);
            assert_ne!(message, OFF_TOPIC_MESSAGE);
        }
    }

    #[test]
    fn off_topic_wins_over_irrelevant() {
        let g = GuardrailFilter::new();
        // "movie" is off-topic and nothing here is a domain keyword either.
        assert_eq!(reason(g.validate("recommend a movie")), Some(RejectReason::OffTopic));
    }

    #[test]
    fn off_topic_wins_even_with_domain_keyword() {
        let g = GuardrailFilter::new();
        assert_eq!(
            reason(g.validate("can I get a loan to buy an iphone")),
            Some(RejectReason::OffTopic)
        );
    }

    #[test]
    fn repeated_characters_flagged_as_spam() {
        let g = GuardrailFilter::new();
        assert_eq!(reason(g.validate("loan aaaaaaaaaaa")), Some(RejectReason::Spam));
        // Ten in a row is still fine.
        assert_eq!(g.validate("loan aaaaaaaaaa"), Verdict::Valid);
        // Blank lines between paragraphs are not a run.
        let spaced = format!("need a loan{}for my farm", "\n".repeat(12));
        assert_eq!(g.validate(&spaced), Verdict::Valid);
    }

    #[test]
    fn message_without_domain_keyword_gets_onboarding() {
        let g = GuardrailFilter::new();
        let v = g.validate("hello there friend");
        assert_eq!(reason(v), Some(RejectReason::Irrelevant));
        if let Verdict::Rejected { message, .. } = v {
            assert!(message.contains("SahaayAI"));
        }
    }

    #[test]
    fn matching_is_case_insensitive_and_word_bounded() {
        let g = GuardrailFilter::new();
        assert_eq!(
            reason(g.validate("CRICKET tickets please")),
            Some(RejectReason::OffTopic)
        );
        // "skill" contains "kill" but is not the word "kill".
        assert_eq!(g.validate("skill training for farmers"), Verdict::Valid);
    }

    #[test]
    fn sanitize_strips_and_caps() {
        assert_eq!(sanitize_input("  <b>loan</b> {x} [y] \\ "), "bloan/b x y");
        let long = "a".repeat(MAX_INPUT_CHARS + 50);
        assert_eq!(sanitize_input(&long).chars().count(), MAX_INPUT_CHARS);
    }

    #[test]
    fn repeated_run_counts_consecutive_only() {
        assert!(has_repeated_run("xxxxxxxxxxx", 11));
        assert!(!has_repeated_run("xyxyxyxyxyxyxyxyxyxy", 11));
        assert!(!has_repeated_run(&"\n".repeat(20), 11));
        assert!(!has_repeated_run("xxxxxx\nxxxxxx", 11));
    }
}
