//! Deterministic domain classifier that runs before the reasoning loop.
//!
//! The guard never consults the oracle. Out-of-domain requests are answered
//! with [`OUT_OF_SCOPE_REPLY`] without touching any tool.

use partsage_core::domain::conversation::Query;

pub const OUT_OF_SCOPE_REPLY: &str = "I can only help with refrigerator and dishwasher parts, repairs, and store policies. Please ask about one of those.";

pub const REASON_UNSUPPORTED_DOMAIN: &str = "unsupported_domain";
pub const REASON_NO_SUPPORTED_TOPIC: &str = "no_supported_topic";

const SUPPORTED_CATEGORIES: &[&str] =
    &["fridge", "refrigerator", "refrigerators", "freezer", "dishwasher", "dishwashers", "dish washer"];

const UNSUPPORTED_DOMAINS: &[&str] = &[
    "washer",
    "washing machine",
    "dryer",
    "oven",
    "microwave",
    "stove",
    "range hood",
    "cooktop",
    "air conditioner",
    "furnace",
    "water heater",
    "lawn mower",
    "car",
    "truck",
    "vehicle",
    "engine",
    "stereo",
    "phone",
    "laptop",
    "computer",
    "tv",
    "television",
];

const PART_WORDS: &[&str] = &[
    "part",
    "parts",
    "ice maker",
    "icemaker",
    "door seal",
    "gasket",
    "filter",
    "pump",
    "valve",
    "shelf",
    "bin",
    "rack",
    "drawer",
    "hinge",
    "thermostat",
    "compressor",
    "fan",
    "motor",
    "spray arm",
    "dispenser",
    "latch",
    "heater",
    "sensor",
    "board",
    "model",
    "install",
    "installation",
    "replace",
    "replacement",
    "compatible",
    "fit",
    "fits",
];

/// Matched as word prefixes so inflections ("leaking", "cooling") count.
const SYMPTOM_STEMS: &[&str] = &[
    "cool", "cold", "warm", "leak", "drain", "nois", "loud", "frost", "ice", "water", "smell", "odor",
    "clean", "dishes", "broke", "fix", "repair", "troubleshoot",
];

const STORE_TOPICS: &[&str] = &[
    "order",
    "orders",
    "return",
    "returns",
    "refund",
    "warranty",
    "shipping",
    "delivery",
    "policy",
    "policies",
    "price",
    "stock",
];

/// Words that point back at something already discussed.
const FOLLOW_UP_CUES: &[&str] = &[
    "it", "its", "this", "that", "these", "those", "them", "they", "one", "ones", "same", "another",
    "else", "more", "cheaper", "much", "cost", "costs",
];

/// Function words a bare follow-up may carry besides its cue.
const FOLLOW_UP_FILLER: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "be", "do", "does", "did", "can", "could", "will", "would",
    "should", "how", "what", "which", "when", "where", "any", "anything", "there", "i", "me", "my",
    "you", "your", "s", "t", "to", "of", "for", "in", "on", "with", "and", "or", "also", "still",
    "have", "has", "get", "need", "show", "tell", "about", "many", "long", "take", "please", "ok",
    "okay", "yes", "so", "then", "now",
];

const GENERIC_APPLIANCE: &[&str] = &["appliance", "appliances", "whirlpool", "kitchenaid", "maytag", "frigidaire", "lg", "samsung", "ge", "bosch", "kenmore"];

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScopeDecision {
    InScope,
    OutOfScope { reason_code: &'static str, reason: String },
}

impl ScopeDecision {
    pub fn is_in_scope(&self) -> bool {
        matches!(self, Self::InScope)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScopeGuard;

impl ScopeGuard {
    pub fn new() -> Self {
        Self
    }

    pub fn classify(&self, query: &Query) -> ScopeDecision {
        let terms = Terms::new(&query.text);

        if !terms.names_supported_category() {
            if let Some(topic) = terms.first_match(UNSUPPORTED_DOMAINS) {
                return ScopeDecision::OutOfScope {
                    reason_code: REASON_UNSUPPORTED_DOMAIN,
                    reason: format!("request mentions unsupported topic `{topic}`"),
                };
            }
        }

        if terms.has_supported_topic() {
            return ScopeDecision::InScope;
        }

        // Bare follow-ups such as "how much is it?" inherit scope from earlier turns.
        let follow_up = terms.is_bare_follow_up()
            && query.history.user_turns().any(|turn| {
                let earlier = Terms::new(&turn.content);
                earlier.has_supported_topic() && earlier.first_match(UNSUPPORTED_DOMAINS).is_none()
            });
        if follow_up {
            return ScopeDecision::InScope;
        }

        ScopeDecision::OutOfScope {
            reason_code: REASON_NO_SUPPORTED_TOPIC,
            reason: "request does not mention a supported appliance topic".to_string(),
        }
    }
}

struct Terms {
    tokens: Vec<String>,
    padded: String,
}

impl Terms {
    fn new(text: &str) -> Self {
        let tokens = tokenize(text);
        let padded = format!(" {} ", tokens.join(" "));
        Self { tokens, padded }
    }

    fn contains(&self, term: &str) -> bool {
        if term.contains(' ') {
            self.padded.contains(&format!(" {term} "))
        } else {
            self.tokens.iter().any(|token| token == term)
        }
    }

    fn first_match<'a>(&self, vocabulary: &[&'a str]) -> Option<&'a str> {
        vocabulary.iter().copied().find(|term| self.contains(term))
    }

    fn names_supported_category(&self) -> bool {
        self.first_match(SUPPORTED_CATEGORIES).is_some()
    }

    /// A cue word and nothing but function words around it.
    fn is_bare_follow_up(&self) -> bool {
        self.first_match(FOLLOW_UP_CUES).is_some()
            && self.tokens.iter().all(|token| {
                FOLLOW_UP_CUES.contains(&token.as_str()) || FOLLOW_UP_FILLER.contains(&token.as_str())
            })
    }

    fn has_supported_topic(&self) -> bool {
        self.names_supported_category()
            || self.first_match(PART_WORDS).is_some()
            || self.first_match(STORE_TOPICS).is_some()
            || self.first_match(GENERIC_APPLIANCE).is_some()
            || self
                .tokens
                .iter()
                .any(|token| SYMPTOM_STEMS.iter().any(|stem| token.starts_with(stem)))
            || self.tokens.iter().any(|token| is_identifier(token))
    }
}

fn tokenize(text: &str) -> Vec<String> {
    let mut sanitized = String::with_capacity(text.len());
    for character in text.chars() {
        if character.is_ascii_alphanumeric() {
            sanitized.push(character.to_ascii_lowercase());
        } else {
            sanitized.push(' ');
        }
    }
    sanitized.split_whitespace().map(|token| token.to_string()).collect()
}

/// Part and model numbers mix letters and digits: `x123`, `ps11752778`.
fn is_identifier(token: &str) -> bool {
    token.len() >= 4
        && token.chars().any(|character| character.is_ascii_digit())
        && token.chars().any(|character| character.is_ascii_alphabetic())
}

#[cfg(test)]
mod tests {
    use partsage_core::domain::conversation::{ConversationHistory, Query, Turn};

    use super::{ScopeDecision, ScopeGuard, REASON_NO_SUPPORTED_TOPIC, REASON_UNSUPPORTED_DOMAIN};

    fn classify(text: &str) -> ScopeDecision {
        ScopeGuard::new().classify(&Query::new(text))
    }

    #[test]
    fn appliance_queries_are_in_scope() {
        for text in [
            "Tell me about item X123",
            "My appliance won't cool",
            "How can I install part number PS11752778?",
            "Is this part compatible with my WDT780SAEM1 model?",
            "The ice maker on my Whirlpool fridge is not working. How can I fix it?",
            "What is your return policy?",
            "My dish washer is leaking",
        ] {
            assert_eq!(classify(text), ScopeDecision::InScope, "{text}");
        }
    }

    #[test]
    fn other_domains_are_rejected() {
        let decision = classify("How do I fix my car stereo?");
        assert!(matches!(
            decision,
            ScopeDecision::OutOfScope { reason_code, .. } if reason_code == REASON_UNSUPPORTED_DOMAIN
        ));

        assert!(!classify("My washer is leaking water").is_in_scope());
        assert!(!classify("Which microwave should I buy?").is_in_scope());
    }

    #[test]
    fn supported_category_outweighs_unsupported_mention() {
        assert_eq!(
            classify("Will the dryer vent kit also fit my refrigerator?"),
            ScopeDecision::InScope
        );
    }

    #[test]
    fn unrelated_chatter_has_no_supported_topic() {
        let decision = classify("What's the capital of France?");
        assert!(matches!(
            decision,
            ScopeDecision::OutOfScope { reason_code, .. } if reason_code == REASON_NO_SUPPORTED_TOPIC
        ));
    }

    #[test]
    fn follow_up_inherits_scope_from_history() {
        let history = ConversationHistory::from_turns(
            8,
            [Turn::user("Do you carry the door bin for a WRS325SDHZ01?"), Turn::assistant("Yes.")],
        );
        let query = Query::new("How much is it?").with_history(history);
        assert_eq!(ScopeGuard::new().classify(&query), ScopeDecision::InScope);

        assert!(!classify("How much is it?").is_in_scope());
    }

    #[test]
    fn off_topic_message_is_rejected_despite_in_scope_history() {
        let history = ConversationHistory::from_turns(
            8,
            [Turn::user("My fridge is leaking"), Turn::assistant("Try the inlet valve.")],
        );
        for text in ["Write me a poem about love", "What's the capital of France?", "Tell me a joke"] {
            let query = Query::new(text).with_history(history.clone());
            assert!(!ScopeGuard::new().classify(&query).is_in_scope(), "{text}");
        }

        let query = Query::new("Is that one cheaper?").with_history(history);
        assert_eq!(ScopeGuard::new().classify(&query), ScopeDecision::InScope);
    }

    #[test]
    fn classification_is_repeatable() {
        let guard = ScopeGuard::new();
        let query = Query::new("How do I fix my car stereo?");
        assert_eq!(guard.classify(&query), guard.classify(&query));
    }
}
