use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;

/// Phrases that mark an utterance as a question about what the camera sees.
pub const DEFAULT_VISUAL_KEYWORDS: &[&str] = &[
    "camera",
    "what do you see",
    "what can you see",
    "describe what you see",
    "can you see",
    "do you see",
    "look at",
    "take a look",
    "analyze",
    "analyse",
    "what is this",
    "what's this",
    "what am i holding",
    "what's in front",
    "describe this",
    "tell me about",
];

/// Decides whether an utterance is a visual query. Kept as a trait so the
/// precision/recall trade-off can be changed without touching the
/// coordinator.
pub trait IntentClassifier: Send + Sync {
    fn is_visual_query(&self, utterance: &str) -> bool;
}

/// Case-insensitive substring match against a fixed keyword set.
#[derive(Debug, Clone)]
pub struct KeywordClassifier {
    keywords: Vec<String>,
}

impl KeywordClassifier {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
        }
    }
}

impl Default for KeywordClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_VISUAL_KEYWORDS)
    }
}

impl IntentClassifier for KeywordClassifier {
    fn is_visual_query(&self, utterance: &str) -> bool {
        let utterance = utterance.trim().to_lowercase();
        if utterance.is_empty() {
            return false;
        }
        self.keywords.iter().any(|k| utterance.contains(k.as_str()))
    }
}

/// Fuzzy keyword match for noisy transcriptions ("wat do u see").
pub struct FuzzyKeywordClassifier {
    keywords: Vec<String>,
    threshold: i64,
    matcher: SkimMatcherV2,
}

impl FuzzyKeywordClassifier {
    pub fn new<I, S>(keywords: I, threshold: i64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            keywords: keywords
                .into_iter()
                .map(|k| k.as_ref().trim().to_lowercase())
                .filter(|k| !k.is_empty())
                .collect(),
            threshold,
            matcher: SkimMatcherV2::default(),
        }
    }
}

impl IntentClassifier for FuzzyKeywordClassifier {
    fn is_visual_query(&self, utterance: &str) -> bool {
        let utterance = utterance.trim().to_lowercase();
        if utterance.is_empty() {
            return false;
        }
        self.keywords.iter().any(|k| {
            self.matcher.fuzzy_match(&utterance, k).unwrap_or(0) > self.threshold
        })
    }
}
