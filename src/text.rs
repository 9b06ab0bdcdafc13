//! Text cleaning and normalization
//!
//! The normalizer turns a raw message into the space-separated lemma string
//! used for topic extraction and for the `normalized_text` output column.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashSet;

lazy_static! {
    static ref URL_REGEX: Regex = Regex::new(r"http\S+|www.\S+").expect("valid url regex");
    static ref MENTION_REGEX: Regex = Regex::new(r"@\w+|#\w+").expect("valid mention regex");
    static ref PUNCTUATION_REGEX: Regex = Regex::new(r"[^\w\s]").expect("valid punctuation regex");
    static ref DIGITS_REGEX: Regex = Regex::new(r"\d+").expect("valid digits regex");
    static ref STOPWORDS: HashSet<&'static str> = PORTUGUESE_STOPWORDS.iter().copied().collect();
}

/// Portuguese stopword list
pub const PORTUGUESE_STOPWORDS: &[&str] = &[
    "a", "à", "ao", "aos", "aquela", "aquelas", "aquele", "aqueles", "aquilo", "as", "às", "até",
    "com", "como", "da", "das", "de", "dela", "delas", "dele", "deles", "depois", "do", "dos", "e",
    "é", "ela", "elas", "ele", "eles", "em", "entre", "era", "eram", "éramos", "essa", "essas",
    "esse", "esses", "esta", "está", "estamos", "estão", "estar", "estas", "estava", "estavam",
    "este", "esteja", "estes", "estive", "estou", "eu", "foi", "fomos", "for", "foram", "fosse",
    "fui", "há", "isso", "isto", "já", "lhe", "lhes", "mais", "mas", "me", "mesmo", "meu",
    "meus", "minha", "minhas", "muito", "na", "não", "nas", "nem", "no", "nos", "nós", "nossa",
    "nossas", "nosso", "nossos", "num", "numa", "o", "os", "ou", "para", "pela", "pelas", "pelo",
    "pelos", "por", "qual", "quando", "que", "quem", "são", "se", "seja", "sem", "ser", "será",
    "seu", "seus", "só", "somos", "sou", "sua", "suas", "também", "te", "tem", "tém", "temos",
    "tenho", "ter", "teu", "teus", "tu", "tua", "tuas", "um", "uma", "umas", "uns", "você",
    "vocês", "vos",
];

/// Deterministic text-cleaning transform
///
/// Must never fail: unrecoverable input normalizes to an empty string.
pub trait TextNormalizer: Send + Sync {
    fn normalize(&self, text: &str) -> String;
}

/// Remove URLs, mentions, hashtags, punctuation and digits, then lowercase
///
/// # Examples
/// ```
/// use sentiment_portal::text::clean_text;
///
/// assert_eq!(clean_text("Ótimo atendimento!!! Nota 10"), "ótimo atendimento nota");
/// ```
pub fn clean_text(text: &str) -> String {
    let text = URL_REGEX.replace_all(text, "");
    let text = MENTION_REGEX.replace_all(&text, "");
    let text = PUNCTUATION_REGEX.replace_all(&text, "");
    let text = DIGITS_REGEX.replace_all(&text, "");
    text.to_lowercase().trim().to_string()
}

/// Reduce a lowercase word to its singular form
///
/// Only the regular Portuguese plural endings are handled; everything else
/// is returned unchanged.
pub fn lemmatize(word: &str) -> String {
    let len = word.chars().count();
    if len <= 3 {
        return word.to_string();
    }

    for (suffix, replacement) in [("ões", "ão"), ("ães", "ão"), ("éis", "el")] {
        if let Some(stem) = word.strip_suffix(suffix) {
            return format!("{}{}", stem, replacement);
        }
    }

    if len > 4 {
        if let Some(stem) = word.strip_suffix("ais") {
            return format!("{}al", stem);
        }
    }

    for suffix in ["res", "zes", "ses"] {
        if word.ends_with(suffix) {
            return word[..word.len() - 2].to_string();
        }
    }

    if let Some(stem) = word.strip_suffix("ns") {
        return format!("{}m", stem);
    }

    if let Some(stem) = word.strip_suffix('s') {
        if stem.ends_with(|c: char| "aeiouáéíóúâêôãõ".contains(c)) {
            return stem.to_string();
        }
    }

    word.to_string()
}

/// Default normalizer for Portuguese text
///
/// Cleans the text, drops stopwords and non-alphabetic tokens and reduces
/// each remaining word with [`lemmatize`].
#[derive(Debug, Clone, Default)]
pub struct PortugueseNormalizer {
    extra_stopwords: HashSet<String>,
}

impl PortugueseNormalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Treat additional words as stopwords
    pub fn with_stopwords<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_stopwords
            .extend(words.into_iter().map(|w| w.into().to_lowercase()));
        self
    }

    fn is_stopword(&self, token: &str) -> bool {
        STOPWORDS.contains(token) || self.extra_stopwords.contains(token)
    }
}

impl TextNormalizer for PortugueseNormalizer {
    fn normalize(&self, text: &str) -> String {
        clean_text(text)
            .split_whitespace()
            .filter(|token| token.chars().all(char::is_alphabetic))
            .filter(|token| !self.is_stopword(token))
            .map(lemmatize)
            .collect::<Vec<_>>()
            .join(" ")
    }
}
