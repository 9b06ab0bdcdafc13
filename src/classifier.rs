use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::text::{clean_text, lemmatize};

/// Sentiment label produced by a classifier
///
/// `Error` marks a text the classifier could not score. Records carrying it
/// are dropped by the batch pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sentiment {
    Positive,
    Neutral,
    Negative,
    Error,
}

impl Sentiment {
    /// Every label, in report order
    pub const ALL: [Sentiment; 4] = [
        Sentiment::Positive,
        Sentiment::Neutral,
        Sentiment::Negative,
        Sentiment::Error,
    ];

    /// Labels a successful classification can carry
    pub const SCORED: [Sentiment; 3] = [Sentiment::Positive, Sentiment::Neutral, Sentiment::Negative];

    pub fn as_str(&self) -> &'static str {
        match self {
            Sentiment::Positive => "positive",
            Sentiment::Neutral => "neutral",
            Sentiment::Negative => "negative",
            Sentiment::Error => "error",
        }
    }

    /// Map a 1-5 star rating onto a label
    ///
    /// 4 and 5 stars are positive, 3 is neutral, 1 and 2 are negative.
    /// Anything outside the scale is an error.
    pub fn from_stars(stars: u8) -> Self {
        match stars {
            4 | 5 => Sentiment::Positive,
            3 => Sentiment::Neutral,
            1 | 2 => Sentiment::Negative,
            _ => Sentiment::Error,
        }
    }
}

impl fmt::Display for Sentiment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("unknown sentiment label: {0}")]
pub struct ParseSentimentError(String);

impl FromStr for Sentiment {
    type Err = ParseSentimentError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "positive" | "positivo" => Ok(Sentiment::Positive),
            "neutral" | "neutro" => Ok(Sentiment::Neutral),
            "negative" | "negativo" => Ok(Sentiment::Negative),
            "error" | "erro" => Ok(Sentiment::Error),
            other => Err(ParseSentimentError(other.to_string())),
        }
    }
}

/// Scores a text with one sentiment label
///
/// Implementations must not panic or fail past this boundary: any internal
/// failure is reported as [`Sentiment::Error`].
pub trait SentimentClassifier: Send + Sync {
    fn classify(&self, text: &str) -> Sentiment;
}

/// Failures inside the lexicon scorer
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ClassifierError {
    #[error("input text is empty")]
    EmptyInput,
}

// Damping constant for the compound score, so a single strong word does not
// saturate the scale.
const NORMALIZATION_ALPHA: f64 = 15.0;

// Tokens after a negation whose polarity gets flipped.
const NEGATION_WINDOW: usize = 3;

/// Rule-based classifier over a Portuguese/English opinion lexicon
///
/// Produces a 1-5 star rating like the multilingual review model it stands
/// in for, then maps the stars onto a [`Sentiment`].
#[derive(Debug, Clone)]
pub struct LexiconClassifier {
    words: HashMap<String, f64>,
    negations: HashSet<String>,
    intensifiers: HashMap<String, f64>,
}

impl Default for LexiconClassifier {
    fn default() -> Self {
        Self::new()
    }
}

impl LexiconClassifier {
    pub fn new() -> Self {
        let positive = [
            ("adorei", 3.0),
            ("adorar", 3.0),
            ("amei", 3.0),
            ("amar", 2.8),
            ("excelente", 3.0),
            ("ótimo", 3.0),
            ("otimo", 3.0),
            ("ótima", 3.0),
            ("maravilhoso", 3.0),
            ("maravilhosa", 3.0),
            ("perfeito", 2.8),
            ("perfeita", 2.8),
            ("incrível", 2.8),
            ("incrivel", 2.8),
            ("fantástico", 2.9),
            ("bom", 1.9),
            ("boa", 1.9),
            ("legal", 1.6),
            ("gostei", 2.0),
            ("gostar", 1.8),
            ("feliz", 2.2),
            ("satisfeito", 2.0),
            ("satisfeita", 2.0),
            ("recomendo", 2.3),
            ("rápido", 1.2),
            ("rapido", 1.2),
            ("eficiente", 1.8),
            ("agradável", 1.8),
            ("parabéns", 2.4),
            ("obrigado", 1.4),
            ("obrigada", 1.4),
            ("melhor", 2.0),
            ("love", 3.0),
            ("loved", 3.0),
            ("great", 2.8),
            ("excellent", 3.0),
            ("good", 1.9),
            ("amazing", 2.9),
            ("happy", 2.2),
            ("recommend", 2.3),
            ("perfect", 2.8),
            ("nice", 1.8),
            ("fast", 1.2),
        ];
        let negative = [
            ("ruim", -2.5),
            ("péssimo", -3.0),
            ("pessimo", -3.0),
            ("péssima", -3.0),
            ("horrível", -3.0),
            ("horrivel", -3.0),
            ("terrível", -3.0),
            ("terrivel", -3.0),
            ("odiei", -3.0),
            ("odiar", -2.8),
            ("detestei", -2.9),
            ("lento", -1.6),
            ("lenta", -1.6),
            ("demora", -1.5),
            ("atraso", -1.8),
            ("atrasado", -1.8),
            ("problema", -1.8),
            ("defeito", -2.2),
            ("quebrado", -2.2),
            ("quebrada", -2.2),
            ("decepcionante", -2.6),
            ("decepção", -2.6),
            ("insatisfeito", -2.2),
            ("insatisfeita", -2.2),
            ("triste", -2.0),
            ("pior", -2.6),
            ("caro", -1.2),
            ("golpe", -3.0),
            ("fraude", -3.0),
            ("reclamação", -1.8),
            ("bad", -2.5),
            ("terrible", -3.0),
            ("awful", -3.0),
            ("hate", -3.0),
            ("hated", -3.0),
            ("worst", -3.0),
            ("slow", -1.6),
            ("broken", -2.2),
            ("disappointed", -2.6),
            ("poor", -2.1),
        ];

        let words = positive
            .into_iter()
            .chain(negative)
            .map(|(word, score)| (word.to_string(), score))
            .collect();

        let negations = [
            "não", "nao", "nunca", "jamais", "nem", "nenhum", "nenhuma", "nada", "not", "no",
            "never", "dont", "cant", "isnt", "wasnt", "nothing",
        ]
        .into_iter()
        .map(String::from)
        .collect();

        let intensifiers = [
            ("muito", 1.5),
            ("muita", 1.5),
            ("super", 1.6),
            ("bastante", 1.3),
            ("extremamente", 1.8),
            ("totalmente", 1.4),
            ("pouco", 0.6),
            ("very", 1.5),
            ("really", 1.4),
            ("extremely", 1.8),
            ("slightly", 0.6),
        ]
        .into_iter()
        .map(|(word, factor)| (word.to_string(), factor))
        .collect();

        Self {
            words,
            negations,
            intensifiers,
        }
    }

    /// Add or override a lexicon entry
    pub fn with_word(mut self, word: &str, score: f64) -> Self {
        self.words.insert(word.to_lowercase(), score);
        self
    }

    /// Compound polarity in `[-1, 1]`
    pub fn compound(&self, text: &str) -> Result<f64, ClassifierError> {
        if text.trim().is_empty() {
            return Err(ClassifierError::EmptyInput);
        }

        let cleaned = clean_text(text);
        let tokens: Vec<&str> = cleaned.split_whitespace().collect();

        let mut score = 0.0;
        let mut negated_for = 0;
        let mut boost = 1.0;

        for token in tokens {
            if self.negations.contains(token) {
                negated_for = NEGATION_WINDOW;
                continue;
            }
            if let Some(factor) = self.intensifiers.get(token) {
                boost = *factor;
                continue;
            }

            let polarity = self
                .words
                .get(token)
                .or_else(|| self.words.get(&lemmatize(token)))
                .copied();

            if let Some(polarity) = polarity {
                let mut value = polarity * boost;
                if negated_for > 0 {
                    value = -value * 0.75;
                }
                score += value;
            }

            boost = 1.0;
            negated_for = negated_for.saturating_sub(1);
        }

        Ok(score / (score * score + NORMALIZATION_ALPHA).sqrt())
    }

    /// Star rating on the 1-5 review scale
    pub fn stars(&self, text: &str) -> Result<u8, ClassifierError> {
        let compound = self.compound(text)?;
        let stars = if compound >= 0.6 {
            5
        } else if compound >= 0.2 {
            4
        } else if compound > -0.2 {
            3
        } else if compound > -0.6 {
            2
        } else {
            1
        };
        Ok(stars)
    }
}

impl SentimentClassifier for LexiconClassifier {
    fn classify(&self, text: &str) -> Sentiment {
        match self.stars(text) {
            Ok(stars) => Sentiment::from_stars(stars),
            Err(e) => {
                log::debug!("Failed to classify text: {}", e);
                Sentiment::Error
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stars_map_onto_labels() {
        assert_eq!(Sentiment::from_stars(5), Sentiment::Positive);
        assert_eq!(Sentiment::from_stars(4), Sentiment::Positive);
        assert_eq!(Sentiment::from_stars(3), Sentiment::Neutral);
        assert_eq!(Sentiment::from_stars(2), Sentiment::Negative);
        assert_eq!(Sentiment::from_stars(1), Sentiment::Negative);
        assert_eq!(Sentiment::from_stars(0), Sentiment::Error);
        assert_eq!(Sentiment::from_stars(6), Sentiment::Error);
    }

    #[test]
    fn parses_english_and_portuguese_labels() {
        assert_eq!("positivo".parse::<Sentiment>(), Ok(Sentiment::Positive));
        assert_eq!("Negative".parse::<Sentiment>(), Ok(Sentiment::Negative));
        assert_eq!(" neutro ".parse::<Sentiment>(), Ok(Sentiment::Neutral));
        assert!("meh".parse::<Sentiment>().is_err());
    }

    #[test]
    fn serializes_lowercase() {
        let json = serde_json::to_string(&Sentiment::Positive).unwrap();
        assert_eq!(json, "\"positive\"");
    }

    #[test]
    fn lexicon_scores_clear_opinions() {
        let classifier = LexiconClassifier::new();
        assert_eq!(classifier.classify("Adorei o produto, excelente!"), Sentiment::Positive);
        assert_eq!(classifier.classify("Atendimento péssimo e entrega lenta"), Sentiment::Negative);
        assert_eq!(classifier.classify("Recebi a encomenda hoje"), Sentiment::Neutral);
    }

    #[test]
    fn negation_flips_polarity() {
        let classifier = LexiconClassifier::new();
        assert_eq!(classifier.classify("O produto é bom"), Sentiment::Positive);
        assert_eq!(classifier.classify("O produto não é bom"), Sentiment::Negative);
    }

    #[test]
    fn plural_forms_match_lexicon() {
        let classifier = LexiconClassifier::new();
        assert_eq!(classifier.classify("Produtos ótimos"), Sentiment::Positive);
    }

    #[test]
    fn blank_text_is_an_error() {
        let classifier = LexiconClassifier::new();
        assert_eq!(classifier.stars("   "), Err(ClassifierError::EmptyInput));
        assert_eq!(classifier.classify(""), Sentiment::Error);
    }

    #[test]
    fn custom_words_override_lexicon() {
        let classifier = LexiconClassifier::new().with_word("Bacana", 2.5);
        assert_eq!(classifier.classify("muito bacana"), Sentiment::Positive);
    }
}
