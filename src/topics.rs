//! Topic extraction
//!
//! A count vectorizer followed by Latent Dirichlet Allocation fitted with
//! collapsed Gibbs sampling. The sampler is seeded, so the same texts always
//! produce the same topics.

use crate::text::PORTUGUESE_STOPWORDS;
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use thiserror::Error;

/// Smallest and largest number of topics a caller may ask for
pub const MIN_TOPICS: usize = 2;
pub const MAX_TOPICS: usize = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TopicError {
    #[error("no documents to analyse")]
    NoDocuments,

    #[error("no term passes the document frequency limits")]
    EmptyVocabulary,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopicConfig {
    /// Topics extracted when the caller does not choose
    pub n_topics: usize,

    /// Terms listed per topic
    pub top_terms: usize,

    /// A term must appear in at least this many documents
    pub min_df: usize,

    /// A term must appear in at most this fraction of documents
    pub max_df: f64,

    /// Document-topic prior
    pub alpha: f64,

    /// Topic-term prior
    pub beta: f64,

    /// Gibbs sweeps over the corpus
    pub iterations: usize,

    pub seed: u64,
}

impl Default for TopicConfig {
    fn default() -> Self {
        Self {
            n_topics: 3,
            top_terms: 10,
            min_df: 2,
            max_df: 0.9,
            alpha: 0.1,
            beta: 0.01,
            iterations: 200,
            seed: 0,
        }
    }
}

/// One topic and its most probable terms, strongest first
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Topic {
    pub index: usize,
    pub terms: Vec<String>,
}

/// Finds recurring themes in a set of texts
///
/// Implementations return an empty list instead of failing.
pub trait TopicExtractor: Send + Sync {
    fn extract(&self, texts: &[&str], n_topics: usize) -> Vec<Topic>;
}

/// Clamp a requested topic count to the supported range
pub fn clamp_topics(n_topics: usize) -> usize {
    n_topics.clamp(MIN_TOPICS, MAX_TOPICS)
}

fn stopword_set() -> HashSet<&'static str> {
    PORTUGUESE_STOPWORDS.iter().copied().collect()
}

// Lowercased alphanumeric runs of two or more chars, stopwords removed
fn tokenize(text: &str, stopwords: &HashSet<&str>) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2 && !stopwords.contains(t))
        .map(String::from)
        .collect()
}

/// Words shown in the word chart when the caller does not choose
pub const DEFAULT_WORD_LIMIT: usize = 100;

/// Occurrences of one term across a corpus
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TermFrequency {
    pub term: String,
    pub count: usize,
}

/// The `top_n` most frequent terms of a corpus
///
/// Tokens follow the vectorizer rules (lowercase, two or more chars, no
/// stopwords). Ordered by count, most frequent first, then alphabetically.
///
/// # Examples
/// ```
/// use sentiment_portal::topics::word_frequencies;
///
/// let words = word_frequencies(&["entrega rápida", "entrega atrasada"], 10);
/// assert_eq!(words[0].term, "entrega");
/// assert_eq!(words[0].count, 2);
/// ```
pub fn word_frequencies(texts: &[&str], top_n: usize) -> Vec<TermFrequency> {
    let stopwords = stopword_set();
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for text in texts {
        for token in tokenize(text, &stopwords) {
            *counts.entry(token).or_insert(0) += 1;
        }
    }

    let mut frequencies: Vec<TermFrequency> = counts
        .into_iter()
        .map(|(term, count)| TermFrequency { term, count })
        .collect();
    // Stable sort keeps the alphabetical order of the map among equal counts
    frequencies.sort_by(|a, b| b.count.cmp(&a.count));
    frequencies.truncate(top_n);
    frequencies
}

/// Bag-of-words view of a corpus
#[derive(Debug, Clone, PartialEq)]
pub struct CountMatrix {
    /// Vocabulary, sorted
    pub terms: Vec<String>,

    /// Per document, `(term index, count)` pairs sorted by term index
    pub documents: Vec<Vec<(usize, usize)>>,
}

impl CountMatrix {
    /// Count terms, keeping those whose document frequency is in bounds
    pub fn fit(texts: &[&str], min_df: usize, max_df: f64) -> Result<Self, TopicError> {
        if texts.is_empty() {
            return Err(TopicError::NoDocuments);
        }

        let stopwords = stopword_set();
        let tokenized: Vec<Vec<String>> = texts.iter().map(|text| tokenize(text, &stopwords)).collect();

        let mut doc_freq: BTreeMap<&str, usize> = BTreeMap::new();
        for tokens in &tokenized {
            let unique: HashSet<&str> = tokens.iter().map(String::as_str).collect();
            for token in unique {
                *doc_freq.entry(token).or_insert(0) += 1;
            }
        }

        let max_docs = max_df * texts.len() as f64;
        let terms: Vec<String> = doc_freq
            .into_iter()
            .filter(|(_, df)| *df >= min_df && (*df as f64) <= max_docs)
            .map(|(term, _)| term.to_string())
            .collect();

        if terms.is_empty() {
            return Err(TopicError::EmptyVocabulary);
        }

        let documents = tokenized
            .iter()
            .map(|tokens| {
                let mut counts: BTreeMap<usize, usize> = BTreeMap::new();
                for token in tokens {
                    if let Ok(index) = terms.binary_search(token) {
                        *counts.entry(index).or_insert(0) += 1;
                    }
                }
                counts.into_iter().collect()
            })
            .collect();

        Ok(Self { terms, documents })
    }

    pub fn n_terms(&self) -> usize {
        self.terms.len()
    }
}

/// LDA over a [`CountMatrix`]
#[derive(Debug, Clone, Default)]
pub struct LdaTopicExtractor {
    config: TopicConfig,
}

impl LdaTopicExtractor {
    pub fn new(config: TopicConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TopicConfig {
        &self.config
    }

    /// Fit the model and return the topics, or why it could not be fitted
    pub fn try_extract(&self, texts: &[&str], n_topics: usize) -> Result<Vec<Topic>, TopicError> {
        let n_topics = clamp_topics(n_topics);
        let matrix = CountMatrix::fit(texts, self.config.min_df, self.config.max_df)?;
        let topic_term = self.sample(&matrix, n_topics);

        let topics = topic_term
            .iter()
            .enumerate()
            .map(|(index, counts)| {
                let mut ranked: Vec<(usize, usize)> = counts.iter().copied().enumerate().collect();
                // Heaviest first, ties broken by term order
                ranked.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

                Topic {
                    index,
                    terms: ranked
                        .into_iter()
                        .take(self.config.top_terms)
                        .map(|(term, _)| matrix.terms[term].clone())
                        .collect(),
                }
            })
            .collect();

        Ok(topics)
    }

    /// Collapsed Gibbs sampling, returning topic-term counts
    fn sample(&self, matrix: &CountMatrix, n_topics: usize) -> Vec<Vec<usize>> {
        let n_terms = matrix.n_terms();
        let alpha = self.config.alpha;
        let beta = self.config.beta;
        let beta_sum = beta * n_terms as f64;

        let mut rng = StdRng::seed_from_u64(self.config.seed);

        // One entry per token occurrence
        let tokens: Vec<Vec<usize>> = matrix
            .documents
            .iter()
            .map(|doc| {
                doc.iter()
                    .flat_map(|&(term, count)| std::iter::repeat(term).take(count))
                    .collect()
            })
            .collect();

        let mut topic_term = vec![vec![0usize; n_terms]; n_topics];
        let mut doc_topic = vec![vec![0usize; n_topics]; tokens.len()];
        let mut topic_totals = vec![0usize; n_topics];
        let mut assignments: Vec<Vec<usize>> = Vec::with_capacity(tokens.len());

        for (doc, terms) in tokens.iter().enumerate() {
            let mut doc_assignments = Vec::with_capacity(terms.len());
            for &term in terms {
                let topic = rng.gen_range(0..n_topics);
                topic_term[topic][term] += 1;
                doc_topic[doc][topic] += 1;
                topic_totals[topic] += 1;
                doc_assignments.push(topic);
            }
            assignments.push(doc_assignments);
        }

        let mut weights = vec![0.0; n_topics];
        for _ in 0..self.config.iterations {
            for (doc, terms) in tokens.iter().enumerate() {
                for (position, &term) in terms.iter().enumerate() {
                    let old = assignments[doc][position];
                    topic_term[old][term] -= 1;
                    doc_topic[doc][old] -= 1;
                    topic_totals[old] -= 1;

                    let mut total = 0.0;
                    for topic in 0..n_topics {
                        let weight = (doc_topic[doc][topic] as f64 + alpha)
                            * (topic_term[topic][term] as f64 + beta)
                            / (topic_totals[topic] as f64 + beta_sum);
                        weights[topic] = weight;
                        total += weight;
                    }

                    let threshold = rng.gen_range(0.0..1.0) * total;
                    let mut cumulative = 0.0;
                    let mut new = n_topics - 1;
                    for (topic, weight) in weights.iter().enumerate() {
                        cumulative += weight;
                        if cumulative >= threshold {
                            new = topic;
                            break;
                        }
                    }

                    topic_term[new][term] += 1;
                    doc_topic[doc][new] += 1;
                    topic_totals[new] += 1;
                    assignments[doc][position] = new;
                }
            }
        }

        topic_term
    }
}

impl TopicExtractor for LdaTopicExtractor {
    fn extract(&self, texts: &[&str], n_topics: usize) -> Vec<Topic> {
        match self.try_extract(texts, n_topics) {
            Ok(topics) => topics,
            Err(e) => {
                log::warn!("Failed to identify topics: {}", e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CORPUS: &[&str] = &[
        "entrega atrasada pedido atrasado entrega",
        "entrega demorou pedido chegou tarde",
        "pedido entrega atraso transportadora",
        "produto qualidade excelente material",
        "qualidade produto material resistente",
        "produto qualidade acabamento material",
        "atendimento suporte resposta rapida",
        "suporte atendimento educado resposta",
    ];

    #[test]
    fn vectorizer_applies_document_frequency_limits() {
        let texts = ["casa azul", "casa verde", "casa azul grande"];
        let matrix = CountMatrix::fit(&texts, 2, 0.9).unwrap();

        // "casa" is in every document, "verde" and "grande" in only one
        assert_eq!(matrix.terms, vec!["azul".to_string()]);
        assert_eq!(matrix.documents[0], vec![(0, 1)]);
        assert!(matrix.documents[1].is_empty());
    }

    #[test]
    fn vectorizer_drops_stopwords_and_single_chars() {
        let texts = ["o pedido e x", "o pedido e y", "nada aqui"];
        let matrix = CountMatrix::fit(&texts, 2, 1.0).unwrap();
        assert_eq!(matrix.terms, vec!["pedido".to_string()]);
    }

    #[test]
    fn vectorizer_reports_empty_vocabulary() {
        assert_eq!(
            CountMatrix::fit(&["um", "dois"], 2, 0.9),
            Err(TopicError::EmptyVocabulary)
        );
        assert_eq!(CountMatrix::fit(&[], 2, 0.9), Err(TopicError::NoDocuments));
    }

    #[test]
    fn extracts_requested_number_of_topics() {
        let extractor = LdaTopicExtractor::default();
        let topics = extractor.extract(CORPUS, 3);

        assert_eq!(topics.len(), 3);
        for (i, topic) in topics.iter().enumerate() {
            assert_eq!(topic.index, i);
            assert!(!topic.terms.is_empty());
            assert!(topic.terms.len() <= 10);
        }
    }

    #[test]
    fn topic_count_is_clamped() {
        let extractor = LdaTopicExtractor::default();
        assert_eq!(extractor.extract(CORPUS, 0).len(), MIN_TOPICS);
        assert_eq!(extractor.extract(CORPUS, 50).len(), MAX_TOPICS);
    }

    #[test]
    fn same_seed_gives_same_topics() {
        let first = LdaTopicExtractor::default().extract(CORPUS, 3);
        let second = LdaTopicExtractor::default().extract(CORPUS, 3);
        assert_eq!(first, second);
    }

    #[test]
    fn terms_come_from_vocabulary() {
        let matrix = CountMatrix::fit(CORPUS, 2, 0.9).unwrap();
        let topics = LdaTopicExtractor::default().extract(CORPUS, 2);
        for term in topics.iter().flat_map(|t| &t.terms) {
            assert!(matrix.terms.contains(term));
        }
    }

    #[test]
    fn failure_yields_empty_list() {
        let extractor = LdaTopicExtractor::default();
        assert!(extractor.extract(&[], 3).is_empty());
        assert!(extractor.extract(&["sozinho"], 3).is_empty());
    }

    #[test]
    fn word_frequencies_skip_stopwords_and_short_tokens() {
        let words = word_frequencies(&["o produto e bom", "produto de qualidade x"], 10);
        let terms: Vec<&str> = words.iter().map(|w| w.term.as_str()).collect();

        assert_eq!(terms, vec!["produto", "bom", "qualidade"]);
        assert_eq!(words[0].count, 2);
    }

    #[test]
    fn word_frequencies_order_by_count_then_term() {
        let words = word_frequencies(&["zebra casa", "casa bola zebra", "casa"], 10);
        let summary: Vec<(&str, usize)> = words.iter().map(|w| (w.term.as_str(), w.count)).collect();
        assert_eq!(summary, vec![("casa", 3), ("zebra", 2), ("bola", 1)]);
    }

    #[test]
    fn word_frequencies_respect_limit() {
        assert_eq!(word_frequencies(CORPUS, 3).len(), 3);
        assert!(word_frequencies(CORPUS, 0).is_empty());
        assert!(word_frequencies(&[], 10).is_empty());
    }

    #[test]
    fn respects_top_terms_setting() {
        let extractor = LdaTopicExtractor::new(TopicConfig {
            top_terms: 2,
            ..TopicConfig::default()
        });
        for topic in extractor.extract(CORPUS, 2) {
            assert_eq!(topic.terms.len(), 2);
        }
    }
}
