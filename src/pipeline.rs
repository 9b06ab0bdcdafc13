//! Batch sentiment pipeline
//!
//! Normalizes and classifies every record of a dataset, keeping rows in
//! their original order and counting the ones it drops:
//!
//! 1. normalize the text column
//! 2. drop rows whose normalized text is blank (`empty_after_normalize`)
//! 3. classify the survivors
//! 4. drop rows labelled [`Sentiment::Error`] (`classifier_error`)
//!
//! A failure on one row never aborts the batch.

use crate::classifier::{LexiconClassifier, Sentiment, SentimentClassifier};
use crate::loader::{Dataset, InputError};
use crate::text::{PortugueseNormalizer, TextNormalizer};
use serde::{Deserialize, Serialize};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

/// Longest prefix of a text, in characters, handed to the classifier
pub const DEFAULT_MAX_CLASSIFIER_CHARS: usize = 512;

/// Which text the classifier receives
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassifierInput {
    /// The original text, truncated
    #[default]
    Raw,
    /// The normalized text, truncated
    Normalized,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub max_classifier_chars: usize,
    pub classifier_input: ClassifierInput,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_classifier_chars: DEFAULT_MAX_CLASSIFIER_CHARS,
            classifier_input: ClassifierInput::Raw,
        }
    }
}

/// One input row
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Record {
    /// Zero-based position in the source dataset
    pub row: usize,

    /// Content of the selected text column
    pub raw_text: String,

    /// Every column of the row, in header order, passed through unchanged
    pub values: Vec<String>,
}

impl Record {
    /// A record with no columns besides its text
    pub fn from_text(row: usize, text: impl Into<String>) -> Self {
        let raw_text = text.into();
        Self {
            row,
            values: vec![raw_text.clone()],
            raw_text,
        }
    }
}

/// A record that survived the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LabeledRecord {
    #[serde(flatten)]
    pub record: Record,
    pub normalized_text: String,
    pub sentiment: Sentiment,
}

/// Why a record was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineWarning {
    EmptyAfterNormalize,
    ClassificationError,
}

/// Per-stage drop counts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DropCounters {
    pub empty_after_normalize: usize,
    pub classifier_error: usize,
}

impl DropCounters {
    pub fn record(&mut self, warning: PipelineWarning) {
        match warning {
            PipelineWarning::EmptyAfterNormalize => self.empty_after_normalize += 1,
            PipelineWarning::ClassificationError => self.classifier_error += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.empty_after_normalize + self.classifier_error
    }
}

/// Labelled records plus drop counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PipelineOutput {
    pub records: Vec<LabeledRecord>,
    pub counters: DropCounters,
}

/// A finished batch over a dataset, ready for export
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchOutcome {
    /// Headers of the source dataset
    pub headers: Vec<String>,

    /// Column the text was taken from
    pub text_column: String,

    /// Number of input rows
    pub input_len: usize,

    pub records: Vec<LabeledRecord>,

    pub counters: DropCounters,
}

/// Result of analysing a single free text
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FreeTextOutcome {
    /// Nothing left after normalization
    EmptyAfterNormalize,
    Labeled {
        normalized_text: String,
        sentiment: Sentiment,
    },
}

/// Cut `text` to at most `max_chars` characters, on a char boundary
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}

/// Pick the column holding the messages
///
/// Prefers a column named exactly `Message`, then the first one whose name
/// contains "message" in any case, then the first column.
pub fn detect_text_column(headers: &[String]) -> Option<usize> {
    if headers.is_empty() {
        return None;
    }

    headers
        .iter()
        .position(|h| h == "Message")
        .or_else(|| {
            headers
                .iter()
                .position(|h| h.to_lowercase().contains("message"))
        })
        .or(Some(0))
}

/// Keep the records whose label is one of `allowed`, in order
pub fn filter_by_sentiment<'a>(
    records: &'a [LabeledRecord],
    allowed: &[Sentiment],
) -> Vec<&'a LabeledRecord> {
    records
        .iter()
        .filter(|r| allowed.contains(&r.sentiment))
        .collect()
}

/// Normalizer and classifier wired together
#[derive(Clone)]
pub struct BatchPipeline {
    normalizer: Arc<dyn TextNormalizer>,
    classifier: Arc<dyn SentimentClassifier>,
    config: PipelineConfig,
}

impl Default for BatchPipeline {
    fn default() -> Self {
        Self::with_defaults(PipelineConfig::default())
    }
}

impl BatchPipeline {
    pub fn new(
        normalizer: Arc<dyn TextNormalizer>,
        classifier: Arc<dyn SentimentClassifier>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            normalizer,
            classifier,
            config,
        }
    }

    /// Pipeline over the built-in Portuguese normalizer and lexicon classifier
    pub fn with_defaults(config: PipelineConfig) -> Self {
        Self::new(
            Arc::new(PortugueseNormalizer::new()),
            Arc::new(LexiconClassifier::new()),
            config,
        )
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    // A panicking normalizer is treated as one that gave up on the text.
    fn normalize(&self, text: &str) -> String {
        catch_unwind(AssertUnwindSafe(|| self.normalizer.normalize(text))).unwrap_or_else(|_| {
            log::warn!("Normalizer panicked, treating text as empty");
            String::new()
        })
    }

    fn classify(&self, raw_text: &str, normalized_text: &str) -> Sentiment {
        let source = match self.config.classifier_input {
            ClassifierInput::Raw => raw_text,
            ClassifierInput::Normalized => normalized_text,
        };
        let input = truncate_chars(source, self.config.max_classifier_chars);

        catch_unwind(AssertUnwindSafe(|| self.classifier.classify(input))).unwrap_or_else(|_| {
            log::warn!("Classifier panicked, labelling text as error");
            Sentiment::Error
        })
    }

    fn label(&self, record: Record) -> Result<LabeledRecord, PipelineWarning> {
        let normalized_text = self.normalize(&record.raw_text);
        if normalized_text.trim().is_empty() {
            return Err(PipelineWarning::EmptyAfterNormalize);
        }

        match self.classify(&record.raw_text, &normalized_text) {
            Sentiment::Error => Err(PipelineWarning::ClassificationError),
            sentiment => Ok(LabeledRecord {
                record,
                normalized_text,
                sentiment,
            }),
        }
    }

    /// Run every record through the pipeline
    ///
    /// # Examples
    /// ```
    /// use sentiment_portal::pipeline::{BatchPipeline, Record};
    ///
    /// let pipeline = BatchPipeline::default();
    /// let output = pipeline.run(vec![
    ///     Record::from_text(0, "Adorei, excelente atendimento!"),
    ///     Record::from_text(1, "!!!"),
    /// ]);
    ///
    /// assert_eq!(output.records.len(), 1);
    /// assert_eq!(output.counters.empty_after_normalize, 1);
    /// ```
    pub fn run<I>(&self, records: I) -> PipelineOutput
    where
        I: IntoIterator<Item = Record>,
    {
        let mut output = PipelineOutput::default();

        for record in records {
            let row = record.row;
            match self.label(record) {
                Ok(labeled) => output.records.push(labeled),
                Err(warning) => {
                    log::debug!("Dropped row {}: {:?}", row, warning);
                    output.counters.record(warning);
                }
            }
        }

        if output.counters.total() > 0 {
            log::warn!(
                "{} texts removed as empty after preprocessing, {} removed due to analysis errors",
                output.counters.empty_after_normalize,
                output.counters.classifier_error
            );
        }

        output
    }

    /// Run the pipeline over one column of a dataset
    ///
    /// # Errors
    /// * `InputError::UnknownColumn` if the column does not exist
    pub fn run_dataset(&self, dataset: &Dataset, column: &str) -> Result<BatchOutcome, InputError> {
        let records = dataset.records(column)?;
        let input_len = records.len();

        log::info!("Analysing {} texts from column '{}'", input_len, column);
        let output = self.run(records);
        log::info!("Analysis finished for {} texts", output.records.len());

        Ok(BatchOutcome {
            headers: dataset.headers.clone(),
            text_column: column.to_string(),
            input_len,
            records: output.records,
            counters: output.counters,
        })
    }

    /// Analyse one free text
    ///
    /// Unlike [`BatchPipeline::run`], an error label is returned to the
    /// caller instead of being dropped.
    pub fn analyze_text(&self, text: &str) -> FreeTextOutcome {
        let normalized_text = self.normalize(text);
        if normalized_text.trim().is_empty() {
            return FreeTextOutcome::EmptyAfterNormalize;
        }

        let sentiment = self.classify(text, &normalized_text);
        FreeTextOutcome::Labeled {
            normalized_text,
            sentiment,
        }
    }
}
