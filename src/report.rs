use crate::classifier::Sentiment;
use crate::pipeline::LabeledRecord;
use serde::Serialize;
use std::collections::BTreeMap;

/// Label counts and percentages over a set of records
///
/// Every label has an entry, zero when absent. Percentages are in
/// `0.0..=100.0` and sum to 100 for a non-empty report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub total: usize,
    pub counts: BTreeMap<Sentiment, usize>,
    pub percentages: BTreeMap<Sentiment, f64>,
}

/// Verdict shown under the chart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Insight {
    /// Negative texts outnumber positive ones
    MoreNegative,
    /// Positive texts are at least as many as negative ones
    Favorable,
}

impl Insight {
    pub fn message(&self) -> &'static str {
        match self {
            Insight::MoreNegative => {
                "Negative texts outnumber positive ones: review the negative feedback."
            }
            Insight::Favorable => "Overall sentiment is favorable.",
        }
    }
}

/// Summarise the labels of a pipeline output
///
/// # Examples
/// ```
/// use sentiment_portal::classifier::Sentiment;
/// use sentiment_portal::report::aggregate_labels;
///
/// let report = aggregate_labels([Sentiment::Positive, Sentiment::Positive, Sentiment::Negative]);
/// assert_eq!(report.total, 3);
/// assert_eq!(report.count(Sentiment::Positive), 2);
/// assert_eq!(report.count(Sentiment::Neutral), 0);
/// ```
pub fn aggregate(records: &[LabeledRecord]) -> Report {
    aggregate_labels(records.iter().map(|r| r.sentiment))
}

pub fn aggregate_labels<I>(labels: I) -> Report
where
    I: IntoIterator<Item = Sentiment>,
{
    let mut counts: BTreeMap<Sentiment, usize> = Sentiment::ALL.iter().map(|s| (*s, 0)).collect();

    let mut total = 0;
    for label in labels {
        *counts.entry(label).or_insert(0) += 1;
        total += 1;
    }

    let percentages = counts
        .iter()
        .map(|(label, count)| {
            let pct = if total == 0 {
                0.0
            } else {
                100.0 * *count as f64 / total as f64
            };
            (*label, pct)
        })
        .collect();

    Report {
        total,
        counts,
        percentages,
    }
}

impl Report {
    pub fn count(&self, label: Sentiment) -> usize {
        self.counts.get(&label).copied().unwrap_or(0)
    }

    pub fn percentage(&self, label: Sentiment) -> f64 {
        self.percentages.get(&label).copied().unwrap_or(0.0)
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn insight(&self) -> Insight {
        if self.count(Sentiment::Negative) > self.count(Sentiment::Positive) {
            Insight::MoreNegative
        } else {
            Insight::Favorable
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use Sentiment::*;

    #[test]
    fn empty_input_gives_zero_report() {
        let report = aggregate(&[]);
        assert_eq!(report.total, 0);
        for label in Sentiment::ALL {
            assert_eq!(report.count(label), 0);
            assert_eq!(report.percentage(label), 0.0);
        }
        assert!(report.is_empty());
    }

    #[test]
    fn counts_and_percentages() {
        let report = aggregate_labels([Positive, Positive, Negative, Neutral]);

        assert_eq!(report.total, 4);
        assert_eq!(report.count(Positive), 2);
        assert_eq!(report.count(Negative), 1);
        assert_eq!(report.count(Neutral), 1);
        assert_eq!(report.percentage(Positive), 50.0);
        assert_eq!(report.percentage(Negative), 25.0);
        assert_eq!(report.percentage(Error), 0.0);
    }

    #[test]
    fn counts_sum_to_total_and_percentages_to_hundred() {
        let report = aggregate_labels([Positive, Neutral, Neutral, Negative, Negative, Negative, Positive]);

        let count_sum: usize = report.counts.values().sum();
        assert_eq!(count_sum, report.total);

        let pct_sum: f64 = report.percentages.values().sum();
        assert!((pct_sum - 100.0).abs() < 1e-9);
        assert!(report.percentages.values().all(|p| (0.0..=100.0).contains(p)));
    }

    #[test]
    fn percentages_are_hundred_times_count_over_total() {
        let report = aggregate_labels([Positive, Neutral, Neutral]);

        for label in Sentiment::ALL {
            let expected = 100.0 * report.count(label) as f64 / report.total as f64;
            assert_eq!(report.percentage(label), expected);
        }
        assert_eq!(report.percentage(Positive), 100.0 * 1.0 / 3.0);
    }

    #[test]
    fn every_label_is_present() {
        let report = aggregate_labels([Neutral]);
        assert_eq!(report.counts.len(), 4);
        assert_eq!(report.percentages.len(), 4);
    }

    #[test]
    fn insight_compares_negative_and_positive() {
        assert_eq!(aggregate_labels([Negative, Negative, Positive]).insight(), Insight::MoreNegative);
        assert_eq!(aggregate_labels([Negative, Positive]).insight(), Insight::Favorable);
        assert_eq!(aggregate(&[]).insight(), Insight::Favorable);
    }

    #[test]
    fn serializes_with_lowercase_keys() {
        let report = aggregate_labels([Positive]);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["counts"]["positive"], 1);
        assert_eq!(json["percentages"]["positive"], 100.0);
    }
}
