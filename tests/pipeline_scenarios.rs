//! End-to-end scenarios over the library: load, analyse, report, export

use sentiment_portal::classifier::{Sentiment, SentimentClassifier};
use sentiment_portal::downloader::to_csv;
use sentiment_portal::loader::load_dataset;
use sentiment_portal::pipeline::{BatchPipeline, PipelineConfig, Record, detect_text_column};
use sentiment_portal::report::{Insight, aggregate};
use sentiment_portal::text::TextNormalizer;
use std::sync::Arc;

/// Lowercases, and returns nothing for texts made only of punctuation
struct Lowercase;

impl TextNormalizer for Lowercase {
    fn normalize(&self, text: &str) -> String {
        if text.chars().all(|c| !c.is_alphanumeric()) {
            String::new()
        } else {
            text.to_lowercase()
        }
    }
}

/// Labels by keyword in any case, errors on "???"
struct Keywords;

impl SentimentClassifier for Keywords {
    fn classify(&self, text: &str) -> Sentiment {
        let text = text.to_lowercase();
        if text.contains("???") {
            Sentiment::Error
        } else if text.contains("great") {
            Sentiment::Positive
        } else if text.contains("awful") {
            Sentiment::Negative
        } else {
            Sentiment::Neutral
        }
    }
}

fn keyword_pipeline() -> BatchPipeline {
    BatchPipeline::new(Arc::new(Lowercase), Arc::new(Keywords), PipelineConfig::default())
}

#[test]
fn three_records_one_per_outcome() {
    let pipeline = keyword_pipeline();
    let output = pipeline.run(vec![
        Record::from_text(0, "Great service"),
        Record::from_text(1, "!!!"),
        Record::from_text(2, "what ???"),
    ]);

    assert_eq!(output.records.len(), 1);
    assert_eq!(output.records[0].sentiment, Sentiment::Positive);
    assert_eq!(output.counters.empty_after_normalize, 1);
    assert_eq!(output.counters.classifier_error, 1);

    let report = aggregate(&output.records);
    assert_eq!(report.total, 1);
    assert_eq!(report.percentage(Sentiment::Positive), 100.0);
}

#[test]
fn empty_dataset_gives_empty_report() {
    let dataset = load_dataset("vazio.csv", b"Message\n").unwrap();
    let outcome = keyword_pipeline().run_dataset(&dataset, "Message").unwrap();

    assert!(outcome.records.is_empty());
    assert_eq!(outcome.counters.total(), 0);

    let report = aggregate(&outcome.records);
    assert_eq!(report.total, 0);
    assert!(report.percentages.values().all(|p| *p == 0.0));
}

#[test]
fn csv_upload_flows_to_export() {
    let csv = "id,autor,Message\n\
               1,ana,great product\n\
               2,bia,awful delivery\n\
               3,caio,...\n\
               4,dani,awful support\n";
    let dataset = load_dataset("opinioes.csv", csv.as_bytes()).unwrap();

    let column = detect_text_column(&dataset.headers).map(|i| dataset.headers[i].clone());
    assert_eq!(column.as_deref(), Some("Message"));

    let outcome = keyword_pipeline().run_dataset(&dataset, "Message").unwrap();
    assert_eq!(outcome.input_len, 4);
    assert_eq!(outcome.records.len() + outcome.counters.total(), outcome.input_len);

    let rows: Vec<usize> = outcome.records.iter().map(|r| r.record.row).collect();
    assert_eq!(rows, vec![0, 1, 3]);

    let report = aggregate(&outcome.records);
    assert_eq!(report.count(Sentiment::Negative), 2);
    assert_eq!(report.insight(), Insight::MoreNegative);

    let exported = to_csv(&outcome).unwrap();
    let lines: Vec<&str> = exported.lines().collect();
    assert_eq!(lines[0], "id,autor,Message,normalized_text,sentiment");
    assert_eq!(lines[1], "1,ana,great product,great product,positive");
    assert_eq!(lines.len(), 4);
}

#[test]
fn default_pipeline_on_portuguese_reviews() {
    let csv = "Message\n\
               \"Adorei o produto, chegou rápido e é excelente!\"\n\
               \"Péssimo atendimento, produto quebrado.\"\n\
               https://exemplo.com 123\n";
    let dataset = load_dataset("reviews.csv", csv.as_bytes()).unwrap();
    let outcome = BatchPipeline::default().run_dataset(&dataset, "Message").unwrap();

    let labels: Vec<Sentiment> = outcome.records.iter().map(|r| r.sentiment).collect();
    assert_eq!(labels, vec![Sentiment::Positive, Sentiment::Negative]);
    assert_eq!(outcome.counters.empty_after_normalize, 1);
    assert!(!outcome.records[0].normalized_text.contains('!'));
}

#[test]
fn unknown_column_aborts_only_that_run() {
    let dataset = load_dataset("dados.csv", b"texto\nbom\n").unwrap();
    let pipeline = keyword_pipeline();

    assert!(pipeline.run_dataset(&dataset, "Message").is_err());
    assert!(pipeline.run_dataset(&dataset, "texto").is_ok());
}
