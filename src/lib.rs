/*!
# Sentiment Portal

A browser-based sentiment analysis portal for spreadsheets of short texts, built in Rust.

## Overview

Users log in, upload a CSV or Excel file (or type a free text) and get every
text labelled as positive, neutral or negative, together with the label
distribution, a bar chart, the main topics of the batch and a downloadable
copy of the data with the results appended.

## Architecture

### Access Layer
- **login**: SHA-256 credential check, per-browser session gate and registry
- **config**: TOML configuration, including the table of known users

### Analysis Layer
- **text**: Cleaning, stopword removal and lemmatization of Portuguese text
- **classifier**: Sentiment labels and the lexicon-based star classifier
- **pipeline**: Normalize, classify and drop records, counting what was dropped
- **report**: Counts and percentages per label
- **topics**: Count vectorizer, word frequencies and LDA topic extraction

### Data Layer
- **loader**: CSV and Excel import
- **downloader**: CSV and XLSX export
- **saving**: Writing results to disk

### Presentation Layer (`web` feature)
- **graph**: PNG bar charts of the label distribution and the frequent words
- **app**: Routing, middleware and JSON API

## Pipeline

1. Normalize the text column
2. Drop rows that are empty after normalization
3. Classify the remaining rows
4. Drop rows the classifier could not score
5. Aggregate the labels into a report

Row order is preserved; every dropped row is counted.

## REST API Endpoints

- `GET /login`, `POST /login` - Login form and credential check
- `POST /logout` - Ends the session
- `GET /` - Analysis page
- `POST /api/columns` - Columns of an uploaded file and the detected text column
- `POST /api/analyze/file` - Batch analysis of an uploaded file
- `POST /api/analyze/text` - Analysis of a single text
- `GET /api/results` - Latest results, filtered by sentiment
- `GET /api/results.csv`, `GET /api/results.xlsx` - Downloads
- `GET /api/chart.png` - Distribution chart
- `GET /api/words.png` - Most frequent words
*/

#[cfg(feature = "web")]
pub mod app;
pub mod classifier;
pub mod config;
pub mod downloader;
#[cfg(feature = "web")]
pub mod graph;
pub mod loader;
pub mod login;
pub mod pipeline;
pub mod report;
pub mod saving;
pub mod text;
pub mod topics;

pub use classifier::{LexiconClassifier, Sentiment, SentimentClassifier};
pub use config::{AppConfig, ConfigError};
pub use loader::{Dataset, InputError, load_dataset};
pub use login::{AuthError, AuthGate, Credential, CredentialStore, Session, hash_password};
pub use pipeline::{BatchOutcome, BatchPipeline, DropCounters, LabeledRecord, Record};
pub use report::{Report, aggregate};
pub use text::{PortugueseNormalizer, TextNormalizer};
pub use topics::{LdaTopicExtractor, Topic, TopicExtractor};
