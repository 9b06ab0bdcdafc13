#![cfg(not(tarpaulin_include))]

use clap::Parser;
use env_logger::Env;
use sentiment_portal::config::AppConfig;
use sentiment_portal::loader::load_path;
use sentiment_portal::pipeline::{BatchPipeline, detect_text_column};
use sentiment_portal::report::aggregate;
use sentiment_portal::saving::save_results;
use sentiment_portal::topics::{LdaTopicExtractor, TopicExtractor};
use std::path::PathBuf;
use std::process;

/// Analyse a spreadsheet offline and write the labelled rows to CSV
#[derive(Parser, Debug)]
#[command(name = "analyze")]
#[command(version)]
struct Args {
    /// Input file (.csv, .xlsx or .xls)
    input: PathBuf,

    /// Column holding the texts; detected when omitted
    #[arg(short = 'C', long)]
    column: Option<String>,

    /// Output CSV, defaults to the configured results path
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Number of topics to extract (2 to 10)
    #[arg(short, long)]
    topics: Option<usize>,

    /// TOML configuration file
    #[arg(short, long, env = "SENTIMENT_PORTAL_CONFIG")]
    config: Option<PathBuf>,
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    if let Err(e) = run(Args::parse()) {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load(args.config.as_deref())?;
    let dataset = load_path(&args.input)?;

    let column = match args.column {
        Some(column) => column,
        None => detect_text_column(&dataset.headers)
            .map(|i| dataset.headers[i].clone())
            .ok_or("input has no columns")?,
    };

    let pipeline = BatchPipeline::with_defaults(config.pipeline.clone());
    let outcome = pipeline.run_dataset(&dataset, &column)?;
    let report = aggregate(&outcome.records);

    println!(
        "Analysed {} of {} texts from column '{}'",
        outcome.records.len(),
        outcome.input_len,
        column
    );
    if outcome.counters.total() > 0 {
        println!(
            "Removed {} empty after preprocessing, {} analysis errors",
            outcome.counters.empty_after_normalize, outcome.counters.classifier_error
        );
    }
    for (label, count) in &report.counts {
        println!("  {:<9} {:>6} ({:.1}%)", label.as_str(), count, report.percentage(*label));
    }
    println!("{}", report.insight().message());

    let extractor = LdaTopicExtractor::new(config.topics.clone());
    let texts: Vec<&str> = outcome
        .records
        .iter()
        .map(|r| r.normalized_text.as_str())
        .collect();
    let topics = extractor.extract(&texts, args.topics.unwrap_or(config.topics.n_topics));
    for topic in &topics {
        println!("Topic {}: {}", topic.index + 1, topic.terms.join(", "));
    }

    let output = args.output.unwrap_or_else(|| config.results_path.clone());
    let written = save_results(&outcome, &output)?;
    println!("Results saved to {}", written.display());

    Ok(())
}
