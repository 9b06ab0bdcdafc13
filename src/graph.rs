#![cfg(not(tarpaulin_include))]
#![cfg(feature = "web")]
use crate::classifier::Sentiment;
use crate::report::Report;
use crate::topics::TermFrequency;
use image::{DynamicImage, ImageOutputFormat, RgbImage};
use plotters::coord::Shift;
use plotters::prelude::*;
use std::io::Cursor;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChartError {
    #[error("nothing to plot")]
    NoData,

    #[error("chart size must be non-zero")]
    InvalidSize,

    #[error("failed to draw chart: {0}")]
    Draw(String),

    #[error("failed to encode chart: {0}")]
    Encode(#[from] image::ImageError),
}

impl<E> From<DrawingAreaErrorKind<E>> for ChartError
where
    E: std::error::Error + Send + Sync,
{
    fn from(e: DrawingAreaErrorKind<E>) -> Self {
        ChartError::Draw(e.to_string())
    }
}

/// Configuration options for chart generation
#[derive(Clone, Debug)]
pub struct GraphOptions {
    /// Title displayed at the top of the chart
    pub title: String,

    /// Label for the X-axis
    pub x_label: String,

    /// Label for the Y-axis
    pub y_label: String,

    /// Width of the chart in pixels
    pub width: u32,

    /// Height of the chart in pixels
    pub height: u32,
}

impl Default for GraphOptions {
    fn default() -> Self {
        Self {
            title: "Sentiment distribution".to_string(),
            x_label: "Sentiment".to_string(),
            y_label: "Texts".to_string(),
            width: 800,
            height: 600,
        }
    }
}

impl GraphOptions {
    /// Defaults for the word frequency chart
    pub fn words() -> Self {
        Self {
            title: "Most frequent words".to_string(),
            x_label: "Word".to_string(),
            y_label: "Occurrences".to_string(),
            width: 1000,
            height: 500,
        }
    }
}

/// Words drawn by [`word_chart`]; longer lists are cut
pub const WORD_CHART_LIMIT: usize = 20;

const WORD_COLOR: RGBColor = RGBColor(0x3b, 0x52, 0x8b);

/// One bar of a chart
#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    pub label: String,
    pub count: usize,
    pub color: RGBColor,
}

fn bar_color(sentiment: Sentiment) -> RGBColor {
    match sentiment {
        Sentiment::Positive => RGBColor(0x28, 0xa7, 0x45),
        Sentiment::Neutral => RGBColor(0xff, 0xc1, 0x07),
        Sentiment::Negative => RGBColor(0xdc, 0x35, 0x45),
        Sentiment::Error => RGBColor(0x6c, 0x75, 0x7d),
    }
}

fn bar_label(sentiment: Sentiment) -> &'static str {
    match sentiment {
        Sentiment::Positive => "Positive",
        Sentiment::Neutral => "Neutral",
        Sentiment::Negative => "Negative",
        Sentiment::Error => "Error",
    }
}

/// Bars for the positive, neutral and negative counts, in that order
pub fn bars(report: &Report) -> Vec<Bar> {
    Sentiment::SCORED
        .iter()
        .map(|&s| Bar {
            label: bar_label(s).to_string(),
            count: report.count(s),
            color: bar_color(s),
        })
        .collect()
}

/// Render the sentiment distribution as a PNG bar chart
///
/// # Errors
/// * `ChartError::NoData` if the report is empty
/// * `ChartError::Draw` if plotting fails, e.g. no font is available
pub fn sentiment_chart(report: &Report, options: &GraphOptions) -> Result<Vec<u8>, ChartError> {
    if report.is_empty() {
        return Err(ChartError::NoData);
    }
    if options.width == 0 || options.height == 0 {
        return Err(ChartError::InvalidSize);
    }

    render_png(&bars(report), options)
}

/// Bars for the most frequent words, in the given order
pub fn word_bars(words: &[TermFrequency]) -> Vec<Bar> {
    words
        .iter()
        .take(WORD_CHART_LIMIT)
        .map(|w| Bar {
            label: w.term.clone(),
            count: w.count,
            color: WORD_COLOR,
        })
        .collect()
}

/// Render the most frequent words as a PNG bar chart
///
/// # Errors
/// * `ChartError::NoData` if there are no words
/// * `ChartError::Draw` if plotting fails
pub fn word_chart(words: &[TermFrequency], options: &GraphOptions) -> Result<Vec<u8>, ChartError> {
    if words.is_empty() {
        return Err(ChartError::NoData);
    }
    if options.width == 0 || options.height == 0 {
        return Err(ChartError::InvalidSize);
    }

    render_png(&word_bars(words), options)
}

fn render_png(bars: &[Bar], options: &GraphOptions) -> Result<Vec<u8>, ChartError> {
    let mut buffer = vec![0u8; options.width as usize * options.height as usize * 3];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (options.width, options.height))
            .into_drawing_area();
        draw_bars(&root, bars, options)?;
        root.present()?;
    }

    let image = RgbImage::from_raw(options.width, options.height, buffer).ok_or(ChartError::InvalidSize)?;
    let mut png = Vec::new();
    DynamicImage::ImageRgb8(image).write_to(&mut Cursor::new(&mut png), ImageOutputFormat::Png)?;

    Ok(png)
}

fn draw_bars<DB>(
    root: &DrawingArea<DB, Shift>,
    bars: &[Bar],
    options: &GraphOptions,
) -> Result<(), ChartError>
where
    DB: DrawingBackend,
{
    root.fill(&WHITE)?;

    let max_y = bars.iter().map(|b| b.count).max().unwrap_or(0) as u32;
    // Headroom above the tallest bar
    let y_range = 0..(max_y + max_y / 10 + 1);

    let mut chart = ChartBuilder::on(root)
        .caption(&options.title, ("sans-serif", 30).into_font())
        .margin(10)
        .x_label_area_size(30)
        .y_label_area_size(40)
        .build_cartesian_2d((0..bars.len() as u32).into_segmented(), y_range)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_desc(&options.x_label)
        .y_desc(&options.y_label)
        .x_label_formatter(&|v| match v {
            SegmentValue::CenterOf(i) => bars
                .get(*i as usize)
                .map(|b| b.label.clone())
                .unwrap_or_default(),
            _ => String::new(),
        })
        .draw()?;

    chart.draw_series(bars.iter().enumerate().map(|(i, bar)| {
        let i = i as u32;
        let mut rect = Rectangle::new(
            [
                (SegmentValue::Exact(i), 0),
                (SegmentValue::Exact(i + 1), bar.count as u32),
            ],
            bar.color.filled(),
        );
        rect.set_margin(0, 0, 15, 15);
        rect
    }))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{aggregate, aggregate_labels};

    #[test]
    fn bars_follow_report_counts() {
        let report = aggregate_labels([
            Sentiment::Positive,
            Sentiment::Positive,
            Sentiment::Negative,
        ]);
        let bars = bars(&report);

        let summary: Vec<(&str, usize)> = bars.iter().map(|b| (b.label.as_str(), b.count)).collect();
        assert_eq!(summary, vec![("Positive", 2), ("Neutral", 0), ("Negative", 1)]);
        assert_eq!(bars[0].color, RGBColor(0x28, 0xa7, 0x45));
        assert_eq!(bars[2].color, RGBColor(0xdc, 0x35, 0x45));
    }

    #[test]
    fn empty_report_has_no_chart() {
        let report = aggregate(&[]);
        assert!(matches!(
            sentiment_chart(&report, &GraphOptions::default()),
            Err(ChartError::NoData)
        ));
    }

    #[test]
    fn zero_size_is_rejected() {
        let report = aggregate_labels([Sentiment::Neutral]);
        let options = GraphOptions {
            width: 0,
            ..GraphOptions::default()
        };
        assert!(matches!(
            sentiment_chart(&report, &options),
            Err(ChartError::InvalidSize)
        ));
    }

    #[test]
    fn word_bars_keep_order_and_limit() {
        let words: Vec<TermFrequency> = (0..30)
            .map(|i| TermFrequency {
                term: format!("termo{}", i),
                count: 30 - i,
            })
            .collect();
        let bars = word_bars(&words);

        assert_eq!(bars.len(), WORD_CHART_LIMIT);
        assert_eq!(bars[0].label, "termo0");
        assert_eq!(bars[0].count, 30);
        assert!(bars.windows(2).all(|w| w[0].count >= w[1].count));
    }

    #[test]
    fn no_words_has_no_chart() {
        assert!(matches!(
            word_chart(&[], &GraphOptions::words()),
            Err(ChartError::NoData)
        ));
    }

    #[test]
    fn renders_word_png() {
        let words = vec![
            TermFrequency {
                term: "entrega".to_string(),
                count: 3,
            },
            TermFrequency {
                term: "produto".to_string(),
                count: 1,
            },
        ];
        match word_chart(&words, &GraphOptions::words()) {
            Ok(png) => assert!(png.starts_with(&[0x89, b'P', b'N', b'G'])),
            Err(ChartError::Draw(_)) => {}
            Err(e) => panic!("unexpected chart error: {}", e),
        }
    }

    #[test]
    fn renders_png() {
        let report = aggregate_labels([Sentiment::Positive, Sentiment::Neutral]);
        match sentiment_chart(&report, &GraphOptions::default()) {
            Ok(png) => assert!(png.starts_with(&[0x89, b'P', b'N', b'G'])),
            // Machines without system fonts cannot draw the caption
            Err(ChartError::Draw(_)) => {}
            Err(e) => panic!("unexpected chart error: {}", e),
        }
    }
}
