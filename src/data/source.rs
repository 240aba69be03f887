use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use std::path::PathBuf;
use tracing::{debug, info};

use crate::data::types::{Column, DateRange, Scalar, TimeSeriesFrame};
use crate::pipeline::PipelineError;

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];

/// Anything that can hand back a daily, date-indexed dataset.
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    fn describe(&self) -> String;

    async fn fetch(&self, range: DateRange) -> Result<TimeSeriesFrame, PipelineError>;
}

/// Local CSV file: first column is the date, the rest are values.
pub struct CsvFileSource {
    path: PathBuf,
}

impl CsvFileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl MarketDataSource for CsvFileSource {
    fn describe(&self) -> String {
        format!("file:{}", self.path.display())
    }

    async fn fetch(&self, range: DateRange) -> Result<TimeSeriesFrame, PipelineError> {
        let text = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            PipelineError::InputData(format!("failed to read {}: {}", self.path.display(), e))
        })?;
        let frame = parse_csv(&text)?;
        debug!(source = %self.describe(), rows = frame.len(), "Parsed CSV source");
        Ok(frame.restrict_to(range))
    }
}

/// Same CSV layout, downloaded over HTTP.
pub struct HttpCsvSource {
    client: Client,
    url: String,
}

impl HttpCsvSource {
    pub fn new(url: String) -> Self {
        Self {
            client: Client::new(),
            url,
        }
    }
}

#[async_trait]
impl MarketDataSource for HttpCsvSource {
    fn describe(&self) -> String {
        format!("http:{}", self.url)
    }

    async fn fetch(&self, range: DateRange) -> Result<TimeSeriesFrame, PipelineError> {
        let text = self
            .client
            .get(&self.url)
            .header("User-Agent", "RebarForecast/1.0")
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let frame = parse_csv(&text)?;
        debug!(source = %self.describe(), rows = frame.len(), "Downloaded CSV source");
        Ok(frame.restrict_to(range))
    }
}

/// Outer-joins several sources on date.
pub struct JoinedSource {
    sources: Vec<Box<dyn MarketDataSource>>,
}

impl JoinedSource {
    pub fn new(sources: Vec<Box<dyn MarketDataSource>>) -> Self {
        Self { sources }
    }
}

#[async_trait]
impl MarketDataSource for JoinedSource {
    fn describe(&self) -> String {
        self.sources
            .iter()
            .map(|s| s.describe())
            .collect::<Vec<_>>()
            .join(" + ")
    }

    async fn fetch(&self, range: DateRange) -> Result<TimeSeriesFrame, PipelineError> {
        let frames = futures::future::try_join_all(self.sources.iter().map(|s| s.fetch(range))).await?;

        let mut frames = frames.into_iter();
        let Some(mut joined) = frames.next() else {
            return Err(PipelineError::InputData("no data sources configured".to_string()));
        };
        for frame in frames {
            joined = joined.outer_join(&frame)?;
        }
        Ok(joined)
    }
}

/// Fetches, rounds to one decimal and resamples to business days.
pub async fn load_dataset(
    source: &dyn MarketDataSource,
    range: DateRange,
) -> Result<TimeSeriesFrame, PipelineError> {
    let mut frame = source.fetch(range).await?;
    frame.round_numbers(1);
    let frame = frame.to_business_days();

    if frame.is_empty() {
        return Err(PipelineError::InputData(format!(
            "no business-day rows between {} and {} from {}",
            range.start,
            range.end,
            source.describe()
        )));
    }

    info!(
        "✅ Dataset loaded: {} rows x {} columns ({} to {})",
        frame.len(),
        frame.width(),
        frame.dates()[0],
        frame.dates()[frame.len() - 1]
    );
    Ok(frame)
}

pub fn parse_csv(text: &str) -> Result<TimeSeriesFrame, PipelineError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader.headers()?.clone();
    if headers.len() < 2 {
        return Err(PipelineError::InputData(
            "CSV needs a date column and at least one value column".to_string(),
        ));
    }
    let names: Vec<String> = headers.iter().skip(1).map(str::to_string).collect();

    let mut rows: Vec<(NaiveDate, Vec<Option<Scalar>>)> = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let raw_date = record.get(0).unwrap_or_default();
        let date = parse_date(raw_date).ok_or_else(|| {
            PipelineError::InputData(format!("line {}: unparseable date '{}'", line + 2, raw_date))
        })?;
        let values = (1..headers.len())
            .map(|i| parse_cell(record.get(i).unwrap_or_default()))
            .collect();
        rows.push((date, values));
    }

    rows.sort_by_key(|(date, _)| *date);
    if let Some(pair) = rows.windows(2).find(|w| w[0].0 == w[1].0) {
        return Err(PipelineError::InputData(format!("duplicate date {}", pair[0].0)));
    }

    let dates = rows.iter().map(|(d, _)| *d).collect();
    let columns = names
        .into_iter()
        .enumerate()
        .map(|(i, name)| Column::new(name, rows.iter().map(|(_, v)| v[i].clone()).collect()))
        .collect();
    TimeSeriesFrame::with_columns(dates, columns)
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    // Timestamps like "2024-01-02 00:00:00" keep only the date part.
    let raw = raw.split_whitespace().next()?;
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(raw, fmt).ok())
}

fn parse_cell(raw: &str) -> Option<Scalar> {
    if raw.is_empty() || raw.eq_ignore_ascii_case("nan") || raw.eq_ignore_ascii_case("null") {
        return None;
    }
    match raw.replace(',', "").parse::<f64>() {
        Ok(v) if v.is_finite() => Some(Scalar::Number(v)),
        Ok(_) => None,
        Err(_) => Some(Scalar::Text(raw.to_string())),
    }
}
