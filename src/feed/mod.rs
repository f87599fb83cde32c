// Bar feed: CSV loading, resampling and validation
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Duration, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use thiserror::Error;

use crate::models::Bar;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("failed to open {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),
    #[error("unparseable timestamp on row {row}: {value:?}")]
    Timestamp { row: usize, value: String },
    #[error("no bars")]
    Empty,
    #[error("timestamp at bar {index} ({timestamp}) is not after the previous bar")]
    NonMonotonic {
        index: usize,
        timestamp: DateTime<Utc>,
    },
    #[error("non-finite or inconsistent prices at bar {index}")]
    BadPrice { index: usize },
    #[error("coarse timeframe must be at least one minute")]
    Timeframe,
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
    #[serde(default)]
    volume: Option<f64>,
}

/// Parse RFC 3339, `%Y-%m-%d %H:%M:%S` (UTC) or epoch milliseconds
fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    value
        .parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_millis)
}

/// Read bars from any CSV source with a `timestamp,open,high,low,close[,volume]` header
pub fn read_csv<R: Read>(reader: R) -> Result<Vec<Bar>, FeedError> {
    let mut csv_reader = csv::Reader::from_reader(reader);
    let mut bars = Vec::new();

    for (row, result) in csv_reader.deserialize().enumerate() {
        let record: CsvRow = result?;
        let timestamp =
            parse_timestamp(&record.timestamp).ok_or_else(|| FeedError::Timestamp {
                row: row + 1,
                value: record.timestamp.clone(),
            })?;

        bars.push(Bar::new(
            timestamp,
            record.open,
            record.high,
            record.low,
            record.close,
            record.volume.unwrap_or(0.0),
        ));
    }

    Ok(bars)
}

/// Load bars from a CSV file
pub fn load_csv(path: impl AsRef<Path>) -> Result<Vec<Bar>, FeedError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| FeedError::Io {
        path: path.to_path_buf(),
        source,
    })?;

    let bars = read_csv(BufReader::new(file))?;
    tracing::debug!("Loaded {} bars from {}", bars.len(), path.display());
    Ok(bars)
}

/// Check ordering and prices; the engine assumes a clean series
pub fn validate_series(bars: &[Bar]) -> Result<(), FeedError> {
    if bars.is_empty() {
        return Err(FeedError::Empty);
    }

    for (index, bar) in bars.iter().enumerate() {
        let prices = [bar.open, bar.high, bar.low, bar.close];
        let finite = prices.iter().all(|p| p.is_finite());
        let consistent = bar.high >= bar.low
            && bar.high >= bar.open.max(bar.close)
            && bar.low <= bar.open.min(bar.close);
        if !finite || !consistent {
            return Err(FeedError::BadPrice { index });
        }

        if index > 0 && bar.timestamp <= bars[index - 1].timestamp {
            return Err(FeedError::NonMonotonic {
                index,
                timestamp: bar.timestamp,
            });
        }
    }

    Ok(())
}

/// Aggregate fine bars into `minutes`-wide buckets aligned to the epoch.
///
/// Each coarse bar is stamped with its bucket's close so it only becomes
/// visible to the engine once all of its fine bars are in. Empty buckets are skipped.
pub fn resample(bars: &[Bar], minutes: u32) -> Vec<Bar> {
    if minutes == 0 {
        return Vec::new();
    }
    let width = Duration::minutes(minutes as i64);
    let width_secs = width.num_seconds();

    let mut coarse: Vec<Bar> = Vec::new();
    let mut current: Option<(DateTime<Utc>, Bar)> = None;

    for bar in bars {
        let offset = bar.timestamp.timestamp().rem_euclid(width_secs);
        let start = bar.timestamp
            - Duration::seconds(offset)
            - Duration::nanoseconds(bar.timestamp.timestamp_subsec_nanos() as i64);

        match current.as_mut() {
            Some((bucket, agg)) if *bucket == start => {
                agg.high = agg.high.max(bar.high);
                agg.low = agg.low.min(bar.low);
                agg.close = bar.close;
                agg.volume += bar.volume;
            }
            _ => {
                if let Some((_, done)) = current.take() {
                    coarse.push(done);
                }
                current = Some((
                    start,
                    Bar::new(
                        start + width,
                        bar.open,
                        bar.high,
                        bar.low,
                        bar.close,
                        bar.volume,
                    ),
                ));
            }
        }
    }
    if let Some((_, done)) = current {
        coarse.push(done);
    }

    coarse
}

/// Fine and coarse series handed to the engine
#[derive(Debug, Clone, Default)]
pub struct BarFeed {
    pub fine: Vec<Bar>,
    pub coarse: Vec<Bar>,
}

impl BarFeed {
    pub fn new(fine: Vec<Bar>, coarse: Vec<Bar>) -> Self {
        Self { fine, coarse }
    }

    /// Build the coarse series by resampling the fine one
    pub fn from_fine(fine: Vec<Bar>, coarse_minutes: u32) -> Result<Self, FeedError> {
        if coarse_minutes == 0 {
            return Err(FeedError::Timeframe);
        }
        validate_series(&fine)?;
        let coarse = resample(&fine, coarse_minutes);
        Ok(Self { fine, coarse })
    }

    /// Load the fine series and either load or resample the coarse one
    pub fn load(
        fine_path: impl AsRef<Path>,
        coarse_path: Option<&Path>,
        coarse_minutes: u32,
    ) -> Result<Self, FeedError> {
        let fine = load_csv(fine_path)?;
        match coarse_path {
            Some(path) => {
                validate_series(&fine)?;
                let coarse = load_csv(path)?;
                validate_series(&coarse)?;
                Ok(Self { fine, coarse })
            }
            None => Self::from_fine(fine, coarse_minutes),
        }
    }
}
