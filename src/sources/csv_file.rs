// =============================================================================
// Local CSV Source — manually maintained prices.csv / sentiment.csv
// =============================================================================
//
// prices.csv:     Ticker,Price,ChgPct,Volume,AvgVolume   (last row per ticker wins)
// sentiment.csv:  VIX,PutCall,FearGreed,MacroRisk       (last row wins)
//
// Columns are located by header name (case-insensitive), so extra or
// reordered columns are tolerated. Empty or non-numeric cells are absent.
// Cells may be double-quoted (`"1,250,000"`, with `""` for a literal quote);
// thousands separators inside numbers are ignored. A quoted cell cannot span
// lines.
// =============================================================================

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;

use super::{usable_price, DataSource, QuoteSource, RawPriceSource, SentimentSource};
use crate::types::{PriceQuote, QuoteOrigin, SentimentSnapshot};

#[derive(Debug, Clone)]
pub struct CsvFileSource {
    prices_path: PathBuf,
    sentiment_path: PathBuf,
}

/// A parsed CSV file: lowercase header name -> column index, plus data rows.
struct Table {
    columns: HashMap<String, usize>,
    rows: Vec<Vec<String>>,
}

impl Table {
    fn parse(content: &str) -> Result<Self> {
        let mut lines = content
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty());

        let header = lines.next().context("csv file is empty")?;
        let columns = split_row(header)
            .into_iter()
            .enumerate()
            .map(|(i, name)| (name.to_ascii_lowercase(), i))
            .collect();

        Ok(Self {
            columns,
            rows: lines.map(split_row).collect(),
        })
    }

    fn cell<'a>(&self, row: &'a [String], column: &str) -> Option<&'a str> {
        let idx = *self.columns.get(column)?;
        row.get(idx).map(String::as_str).filter(|s| !s.is_empty())
    }

    fn number(&self, row: &[String], column: &str) -> Option<f64> {
        self.cell(row, column)?
            .replace(',', "")
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
    }
}

fn split_row(line: &str) -> Vec<String> {
    let mut cells = Vec::new();
    let mut cell = String::new();
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if quoted && chars.peek() == Some(&'"') => {
                cell.push('"');
                chars.next();
            }
            '"' => quoted = !quoted,
            ',' if !quoted => cells.push(std::mem::take(&mut cell).trim().to_string()),
            _ => cell.push(c),
        }
    }
    cells.push(cell.trim().to_string());
    cells
}

impl CsvFileSource {
    pub fn new(prices_path: impl Into<PathBuf>, sentiment_path: impl Into<PathBuf>) -> Self {
        Self {
            prices_path: prices_path.into(),
            sentiment_path: sentiment_path.into(),
        }
    }

    async fn read_table(path: &Path) -> Result<Table> {
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        Table::parse(&content).with_context(|| format!("failed to parse {}", path.display()))
    }

    async fn latest_price_row(&self, ticker: &str) -> Result<(Table, Vec<String>)> {
        let mut table = Self::read_table(&self.prices_path).await?;
        let idx = table
            .rows
            .iter()
            .rposition(|row| {
                table
                    .cell(row, "ticker")
                    .is_some_and(|t| t.eq_ignore_ascii_case(ticker))
            })
            .with_context(|| format!("no row for {ticker} in {}", self.prices_path.display()))?;
        let row = table.rows.swap_remove(idx);
        Ok((table, row))
    }
}

impl DataSource for CsvFileSource {
    fn name(&self) -> &str {
        "csv"
    }
}

#[async_trait]
impl QuoteSource for CsvFileSource {
    async fn fetch_quote(&self, ticker: &str) -> Result<PriceQuote> {
        let (table, row) = self.latest_price_row(ticker).await?;
        let price = usable_price(table.number(&row, "price"))
            .with_context(|| format!("csv row for {ticker} has no usable price"))?;

        Ok(PriceQuote {
            ticker: ticker.to_string(),
            price: Some(price),
            change_pct: table.number(&row, "chgpct"),
            volume: table.number(&row, "volume"),
            avg_volume: table.number(&row, "avgvolume"),
            origin: Some(QuoteOrigin::Source {
                name: self.name().to_string(),
            }),
        })
    }
}

#[async_trait]
impl RawPriceSource for CsvFileSource {
    async fn fetch_raw_price(&self, ticker: &str) -> Result<f64> {
        let (table, row) = self.latest_price_row(ticker).await?;
        usable_price(table.number(&row, "price"))
            .with_context(|| format!("csv row for {ticker} has no usable price"))
    }
}

#[async_trait]
impl SentimentSource for CsvFileSource {
    async fn fetch_sentiment(&self) -> Result<SentimentSnapshot> {
        let table = Self::read_table(&self.sentiment_path).await?;
        let row = table
            .rows
            .last()
            .context("sentiment csv has no data rows")?;

        Ok(SentimentSnapshot {
            vix: table.number(row, "vix"),
            put_call: table.number(row, "putcall"),
            fear_greed: table.number(row, "feargreed"),
            macro_risk: table.number(row, "macrorisk"),
        })
    }
}
