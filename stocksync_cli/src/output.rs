use anyhow::{bail, Result};
use serde::Serialize;
use stocksync_lib::{TickerOutcome, TickerStatus, TickerSummary, Universe};
use tabled::settings::Style;
use tabled::{Table, Tabled};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    Csv,
    Markdown,
}

impl std::str::FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "table" => Ok(Self::Table),
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            "markdown" | "md" => Ok(Self::Markdown),
            other => bail!("unknown output format '{}': use table, json, csv or markdown", other),
        }
    }
}

#[derive(Tabled, Serialize)]
struct StatusRow {
    #[tabled(rename = "Ticker")]
    #[serde(rename = "Ticker")]
    ticker: String,
    #[tabled(rename = "Rows")]
    #[serde(rename = "Rows")]
    rows: u64,
    #[tabled(rename = "First")]
    #[serde(rename = "First")]
    first_date: String,
    #[tabled(rename = "Last")]
    #[serde(rename = "Last")]
    last_date: String,
}

#[derive(Tabled, Serialize)]
struct OutcomeRow {
    #[tabled(rename = "Ticker")]
    #[serde(rename = "Ticker")]
    ticker: String,
    #[tabled(rename = "Status")]
    #[serde(rename = "Status")]
    status: String,
    #[tabled(rename = "Range")]
    #[serde(rename = "Range")]
    range: String,
    #[tabled(rename = "Fetched")]
    #[serde(rename = "Fetched")]
    fetched: usize,
    #[tabled(rename = "Written")]
    #[serde(rename = "Written")]
    written: usize,
    #[tabled(rename = "Unchanged")]
    #[serde(rename = "Unchanged")]
    unchanged: usize,
    #[tabled(rename = "Error")]
    #[serde(rename = "Error")]
    error: String,
}

#[derive(Tabled, Serialize)]
struct UniverseRow {
    #[tabled(rename = "Group")]
    #[serde(rename = "Group")]
    group: String,
    #[tabled(rename = "Ticker")]
    #[serde(rename = "Ticker")]
    ticker: String,
}

// -- Row builders --

fn build_status_rows(summaries: &[TickerSummary]) -> Vec<StatusRow> {
    summaries
        .iter()
        .map(|s| StatusRow {
            ticker: s.ticker.clone(),
            rows: s.rows,
            first_date: s.first_date.to_string(),
            last_date: s.last_date.to_string(),
        })
        .collect()
}

fn build_outcome_rows(outcomes: &[TickerOutcome]) -> Vec<OutcomeRow> {
    outcomes
        .iter()
        .map(|o| {
            let mut row = OutcomeRow {
                ticker: o.ticker.clone(),
                status: o.status.label().to_string(),
                range: String::new(),
                fetched: 0,
                written: 0,
                unchanged: 0,
                error: String::new(),
            };
            match &o.status {
                TickerStatus::Updated {
                    start,
                    end,
                    fetched,
                    written,
                    unchanged,
                } => {
                    row.range = format!("{}..{}", start, end);
                    row.fetched = *fetched;
                    row.written = *written;
                    row.unchanged = *unchanged;
                }
                TickerStatus::Failed(err) => row.error = err.clone(),
                TickerStatus::UpToDate | TickerStatus::NoData => {}
            }
            row
        })
        .collect()
}

fn build_universe_rows(universe: &Universe) -> Vec<UniverseRow> {
    universe
        .groups
        .iter()
        .flat_map(|g| {
            g.tickers.iter().map(move |t| UniverseRow {
                group: g.name.clone(),
                ticker: t.clone(),
            })
        })
        .collect()
}

// -- Rendering --

fn print_rows<R: Tabled + Serialize>(rows: Vec<R>, format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => println!("{}", Table::new(rows)),
        OutputFormat::Markdown => {
            let mut table = Table::new(rows);
            table.with(Style::markdown());
            println!("{}", table);
        }
        OutputFormat::Csv => {
            let mut wtr = csv::Writer::from_writer(std::io::stdout());
            for row in rows {
                wtr.serialize(row)?;
            }
            wtr.flush()?;
        }
        OutputFormat::Json => print_json(&rows),
    }
    Ok(())
}

pub fn print_status(summaries: &[TickerSummary], format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            print_json(&summaries);
            Ok(())
        }
        _ => print_rows(build_status_rows(summaries), format),
    }
}

pub fn print_outcomes(outcomes: &[TickerOutcome], format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            print_json(&outcomes);
            Ok(())
        }
        _ => print_rows(build_outcome_rows(outcomes), format),
    }
}

pub fn print_universe(universe: &Universe, format: &OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Json => {
            print_json(universe);
            Ok(())
        }
        _ => print_rows(build_universe_rows(universe), format),
    }
}

pub fn print_json<T: serde::Serialize>(data: &T) {
    match serde_json::to_string_pretty(data) {
        Ok(json) => println!("{}", json),
        Err(e) => eprintln!("Failed to serialize to JSON: {}", e),
    }
}

/// Render rows to a CSV string (used by tests).
#[cfg(test)]
fn rows_to_csv<R: Serialize>(rows: Vec<R>) -> String {
    let mut wtr = csv::Writer::from_writer(Vec::new());
    for row in rows {
        wtr.serialize(row).unwrap();
    }
    String::from_utf8(wtr.into_inner().unwrap()).unwrap()
}
