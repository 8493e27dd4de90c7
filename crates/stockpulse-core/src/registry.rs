//! Ticker registry: seeding from a CSV list and toggling membership.

use std::collections::BTreeSet;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use serde::Serialize;
use stockpulse_warehouse::{DeleteSummary, TickerRecord, TickerSeed, Warehouse};
use tracing::{info, warn};

use crate::fetcher::Fetcher;
use crate::{PipelineError, SeedListError, Symbol};

const TICKER_HEADERS: [&str; 2] = ["ticker", "symbol"];
const NAME_HEADERS: [&str; 3] = ["name", "company_name", "company"];
const SECTOR_HEADERS: [&str; 1] = ["sector"];

/// One usable row of a seed list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeedEntry {
    pub symbol: Symbol,
    pub name: Option<String>,
    pub sector: Option<String>,
}

impl SeedEntry {
    pub fn new(symbol: Symbol) -> Self {
        Self {
            symbol,
            name: None,
            sector: None,
        }
    }

    fn to_seed(&self) -> TickerSeed {
        TickerSeed {
            ticker: self.symbol.as_str().to_string(),
            name: self.name.clone(),
            sector: self.sector.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeedReport {
    pub inserted: usize,
    pub updated: usize,
    /// Profiles that filled in a missing name or sector.
    pub enriched: usize,
}

#[derive(Debug, Clone, Copy)]
struct Columns {
    ticker: usize,
    name: Option<usize>,
    sector: Option<usize>,
}

/// Reads a seed list from disk. See [`parse_seed_list`].
pub fn read_seed_list(path: impl AsRef<Path>) -> Result<Vec<SeedEntry>, SeedListError> {
    let file = File::open(path.as_ref())?;
    parse_seed_list(file)
}

/// Parses a seed list.
///
/// A header row is recognized when one of its cells is `ticker` or `symbol`
/// (any case); `name`/`company_name`/`company` and `sector` are picked up
/// when present. Without a header the first column holds the symbols.
/// Invalid symbols are skipped with a warning and duplicates keep their
/// first occurrence.
pub fn parse_seed_list<R: Read>(reader: R) -> Result<Vec<SeedEntry>, SeedListError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let mut records = reader.records();
    let Some(first) = records.next().transpose()? else {
        return Ok(Vec::new());
    };
    if first.is_empty() {
        return Err(SeedListError::NoColumns);
    }

    let header = detect_columns(&first);
    let columns = header.unwrap_or(Columns {
        ticker: 0,
        name: None,
        sector: None,
    });

    let mut seen = BTreeSet::new();
    let mut entries = Vec::new();
    let leading = header.is_none().then_some(Ok(first));
    for (line, record) in leading.into_iter().chain(records).enumerate() {
        let record = record?;
        let raw = record.get(columns.ticker).unwrap_or_default();
        if raw.is_empty() {
            continue;
        }

        let symbol = match Symbol::parse(raw) {
            Ok(symbol) => symbol,
            Err(error) => {
                warn!(row = line + 1, value = raw, %error, "skipping invalid symbol in seed list");
                continue;
            }
        };
        if !seen.insert(symbol.clone()) {
            continue;
        }

        entries.push(SeedEntry {
            symbol,
            name: cell(&record, columns.name),
            sector: cell(&record, columns.sector),
        });
    }

    Ok(entries)
}

fn detect_columns(record: &csv::StringRecord) -> Option<Columns> {
    let position = |names: &[&str]| {
        record
            .iter()
            .position(|cell| names.iter().any(|name| cell.eq_ignore_ascii_case(name)))
    };
    Some(Columns {
        ticker: position(&TICKER_HEADERS[..])?,
        name: position(&NAME_HEADERS[..]),
        sector: position(&SECTOR_HEADERS[..]),
    })
}

fn cell(record: &csv::StringRecord, index: Option<usize>) -> Option<String> {
    index
        .and_then(|index| record.get(index))
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Registry operations over the `tickers` table.
#[derive(Clone)]
pub struct Registry {
    warehouse: Warehouse,
}

impl Registry {
    pub fn new(warehouse: Warehouse) -> Self {
        Self { warehouse }
    }

    /// Upserts the entries; existing tickers keep their active flag and any
    /// name or sector the entry leaves out.
    pub fn seed(&self, entries: &[SeedEntry]) -> Result<SeedReport, PipelineError> {
        let seeds: Vec<TickerSeed> = entries.iter().map(SeedEntry::to_seed).collect();
        let inserted = self.warehouse.upsert_tickers(&seeds)?;
        let report = SeedReport {
            inserted,
            updated: seeds.len() - inserted,
            enriched: 0,
        };
        info!(inserted = report.inserted, updated = report.updated, "ticker registry seeded");
        Ok(report)
    }

    pub fn seed_from_csv(&self, path: impl AsRef<Path>) -> Result<SeedReport, PipelineError> {
        let entries = read_seed_list(path)?;
        self.seed(&entries)
    }

    /// Fills missing names and sectors from provider profiles, then seeds.
    ///
    /// A failed profile lookup leaves the entry as it was.
    pub async fn seed_enriched(
        &self,
        mut entries: Vec<SeedEntry>,
        fetcher: &Fetcher,
    ) -> Result<SeedReport, PipelineError> {
        let mut enriched = 0;
        for entry in entries
            .iter_mut()
            .filter(|entry| entry.name.is_none() || entry.sector.is_none())
        {
            match fetcher.profile(&entry.symbol).await {
                Ok(Some(profile)) => {
                    let before = (entry.name.is_some(), entry.sector.is_some());
                    entry.name = entry.name.take().or(profile.name);
                    entry.sector = entry.sector.take().or(profile.sector);
                    if before != (entry.name.is_some(), entry.sector.is_some()) {
                        enriched += 1;
                    }
                }
                Ok(None) => {}
                Err(error) => {
                    warn!(ticker = %entry.symbol, %error, "profile lookup failed; seeding with defaults");
                }
            }
        }

        let mut report = self.seed(&entries)?;
        report.enriched = enriched;
        Ok(report)
    }

    pub fn activate(&self, symbol: &Symbol) -> Result<(), PipelineError> {
        self.warehouse.set_active(symbol.as_str(), true)?;
        Ok(())
    }

    /// Excludes the ticker from future batches; its history stays.
    pub fn deactivate(&self, symbol: &Symbol) -> Result<(), PipelineError> {
        self.warehouse.set_active(symbol.as_str(), false)?;
        Ok(())
    }

    /// Deletes the ticker and every row keyed on it.
    pub fn remove(&self, symbol: &Symbol) -> Result<DeleteSummary, PipelineError> {
        Ok(self.warehouse.delete_ticker(symbol.as_str())?)
    }

    pub fn list(&self, include_inactive: bool) -> Result<Vec<TickerRecord>, PipelineError> {
        Ok(self.warehouse.list_tickers(include_inactive)?)
    }

    /// Symbols the daily batch should fetch, in symbol order.
    pub fn active_symbols(&self) -> Result<Vec<Symbol>, PipelineError> {
        let symbols = self
            .warehouse
            .active_tickers()?
            .into_iter()
            .filter_map(|record| match Symbol::parse(&record.ticker) {
                Ok(symbol) => Some(symbol),
                Err(error) => {
                    warn!(ticker = %record.ticker, %error, "ignoring unparseable registry entry");
                    None
                }
            })
            .collect();
        Ok(symbols)
    }
}
