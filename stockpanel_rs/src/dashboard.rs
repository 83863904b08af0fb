//! Read-side queries over a published enriched table: per-ticker summary,
//! KPI comparison across tickers and top-N leaderboards.

use std::cmp::Ordering;
use std::path::Path;

use anyhow::{Result, anyhow};
use chrono::NaiveDate;
use serde::Serialize;

use crate::enriched::{EnrichedPanel, EnrichedRow};
use crate::storage::read_published;
use crate::universe::{find_ticker, normalize_symbol};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Kpi {
    Close,
    Volume,
    DailyReturn,
    Volatility,
    Momentum7d,
    CumulativeReturn,
}

impl Kpi {
    pub const ALL: [Kpi; 6] = [
        Kpi::Close,
        Kpi::Volume,
        Kpi::DailyReturn,
        Kpi::Volatility,
        Kpi::Momentum7d,
        Kpi::CumulativeReturn,
    ];

    /// Column name in the published table.
    pub fn column(self) -> &'static str {
        match self {
            Kpi::Close => "Close",
            Kpi::Volume => "Volume",
            Kpi::DailyReturn => "Daily_return",
            Kpi::Volatility => "Volatility",
            Kpi::Momentum7d => "Momentum_7d",
            Kpi::CumulativeReturn => "Cumulative_Return",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Kpi::Close => "Close price",
            Kpi::Volume => "Volume",
            Kpi::DailyReturn => "Daily return (%)",
            Kpi::Volatility => "Intraday volatility (%)",
            Kpi::Momentum7d => "7-day momentum (%)",
            Kpi::CumulativeReturn => "Cumulative return (%)",
        }
    }

    pub fn value(self, row: &EnrichedRow) -> Option<f64> {
        match self {
            Kpi::Close => Some(row.bar.close),
            Kpi::Volume => Some(row.bar.volume as f64),
            Kpi::DailyReturn => row.daily_return,
            Kpi::Volatility => row.volatility,
            Kpi::Momentum7d => row.momentum_7d,
            Kpi::CumulativeReturn => row.cumulative_return,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickerSummary {
    pub ticker: String,
    pub name: Option<&'static str>,
    pub rows: usize,
    pub first_date: NaiveDate,
    pub latest_date: NaiveDate,
    pub close: f64,
    pub cumulative_return: Option<f64>,
    pub momentum_7d: Option<f64>,
    pub drawdown: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiPoint {
    pub ticker: String,
    pub date: NaiveDate,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub ticker: String,
    pub date: NaiveDate,
    pub value: Option<f64>,
}

/// In-memory view of a published table, grouped per ticker.
pub struct DashboardTable {
    tickers: Vec<String>,
    groups: Vec<Vec<EnrichedRow>>,
}

impl DashboardTable {
    pub fn open(path: &Path) -> Result<Self> {
        Self::from_panel(&read_published(path)?)
    }

    pub fn from_panel(panel: &EnrichedPanel) -> Result<Self> {
        let mut tickers: Vec<String> = Vec::new();
        let mut groups: Vec<Vec<EnrichedRow>> = Vec::new();
        for row in panel.rows()? {
            if tickers.last() != Some(&row.ticker) {
                tickers.push(row.ticker.clone());
                groups.push(Vec::new());
            }
            if let Some(group) = groups.last_mut() {
                group.push(row);
            }
        }
        Ok(Self { tickers, groups })
    }

    pub fn tickers(&self) -> &[String] {
        &self.tickers
    }

    pub fn ticker_rows(&self, ticker: &str) -> Result<&[EnrichedRow]> {
        let symbol = normalize_symbol(ticker);
        self.tickers
            .iter()
            .position(|t| *t == symbol)
            .map(|idx| self.groups[idx].as_slice())
            .ok_or_else(|| anyhow!("Ticker {symbol} is not in the published table"))
    }

    pub fn summary(&self, ticker: &str) -> Result<TickerSummary> {
        let rows = self.ticker_rows(ticker)?;
        let (Some(first), Some(latest)) = (rows.first(), rows.last()) else {
            return Err(anyhow!("Ticker {ticker} has no rows"));
        };
        Ok(TickerSummary {
            ticker: latest.ticker.clone(),
            name: find_ticker(&latest.ticker).map(|p| p.name),
            rows: rows.len(),
            first_date: first.bar.date,
            latest_date: latest.bar.date,
            close: latest.bar.close,
            cumulative_return: latest.cumulative_return,
            momentum_7d: latest.momentum_7d,
            drawdown: latest.drawdown,
        })
    }

    /// Full KPI history of each listed ticker, concatenated in the order
    /// given.
    pub fn compare<S: AsRef<str>>(&self, kpi: Kpi, tickers: &[S]) -> Result<Vec<KpiPoint>> {
        let mut points = Vec::new();
        for ticker in tickers {
            for row in self.ticker_rows(ticker.as_ref())? {
                points.push(KpiPoint {
                    ticker: row.ticker.clone(),
                    date: row.bar.date,
                    value: kpi.value(row),
                });
            }
        }
        Ok(points)
    }

    /// Rank tickers by the KPI on their latest row. Highest first; nulls
    /// last; ties broken by ticker.
    pub fn leaderboard(&self, kpi: Kpi, top: usize) -> Vec<LeaderboardEntry> {
        let mut latest: Vec<(&EnrichedRow, Option<f64>)> = self
            .groups
            .iter()
            .filter_map(|rows| rows.last())
            .map(|row| (row, kpi.value(row)))
            .collect();
        latest.sort_by(|(a_row, a), (b_row, b)| {
            let by_value = match (a, b) {
                (Some(a), Some(b)) => b.partial_cmp(a).unwrap_or(Ordering::Equal),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            };
            by_value.then_with(|| a_row.ticker.cmp(&b_row.ticker))
        });
        latest
            .into_iter()
            .take(top)
            .enumerate()
            .map(|(idx, (row, value))| LeaderboardEntry {
                rank: idx + 1,
                ticker: row.ticker.clone(),
                date: row.bar.date,
                value,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::enriched::tests::row;

    fn table() -> Result<DashboardTable> {
        let mut rows = vec![
            row("AAPL", 2, 10.0, Some(0.0)),
            row("AAPL", 3, 12.0, Some(0.0)),
            row("MSFT", 2, 20.0, Some(0.0)),
            row("NVDA", 2, 5.0, Some(0.0)),
        ];
        rows[1].momentum_7d = Some(4.0);
        rows[2].momentum_7d = Some(9.5);
        rows[1].cumulative_return = Some(20.0);
        let panel = EnrichedPanel::from_rows(&rows)?;
        DashboardTable::from_panel(&panel)
    }

    #[test]
    fn summary_uses_latest_row() -> Result<()> {
        let table = table()?;
        let summary = table.summary("aapl")?;
        assert_eq!(summary.rows, 2);
        assert_eq!(summary.close, 12.0);
        assert_eq!(summary.cumulative_return, Some(20.0));
        assert_eq!(summary.momentum_7d, Some(4.0));
        assert_eq!(summary.name, Some("Apple"));
        assert!(table.summary("ZZZ").is_err());
        Ok(())
    }

    #[test]
    fn share_class_symbols_resolve_with_either_separator() -> Result<()> {
        let panel = EnrichedPanel::from_rows(&[
            row("AAPL", 2, 10.0, Some(0.0)),
            row("BRK-B", 2, 410.0, Some(0.0)),
        ])?;
        let table = DashboardTable::from_panel(&panel)?;
        assert_eq!(table.ticker_rows("brk.b")?.len(), 1);
        assert_eq!(table.ticker_rows(" BRK-B ")?.len(), 1);
        let summary = table.summary("Brk.B")?;
        assert_eq!(summary.ticker, "BRK-B");
        assert_eq!(summary.name, Some("Berkshire Hathaway Class B"));
        Ok(())
    }

    #[test]
    fn leaderboard_ranks_latest_values_with_nulls_last() -> Result<()> {
        let board = table()?.leaderboard(Kpi::Momentum7d, 5);
        let order: Vec<_> = board.iter().map(|e| e.ticker.as_str()).collect();
        assert_eq!(order, vec!["MSFT", "AAPL", "NVDA"]);
        assert_eq!(board[0].rank, 1);
        assert_eq!(board[2].value, None);
        Ok(())
    }

    #[test]
    fn leaderboard_truncates_to_top_n() -> Result<()> {
        let board = table()?.leaderboard(Kpi::Close, 2);
        let order: Vec<_> = board.iter().map(|e| e.ticker.as_str()).collect();
        assert_eq!(order, vec!["MSFT", "AAPL"]);
        Ok(())
    }

    #[test]
    fn compare_concatenates_requested_histories() -> Result<()> {
        let points = table()?.compare(Kpi::Close, &["NVDA", "AAPL"])?;
        let values: Vec<_> = points.iter().map(|p| (p.ticker.as_str(), p.value)).collect();
        assert_eq!(
            values,
            vec![("NVDA", Some(5.0)), ("AAPL", Some(10.0)), ("AAPL", Some(12.0))]
        );
        Ok(())
    }
}
