use comfy_table::{
    Attribute, Cell, CellAlignment, ContentArrangement, Table, modifiers::UTF8_ROUND_CORNERS,
    presets::UTF8_BORDERS_ONLY,
};
use stockpanel_features::RunOutcome;
use stockpanel_rs::EnrichedRow;
use stockpanel_rs::dashboard::{Kpi, KpiPoint, LeaderboardEntry, TickerSummary};

fn table_with_header(columns: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_BORDERS_ONLY)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            columns
                .iter()
                .map(|name| Cell::new(name).add_attribute(Attribute::Bold))
                .collect::<Vec<_>>(),
        );
    table
}

fn number(value: Option<f64>) -> Cell {
    let text = match value {
        Some(v) => format!("{v:.2}"),
        None => "-".to_string(),
    };
    Cell::new(text).set_alignment(CellAlignment::Right)
}

fn kpi_cell(kpi: Kpi, value: Option<f64>) -> Cell {
    match (kpi, value) {
        (Kpi::Volume, Some(v)) => Cell::new(format!("{v:.0}")).set_alignment(CellAlignment::Right),
        _ => number(value),
    }
}

pub fn run_outcome(outcome: &RunOutcome) -> String {
    match outcome {
        RunOutcome::Skipped(marker) => format!(
            "Already published for {} ({} rows, {} tickers); use --force to rerun.",
            marker.run_date, marker.rows, marker.tickers
        ),
        RunOutcome::Published(summary) => {
            let mut table = table_with_header(&["Item", "Value"]);
            table.add_row(vec![
                Cell::new("Table"),
                Cell::new(summary.receipt.path.display()),
            ]);
            table.add_row(vec![Cell::new("Run date"), Cell::new(summary.run_date)]);
            table.add_row(vec![
                Cell::new("Window"),
                Cell::new(format!("{} .. {}", summary.range.start, summary.range.end)),
            ]);
            table.add_row(vec![Cell::new("Rows"), Cell::new(summary.receipt.rows)]);
            table.add_row(vec![Cell::new("Tickers"), Cell::new(summary.receipt.tickers)]);
            table.add_row(vec![
                Cell::new("Missing"),
                Cell::new(summary.report.missing.len()),
            ]);
            table.add_row(vec![
                Cell::new("Excluded"),
                Cell::new(summary.report.excluded.len()),
            ]);
            table.add_row(vec![
                Cell::new("Null cells"),
                Cell::new(summary.report.invalid_cells.len()),
            ]);
            table.add_row(vec![Cell::new("SHA-256"), Cell::new(&summary.receipt.sha256)]);
            table.to_string()
        }
    }
}

pub fn summary(summary: &TickerSummary, recent: &[EnrichedRow]) -> String {
    let title = match summary.name {
        Some(name) => format!("{} ({name})", summary.ticker),
        None => summary.ticker.clone(),
    };
    let mut head = table_with_header(&["Ticker", "As of", "Close", "Cumulative %", "Momentum 7d %", "Drawdown %"]);
    head.add_row(vec![
        Cell::new(title),
        Cell::new(summary.latest_date),
        number(Some(summary.close)),
        number(summary.cumulative_return),
        number(summary.momentum_7d),
        number(summary.drawdown),
    ]);

    let mut history = table_with_header(&[
        "Date", "Close", "Daily %", "Volatility %", "MA 12", "MA 26", "MACD", "Signal",
    ]);
    for row in recent {
        history.add_row(vec![
            Cell::new(row.bar.date),
            number(Some(row.bar.close)),
            number(row.daily_return),
            number(row.volatility),
            number(Some(row.ma_12)),
            number(Some(row.ma_26)),
            number(Some(row.macd)),
            number(Some(row.signal_line)),
        ]);
    }
    format!(
        "{head}\n{} rows from {} to {}\n{history}",
        summary.rows, summary.first_date, summary.latest_date
    )
}

pub fn comparison(kpi: Kpi, points: &[KpiPoint]) -> String {
    let mut table = table_with_header(&["Ticker", "Date", kpi.label()]);
    for point in points {
        table.add_row(vec![
            Cell::new(&point.ticker),
            Cell::new(point.date),
            kpi_cell(kpi, point.value),
        ]);
    }
    table.to_string()
}

pub fn leaderboard(kpi: Kpi, entries: &[LeaderboardEntry]) -> String {
    let mut table = table_with_header(&["Rank", "Ticker", "Date", kpi.label()]);
    for entry in entries {
        table.add_row(vec![
            Cell::new(entry.rank),
            Cell::new(&entry.ticker),
            Cell::new(entry.date),
            kpi_cell(kpi, entry.value),
        ]);
    }
    table.to_string()
}
