use anyhow::Result;
use chrono::{Days, NaiveDate};
use stockpanel_features::window::round2;
use stockpanel_features::{FeatureEngine, MOMENTUM_LAG, enrich_series};
use stockpanel_rs::panel::PriceColumns;
use stockpanel_rs::{ComputeContext, EnrichedRow, PanelBuilder, PriceBar, TickerSeries};

/// Deterministic cent-quoted random walk between 50 and 150.
fn walk(seed: u64, len: usize) -> Vec<PriceBar> {
    let mut state = seed;
    let mut cents: i64 = 10_000;
    let start = NaiveDate::from_ymd_opt(2022, 1, 3).unwrap();
    (0..len)
        .map(|i| {
            state = state
                .wrapping_mul(6_364_136_223_846_793_005)
                .wrapping_add(1_442_695_040_888_963_407);
            let step = ((state >> 33) % 401) as i64 - 200;
            cents = (cents + step).clamp(5_000, 15_000);
            let close = cents as f64 / 100.0;
            let spread = ((state >> 20) % 150) as f64 / 100.0;
            PriceBar {
                date: start + Days::new(i as u64),
                open: close,
                high: close + spread,
                low: (close - spread).max(1.0),
                close,
                volume: (state >> 40) % 1_000_000,
            }
        })
        .collect()
}

fn enrich_bars(bars: &[PriceBar]) -> Result<Vec<EnrichedRow>> {
    Ok(enrich_series("T", &PriceColumns::from(bars))?.rows)
}

fn run_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 1).unwrap()
}

#[test]
fn no_look_ahead_under_truncation() -> Result<()> {
    let bars = walk(7, 260);
    let full = enrich_bars(&bars)?;
    for cut in [0, 1, 6, 7, 8, 11, 12, 25, 26, 49, 50, 199, 200, 259] {
        let truncated = enrich_bars(&bars[..=cut])?;
        assert_eq!(truncated[cut], full[cut], "row {cut}");
    }
    Ok(())
}

#[test]
fn later_rows_do_not_change_earlier_values() -> Result<()> {
    let bars = walk(11, 120);
    let baseline = enrich_bars(&bars)?;
    let mut mutated = bars.clone();
    for bar in &mut mutated[60..] {
        bar.close *= 3.0;
        bar.high *= 3.0;
        bar.low *= 0.5;
    }
    let changed = enrich_bars(&mutated)?;
    assert_eq!(&changed[..60], &baseline[..60]);
    assert_ne!(changed[60], baseline[60]);
    Ok(())
}

#[test]
fn short_series_averages_what_exists() -> Result<()> {
    let bars = walk(3, 9);
    let rows = enrich_bars(&bars)?;
    let last = rows.last().unwrap();
    let mean = bars.iter().map(|b| b.close).sum::<f64>() / bars.len() as f64;
    assert_eq!(last.ma_12, round2(mean));
    assert_eq!(last.ma_200, round2(mean));
    Ok(())
}

#[test]
fn drawdown_is_never_positive_and_zero_only_at_peaks() -> Result<()> {
    let bars = walk(5, 300);
    let rows = enrich_bars(&bars)?;
    let mut running_max = f64::MIN;
    for row in &rows {
        running_max = running_max.max(row.bar.close);
        assert_eq!(row.peak_close, running_max);
        let drawdown = row.drawdown.unwrap();
        assert!(drawdown <= 0.0);
        assert_eq!(drawdown == 0.0, row.bar.close == running_max);
    }
    Ok(())
}

#[test]
fn momentum_looks_back_exactly_seven_rows() -> Result<()> {
    let bars = walk(9, 30);
    let rows = enrich_bars(&bars)?;
    for (idx, row) in rows.iter().enumerate() {
        if idx < MOMENTUM_LAG {
            assert_eq!(row.close_7_days_ago, None);
            assert_eq!(row.momentum_7d, None);
        } else {
            let base = bars[idx - MOMENTUM_LAG].close;
            assert_eq!(row.close_7_days_ago, Some(base));
            assert_eq!(
                row.momentum_7d,
                Some(round2((row.bar.close - base) / base * 100.0))
            );
        }
    }
    Ok(())
}

#[test]
fn output_is_deterministic_across_runs_and_pool_sizes() -> Result<()> {
    let series = || {
        vec![
            TickerSeries::new("AAA", walk(1, 400)),
            TickerSeries::new("BBB", walk(2, 250)),
            TickerSeries::new("CCC", walk(3, 40)),
        ]
    };
    let build = PanelBuilder::new(&["CCC", "AAA", "BBB"]).build(series())?;
    let single = ComputeContext::new(1, run_date())?;
    let many = ComputeContext::new(4, run_date())?;
    let a = FeatureEngine::new(&single).enrich(&build.panel)?;
    let b = FeatureEngine::new(&many).enrich(&build.panel)?;
    let c = FeatureEngine::new(&many).enrich(&build.panel)?;
    assert_eq!(a.panel.fingerprint()?, b.panel.fingerprint()?);
    assert_eq!(b.panel.fingerprint()?, c.panel.fingerprint()?);
    assert_eq!(
        a.panel.tickers(),
        &["AAA".to_string(), "BBB".to_string(), "CCC".to_string()]
    );
    Ok(())
}

#[test]
fn tickers_do_not_leak_into_each_other() -> Result<()> {
    let ctx = ComputeContext::new(2, run_date())?;
    let alone = PanelBuilder::new(&["AAA"]).build(vec![TickerSeries::new("AAA", walk(1, 80))])?;
    let together = PanelBuilder::new(&["AAA", "BBB"]).build(vec![
        TickerSeries::new("BBB", walk(2, 300)),
        TickerSeries::new("AAA", walk(1, 80)),
    ])?;
    let alone_rows = FeatureEngine::new(&ctx).enrich(&alone.panel)?.panel.rows()?;
    let together_rows: Vec<_> = FeatureEngine::new(&ctx)
        .enrich(&together.panel)?
        .panel
        .rows()?
        .into_iter()
        .filter(|r| r.ticker == "AAA")
        .collect();
    assert_eq!(alone_rows, together_rows);
    Ok(())
}
