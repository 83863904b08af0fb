use serde::Serialize;
use std::collections::HashMap;

use once_cell::sync::Lazy;

#[derive(Debug, Clone, Serialize)]
pub struct TickerProfile {
    pub symbol: &'static str,
    pub name: &'static str,
}

const fn profile(symbol: &'static str, name: &'static str) -> TickerProfile {
    TickerProfile { symbol, name }
}

/// The fixed set of large caps the daily job tracks, in download order.
pub const DEFAULT_UNIVERSE: [TickerProfile; 30] = [
    profile("AAPL", "Apple"),
    profile("MSFT", "Microsoft"),
    profile("NVDA", "NVIDIA"),
    profile("GOOGL", "Alphabet Class A"),
    profile("AMZN", "Amazon"),
    profile("META", "Meta Platforms"),
    profile("AVGO", "Broadcom"),
    profile("BRK-B", "Berkshire Hathaway Class B"),
    profile("TSLA", "Tesla"),
    profile("TSM", "Taiwan Semiconductor ADR"),
    profile("JPM", "JPMorgan Chase"),
    profile("WMT", "Walmart"),
    profile("LLY", "Eli Lilly"),
    profile("ORCL", "Oracle"),
    profile("V", "Visa"),
    profile("MA", "Mastercard"),
    profile("NFLX", "Netflix"),
    profile("XOM", "Exxon Mobil"),
    profile("COST", "Costco"),
    profile("JNJ", "Johnson & Johnson"),
    profile("ABBV", "AbbVie"),
    profile("SAP", "SAP ADR"),
    profile("BABA", "Alibaba ADR"),
    profile("GS", "Goldman Sachs"),
    profile("HD", "Home Depot"),
    profile("VRTX", "Vertex Pharmaceuticals"),
    profile("UNH", "UnitedHealth"),
    profile("MRK", "Merck"),
    profile("PEP", "PepsiCo"),
    profile("TMO", "Thermo Fisher Scientific"),
];

static PROFILES: Lazy<HashMap<&'static str, &'static TickerProfile>> = Lazy::new(|| {
    DEFAULT_UNIVERSE
        .iter()
        .map(|profile| (profile.symbol, profile))
        .collect()
});

/// Canonical form of a user-typed symbol: trimmed, upper case, with the
/// share-class separator written as `-`.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_ascii_uppercase().replace('.', "-")
}

/// Look up a symbol case-insensitively. `brk.b` and `BRK-B` both resolve.
pub fn find_ticker(symbol: &str) -> Option<&'static TickerProfile> {
    PROFILES.get(normalize_symbol(symbol).as_str()).copied()
}

pub fn default_tickers() -> Vec<String> {
    DEFAULT_UNIVERSE
        .iter()
        .map(|profile| profile.symbol.to_string())
        .collect()
}
