use clap::ValueEnum;

use stockpanel_rs::Kpi;

#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum KpiValue {
    Close,
    Volume,
    #[value(name = "daily-return")]
    DailyReturn,
    Volatility,
    #[value(name = "momentum-7d")]
    Momentum7d,
    #[value(name = "cumulative-return")]
    CumulativeReturn,
}

impl KpiValue {
    pub fn to_kpi(self) -> Kpi {
        match self {
            KpiValue::Close => Kpi::Close,
            KpiValue::Volume => Kpi::Volume,
            KpiValue::DailyReturn => Kpi::DailyReturn,
            KpiValue::Volatility => Kpi::Volatility,
            KpiValue::Momentum7d => Kpi::Momentum7d,
            KpiValue::CumulativeReturn => Kpi::CumulativeReturn,
        }
    }
}
