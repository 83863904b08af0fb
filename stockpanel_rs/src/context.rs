use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use rayon::{ThreadPool, ThreadPoolBuilder};

/// Per-run execution context handed to the feature engine. Owns the worker
/// pool so per-ticker computation never touches the global rayon pool.
pub struct ComputeContext {
    pool: ThreadPool,
    run_id: String,
    run_date: NaiveDate,
}

impl ComputeContext {
    /// `n_workers == 0` sizes the pool to the available cores.
    pub fn new(n_workers: usize, run_date: NaiveDate) -> Result<Self> {
        let mut builder =
            ThreadPoolBuilder::new().thread_name(|idx| format!("stockpanel-worker-{idx}"));
        if n_workers > 0 {
            builder = builder.num_threads(n_workers);
        }
        let pool = builder.build().context("Failed to build worker pool")?;
        let run_id = format!("{}-{}", run_date, Local::now().format("%H%M%S%3f"));
        Ok(Self {
            pool,
            run_id,
            run_date,
        })
    }

    pub fn install<OP, R>(&self, op: OP) -> R
    where
        OP: FnOnce() -> R + Send,
        R: Send,
    {
        self.pool.install(op)
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn run_date(&self) -> NaiveDate {
        self.run_date
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_worker_count_is_honoured() -> Result<()> {
        let day = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let ctx = ComputeContext::new(2, day)?;
        assert_eq!(ctx.workers(), 2);
        assert_eq!(ctx.run_date(), day);
        assert!(ctx.run_id().starts_with("2024-03-01-"));
        let name = ctx.install(|| std::thread::current().name().map(str::to_string));
        assert!(name.is_some_and(|n| n.starts_with("stockpanel-worker-")));
        Ok(())
    }

    #[test]
    fn zero_workers_uses_default_pool_size() -> Result<()> {
        let ctx = ComputeContext::new(0, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())?;
        assert!(ctx.workers() >= 1);
        Ok(())
    }
}
