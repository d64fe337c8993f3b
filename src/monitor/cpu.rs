use std::fs;
use thiserror::Error;

pub const PROC_STAT: &str = "/proc/stat";

#[derive(Debug, Error)]
pub enum CpuError{
    #[error("failed to read /proc/stat: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse /proc/stat: {0}")]
    Parse(String),
}

/// Aggregate jiffy counters from the `cpu ` line of /proc/stat.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuSample{
    pub user: u64,
    pub nice: u64,
    pub system: u64,
    pub idle: u64,
    pub iowait: u64,
    pub irq: u64,
    pub softirq: u64,
    pub steal: u64,
}

impl CpuSample{
    pub fn read() -> Result<Self, CpuError>{
        let content = fs::read_to_string(PROC_STAT)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, CpuError>{
        let line = content
            .lines()
            .find(|l| l.starts_with("cpu "))
            .ok_or_else(|| CpuError::Parse("no aggregate cpu line".to_string()))?;

        let counters = line
            .split_whitespace()
            .skip(1)
            .map(|field| field.parse::<u64>().map_err(|_| CpuError::Parse(format!("bad counter '{}'", field))))
            .collect::<Result<Vec<u64>, CpuError>>()?;
        if counters.len() < 4{
            return Err(CpuError::Parse(format!("expected at least 4 counters, got {}", counters.len())));
        }

        //trailing counters are absent on old kernels
        let at = |i: usize| counters.get(i).copied().unwrap_or(0);
        Ok(CpuSample{
            user: at(0),
            nice: at(1),
            system: at(2),
            idle: at(3),
            iowait: at(4),
            irq: at(5),
            softirq: at(6),
            steal: at(7),
        })
    }

    //user + nice + system + idle
    fn total(&self) -> u64{
        self.user
            .saturating_add(self.nice)
            .saturating_add(self.system)
            .saturating_add(self.idle)
    }

    /// Busy share since boot, in percent.
    pub fn usage_since_boot(&self) -> f64{
        percent(self.total().saturating_sub(self.idle), self.total())
    }

    /// Busy share between two samples; 0 when no time elapsed.
    pub fn usage_between(prev: &CpuSample, curr: &CpuSample) -> f64{
        let total = curr.total().saturating_sub(prev.total());
        let idle = curr.idle.saturating_sub(prev.idle);
        percent(total.saturating_sub(idle), total)
    }
}

fn percent(busy: u64, total: u64) -> f64{
    if total == 0{
        return 0.0;
    }
    busy as f64 / total as f64 * 100.0
}
