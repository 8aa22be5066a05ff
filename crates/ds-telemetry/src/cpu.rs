//! Process CPU-time sampling, Linux-only; other targets report `None`
//! rather than failing the sample (spec.md §4.K, §9 "Clock alignment").

/// CPU time consumed by this process so far, in clock ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuTicks {
    pub user: u64,
    pub sys: u64,
}

#[cfg(target_os = "linux")]
pub fn sample() -> Option<CpuTicks> {
    let stat = std::fs::read_to_string("/proc/self/stat").ok()?;
    // Fields are space-separated; the command name (field 2) may itself
    // contain spaces and is wrapped in parens, so split on the closing paren
    // first and index from there.
    let after_comm = stat.rsplit_once(')')?.1;
    let fields: Vec<&str> = after_comm.split_whitespace().collect();
    // After the comm field, state is index 0; utime is index 11, stime 12
    // (1-indexed fields 14 and 15 of the full record).
    let utime: u64 = fields.get(11)?.parse().ok()?;
    let stime: u64 = fields.get(12)?.parse().ok()?;
    Some(CpuTicks {
        user: utime,
        sys: stime,
    })
}

#[cfg(not(target_os = "linux"))]
pub fn sample() -> Option<CpuTicks> {
    None
}

#[cfg(target_os = "linux")]
pub fn ticks_per_second() -> u64 {
    // sysconf(_SC_CLK_TCK) is 100 on effectively every Linux target; avoid an
    // extra libc dependency for a value that has been stable for decades.
    100
}

#[cfg(not(target_os = "linux"))]
pub fn ticks_per_second() -> u64 {
    100
}

#[cfg(all(test, target_os = "linux"))]
mod tests {
    use super::*;

    #[test]
    fn sample_reads_self_stat_without_error() {
        let ticks = sample().expect("/proc/self/stat should be readable under test");
        assert!(ticks.user < u64::MAX);
        assert!(ticks.sys < u64::MAX);
    }
}
