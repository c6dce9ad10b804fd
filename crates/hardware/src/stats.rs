//! Simulation statistics collection and reporting.
//!
//! This module summarises a finished (or interrupted) run. It provides:
//! 1. **Summary:** Host time, ticks, retired instructions and derived rates.
//! 2. **Core:** The named counters reported by the core model.
//! 3. **Program:** Exit code and the size of captured output.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{Duration, Instant};

/// Section names for selective stats output.
///
/// Valid section identifiers: `"summary"`, `"core"`, `"program"`.
/// Pass an empty slice to [`SimStats::render_sections`] to render all sections.
pub const STATS_SECTIONS: &[&str] = &["summary", "core", "program"];

const RULE: &str = "==========================================================";
const THIN_RULE: &str = "----------------------------------------------------------";

/// Statistics of one simulation run.
#[derive(Clone, Debug)]
pub struct SimStats {
    start_time: Instant,
    elapsed: Option<Duration>,
    /// Simulator ticks elapsed.
    pub ticks: u64,
    /// Instructions retired by the core.
    pub instructions_retired: u64,
    /// Counters reported by the core model.
    pub core: BTreeMap<String, String>,
    /// Exit code of the program, if it exited.
    pub exit_code: Option<i64>,
    /// Bytes written to stdout.
    pub stdout_bytes: usize,
    /// Bytes written to stderr.
    pub stderr_bytes: usize,
}

impl Default for SimStats {
    fn default() -> Self {
        Self {
            start_time: Instant::now(),
            elapsed: None,
            ticks: 0,
            instructions_retired: 0,
            core: BTreeMap::new(),
            exit_code: None,
            stdout_bytes: 0,
            stderr_bytes: 0,
        }
    }
}

impl SimStats {
    /// Starts the host timer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stops the host timer; later renders report the stopped duration.
    pub fn finish(&mut self) {
        self.elapsed = Some(self.start_time.elapsed());
    }

    /// Host time spent simulating.
    pub fn host_time(&self) -> Duration {
        self.elapsed.unwrap_or_else(|| self.start_time.elapsed())
    }

    /// Retired instructions per tick.
    pub fn ipc(&self) -> f64 {
        self.instructions_retired as f64 / self.ticks.max(1) as f64
    }

    /// Renders the requested sections.
    ///
    /// # Arguments
    ///
    /// * `sections` - Section names from [`STATS_SECTIONS`], or empty for all.
    ///
    /// # Returns
    ///
    /// The report text, one statistic per line.
    pub fn render_sections(&self, sections: &[String]) -> String {
        let want = |s: &str| sections.is_empty() || sections.iter().any(|x| x == s);
        let seconds = self.host_time().as_secs_f64().max(f64::EPSILON);
        let mut out = String::new();

        if want("summary") {
            let khz = (self.ticks as f64 / seconds) / 1000.0;
            let mips = (self.instructions_retired as f64 / seconds) / 1_000_000.0;
            out.push_str(&format!("\n{RULE}\nSIMULATION STATISTICS\n{RULE}\n"));
            out.push_str(&format!("host_seconds             {seconds:.4} s\n"));
            out.push_str(&format!("sim_ticks                {}\n", self.ticks));
            out.push_str(&format!("sim_freq                 {khz:.2} kHz\n"));
            out.push_str(&format!("sim_insts                {}\n", self.instructions_retired));
            out.push_str(&format!("sim_ipc                  {:.4}\n", self.ipc()));
            out.push_str(&format!("sim_mips                 {mips:.2}\n"));
            out.push_str(THIN_RULE);
            out.push('\n');
        }
        if want("core") && !self.core.is_empty() {
            out.push_str("CORE\n");
            for (name, value) in &self.core {
                out.push_str(&format!("  {name:<23}{value}\n"));
            }
            out.push_str(THIN_RULE);
            out.push('\n');
        }
        if want("program") {
            let exit = self
                .exit_code
                .map_or_else(|| "none".to_owned(), |code| code.to_string());
            out.push_str("PROGRAM\n");
            out.push_str(&format!("  exit_code              {exit}\n"));
            out.push_str(&format!("  stdout_bytes           {}\n", self.stdout_bytes));
            out.push_str(&format!("  stderr_bytes           {}\n", self.stderr_bytes));
            out.push_str(THIN_RULE);
            out.push('\n');
        }
        out
    }
}

impl fmt::Display for SimStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render_sections(&[]))
    }
}
