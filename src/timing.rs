use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{Duration, Instant};

/// Wall-clock timer started at construction.
#[derive(Debug, Clone, Copy)]
pub struct PhaseTimer {
    start: Instant,
}

impl PhaseTimer {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Elapsed time of each benchmark phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkReport {
    pub data: Duration,
    pub train: Duration,
    pub test: Duration,
    pub total: Duration,
}

impl BenchmarkReport {
    pub fn phases(&self) -> [(&'static str, Duration); 4] {
        [
            ("Data", self.data),
            ("Train", self.train),
            ("Test", self.test),
            ("Total", self.total),
        ]
    }

    /// Prints one timing line per phase to stdout.
    pub fn print(&self) {
        for (label, duration) in self.phases() {
            print_time(label, duration);
        }
    }
}

impl fmt::Display for BenchmarkReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let lines: Vec<String> = self
            .phases()
            .iter()
            .map(|(label, duration)| time_line(label, *duration))
            .collect();
        write!(f, "{}", lines.join("\n"))
    }
}

/// `"<min> min <sec> sec <ms> ms"`
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    let minutes = millis / 60_000;
    let seconds = (millis / 1000) % 60;
    let millis = millis % 1000;
    format!("{minutes} min {seconds} sec {millis} ms")
}

fn time_line(label: &str, duration: Duration) -> String {
    format!("{label} time: {}", format_duration(duration))
}

pub fn print_time(label: &str, duration: Duration) {
    println!("{}", time_line(label, duration));
}
