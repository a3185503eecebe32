use crate::engine::{ScenarioStats, ScenarioStatus, Stats};
use crate::types::{CounterName, Plan};
use std::io::{self, BufWriter, Write};

const HEADER: [&str; 11] = [
    "Scenario", "Total", "Success", "Failed", "Timeout", "Invalid", "P99", "Duration", "RPS",
    "Passed", "Status",
];

pub fn print_summary(plan: &Plan, stats: &Stats) -> io::Result<()> {
    let stdout = io::stdout();
    let mut writer = BufWriter::new(stdout.lock());
    write_summary(&mut writer, plan, stats)?;
    writer.flush()
}

pub fn write_summary<W: Write>(writer: &mut W, plan: &Plan, stats: &Stats) -> io::Result<()> {
    writeln!(writer, "Plan: {}", plan.name)?;
    writeln!(writer)?;

    let rows: Vec<[String; 11]> = stats.scenarios().iter().map(row).collect();

    let mut widths = HEADER.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.len());
        }
    }

    write_row(writer, &HEADER.map(String::from), &widths)?;
    let rule: usize = widths.iter().sum::<usize>() + 2 * (widths.len() - 1);
    writeln!(writer, "{}", "-".repeat(rule))?;
    for row in &rows {
        write_row(writer, row, &widths)?;
    }

    for scenario in stats.scenarios() {
        for outcome in scenario.thresholds.outcomes.iter().filter(|o| !o.passed) {
            writeln!(
                writer,
                "  {}: threshold failed: {} (actual: {})",
                scenario.name,
                outcome.condition,
                format_actual(outcome.metric, outcome.actual)
            )?;
        }
    }

    writeln!(writer)?;
    writeln!(
        writer,
        "Total duration: {}",
        humantime::format_duration(round_to_millis(stats.total_duration()))
    )?;

    let verdict = if stats.cancelled() {
        "Cancelled"
    } else if stats.all_passed() {
        "OK"
    } else {
        "Failed"
    };
    writeln!(writer, "{}", verdict)
}

fn row(scenario: &ScenarioStats) -> [String; 11] {
    let status = match &scenario.status {
        ScenarioStatus::Completed => "completed".to_string(),
        ScenarioStatus::Cancelled => "cancelled".to_string(),
        ScenarioStatus::Failed(reason) => format!("error: {}", reason),
    };

    [
        scenario.name.clone(),
        scenario.counter(CounterName::Total).to_string(),
        scenario.counter(CounterName::Success).to_string(),
        scenario.counter(CounterName::Failed).to_string(),
        scenario.counter(CounterName::Timeout).to_string(),
        scenario.counter(CounterName::Invalid).to_string(),
        format!("{} ms", scenario.latency_at_percentile(99.0)),
        humantime::format_duration(round_to_millis(scenario.duration)).to_string(),
        scenario.rps().to_string(),
        scenario.passed().to_string(),
        status,
    ]
}

fn write_row<W: Write>(writer: &mut W, cells: &[String; 11], widths: &[usize; 11]) -> io::Result<()> {
    let line = cells
        .iter()
        .zip(widths)
        .map(|(cell, width)| format!("{:<width$}", cell, width = width))
        .collect::<Vec<_>>()
        .join("  ");
    writeln!(writer, "{}", line.trim_end())
}

fn round_to_millis(duration: std::time::Duration) -> std::time::Duration {
    std::time::Duration::from_millis(duration.as_millis() as u64)
}

fn format_actual(metric: &str, value: f64) -> String {
    if metric == "latency" {
        format!("{:.0}ms", value)
    } else {
        format!("{:.4}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{Counters, Listener, ThresholdOutcome, ThresholdReport};
    use crate::types::{HttpClientConfig, RequestInfo};
    use std::sync::Arc;
    use std::time::Duration;

    fn scenario(name: &str, passed: bool) -> ScenarioStats {
        let counters = Arc::new(Counters::new());
        let info = RequestInfo {
            scenario: name.to_string(),
            method: "GET".to_string(),
            url: "http://localhost".to_string(),
            code: Some("200".to_string()),
        };
        for _ in 0..4 {
            counters.track_response(&info, true, Duration::from_millis(42));
        }

        let outcomes = if passed {
            Vec::new()
        } else {
            vec![ThresholdOutcome {
                metric: "checks",
                condition: "code pass rate >= 1".to_string(),
                actual: 0.9,
                passed: false,
            }]
        };

        ScenarioStats {
            name: name.to_string(),
            counters,
            duration: Duration::from_secs(2),
            thresholds: ThresholdReport { passed, outcomes },
            status: ScenarioStatus::Completed,
        }
    }

    fn plan() -> Plan {
        Plan {
            name: "smoke".to_string(),
            parallel: false,
            http_client: HttpClientConfig::default(),
            scenarios: Vec::new(),
        }
    }

    fn render(stats: &Stats) -> String {
        let mut out = Vec::new();
        write_summary(&mut out, &plan(), stats).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_summary_rows() {
        let stats = Stats::new(vec![scenario("home", true)], false, Duration::from_secs(2));
        let output = render(&stats);

        assert!(output.starts_with("Plan: smoke"));
        assert!(output.contains("Scenario"));
        let line = output.lines().find(|l| l.starts_with("home")).unwrap();
        let cells: Vec<&str> = line.split_whitespace().collect();
        assert_eq!(cells[1], "4");
        assert_eq!(cells[2], "4");
        assert!(line.contains("42 ms"));
        assert!(line.contains("true"));
        assert!(output.contains("Total duration: 2s"));
        assert!(output.trim_end().ends_with("OK"));
    }

    #[test]
    fn test_summary_lists_failed_thresholds() {
        let stats = Stats::new(vec![scenario("home", false)], false, Duration::from_secs(2));
        let output = render(&stats);

        assert!(output.contains("home: threshold failed: code pass rate >= 1 (actual: 0.9000)"));
        assert!(output.trim_end().ends_with("Failed"));
    }

    #[test]
    fn test_summary_marks_cancelled() {
        let stats = Stats::new(vec![scenario("home", true)], true, Duration::from_secs(2));
        assert!(render(&stats).trim_end().ends_with("Cancelled"));
    }
}
