//! Run summary printed after shutdown.

use std::time::Duration;

use ingestion::ShutdownReport;

/// Print the shutdown report
pub fn print_summary(report: &ShutdownReport, duration: Duration) {
    println!();
    println!("{}", report.metrics);
    println!("Stop reason: {}", report.reason);
    println!("Duration: {:.2}s", duration.as_secs_f64());

    let secs = duration.as_secs_f64();
    if secs > 0.0 {
        println!(
            "Throughput: {:.2} msg/s",
            report.metrics.persisted as f64 / secs
        );
    }

    if !report.errors.is_empty() {
        println!("\nShutdown errors ({}):", report.errors.len());
        for error in &report.errors {
            println!("  - {error}");
        }
    }
    println!();
}
