mod lines;

use serde_json::json;

use crate::args::OutputFormat;
use crate::error::AppResult;
use crate::load::LoadRunStats;

pub(crate) use lines::summary_lines;

/// Prints the run summary on stdout in the requested format.
pub(crate) fn print_summary(
    stats: &LoadRunStats,
    top_failures: usize,
    format: OutputFormat,
) -> AppResult<()> {
    match format {
        OutputFormat::Text => {
            for line in summary_lines(stats, top_failures) {
                println!("{}", line);
            }
        }
        OutputFormat::Json => {
            let summary = summary_json(stats, top_failures);
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
    }
    Ok(())
}

pub(crate) fn summary_json(stats: &LoadRunStats, top_failures: usize) -> serde_json::Value {
    let failures: Vec<serde_json::Value> = stats
        .top_failures(top_failures)
        .into_iter()
        .map(|(category, count)| json!({ "category": category, "count": count }))
        .collect();

    json!({
        "completed": stats.completed(),
        "end": stats.end.as_str(),
        "requested": stats.requested,
        "attempted": stats.attempted,
        "succeeded": stats.succeeded,
        "failed": stats.failed,
        "abandoned": stats.abandoned(),
        "elapsed_ms": u64::try_from(stats.elapsed.as_millis()).unwrap_or(u64::MAX),
        "success_rate_x100": stats.success_rate_x100(),
        "throughput_x100": stats.throughput_x100(),
        "peak_in_flight": stats.peak_in_flight,
        "latency_ms": {
            "count": stats.latency.count,
            "avg": stats.average_success_ms(),
            "min": stats.latency.min_ms,
            "p50": stats.latency.p50_ms,
            "p90": stats.latency.p90_ms,
            "p99": stats.latency.p99_ms,
            "max": stats.latency.max_ms,
        },
        "top_failures": failures,
    })
}
