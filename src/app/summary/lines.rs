use crate::load::LoadRunStats;

/// Scale of the fixed-point rates in [`LoadRunStats`].
const PERCENT_DIVISOR: u64 = 100;
const MS_PER_SEC: u64 = 1_000;

pub(crate) fn summary_lines(stats: &LoadRunStats, top_failures: usize) -> Vec<String> {
    let mut lines = Vec::new();

    if stats.completed() {
        lines.push("Run: completed".to_owned());
    } else {
        lines.push(format!("Run: {} (degraded summary)", stats.end.as_str()));
    }
    lines.push(format!("Requested: {}", stats.requested));
    lines.push(format!("Attempted: {}", stats.attempted));
    lines.push(format!(
        "Successful: {} ({}%)",
        stats.succeeded,
        format_x100(stats.success_rate_x100())
    ));
    lines.push(format!("Failed: {}", stats.failed));
    let abandoned = stats.abandoned();
    if abandoned > 0 {
        lines.push(format!("Abandoned: {}", abandoned));
    }

    let elapsed_ms = u64::try_from(stats.elapsed.as_millis()).unwrap_or(u64::MAX);
    lines.push(format!("Total Time: {}", format_duration_ms(elapsed_ms)));
    match stats.average_success_ms() {
        Some(average) => lines.push(format!("Avg Time per Success: {}ms", average)),
        None => lines.push("Avg Time per Success: n/a".to_owned()),
    }
    lines.push(format!(
        "Throughput: {} req/s",
        format_x100(stats.throughput_x100())
    ));
    if stats.latency.count > 0 {
        lines.push(format!(
            "P50/P90/P99 Latency: {}ms / {}ms / {}ms",
            stats.latency.p50_ms, stats.latency.p90_ms, stats.latency.p99_ms
        ));
        lines.push(format!(
            "Min/Max Latency: {}ms / {}ms",
            stats.latency.min_ms, stats.latency.max_ms
        ));
    }
    lines.push(format!("Peak In Flight: {}", stats.peak_in_flight));

    let failures = stats.top_failures(top_failures);
    if !failures.is_empty() {
        lines.push("Top Failures:".to_owned());
        for (rank, (category, count)) in (1_usize..).zip(failures) {
            lines.push(format!("  {}. {} ({})", rank, category, count));
        }
    }

    lines
}

fn format_x100(value: u64) -> String {
    format!(
        "{}.{:02}",
        value.checked_div(PERCENT_DIVISOR).unwrap_or(0),
        value.checked_rem(PERCENT_DIVISOR).unwrap_or(0)
    )
}

fn format_duration_ms(duration_ms: u64) -> String {
    format!(
        "{}.{:03}s",
        duration_ms.checked_div(MS_PER_SEC).unwrap_or(0),
        duration_ms.checked_rem(MS_PER_SEC).unwrap_or(0)
    )
}
