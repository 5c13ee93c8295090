mod support_cli;

use support_cli::{expect_success, run_rpcstress};

fn json_field<'value>(
    value: &'value serde_json::Value,
    field: &str,
) -> Result<&'value serde_json::Value, String> {
    value
        .get(field)
        .ok_or_else(|| format!("missing {} in {}", field, value))
}

#[test]
fn e2e_generate_prints_registrations() -> Result<(), String> {
    let output = run_rpcstress(["generate", "-n", "3", "--output-format", "json"])?;
    let stdout = expect_success(&output)?;

    let users: Vec<serde_json::Value> = stdout
        .lines()
        .map(serde_json::from_str)
        .collect::<Result<_, _>>()
        .map_err(|err| format!("generate output is not JSON lines: {}", err))?;
    if users.len() != 3 {
        return Err(format!("expected 3 users, got {}", users.len()));
    }
    for user in &users {
        let dni = json_field(user, "dni")?.as_str().unwrap_or_default();
        if dni.len() != 8 || !dni.bytes().all(|byte| byte.is_ascii_digit()) {
            return Err(format!("bad dni in {}", user));
        }
    }
    Ok(())
}

#[test]
fn e2e_send_random_user_in_memory() -> Result<(), String> {
    let output = run_rpcstress([
        "--transport",
        "memory",
        "send",
        "--random",
        "--output-format",
        "json",
    ])?;
    let stdout = expect_success(&output)?;
    let reply: serde_json::Value =
        serde_json::from_str(&stdout).map_err(|err| format!("send output: {}", err))?;

    if json_field(&reply, "success")? != &serde_json::Value::Bool(true) {
        return Err(format!("registration should succeed: {}", reply));
    }
    let status = json_field(json_field(&reply, "reply")?, "status")?;
    if status.as_str() != Some("success") {
        return Err(format!("unexpected status {}", status));
    }
    Ok(())
}

#[test]
fn e2e_send_rejects_invalid_dni() -> Result<(), String> {
    let output = run_rpcstress([
        "--transport",
        "memory",
        "send",
        "--data",
        r#"{"nombre":"Ana","correo":"ana@example.com","clave":"x","dni":"12","telefono":"900000000"}"#,
    ])?;
    if output.status.success() {
        return Err("an invalid DNI must fail before sending".to_owned());
    }
    Ok(())
}

#[test]
fn e2e_load_summary_in_memory() -> Result<(), String> {
    let output = run_rpcstress([
        "--transport",
        "memory",
        "--output-format",
        "json",
        "load",
        "-n",
        "50",
        "-c",
        "5",
    ])?;
    let stdout = expect_success(&output)?;
    let summary: serde_json::Value =
        serde_json::from_str(&stdout).map_err(|err| format!("load output: {}", err))?;

    if json_field(&summary, "completed")? != &serde_json::Value::Bool(true) {
        return Err(format!("run should complete: {}", summary));
    }
    if json_field(&summary, "attempted")?.as_u64() != Some(50) {
        return Err(format!("unexpected attempted count: {}", summary));
    }
    let succeeded = json_field(&summary, "succeeded")?.as_u64().unwrap_or(0);
    let failed = json_field(&summary, "failed")?.as_u64().unwrap_or(0);
    if succeeded.saturating_add(failed) != 50 || succeeded == 0 {
        return Err(format!("unexpected outcome counts: {}", summary));
    }
    let peak = json_field(&summary, "peak_in_flight")?.as_u64().unwrap_or(0);
    if peak > 5 {
        return Err(format!("concurrency limit exceeded: {}", summary));
    }
    Ok(())
}

#[test]
fn e2e_text_summary_lists_counts() -> Result<(), String> {
    let output = run_rpcstress([
        "--transport",
        "memory",
        "load",
        "-n",
        "20",
        "-c",
        "4",
        "--no-progress",
    ])?;
    let stdout = expect_success(&output)?;
    for expected in ["Run: completed", "Requested: 20", "Attempted: 20", "Throughput:"] {
        if !stdout.contains(expected) {
            return Err(format!("missing {:?} in:\n{}", expected, stdout));
        }
    }
    Ok(())
}

#[cfg(not(feature = "amqp"))]
#[test]
fn e2e_amqp_without_feature_fails_cleanly() -> Result<(), String> {
    let output = run_rpcstress([
        "send",
        "--random",
        "--connect-attempts",
        "1",
        "--connect-retry-delay",
        "10ms",
    ])?;
    if output.status.success() {
        return Err("amqp transport is unavailable in this build".to_owned());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    if !stderr.contains("amqp") {
        return Err(format!("error should name the missing feature: {}", stderr));
    }
    Ok(())
}
