// CLI behavior that needs no browser
use anyhow::Result;
use serde_json::Value;
use std::fs;
use std::process::Command;
use tempfile::TempDir;

/// Helper to run pagesense and parse its stdout as JSON
fn run_command(args: &[&str]) -> Result<(Value, i32)> {
    let output = Command::new(env!("CARGO_BIN_EXE_pagesense"))
        .args(args)
        .output()?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    let exit_code = output.status.code().unwrap_or(-1);
    let json = serde_json::from_str(&stdout).unwrap_or(Value::String(stdout.to_string()));
    Ok((json, exit_code))
}

#[test]
fn test_legend() -> Result<()> {
    let (output, code) = run_command(&["legend"])?;
    assert_eq!(code, 0);
    let text = output.as_str().unwrap_or_default();
    assert!(text.contains("i=id"));
    assert!(text.contains("btn=button"));

    let (output, code) = run_command(&["legend", "--format", "json"])?;
    assert_eq!(code, 0);
    assert_eq!(output["roles"]["checkbox"], "chk");
    assert!(output["legend"].as_str().unwrap().contains("b=box"));
    Ok(())
}

#[test]
fn test_check_size_within_limit() -> Result<()> {
    let dir = TempDir::new()?;
    let file = dir.path().join("payload.json");
    fs::write(&file, r#"[{"i":"1","r":"btn","n":"Save"}]"#)?;

    let (output, code) = run_command(&["check-size", file.to_str().unwrap()])?;
    assert_eq!(code, 0);
    assert_eq!(output["bytes"], 32);
    assert_eq!(output["estimated_tokens"], 8);
    assert_eq!(output["warned"], false);
    Ok(())
}

#[test]
fn test_check_size_over_limit_exits_3() -> Result<()> {
    let dir = TempDir::new()?;
    let file = dir.path().join("payload.json");
    fs::write(&file, "x".repeat(100))?;

    let (output, code) = run_command(&["check-size", file.to_str().unwrap(), "--max-bytes", "100"])?;
    assert_eq!(code, 3);
    assert_eq!(output["error"], true);
    assert_eq!(output["exit_code"], 3);
    assert!(output["message"].as_str().unwrap().contains("100 bytes"));
    Ok(())
}

#[test]
fn test_size_limits_from_config_file() -> Result<()> {
    let dir = TempDir::new()?;
    let config = dir.path().join("pagesense.json");
    fs::write(&config, r#"{"size": {"warn_bytes": 4, "max_bytes": 1000}}"#)?;
    let file = dir.path().join("payload.json");
    fs::write(&file, "[1,2,3]")?;

    let (output, code) = run_command(&[
        "check-size",
        file.to_str().unwrap(),
        "--config",
        config.to_str().unwrap(),
    ])?;
    assert_eq!(code, 0);
    assert_eq!(output["warned"], true);
    Ok(())
}

#[test]
fn test_generic_failures_exit_1() -> Result<()> {
    let (output, code) = run_command(&["check-size", "/nonexistent/payload.json"])?;
    assert_eq!(code, 1);
    assert!(output["message"].as_str().unwrap().contains("Failed to read"));

    let dir = TempDir::new()?;
    let config = dir.path().join("broken.json");
    fs::write(&config, "{")?;
    let (output, code) = run_command(&["legend", "--config", config.to_str().unwrap()])?;
    assert_eq!(code, 1);
    assert!(output["message"].as_str().unwrap().contains("Invalid config file"));
    Ok(())
}

#[test]
fn test_invalid_url_fails_before_launching() -> Result<()> {
    let (output, code) = run_command(&["extract", "not a url"])?;
    assert_eq!(code, 1);
    assert!(output["message"].as_str().unwrap().contains("Invalid URL"));
    Ok(())
}
