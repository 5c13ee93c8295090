use std::ffi::OsStr;
use std::process::{Command, Output};

use tempfile::TempDir;

/// Runs the `rpcstress` binary from an empty working directory so no config
/// file is picked up.
///
/// # Errors
///
/// Returns an error if the binary cannot be located or launched.
pub fn run_rpcstress<I, S>(args: I) -> Result<Output, String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let bin = rpcstress_bin()?;
    let workdir = TempDir::new().map_err(|err| format!("tempdir failed: {}", err))?;
    Command::new(bin)
        .args(args)
        .current_dir(workdir.path())
        .env("RPCSTRESS_LOG", "error")
        .env_remove("RPCSTRESS_TRANSPORT")
        .output()
        .map_err(|err| format!("run rpcstress failed: {}", err))
}

/// Fails with both output streams when the process did not exit cleanly.
///
/// # Errors
///
/// Returns an error describing the failed run.
pub fn expect_success(output: &Output) -> Result<String, String> {
    if !output.status.success() {
        return Err(format!(
            "status: {}\nstdout: {}\nstderr: {}",
            output.status,
            String::from_utf8_lossy(&output.stdout),
            String::from_utf8_lossy(&output.stderr)
        ));
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn rpcstress_bin() -> Result<String, String> {
    option_env!("CARGO_BIN_EXE_rpcstress").map_or_else(
        || Err("CARGO_BIN_EXE_rpcstress missing at compile time.".to_owned()),
        |path| Ok(path.to_owned()),
    )
}
