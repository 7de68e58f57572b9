// ── Local-host accounting source ──

use std::process::Command;

use tracing::debug;

use crate::error::{CoreError, ExecutionKind};

pub const LOCAL_CONNTRACK: &str = "/proc/net/nf_conntrack";

const LOCAL_LABEL: &str = "localhost";

/// Read this host's conntrack table. Blocking; run it on the worker pool.
///
/// Falls back to `conntrack -L` when the proc file is unavailable.
pub fn read_local_conntrack() -> Result<String, CoreError> {
    match std::fs::read_to_string(LOCAL_CONNTRACK) {
        Ok(text) => return Ok(text),
        Err(e) => debug!(path = LOCAL_CONNTRACK, error = %e, "falling back to conntrack -L"),
    }

    let output = Command::new("conntrack")
        .arg("-L")
        .output()
        .map_err(|e| CoreError::Execution {
            device: LOCAL_LABEL.into(),
            kind: ExecutionKind::RemoteCommand,
            message: format!("neither {LOCAL_CONNTRACK} nor conntrack(8) is available: {e}"),
        })?;
    if !output.status.success() {
        return Err(CoreError::Execution {
            device: LOCAL_LABEL.into(),
            kind: ExecutionKind::RemoteCommand,
            message: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
