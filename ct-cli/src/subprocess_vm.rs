//! Wires an external VM-under-test binary to [`ct_core::TargetVm`] over a
//! line-delimited JSON pipe, the natural reader/writer for the state schema
//! spec.md §6 mandates (hex-encoded byte slices, unknown-fields rejected,
//! missing fields default to zero -- all handled by `ct-core::state`'s own
//! `serde` derives, not re-implemented here).
//!
//! Wire protocol (one line per message, both directions):
//!
//! - request:  `{"state": <VmState JSON>}`
//! - response: `{"state": <VmState JSON>}` on success, or
//!             `{"error": "unsupported_revision" | "panic" | "other", "detail": "..."}`
//!
//! The binary is spawned once per harness run and kept alive across every
//! step, matching spec.md §6's `step_n(state, n)` contract with `n` always
//! 1 (spec.md §6: "the harness only uses n = 1").

use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::sync::Mutex;

use ct_core::errors::VmError;
use ct_core::{TargetVm, VmState};
use serde::{Deserialize, Serialize};

#[derive(Serialize)]
struct Request<'a> {
    state: &'a VmState,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Response {
    Ok { state: VmState },
    Err { error: ErrorTag, detail: String },
}

#[derive(Deserialize)]
#[serde(rename_all = "snake_case")]
enum ErrorTag {
    UnsupportedRevision,
    Panic,
    Other,
}

/// A VM-under-test reached by spawning `path` and exchanging one JSON line
/// per step over its stdin/stdout. `step` takes `&self` (required by
/// `TargetVm`'s `Send + Sync` bound for the harness's worker pool), so the
/// child's pipes are behind a mutex -- one step is in flight per adapter
/// instance at a time, matching the one-adapter-per-harness-run topology
/// `ct-cli` constructs (each worker thread shares the same child process;
/// true per-thread parallelism would need one subprocess per worker, which
/// the harness does not currently spin up).
pub struct SubprocessVm {
    child: Mutex<Child>,
}

impl SubprocessVm {
    pub fn spawn(path: &Path) -> std::io::Result<Self> {
        let child = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()?;
        Ok(Self { child: Mutex::new(child) })
    }
}

impl TargetVm for SubprocessVm {
    fn step(&self, state: &VmState) -> Result<VmState, VmError> {
        let mut guard = self.child.lock().unwrap_or_else(|e| e.into_inner());
        let child = &mut *guard;

        let stdin = child
            .stdin
            .as_mut()
            .ok_or_else(|| VmError::Other("subprocess has no stdin pipe".to_string()))?;
        let request = serde_json::to_string(&Request { state }).map_err(|e| VmError::Other(e.to_string()))?;
        writeln!(stdin, "{request}").map_err(|e| VmError::Other(format!("write to subprocess: {e}")))?;
        stdin.flush().map_err(|e| VmError::Other(format!("flush subprocess stdin: {e}")))?;

        let stdout = child
            .stdout
            .as_mut()
            .ok_or_else(|| VmError::Other("subprocess has no stdout pipe".to_string()))?;
        let mut reader = BufReader::new(stdout);
        let mut line = String::new();
        let n = reader
            .read_line(&mut line)
            .map_err(|e| VmError::Other(format!("read from subprocess: {e}")))?;
        if n == 0 {
            return Err(VmError::Other("subprocess closed its stdout".to_string()));
        }

        let response: Response =
            serde_json::from_str(line.trim_end()).map_err(|e| VmError::Other(format!("malformed response: {e}")))?;
        match response {
            Response::Ok { state } => Ok(state),
            Response::Err { error: ErrorTag::UnsupportedRevision, .. } => {
                Err(VmError::UnsupportedRevision(state.revision))
            }
            Response::Err { error: ErrorTag::Panic, detail } => Err(VmError::Panic(detail)),
            Response::Err { error: ErrorTag::Other, detail } => Err(VmError::Other(detail)),
        }
    }
}

impl Drop for SubprocessVm {
    fn drop(&mut self) {
        if let Ok(mut child) = self.child.lock() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}
