use std::path::Path;
use std::process::ExitStatus;

use crate::error::IsolationError;

/// Ctrl+C / Ctrl+Break exit code on Windows.
const WINDOWS_CTRL_C: i32 = 0xC000_013Au32 as i32;

/// Human-readable hint for an abnormal exit code.
///
/// Signals are reported as negative codes (`-9` for SIGKILL).
pub fn exit_diagnostic(code: i32) -> Option<&'static str> {
  match code {
    -9 => Some(
      "This indicates that the process exited due to a SIGKILL signal. Typically, this is either \
       caused by manual cancellation or high memory usage causing the operating system to \
       terminate the process.",
    ),
    -15 => Some(
      "This indicates that the process exited due to a SIGTERM signal. Typically, this is caused \
       by manual cancellation.",
    ),
    247 => Some("This indicates that the process was terminated due to high memory usage."),
    code if cfg!(windows) && code == WINDOWS_CTRL_C => Some(
      "Process was terminated due to a Ctrl+C or Ctrl+Break signal. Typically, this is caused by \
       manual cancellation.",
    ),
    _ => None,
  }
}

/// Exit code with signals folded in as negative numbers.
pub fn exit_code(status: &ExitStatus) -> Option<i32> {
  #[cfg(unix)]
  {
    use std::os::unix::process::ExitStatusExt;
    if let Some(signal) = status.signal() {
      return Some(-signal);
    }
  }
  status.code()
}

/// Turn an unsuccessful exit into an error carrying its diagnostic.
pub fn describe_exit(program: &Path, status: &ExitStatus) -> IsolationError {
  let code = exit_code(status);
  let detail = code
    .and_then(exit_diagnostic)
    .map(|d| format!("; {}", d))
    .unwrap_or_default();
  IsolationError::Process {
    program: program.display().to_string(),
    code,
    detail,
  }
}
