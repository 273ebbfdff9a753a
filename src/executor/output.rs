//! Buffered, grouped-by-host rendering of dispatch results.

use std::fmt::Write;

use super::result_types::ExecResult;
use crate::ssh_service::diagnose;

/// Exit code the OpenSSH client uses for its own failures.
const SSH_CLIENT_FAILURE: i32 = 255;

/// One section per result, in input order.
pub fn format_grouped_output(results: &[ExecResult]) -> String {
    let mut buf = String::new();

    for (i, result) in results.iter().enumerate() {
        if i > 0 {
            buf.push('\n');
        }
        let _ = writeln!(buf, "═══ {} ═══", result.connection.id);

        buf.push_str(&result.stdout);
        buf.push_str(&result.stderr);

        if let Some(error) = &result.error {
            let _ = writeln!(buf, "Error: {} (exit code: {})", error, result.exit_code);

            if result.exit_code == SSH_CLIENT_FAILURE {
                if let Some(hint) = diagnose(&result.stderr, &result.connection) {
                    let _ = writeln!(buf, "Suggestion: {hint}");
                }
            }
        }
    }

    buf
}

pub fn count_errors(results: &[ExecResult]) -> usize {
    results.iter().filter(|r| r.error.is_some()).count()
}

pub fn has_errors(results: &[ExecResult]) -> bool {
    results.iter().any(|r| r.error.is_some())
}
