//! Launch-flag manipulation for the local agent CLI.
//!
//! Two concerns:
//!
//! - **Permission flags**: before each spawn the local driver recomputes the
//!   native permission flags from the session's last observed
//!   [`PermissionMode`], stripping any previously injected ones so a relaunch
//!   never stacks conflicting settings.
//! - **One-time flags**: resume/continue directives apply only to the first
//!   spawn of a given identity. They are explicitly consumed (moved out of
//!   the argument vector) after the first attempt instead of being remembered
//!   and skipped.

use crate::mode::PermissionMode;

/// Flag that selects a permission mode by value.
const PERMISSION_MODE_FLAG: &str = "--permission-mode";
/// Flag that disables permission prompts entirely.
const SKIP_PERMISSIONS_FLAG: &str = "--dangerously-skip-permissions";

/// One-time flags that take a value argument.
const ONE_TIME_VALUE_FLAGS: &[&str] = &["--resume", "-r"];
/// One-time flags without a value.
const ONE_TIME_BARE_FLAGS: &[&str] = &["--continue", "-c", "--fork-session"];

/// Strip previously injected permission flags and apply `mode`.
///
/// Non-default modes append their native flag(s); `Default` appends nothing.
pub fn apply_permission_flags(args: &[String], mode: PermissionMode) -> Vec<String> {
    let mut out = strip_permission_flags(args);
    match mode {
        PermissionMode::Default => {}
        PermissionMode::AcceptEdits | PermissionMode::Plan => {
            out.push(PERMISSION_MODE_FLAG.to_owned());
            out.push(mode.as_str().to_owned());
        }
        PermissionMode::BypassPermissions => {
            out.push(SKIP_PERMISSIONS_FLAG.to_owned());
        }
    }
    out
}

/// Remove `--permission-mode <value>` pairs and `--dangerously-skip-permissions`.
fn strip_permission_flags(args: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(args.len());
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        if arg == PERMISSION_MODE_FLAG {
            // Drop the flag and its value.
            let _ = iter.next();
            continue;
        }
        if arg == SKIP_PERMISSIONS_FLAG {
            continue;
        }
        out.push(arg.clone());
    }
    out
}

/// Whether `args` still contains any one-time resume/continue directive.
pub fn has_one_time_flags(args: &[String]) -> bool {
    args.iter().any(|a| {
        ONE_TIME_VALUE_FLAGS.contains(&a.as_str()) || ONE_TIME_BARE_FLAGS.contains(&a.as_str())
    })
}

/// Remove one-time flags (and their values) from `args`.
///
/// Idempotent: calling on an already-consumed vector returns it unchanged.
pub fn consume_one_time_flags(args: &[String]) -> Vec<String> {
    let mut out = Vec::with_capacity(args.len());
    let mut iter = args.iter().peekable();
    while let Some(arg) = iter.next() {
        if ONE_TIME_BARE_FLAGS.contains(&arg.as_str()) {
            continue;
        }
        if ONE_TIME_VALUE_FLAGS.contains(&arg.as_str()) {
            // The value is optional: `--resume` alone means "resume latest".
            if iter.peek().is_some_and(|next| !next.starts_with('-')) {
                let _ = iter.next();
            }
            continue;
        }
        out.push(arg.clone());
    }
    out
}
