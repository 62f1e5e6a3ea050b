//! Interactive discard confirmation.
//!
//! Switching to local mode with messages still queued is destructive; the
//! user must confirm before anything is dropped. Without a TTY the answer is
//! always "no": a non-interactive context must default to declining, never
//! to silently discarding.

use std::io::{BufRead, IsTerminal, Write};

use async_trait::async_trait;
use tracing::debug;

/// Asks the user a yes/no question.
#[async_trait]
pub trait ConfirmPrompt: Send + Sync {
    /// Show `question` (with optional message previews) and return the
    /// user's answer. Only `y`/`yes` accepts.
    async fn confirm(&self, question: &str, preview: &[String]) -> bool;
}

/// Real prompt on the controlling terminal.
///
/// The stdin read blocks, so it runs on the blocking pool rather than a
/// runtime worker.
pub struct TerminalPrompt;

#[async_trait]
impl ConfirmPrompt for TerminalPrompt {
    async fn confirm(&self, question: &str, preview: &[String]) -> bool {
        if !std::io::stdin().is_terminal() {
            debug!("no TTY, declining confirmation");
            return false;
        }

        let question = question.to_owned();
        let preview = preview.to_vec();
        let answer = tokio::task::spawn_blocking(move || {
            let mut stderr = std::io::stderr().lock();
            for line in &preview {
                let _ = writeln!(stderr, "  - {line}");
            }
            let _ = write!(stderr, "{question} ");
            let _ = stderr.flush();
            drop(stderr);

            let mut answer = String::new();
            std::io::stdin()
                .lock()
                .read_line(&mut answer)
                .ok()
                .map(|_| answer)
        })
        .await;

        match answer {
            Ok(Some(answer)) => is_affirmative(&answer),
            _ => false,
        }
    }
}

fn is_affirmative(answer: &str) -> bool {
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}
