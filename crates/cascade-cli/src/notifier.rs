//! Console notifier.
//!
//! Renders step events as styled status lines and fulfills the manual
//! gate's confirmation prompt. A single lock serializes all output so
//! events from concurrent workers never interleave mid-line.

use async_trait::async_trait;
use cascade_core::ports::{Notifier, StepEvent, StepPhase};
use console::{StyledObject, style};
use tokio::sync::Mutex;

pub struct ConsoleNotifier {
    output: Mutex<()>,
}

impl ConsoleNotifier {
    pub fn new() -> Self {
        Self {
            output: Mutex::new(()),
        }
    }

    fn label(phase: StepPhase) -> StyledObject<&'static str> {
        match phase {
            StepPhase::Started => style("[  RUNNING  ]").blue(),
            StepPhase::Succeeded => style("[  SUCCESS  ]").green(),
            StepPhase::Failed => style("[   ERROR   ]").red(),
            StepPhase::Cancelled => style("[ CANCELLED ]").yellow(),
            StepPhase::Skipped => style("[   SKIP    ]").yellow(),
        }
    }
}

impl Default for ConsoleNotifier {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Notifier for ConsoleNotifier {
    async fn notify(&self, event: StepEvent) {
        let _guard = self.output.lock().await;
        println!(
            "{} {} {} {}",
            Self::label(event.phase),
            style(format!("[{}]", event.task)).bold(),
            event.message,
            style(event.log_url.as_deref().unwrap_or("")).dim()
        );
    }

    async fn confirm(&self, task: &str, message: &str, log_url: Option<&str>) -> bool {
        // Hold the output lock for the whole prompt so status lines from
        // other workers cannot land in the middle of it.
        let _guard = self.output.lock().await;
        let prompt = format!(
            "{} {} {} {}",
            style("[  WAITING  ]").magenta(),
            style(format!("[{}]", task)).bold(),
            message,
            style(log_url.unwrap_or("")).dim()
        );
        let answer = tokio::task::spawn_blocking(move || {
            dialoguer::Confirm::new()
                .with_prompt(prompt)
                .default(false)
                .interact()
                .unwrap_or(false)
        })
        .await;
        answer.unwrap_or(false)
    }
}
