use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::api::middleware::AppError;
use crate::services::SqlGenerator;

type Reply = Box<dyn Fn(&str) -> Result<String, AppError> + Send + Sync>;

/// Scripted model: answers each prompt with `reply` and counts calls
pub struct StubGenerator {
    reply: Reply,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl StubGenerator {
    pub fn new<F>(reply: F) -> Self
    where
        F: Fn(&str) -> Result<String, AppError> + Send + Sync + 'static,
    {
        Self {
            reply: Box::new(reply),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_delay<F>(delay: Duration, reply: F) -> Self
    where
        F: Fn(&str) -> Result<String, AppError> + Send + Sync + 'static,
    {
        Self {
            delay: Some(delay),
            ..Self::new(reply)
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SqlGenerator for StubGenerator {
    async fn complete(&self, prompt: &str) -> Result<String, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        (self.reply)(prompt)
    }

    fn model(&self) -> &str {
        "stub"
    }
}

/// Table named on the prompt's `Table name:` line
pub fn table_from_prompt(prompt: &str) -> String {
    prompt
        .lines()
        .find_map(|line| line.strip_prefix("Table name: "))
        .unwrap_or_default()
        .trim()
        .to_string()
}
