use std::fs::OpenOptions;
use std::io::{BufRead, Write};
use std::path::Path;

use anyhow::Result;
use chrono::Local;

use super::{reply_or_fallback, Assistant};

pub const HELP_TEXT: &str = "\
Available Commands:
- 'exit', 'quit', 'bye': Exit the application
- 'help': Show this help message

Example Questions:
- \"How do I debug a failed Airflow DAG?\"
- \"What are common causes of data inconsistencies in ETL pipelines?\"
- \"How can I optimize my Spark job that's running slowly?\"
- \"What metrics should I monitor for my data warehouse?\"
";

const EXIT_WORDS: [&str; 3] = ["exit", "quit", "bye"];

/// Interactive chat loop. Every non-blank query is appended to `query_log`.
pub async fn run_repl<R: BufRead, W: Write>(
    assistant: &dyn Assistant,
    query_log: &Path,
    mut input: R,
    mut output: W,
) -> Result<()> {
    writeln!(
        output,
        "AI-Powered Automated Data Engineering Assistant (ADEA)\nType 'exit' to quit, 'help' for help."
    )?;

    loop {
        write!(output, "You: ")?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            break;
        }
        let query = line.trim();

        if EXIT_WORDS.contains(&query.to_lowercase().as_str()) {
            writeln!(output, "Thank you for using ADEA. Goodbye!")?;
            break;
        }
        if query.is_empty() {
            continue;
        }

        append_query(query_log, query)?;

        if query.eq_ignore_ascii_case("help") {
            writeln!(output, "{}", HELP_TEXT)?;
            continue;
        }

        writeln!(output, "AI Assistant is thinking...")?;
        let (reply, _) = reply_or_fallback(assistant, query).await;
        writeln!(output, "AI: {}", reply)?;
    }

    Ok(())
}

fn append_query(path: &Path, query: &str) -> Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(
        file,
        "{} - Query: {}",
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        query
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{AssistantError, FALLBACK_REPLY};
    use async_trait::async_trait;
    use std::io::Cursor;

    struct Echo;

    #[async_trait]
    impl Assistant for Echo {
        async fn reply(&self, prompt: &str) -> Result<String, AssistantError> {
            Ok(format!("echo: {}", prompt))
        }
    }

    struct Broken;

    #[async_trait]
    impl Assistant for Broken {
        async fn reply(&self, _prompt: &str) -> Result<String, AssistantError> {
            Err(AssistantError::MissingApiKey)
        }
    }

    async fn run(assistant: &dyn Assistant, script: &str) -> (String, String) {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("queries.txt");
        let mut out = Vec::new();
        run_repl(assistant, &log, Cursor::new(script.to_string()), &mut out)
            .await
            .unwrap();
        let logged = std::fs::read_to_string(&log).unwrap_or_default();
        (String::from_utf8(out).unwrap(), logged)
    }

    #[tokio::test]
    async fn answers_questions_until_exit() {
        let (out, logged) = run(&Echo, "why is my DAG slow?\nQUIT\nnever asked\n").await;
        assert!(out.contains("AI: echo: why is my DAG slow?"));
        assert!(out.contains("Goodbye!"));
        assert!(!out.contains("never asked"));
        assert!(logged.contains("Query: why is my DAG slow?"));
        assert_eq!(logged.lines().count(), 1);
    }

    #[tokio::test]
    async fn blank_lines_are_skipped_and_not_logged() {
        let (out, logged) = run(&Echo, "\n   \nbye\n").await;
        assert!(!out.contains("AI:"));
        assert!(logged.is_empty());
    }

    #[tokio::test]
    async fn help_prints_commands() {
        let (out, _) = run(&Echo, "help\nexit\n").await;
        assert!(out.contains("Available Commands:"));
        assert!(!out.contains("AI: echo"));
    }

    #[tokio::test]
    async fn assistant_failure_shows_fallback() {
        let (out, _) = run(&Broken, "hello\n").await;
        assert!(out.contains(FALLBACK_REPLY));
    }
}
