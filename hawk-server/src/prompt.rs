//! Console credential prompt for the interactive login.

use async_trait::async_trait;
use hawk_core::auth::{AuthError, CredentialPrompt};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

/// Reads the login code and two-step password from stdin.
pub struct ConsolePrompt;

impl ConsolePrompt {
    async fn ask(question: &str) -> Result<String, AuthError> {
        let mut stdout = tokio::io::stdout();
        stdout
            .write_all(question.as_bytes())
            .await
            .map_err(|e| AuthError::Prompt(e.to_string()))?;
        stdout
            .flush()
            .await
            .map_err(|e| AuthError::Prompt(e.to_string()))?;

        let mut line = String::new();
        let read = BufReader::new(tokio::io::stdin())
            .read_line(&mut line)
            .await
            .map_err(|e| AuthError::Prompt(e.to_string()))?;
        if read == 0 {
            return Err(AuthError::Prompt("stdin closed".to_string()));
        }

        let answer = line.trim();
        if answer.is_empty() {
            return Err(AuthError::Prompt("empty answer".to_string()));
        }
        Ok(answer.to_owned())
    }
}

#[async_trait]
impl CredentialPrompt for ConsolePrompt {
    async fn code(&self, phone: &str) -> Result<String, AuthError> {
        Self::ask(&format!("Enter the login code sent to {phone}: ")).await
    }

    async fn password(&self, phone: &str) -> Result<String, AuthError> {
        Self::ask(&format!("Two-step verification password for {phone}: ")).await
    }
}
