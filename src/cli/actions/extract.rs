use crate::challenge::extract_code;
use crate::config::EngineConfig;
use crate::mailbox::MailMessage;
use anyhow::{anyhow, Context, Result};
use std::path::Path;
use tracing::debug;

/// Run the challenge code extractor against a saved message and print the code.
///
/// # Errors
/// Returns an error if the file cannot be read, has no body, or holds no code.
pub async fn execute(path: &Path, config: &EngineConfig) -> Result<()> {
    let raw = tokio::fs::read(path)
        .await
        .with_context(|| format!("failed to read {}", path.display()))?;

    let code = code_from_raw(raw, path, config.challenge_marker())?;
    println!("{code}");

    Ok(())
}

fn code_from_raw(raw: Vec<u8>, path: &Path, marker: &str) -> Result<String> {
    let message = MailMessage {
        id: path.display().to_string(),
        received_order: 0,
        raw,
    };
    let body = message
        .body()
        .ok_or_else(|| anyhow!("{} has no readable body", path.display()))?;

    debug!(marker, body_len = body.len(), "inspecting message body");

    extract_code(&body, marker)
        .ok_or_else(|| anyhow!("no verification code found next to marker {marker:?}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    const MESSAGE: &str = "From: Instagram <security@mail.instagram.com>\r\n\
                           Subject: Verify your account\r\n\
                           Content-Type: text/plain; charset=utf-8\r\n\
                           \r\n\
                           Hi alice, use 808080 to confirm your Instagram account.\r\n";

    #[test]
    fn finds_code_in_message() {
        let code = code_from_raw(MESSAGE.as_bytes().to_vec(), Path::new("a.eml"), "instagram");
        assert_eq!(code.ok(), Some("808080".to_string()));
    }

    #[test]
    fn reports_missing_marker() {
        let result = code_from_raw(MESSAGE.as_bytes().to_vec(), Path::new("a.eml"), "example");
        assert!(result.is_err());
        if let Err(err) = result {
            assert!(err.to_string().contains("no verification code found"));
        }
    }
}
