// file: src/utils/validation.rs
// description: input validation and name sanitizing helpers
// reference: input validation patterns

use crate::error::{PipelineError, Result};
use sha2::{Digest, Sha256};

const MAX_KEYWORD_LEN: usize = 200;

pub struct Validator;

impl Validator {
    pub fn validate_keyword(keyword: &str) -> Result<()> {
        if keyword.trim().is_empty() {
            return Err(PipelineError::Validation("Keyword is empty".to_string()));
        }

        if keyword.chars().count() > MAX_KEYWORD_LEN {
            return Err(PipelineError::Validation(format!(
                "Keyword too long (max {} characters)",
                MAX_KEYWORD_LEN
            )));
        }

        Ok(())
    }

    pub fn validate_requested_count(count: Option<usize>, max: usize) -> Result<()> {
        match count {
            Some(0) => Err(PipelineError::Validation(
                "Requested count must be greater than 0".to_string(),
            )),
            Some(n) if n > max => Err(PipelineError::Validation(format!(
                "Requested count too large (max {})",
                max
            ))),
            _ => Ok(()),
        }
    }

    pub fn validate_url(url: &str) -> Result<()> {
        if !url.starts_with("http://") && !url.starts_with("https://") {
            return Err(PipelineError::Validation(format!(
                "Invalid URL format: {}",
                url
            )));
        }
        Ok(())
    }

    /// Table name for a keyword's description log. Keywords are free text, so
    /// the readable prefix is followed by a hash to keep distinct keywords apart.
    pub fn keyword_table_name(keyword: &str) -> String {
        let readable: String = keyword
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .take(48)
            .collect();

        let mut hasher = Sha256::new();
        hasher.update(keyword.as_bytes());
        let digest = format!("{:x}", hasher.finalize());

        format!("desc_{}_{}", readable, &digest[..12])
    }

    /// Make a provider-assigned id safe to use as a file name
    pub fn sanitize_file_component(value: &str) -> String {
        let cleaned: String = value
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .collect();

        if cleaned.is_empty() {
            "item".to_string()
        } else {
            cleaned
        }
    }

    pub fn truncate_text(text: &str, max_chars: usize) -> String {
        if text.chars().count() <= max_chars {
            text.to_string()
        } else {
            let head: String = text.chars().take(max_chars).collect();
            format!("{}...", head)
        }
    }
}
