//! Resume text → [`ResumeData`] through one LLM call.

use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{info, warn};

use crate::llm::LlmClient;
use crate::models::ResumeData;
use crate::{Error, Result};

static FENCED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)```[A-Za-z]*[ \t]*\r?\n?(.*?)```").unwrap());

/// JSON Schema of [`ResumeData`], pretty-printed for the prompt.
pub fn format_instructions() -> Result<String> {
    let schema = schemars::schema_for!(ResumeData);
    Ok(serde_json::to_string_pretty(&schema)?)
}

/// Prompt asking for `resume_text` as JSON conforming to the schema.
pub fn build_prompt(resume_text: &str) -> Result<String> {
    Ok(format!(
        "You are a precise resume parser. Convert the resume text below into structured JSON.\n\
         \n\
         Resume text:\n\
         {}\n\
         \n\
         Output a single JSON object that conforms to this JSON Schema. \
         Use null for unknown values and empty arrays for missing sections. \
         Do not add any commentary.\n\
         {}\n",
        resume_text.trim(),
        format_instructions()?
    ))
}

/// Body of the first Markdown code fence, or the whole text trimmed.
pub fn strip_code_fences(raw: &str) -> String {
    match FENCED.captures(raw).and_then(|c| c.get(1)) {
        Some(body) => body.as_str().trim().to_string(),
        None => raw.trim().to_string(),
    }
}

/// Deserialize LLM output against the resume schema.
pub fn parse_output(raw: &str) -> Result<ResumeData> {
    let json = strip_code_fences(raw);
    serde_json::from_str(&json).map_err(|e| Error::SchemaParseFailed {
        reason: e.to_string(),
        excerpt: json.chars().take(200).collect(),
    })
}

/// Structures resume text with an LLM.
#[derive(Debug, Clone)]
pub struct ResumeParser {
    client: LlmClient,
    scratch_dir: Option<PathBuf>,
}

impl ResumeParser {
    pub fn new(client: LlmClient) -> Self {
        Self {
            client,
            scratch_dir: None,
        }
    }

    /// Archive each raw LLM reply to `<dir>/<unix millis>.txt`.
    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = Some(dir.into());
        self
    }

    pub async fn parse(&self, resume_text: &str) -> Result<ResumeData> {
        let prompt = build_prompt(resume_text)?;
        let raw = self.client.complete(&prompt).await?;
        self.archive(&raw).await;

        let data = parse_output(&raw)?;
        info!(
            "Parsed resume: {} education, {} experience, {} projects, {} skills",
            data.education.len(),
            data.experience.len(),
            data.projects.len(),
            data.skills.len()
        );
        Ok(data)
    }

    async fn archive(&self, raw: &str) {
        let Some(ref dir) = self.scratch_dir else {
            return;
        };
        let path = dir.join(format!("{}.txt", chrono::Utc::now().timestamp_millis()));
        let result = async {
            tokio::fs::create_dir_all(dir).await?;
            tokio::fs::write(&path, strip_code_fences(raw)).await
        }
        .await;
        if let Err(e) = result {
            warn!("Could not archive LLM output to {}: {}", path.display(), e);
        }
    }
}
