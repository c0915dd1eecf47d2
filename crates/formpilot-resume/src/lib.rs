//! # formpilot-resume
//!
//! Resume PDF → plain text → typed [`ResumeData`], with the LLM doing the
//! structuring and serde checking its output.
//!
//! ```rust,no_run
//! use formpilot_resume::{LlmConfig, ResumeConfig, ResumePipeline};
//!
//! # #[tokio::main]
//! # async fn main() -> formpilot_resume::Result<()> {
//! let pipeline = ResumePipeline::new(LlmConfig::default(), ResumeConfig::default())?;
//! let bytes = std::fs::read("cv.pdf")?;
//! let resume = pipeline.run("cv.pdf", bytes).await?;
//! println!("{:?}", resume.personal_info.name);
//! # Ok(())
//! # }
//! ```

pub mod llm;
pub mod models;
pub mod parser;
pub mod pdf;

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::info;

pub use llm::{LlmClient, LlmConfig};
pub use models::{Education, Experience, PersonalInfo, Project, ResumeData};
pub use parser::ResumeParser;

/// Result type for formpilot-resume operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors from the resume pipeline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("not a PDF: {0}")]
    NotAPdf(String),

    #[error("text extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("LLM output does not match the resume schema: {reason} (output starts with: {excerpt:?})")]
    SchemaParseFailed { reason: String, excerpt: String },

    #[error("LLM request failed: {0}")]
    Llm(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Where pipeline artifacts go.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResumeConfig {
    /// Extracted resume text, later served to the agent as one blob.
    pub text_path: PathBuf,

    /// Raw LLM replies are archived here when set.
    pub scratch_dir: Option<PathBuf>,
}

impl Default for ResumeConfig {
    fn default() -> Self {
        Self {
            text_path: PathBuf::from("cv.txt"),
            scratch_dir: Some(PathBuf::from("scratch")),
        }
    }
}

/// PDF bytes in, [`ResumeData`] out.
#[derive(Debug, Clone)]
pub struct ResumePipeline {
    parser: ResumeParser,
    config: ResumeConfig,
}

impl ResumePipeline {
    pub fn new(llm: LlmConfig, config: ResumeConfig) -> Result<Self> {
        let mut parser = ResumeParser::new(LlmClient::new(llm)?);
        if let Some(ref dir) = config.scratch_dir {
            parser = parser.with_scratch_dir(dir);
        }
        Ok(Self { parser, config })
    }

    /// Extract, persist the text blob, then structure it.
    pub async fn run(&self, file_name: &str, bytes: Vec<u8>) -> Result<ResumeData> {
        info!("Extracting PDF text: {}", file_name);
        let text = pdf::extract_text(file_name, bytes).await?;
        self.store_text(&text).await?;

        info!("Structuring resume with LLM");
        self.parser.parse(&text).await
    }

    async fn store_text(&self, text: &str) -> Result<()> {
        if let Some(dir) = self
            .config
            .text_path
            .parent()
            .filter(|d| !d.as_os_str().is_empty())
        {
            tokio::fs::create_dir_all(dir).await?;
        }
        tokio::fs::write(&self.config.text_path, text).await?;
        Ok(())
    }
}

/// Read the stored resume text with every line break run collapsed to one space.
pub async fn load_resume_text(path: impl AsRef<Path>) -> Result<String> {
    let raw = tokio::fs::read_to_string(path.as_ref()).await?;
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join(" "))
}
