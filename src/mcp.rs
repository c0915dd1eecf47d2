use rmcp::{
    handler::server::{tool::ToolRouter, wrapper::Parameters},
    model::*,
    tool, tool_handler, tool_router, ServerHandler,
};
use serde::Deserialize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::info;

use formpilot_agent::{BrowserOptions, CatalogOptions, ListedElement, Session};

use crate::Config;

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct InitializeBrowserRequest {
    #[schemars(
        description = "URL of the application form. Omit to keep the current page."
    )]
    pub url: Option<String>,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct FillIndexRequest {
    #[schemars(description = "Element index from get_webpage_input")]
    pub index: usize,
    #[schemars(description = "Text to enter into the element")]
    pub content: String,
}

#[derive(Debug, Deserialize, schemars::JsonSchema)]
pub struct ClickIndexRequest {
    #[schemars(description = "Element index from get_webpage_button")]
    pub index: usize,
}

// ---------------------------------------------------------------------------
// Server
// ---------------------------------------------------------------------------

fn err(e: impl std::fmt::Display) -> ErrorData {
    ErrorData::internal_error(e.to_string(), None::<Value>)
}

/// Index problems are the caller's to fix (re-catalog); everything else is internal.
fn action_err(e: formpilot_agent::Error) -> ErrorData {
    use formpilot_agent::Error as E;
    match e {
        E::ElementNotFound { .. } | E::StaleCatalog { .. } => {
            ErrorData::invalid_params(e.to_string(), None::<Value>)
        }
        other => err(other),
    }
}

fn text_ok(s: impl Into<String>) -> Result<CallToolResult, ErrorData> {
    Ok(CallToolResult::success(vec![Content::text(s.into())]))
}

fn listing_json(elements: &[ListedElement]) -> Result<String, ErrorData> {
    serde_json::to_string(elements).map_err(err)
}

fn no_browser() -> ErrorData {
    ErrorData::internal_error(
        "No browser open. Use initialize_browser first.",
        None::<Value>,
    )
}

#[derive(Clone)]
pub struct FormServer {
    session: Arc<Mutex<Option<Session>>>,
    browser: BrowserOptions,
    catalog: CatalogOptions,
    resume_text_path: PathBuf,
    tool_router: ToolRouter<Self>,
}

#[tool_router]
impl FormServer {
    pub fn new(config: &Config) -> Self {
        Self {
            session: Arc::new(Mutex::new(None)),
            browser: config.browser.clone(),
            catalog: config.catalog.clone(),
            resume_text_path: config.resume.text_path.clone(),
            tool_router: Self::tool_router(),
        }
    }

    #[tool(
        description = "Open the browser (launched on first call) and go to the application form URL. Only navigates if the page is not already there."
    )]
    async fn initialize_browser(
        &self,
        req: Parameters<InitializeBrowserRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        let mut guard = self.session.lock().await;
        if guard.is_none() {
            let session = Session::launch(self.browser.clone(), self.catalog.clone())
                .await
                .map_err(err)?;
            *guard = Some(session);
        }
        let session = guard.as_mut().ok_or_else(no_browser)?;

        if let Some(ref url) = req.0.url {
            session.ensure_at(url).await.map_err(err)?;
        }
        let url = session.url().await.map_err(err)?;
        info!("Browser ready at {}", url);
        text_ok(format!("Browser ready at {}", url))
    }

    #[tool(
        description = "List the page's input fields as a JSON array of {index, tag, description}. Rebuilds the element catalog; indices from earlier calls become invalid."
    )]
    async fn get_webpage_input(&self) -> Result<CallToolResult, ErrorData> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or_else(no_browser)?;
        let inputs = session.input_elements().await.map_err(err)?;
        text_ok(listing_json(&inputs)?)
    }

    #[tool(
        description = "List the page's buttons as a JSON array of {index, tag, description}. Rebuilds the element catalog; indices from earlier calls become invalid."
    )]
    async fn get_webpage_button(&self) -> Result<CallToolResult, ErrorData> {
        let mut guard = self.session.lock().await;
        let session = guard.as_mut().ok_or_else(no_browser)?;
        let buttons = session.button_elements().await.map_err(err)?;
        text_ok(listing_json(&buttons)?)
    }

    #[tool(description = "Enter content into the input field with the given index, then press Enter.")]
    async fn fill_index_with_content(
        &self,
        req: Parameters<FillIndexRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        let guard = self.session.lock().await;
        let session = guard.as_ref().ok_or_else(no_browser)?;
        let filled = session
            .fill(req.0.index, &req.0.content)
            .await
            .map_err(action_err)?;
        text_ok(filled.to_string())
    }

    #[tool(
        description = "Click the button with the given index. If the click adds or removes form sections, list the elements again before the next action."
    )]
    async fn click_index(
        &self,
        req: Parameters<ClickIndexRequest>,
    ) -> Result<CallToolResult, ErrorData> {
        let guard = self.session.lock().await;
        let session = guard.as_ref().ok_or_else(no_browser)?;
        let clicked = session.click(req.0.index).await.map_err(action_err)?;
        text_ok(clicked.to_string())
    }

    #[tool(description = "Get the applicant's resume as one line of plain text.")]
    async fn get_resume_content(&self) -> Result<CallToolResult, ErrorData> {
        let text = formpilot_resume::load_resume_text(&self.resume_text_path)
            .await
            .map_err(err)?;
        text_ok(serde_json::to_string(&text).map_err(err)?)
    }

    #[tool(description = "Close the browser and release resources.")]
    async fn close_browser(&self) -> Result<CallToolResult, ErrorData> {
        let mut guard = self.session.lock().await;
        if let Some(session) = guard.take() {
            session.close().await.map_err(err)?;
        }
        text_ok("Browser closed.")
    }
}

#[tool_handler]
impl ServerHandler for FormServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::LATEST,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "formpilot".into(),
                version: env!("CARGO_PKG_VERSION").into(),
                title: None,
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Job application form filler. Call 'initialize_browser' with the form URL, \
                 'get_resume_content' for the applicant's resume, then 'get_webpage_input' and \
                 'get_webpage_button' to list elements by index. Use 'fill_index_with_content' \
                 and 'click_index' with those indices. Re-list elements after any click that \
                 changes the form; stale indices are rejected."
                    .into(),
            ),
        }
    }
}

pub async fn run_server(config: &Config) -> anyhow::Result<()> {
    use rmcp::ServiceExt;

    let server = FormServer::new(config);
    let service = server.serve(rmcp::transport::stdio()).await?;
    service.waiting().await?;
    Ok(())
}
