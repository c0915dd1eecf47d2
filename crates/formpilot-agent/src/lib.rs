//! # formpilot-agent
//!
//! Index-addressed form automation for LLM agents. A page's interactive
//! elements are cataloged once, each with a numeric index and a short
//! human-readable description; the agent then fills or clicks by index.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use formpilot_agent::{BrowserOptions, CatalogOptions, Session};
//!
//! # #[tokio::main]
//! # async fn main() -> formpilot_agent::Result<()> {
//! let mut session = Session::launch(BrowserOptions::default(), CatalogOptions::default()).await?;
//! session.goto("https://example.com/apply").await?;
//!
//! // Catalog → pick an index → act, then re-catalog before the next action
//! for el in session.input_elements().await? {
//!     println!("[{}] <{}> {}", el.index, el.tag, el.description);
//! }
//! session.fill(0, "Jane Doe").await?;
//!
//! session.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod actuator;
pub mod catalog;
pub mod dom;
pub mod driver;
pub mod nearest;
pub mod store;

pub use actuator::{Clicked, Filled};
pub use catalog::{
    Catalog, CatalogOptions, CatalogStamp, Classification, ElementDescriptor, ListedElement,
    Locator,
};
pub use driver::{BrowserOptions, EokaDriver, PageDriver, Viewport};
pub use nearest::{ClosestText, DescriptionCandidate, NearestText, TextFamily};
pub use store::{CatalogStore, FileCatalogStore, MemoryCatalogStore, StoredCatalog};

/// Result type for formpilot-agent operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by cataloging and actions.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("element [{index}] not found in the current catalog")]
    ElementNotFound { index: usize },

    #[error("fill of element [{index}] failed: {reason}")]
    FillFailed { index: usize, reason: String },

    #[error("click on element [{index}] failed: {reason}")]
    ClickFailed { index: usize, reason: String },

    #[error(
        "element [{index}] comes from catalog generation {generation}, but the page has changed since; rebuild the catalog"
    )]
    StaleCatalog { index: usize, generation: u64 },

    #[error("browser unavailable: {0}")]
    DriverUnavailable(String),

    #[error("browser error: {0}")]
    Browser(#[from] eoka::Error),

    #[error("page script error: {0}")]
    Script(String),

    #[error("catalog store error: {0}")]
    Store(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// One driven page plus the catalog store it publishes to.
///
/// Replaces process-wide browser/page globals: construct it to start, drop or
/// [`close`](Session::close) it to end.
pub struct Session {
    driver: Box<dyn PageDriver>,
    store: Box<dyn CatalogStore>,
    browser: BrowserOptions,
    catalog: CatalogOptions,
    generation: u64,
}

impl Session {
    /// Launch a browser and store catalogs at `catalog.store_path`.
    pub async fn launch(browser: BrowserOptions, catalog: CatalogOptions) -> Result<Self> {
        let driver = EokaDriver::launch(&browser).await?;
        let store = FileCatalogStore::new(catalog.store_path.clone());
        Ok(Self::new(Box::new(driver), Box::new(store), browser, catalog))
    }

    /// Assemble a session from an existing driver and store.
    pub fn new(
        driver: Box<dyn PageDriver>,
        store: Box<dyn CatalogStore>,
        browser: BrowserOptions,
        catalog: CatalogOptions,
    ) -> Self {
        Self {
            driver,
            store,
            browser,
            catalog,
            generation: 0,
        }
    }

    /// Get a reference to the page driver.
    pub fn driver(&self) -> &dyn PageDriver {
        self.driver.as_ref()
    }

    /// Generation of the last catalog this session built (0 before the first).
    pub fn generation(&self) -> u64 {
        self.generation
    }

    // =========================================================================
    // Navigation
    // =========================================================================

    /// Navigate, bounded by the configured navigation timeout.
    pub async fn goto(&self, url: &str) -> Result<()> {
        tracing::info!("Navigating to {}", url);
        self.driver
            .goto(url, self.browser.navigation_timeout())
            .await
    }

    /// Navigate only if the page is not already at `url`. Returns whether it navigated.
    pub async fn ensure_at(&self, url: &str) -> Result<bool> {
        let current = self.driver.url().await?;
        if same_url(&current, url) {
            tracing::debug!("Already at {}", url);
            return Ok(false);
        }
        self.goto(url).await?;
        Ok(true)
    }

    /// Current page URL.
    pub async fn url(&self) -> Result<String> {
        self.driver.url().await
    }

    // =========================================================================
    // Cataloging
    // =========================================================================

    /// Build, stamp and persist a fresh catalog of the current page.
    ///
    /// Indices handed out by earlier builds are invalid afterwards.
    pub async fn build_catalog(&mut self) -> Result<Catalog> {
        let (catalog, stamp) = catalog::build_catalog(
            self.driver.as_ref(),
            self.store.as_ref(),
            &self.catalog,
            self.generation,
        )
        .await?;
        self.generation = stamp.generation;
        Ok(catalog)
    }

    /// Rebuild the catalog and list its input-like elements.
    pub async fn input_elements(&mut self) -> Result<Vec<ListedElement>> {
        Ok(self.build_catalog().await?.input_listing())
    }

    /// Rebuild the catalog and list its `<button>` elements.
    pub async fn button_elements(&mut self) -> Result<Vec<ListedElement>> {
        Ok(self.build_catalog().await?.button_listing())
    }

    // =========================================================================
    // Actions
    // =========================================================================

    /// Fill input-like element `index` of the stored catalog and submit it with Enter.
    pub async fn fill(&self, index: usize, text: &str) -> Result<Filled> {
        actuator::fill(
            self.driver.as_ref(),
            self.store.as_ref(),
            &self.catalog,
            index,
            text,
        )
        .await
    }

    /// Click clickable element `index` of the stored catalog.
    pub async fn click(&self, index: usize) -> Result<Clicked> {
        actuator::click(
            self.driver.as_ref(),
            self.store.as_ref(),
            &self.catalog,
            index,
        )
        .await
    }

    /// Close the browser.
    pub async fn close(self) -> Result<()> {
        self.driver.close().await
    }
}

fn same_url(a: &str, b: &str) -> bool {
    a.trim_end_matches('/') == b.trim_end_matches('/')
}


#[cfg(test)]
mod tests {
    use super::fake::{element, FakePage};
    use super::*;

    fn label(text: &str, distance: u32) -> NearestText {
        NearestText {
            label: Some(DescriptionCandidate {
                text: text.into(),
                distance,
            }),
            ..Default::default()
        }
    }

    fn application_form() -> FakePage {
        FakePage::new(vec![
            element(
                "input",
                "/html/body/form/label[1]/input",
                &[("id", "email"), ("placeholder", "you@x.com")],
            ),
            element("a", "/html/body/nav/a", &[("href", "/"), ("title", "Home")]),
            element("textarea", "/html/body/form/textarea", &[]),
            element("button", "/html/body/form/button[1]", &[("id", "add-school")]),
            element("select", "/html/body/form/select", &[("id", "country")]),
            element("button", "/html/body/form/button[2]", &[]),
        ])
        .with_text("/html/body/form/label[1]/input", label("Email", 0))
        .with_text("/html/body/form/button[1]", label("Add school", 0))
        .with_text(
            "/html/body/form/button[2]",
            NearestText {
                span: Some(DescriptionCandidate {
                    text: "Submit".into(),
                    distance: 0,
                }),
                ..Default::default()
            },
        )
    }

    fn session(page: &FakePage, store: MemoryCatalogStore) -> Session {
        Session::new(
            Box::new(page.clone()),
            Box::new(store),
            BrowserOptions::default(),
            CatalogOptions::default(),
        )
    }

    #[tokio::test]
    async fn test_email_input_description() {
        let page = application_form();
        let mut s = session(&page, MemoryCatalogStore::new());
        let catalog = s.build_catalog().await.unwrap();

        let email = &catalog.input_elements[0];
        assert_eq!(email.index, 0);
        assert_eq!(email.tag, "input");
        assert_eq!(email.classification(), Classification::InputLike);
        assert_eq!(email.description, vec!["Email", "you@x.com", "#email"]);
        assert_eq!(email.description_text(), "Email | you@x.com | #email");
    }

    #[tokio::test]
    async fn test_indices_are_global_and_lists_split() {
        let page = application_form();
        let mut s = session(&page, MemoryCatalogStore::new());
        let catalog = s.build_catalog().await.unwrap();

        let inputs: Vec<usize> = catalog.input_elements.iter().map(|e| e.index).collect();
        let clickable: Vec<usize> = catalog.clickable_elements.iter().map(|e| e.index).collect();
        assert_eq!(inputs, vec![0, 2, 4]);
        assert_eq!(clickable, vec![1, 3, 5]);
        assert!(catalog
            .input_elements
            .iter()
            .all(|e| e.classification() == Classification::InputLike));

        // Anchor keeps its title, unlabeled textarea gets an empty description.
        assert_eq!(catalog.clickable_elements[0].description_text(), "Home");
        assert_eq!(catalog.input_elements[1].description_text(), "");
    }

    #[tokio::test]
    async fn test_button_listing_keeps_only_buttons() {
        let page = application_form();
        let mut s = session(&page, MemoryCatalogStore::new());
        let buttons = s.button_elements().await.unwrap();
        assert_eq!(
            buttons,
            vec![
                ListedElement {
                    index: 3,
                    tag: "button".into(),
                    description: "Add school | #add-school".into(),
                },
                ListedElement {
                    index: 5,
                    tag: "button".into(),
                    description: "Submit".into(),
                },
            ]
        );
    }

    #[tokio::test]
    async fn test_build_twice_is_identical() {
        let page = application_form();
        let mut s = session(&page, MemoryCatalogStore::new());
        let first = s.build_catalog().await.unwrap();
        let second = s.build_catalog().await.unwrap();
        assert_eq!(first, second);
        assert_eq!(s.generation(), 2);
    }

    #[tokio::test]
    async fn test_empty_page_yields_empty_catalog() {
        let page = FakePage::new(vec![]);
        let mut s = session(&page, MemoryCatalogStore::new());
        let catalog = s.build_catalog().await.unwrap();
        assert!(catalog.clickable_elements.is_empty());
        assert!(catalog.input_elements.is_empty());
    }

    #[tokio::test]
    async fn test_resolver_failure_degrades_to_attributes() {
        let page = application_form();
        page.state
            .lock()
            .unwrap()
            .broken_nearest
            .insert("/html/body/form/label[1]/input".into());
        let mut s = session(&page, MemoryCatalogStore::new());
        let catalog = s.build_catalog().await.unwrap();
        assert_eq!(
            catalog.input_elements[0].description_text(),
            "you@x.com | #email"
        );
        assert_eq!(catalog.len(), 6);
    }

    #[tokio::test]
    async fn test_fill_absent_index_never_touches_page() {
        let page = application_form();
        let mut s = session(&page, MemoryCatalogStore::new());
        s.build_catalog().await.unwrap();
        page.clear_calls();

        let err = s.fill(7, "jane@x.com").await.unwrap_err();
        assert!(matches!(err, Error::ElementNotFound { index: 7 }));
        assert!(err.to_string().contains("[7]"));
        assert!(page.calls().is_empty(), "driver called: {:?}", page.calls());
    }

    #[tokio::test]
    async fn test_fill_rejects_clickable_index() {
        let page = application_form();
        let mut s = session(&page, MemoryCatalogStore::new());
        s.build_catalog().await.unwrap();
        page.clear_calls();

        // Index 3 exists, but in clickable_elements.
        let err = s.fill(3, "x").await.unwrap_err();
        assert!(matches!(err, Error::ElementNotFound { index: 3 }));
        assert!(page.calls().is_empty());

        let err = s.click(0).await.unwrap_err();
        assert!(matches!(err, Error::ElementNotFound { index: 0 }));
    }

    #[tokio::test]
    async fn test_fill_without_catalog_is_not_found() {
        let page = application_form();
        let s = session(&page, MemoryCatalogStore::new());
        let err = s.fill(0, "x").await.unwrap_err();
        assert!(matches!(err, Error::ElementNotFound { index: 0 }));
        assert!(page.calls().is_empty());
    }

    #[tokio::test]
    async fn test_fill_sets_value_then_presses_enter() {
        let page = application_form();
        let mut s = session(&page, MemoryCatalogStore::new());
        s.build_catalog().await.unwrap();
        page.clear_calls();

        let filled = s.fill(0, "jane@x.com").await.unwrap();
        assert_eq!(filled.to_string(), "Filled");
        assert_eq!(filled.description, "Email | you@x.com | #email");
        assert_eq!(
            page.value("/html/body/form/label[1]/input").as_deref(),
            Some("jane@x.com")
        );

        let calls = page.calls();
        assert_eq!(
            calls,
            vec![
                "evaluate:elements".to_string(),
                "fill:/html/body/form/label[1]/input".to_string(),
                "enter:/html/body/form/label[1]/input".to_string(),
            ]
        );
    }

    #[tokio::test]
    async fn test_driver_failure_maps_to_action_failed() {
        let page = application_form();
        let mut s = session(&page, MemoryCatalogStore::new());
        s.build_catalog().await.unwrap();
        page.state.lock().unwrap().fail_actions = true;

        let err = s.fill(2, "hello").await.unwrap_err();
        assert!(matches!(err, Error::FillFailed { index: 2, .. }));

        let err = s.click(5).await.unwrap_err();
        match err {
            Error::ClickFailed { index, reason } => {
                assert_eq!(index, 5);
                assert!(reason.contains("not interactable"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_click_that_adds_section_invalidates_catalog() {
        let page = application_form();
        page.state.lock().unwrap().revealed_on_click = vec![
            element("input", "/html/body/form/fieldset/input[1]", &[("id", "school")]),
            element("input", "/html/body/form/fieldset/input[2]", &[("id", "degree")]),
        ];
        let mut s = session(&page, MemoryCatalogStore::new());
        let before = s.build_catalog().await.unwrap();
        assert_eq!(before.len(), 6);

        let clicked = s.click(3).await.unwrap();
        assert_eq!(clicked.to_string(), "Clicked");

        // The stored catalog no longer matches the page.
        let err = s.fill(0, "jane@x.com").await.unwrap_err();
        assert!(matches!(
            err,
            Error::StaleCatalog {
                index: 0,
                generation: 1
            }
        ));
        assert!(page.value("/html/body/form/label[1]/input").is_none());

        let after = s.build_catalog().await.unwrap();
        assert_eq!(after.len(), before.len() + 2);
        let mut indices: Vec<usize> = after
            .input_elements
            .iter()
            .chain(&after.clickable_elements)
            .map(|e| e.index)
            .collect();
        indices.sort_unstable();
        assert_eq!(indices, (0..8).collect::<Vec<_>>());
        assert_eq!(s.generation(), 2);

        s.fill(6, "MIT").await.unwrap();
    }

    #[tokio::test]
    async fn test_interrupted_save_leaves_catalog_stale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clickable_items.json");
        let page = application_form();
        page.state.lock().unwrap().revealed_on_click =
            vec![element("input", "/html/body/form/fieldset/input", &[])];
        let mut s = Session::new(
            Box::new(page.clone()),
            Box::new(FileCatalogStore::new(&path)),
            BrowserOptions::default(),
            CatalogOptions::default(),
        );
        s.build_catalog().await.unwrap();
        s.click(3).await.unwrap();

        // The catalog file cannot be replaced.
        std::fs::create_dir(dir.path().join("clickable_items.json.tmp")).unwrap();
        let err = s.build_catalog().await.unwrap_err();
        assert!(matches!(err, Error::Io(_)), "got {err}");

        let err = s.fill(0, "jane@x.com").await.unwrap_err();
        assert!(
            matches!(
                err,
                Error::StaleCatalog {
                    index: 0,
                    generation: 1
                }
            ),
            "got {err}"
        );
        assert!(page.value("/html/body/form/label[1]/input").is_none());
    }

    #[tokio::test]
    async fn test_viewport_catalog_survives_scrolling() {
        let page = application_form();
        page.state.lock().unwrap().offscreen = ["/html/body/form/select", "/html/body/form/button[2]"]
            .into_iter()
            .map(String::from)
            .collect();
        let mut s = Session::new(
            Box::new(page.clone()),
            Box::new(MemoryCatalogStore::new()),
            BrowserOptions::default(),
            CatalogOptions {
                viewport_only: true,
                ..Default::default()
            },
        );
        let catalog = s.build_catalog().await.unwrap();
        assert_eq!(catalog.len(), 4);

        // Acting scrolls a different set of elements into view.
        page.state.lock().unwrap().offscreen = ["/html/body/form/label[1]/input"]
            .into_iter()
            .map(String::from)
            .collect();
        s.fill(0, "jane@x.com").await.unwrap();

        // Structural changes are still caught, even off screen.
        {
            let mut state = page.state.lock().unwrap();
            state.revealed_on_click = vec![element("input", "/html/body/footer/input", &[])];
            state.offscreen.insert("/html/body/footer/input".into());
        }
        s.click(3).await.unwrap();
        let err = s.fill(0, "again").await.unwrap_err();
        assert!(matches!(err, Error::StaleCatalog { index: 0, .. }), "got {err}");
    }

    #[tokio::test]
    async fn test_stale_check_can_be_disabled() {
        let page = application_form();
        page.state.lock().unwrap().revealed_on_click =
            vec![element("input", "/html/body/form/fieldset/input", &[])];
        let mut s = Session::new(
            Box::new(page.clone()),
            Box::new(MemoryCatalogStore::new()),
            BrowserOptions::default(),
            CatalogOptions {
                verify_fresh: false,
                ..Default::default()
            },
        );
        s.build_catalog().await.unwrap();
        s.click(3).await.unwrap();
        page.clear_calls();

        s.fill(0, "jane@x.com").await.unwrap();
        assert!(!page.calls().iter().any(|c| c == "evaluate:elements"));
    }

    #[tokio::test]
    async fn test_unstamped_catalog_is_accepted() {
        let page = application_form();
        let store = MemoryCatalogStore::new();
        store.put(StoredCatalog {
            catalog: Catalog::from_descriptors(vec![ElementDescriptor {
                index: 0,
                tag: "input".into(),
                locator: Locator::new("/html/body/form/label[1]/input"),
                description: vec!["Email".into()],
            }]),
            stamp: None,
        });
        let s = session(&page, store);
        s.fill(0, "jane@x.com").await.unwrap();
        assert_eq!(
            page.value("/html/body/form/label[1]/input").as_deref(),
            Some("jane@x.com")
        );
    }

    #[tokio::test]
    async fn test_actions_read_store_not_memory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clickable_items.json");
        let page = application_form();
        let mut s = Session::new(
            Box::new(page.clone()),
            Box::new(FileCatalogStore::new(&path)),
            BrowserOptions::default(),
            CatalogOptions::default(),
        );
        s.build_catalog().await.unwrap();

        // Another writer replaces the committed catalog.
        std::fs::write(&path, r#"{"clickable_elements": [], "input_elements": []}"#).unwrap();
        page.clear_calls();

        let err = s.click(3).await.unwrap_err();
        assert!(matches!(err, Error::ElementNotFound { index: 3 }));
        assert!(page.calls().is_empty());
    }

    #[tokio::test]
    async fn test_generation_continues_from_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clickable_items.json");
        let page = application_form();

        let mut first = Session::new(
            Box::new(page.clone()),
            Box::new(FileCatalogStore::new(&path)),
            BrowserOptions::default(),
            CatalogOptions::default(),
        );
        first.build_catalog().await.unwrap();
        first.build_catalog().await.unwrap();
        assert_eq!(first.generation(), 2);

        let mut second = Session::new(
            Box::new(page.clone()),
            Box::new(FileCatalogStore::new(&path)),
            BrowserOptions::default(),
            CatalogOptions::default(),
        );
        second.build_catalog().await.unwrap();
        assert_eq!(second.generation(), 3);

        // A session sharing the file acts on the other session's catalog.
        first.fill(0, "jane@x.com").await.unwrap();
    }

    #[tokio::test]
    async fn test_ensure_at_skips_same_url() {
        let page = application_form();
        let s = session(&page, MemoryCatalogStore::new());
        assert!(s.ensure_at("https://jobs.example.com/apply").await.unwrap());
        assert!(!s.ensure_at("https://jobs.example.com/apply/").await.unwrap());
        let gotos = page
            .calls()
            .into_iter()
            .filter(|c| c.starts_with("goto:"))
            .count();
        assert_eq!(gotos, 1);
    }
}
