//! Interactive element catalog: index assignment, classification and
//! descriptions for one point-in-time snapshot of a page.

use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::dom::{self, RawElement};
use crate::driver::PageDriver;
use crate::nearest::{self, NearestText};
use crate::store::CatalogStore;
use crate::Result;

/// Structural path to one node of the current DOM (an XPath string).
///
/// Valid only until the DOM structure changes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locator(String);

impl Locator {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which list an element lands in, and which actions may address it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    InputLike,
    Clickable,
}

impl Classification {
    /// Pure function of the tag name.
    pub fn of_tag(tag: &str) -> Self {
        if ["input", "textarea", "select"]
            .iter()
            .any(|t| tag.eq_ignore_ascii_case(t))
        {
            Classification::InputLike
        } else {
            Classification::Clickable
        }
    }
}

/// Separator used when a description is rendered as one string.
pub const DESCRIPTION_SEPARATOR: &str = " | ";

/// One interactive element of a catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementDescriptor {
    /// Zero-based, unique across both lists of one catalog.
    pub index: usize,
    /// Lowercased tag name.
    pub tag: String,
    #[serde(rename = "xpath")]
    pub locator: Locator,
    /// Ordered fragments: nearest text, placeholder, `#id`, title.
    #[serde(with = "fragments", default)]
    pub description: Vec<String>,
}

impl ElementDescriptor {
    pub fn classification(&self) -> Classification {
        Classification::of_tag(&self.tag)
    }

    /// Fragments joined with `" | "`; empty string when there are none.
    pub fn description_text(&self) -> String {
        self.description.join(DESCRIPTION_SEPARATOR)
    }

    /// The locator-free form handed to agents.
    pub fn listing(&self) -> ListedElement {
        ListedElement {
            index: self.index,
            tag: self.tag.clone(),
            description: self.description_text(),
        }
    }
}

impl fmt::Display for ElementDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] <{}>", self.index, self.tag)?;
        if !self.description.is_empty() {
            write!(f, " \"{}\"", self.description_text())?;
        }
        Ok(())
    }
}

/// Externally surfaced catalog entry (no locator).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListedElement {
    pub index: usize,
    pub tag: String,
    pub description: String,
}

/// Point-in-time enumeration of a page's interactive elements.
///
/// Stale after any action that can alter the DOM; indices must not be reused
/// across cataloging passes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalog {
    pub clickable_elements: Vec<ElementDescriptor>,
    pub input_elements: Vec<ElementDescriptor>,
}

impl Catalog {
    /// Split descriptors by classification, keeping their indices and relative order.
    pub fn from_descriptors(descriptors: impl IntoIterator<Item = ElementDescriptor>) -> Self {
        let (input_elements, clickable_elements) = descriptors
            .into_iter()
            .partition(|d| d.classification() == Classification::InputLike);
        Self {
            clickable_elements,
            input_elements,
        }
    }

    pub fn find_input(&self, index: usize) -> Option<&ElementDescriptor> {
        self.input_elements.iter().find(|e| e.index == index)
    }

    pub fn find_clickable(&self, index: usize) -> Option<&ElementDescriptor> {
        self.clickable_elements.iter().find(|e| e.index == index)
    }

    /// Total element count across both lists.
    pub fn len(&self) -> usize {
        self.clickable_elements.len() + self.input_elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clickable_elements.is_empty() && self.input_elements.is_empty()
    }

    /// Every input-like element.
    pub fn input_listing(&self) -> Vec<ListedElement> {
        self.input_elements.iter().map(|e| e.listing()).collect()
    }

    /// Clickable elements whose tag is `button`.
    pub fn button_listing(&self) -> Vec<ListedElement> {
        self.clickable_elements
            .iter()
            .filter(|e| e.tag == "button")
            .map(|e| e.listing())
            .collect()
    }
}

/// Staleness marker stored alongside a catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogStamp {
    /// Strictly increasing per cataloging pass.
    pub generation: u64,
    /// Hash of the ordered `(tag, xpath)` sequence the catalog was built from.
    pub fingerprint: String,
}

/// Catalog build options.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CatalogOptions {
    /// Where the current catalog is persisted.
    pub store_path: PathBuf,

    /// Only include elements inside the current viewport.
    pub viewport_only: bool,

    /// Reject actions when the live page no longer matches the stored catalog.
    pub verify_fresh: bool,

    /// Longest nearest-text fragment kept in a description; 0 keeps everything.
    pub description_max_chars: usize,
}

impl Default for CatalogOptions {
    fn default() -> Self {
        Self {
            store_path: PathBuf::from("clickable_items.json"),
            viewport_only: false,
            verify_fresh: true,
            description_max_chars: 120,
        }
    }
}

/// A freshly built catalog together with the fingerprint of the DOM it came from.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub catalog: Catalog,
    pub fingerprint: String,
}

/// Fingerprint of an enumeration: only structure, never text.
pub fn fingerprint(elements: &[RawElement]) -> String {
    let mut hasher = DefaultHasher::new();
    elements.len().hash(&mut hasher);
    for el in elements {
        el.tag.hash(&mut hasher);
        el.xpath.hash(&mut hasher);
    }
    format!("{:016x}", hasher.finish())
}

/// Fingerprint of the live page, always over the full enumeration so that
/// scrolling never changes it.
pub async fn page_fingerprint(driver: &dyn PageDriver) -> Result<String> {
    let elements = dom::interactive_elements(driver, false).await?;
    Ok(fingerprint(&elements))
}

/// Description fragments for one element, in order, empties omitted.
pub fn describe(raw: &RawElement, nearest: Option<&NearestText>, max_chars: usize) -> Vec<String> {
    let mut fragments = Vec::new();
    if let Some(closest) = nearest.and_then(|n| n.closest()) {
        push_fragment(&mut fragments, clean(&closest.text, max_chars));
    }
    if let Some(placeholder) = raw.attr("placeholder") {
        push_fragment(&mut fragments, placeholder.to_string());
    }
    if let Some(id) = raw.attr("id") {
        push_fragment(&mut fragments, format!("#{}", id));
    }
    if let Some(title) = raw.attr("title") {
        push_fragment(&mut fragments, title.to_string());
    }
    fragments
}

fn push_fragment(fragments: &mut Vec<String>, fragment: String) {
    if !fragment.is_empty() {
        fragments.push(fragment);
    }
}

/// Collapse whitespace runs and cap the length at `max_chars` characters.
fn clean(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if max_chars == 0 || collapsed.chars().count() <= max_chars {
        return collapsed;
    }
    let keep = max_chars.saturating_sub(3);
    let mut out: String = collapsed.chars().take(keep).collect();
    out.push_str("...");
    out
}

/// Enumerate the page and describe every element.
///
/// Indices follow the enumeration order, so two passes over an unchanged DOM
/// agree. A resolver failure on one element only costs that element its
/// nearest-text fragment.
pub async fn snapshot(driver: &dyn PageDriver, options: &CatalogOptions) -> Result<Snapshot> {
    let elements = dom::interactive_elements(driver, options.viewport_only).await?;
    debug!("Enumerated {} interactive elements", elements.len());

    let mut descriptors = Vec::with_capacity(elements.len());
    for (index, raw) in elements.iter().enumerate() {
        let locator = Locator::new(raw.xpath.clone());
        let nearest = match nearest::resolve_nearest_text(driver, &locator).await {
            Ok(n) => Some(n),
            Err(e) => {
                warn!("Nearest text failed for [{}] {}: {}", index, locator, e);
                None
            }
        };
        descriptors.push(ElementDescriptor {
            index,
            tag: raw.tag.to_ascii_lowercase(),
            description: describe(raw, nearest.as_ref(), options.description_max_chars),
            locator,
        });
    }

    let fingerprint = if options.viewport_only {
        page_fingerprint(driver).await?
    } else {
        fingerprint(&elements)
    };

    Ok(Snapshot {
        catalog: Catalog::from_descriptors(descriptors),
        fingerprint,
    })
}

/// Build a fresh catalog, stamp it and replace whatever the store held.
///
/// The new generation is one past the larger of `last_generation` and the
/// generation already in the store, so it keeps increasing across processes
/// sharing one store.
pub async fn build_catalog(
    driver: &dyn PageDriver,
    store: &dyn CatalogStore,
    options: &CatalogOptions,
    last_generation: u64,
) -> Result<(Catalog, CatalogStamp)> {
    let stored_generation = match store.load().await {
        Ok(stored) => stored.and_then(|s| s.stamp).map_or(0, |s| s.generation),
        Err(e) => {
            warn!("Previous catalog unreadable, starting a new generation: {}", e);
            0
        }
    };

    let Snapshot {
        catalog,
        fingerprint,
    } = snapshot(driver, options).await?;
    let stamp = CatalogStamp {
        generation: stored_generation.max(last_generation) + 1,
        fingerprint,
    };
    store.save(&catalog, &stamp).await?;

    info!(
        "Catalog generation {}: {} inputs, {} clickable",
        stamp.generation,
        catalog.input_elements.len(),
        catalog.clickable_elements.len()
    );
    Ok((catalog, stamp))
}

/// Serde adapter: descriptions are stored as one `" | "`-joined string.
///
/// Reading also accepts a plain array of fragments.
mod fragments {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::DESCRIPTION_SEPARATOR;

    pub fn serialize<S: Serializer>(fragments: &[String], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&fragments.join(DESCRIPTION_SEPARATOR))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Stored {
            Joined(String),
            Fragments(Vec<String>),
        }

        let fragments = match Stored::deserialize(deserializer)? {
            Stored::Joined(s) => s
                .split(DESCRIPTION_SEPARATOR)
                .map(str::to_string)
                .collect::<Vec<_>>(),
            Stored::Fragments(v) => v,
        };
        Ok(fragments.into_iter().filter(|f| !f.is_empty()).collect())
    }
}
