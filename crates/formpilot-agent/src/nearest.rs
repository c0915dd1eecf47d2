//! Nearest-text resolution: the closest non-empty `label`, `span` or `div`
//! text around an element, used as its human-readable name.
//!
//! The DOM walk runs inside the page. For each family the script first checks
//! the zero-distance relation (the element's closest enclosing node of that
//! family, else the first one inside its parent). Failing that it walks up
//! from the element itself, searching each subtree for the first node of the
//! family with non-empty trimmed text, and stops below `<body>`. Choosing the
//! winner among the three families happens here in Rust.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::driver::PageDriver;
use crate::{Error, Locator, Result};

/// The three source-tag families, in tie-break priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextFamily {
    Label,
    Span,
    Div,
}

impl TextFamily {
    /// Enumeration order doubles as priority when distances tie.
    pub const PRIORITY: [TextFamily; 3] = [TextFamily::Label, TextFamily::Span, TextFamily::Div];

    pub fn as_str(&self) -> &'static str {
        match self {
            TextFamily::Label => "label",
            TextFamily::Span => "span",
            TextFamily::Div => "div",
        }
    }
}

impl fmt::Display for TextFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One candidate label found while walking outward from an element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DescriptionCandidate {
    pub text: String,
    /// Ancestor hops taken before the family matched; 0 is the element itself.
    pub distance: u32,
}

/// The winning candidate across all families.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClosestText {
    pub tag: TextFamily,
    pub text: String,
    pub distance: u32,
}

/// Per-family results for one element. Missing families have no candidate.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NearestText {
    #[serde(default)]
    pub label: Option<DescriptionCandidate>,
    #[serde(default)]
    pub span: Option<DescriptionCandidate>,
    #[serde(default)]
    pub div: Option<DescriptionCandidate>,
}

impl NearestText {
    pub fn candidate(&self, family: TextFamily) -> Option<&DescriptionCandidate> {
        match family {
            TextFamily::Label => self.label.as_ref(),
            TextFamily::Span => self.span.as_ref(),
            TextFamily::Div => self.div.as_ref(),
        }
    }

    /// Smallest distance wins; ties go to the earlier family in [`TextFamily::PRIORITY`].
    pub fn closest(&self) -> Option<ClosestText> {
        let mut best: Option<ClosestText> = None;
        for family in TextFamily::PRIORITY {
            let Some(candidate) = self.candidate(family) else {
                continue;
            };
            if best.as_ref().map_or(true, |b| candidate.distance < b.distance) {
                best = Some(ClosestText {
                    tag: family,
                    text: candidate.text.clone(),
                    distance: candidate.distance,
                });
            }
        }
        best
    }

    pub fn is_empty(&self) -> bool {
        self.label.is_none() && self.span.is_none() && self.div.is_none()
    }

    /// Drop whitespace-only candidates and trim the rest.
    fn normalized(self) -> Self {
        fn keep(c: Option<DescriptionCandidate>) -> Option<DescriptionCandidate> {
            c.and_then(|c| {
                let text = c.text.trim();
                (!text.is_empty()).then(|| DescriptionCandidate {
                    text: text.to_string(),
                    distance: c.distance,
                })
            })
        }
        Self {
            label: keep(self.label),
            span: keep(self.span),
            div: keep(self.div),
        }
    }
}

/// JavaScript that walks outward from the node at `arg.xpath`.
pub const NEAREST_TEXT_JS: &str = r#"
(arg) => {
    const out = { label: null, span: null, div: null };
    const node = document.evaluate(arg.xpath, document, null, XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue;
    if (!node || node.nodeType !== 1) return out;

    const textOf = el => (el.textContent || el.innerText || '').trim();
    const firstWithText = (root, tag) => {
        for (const el of root.querySelectorAll(tag)) {
            const t = textOf(el);
            if (t) return t;
        }
        return null;
    };

    for (const tag of ['label', 'span', 'div']) {
        const near = node.closest(tag) || (node.parentElement && node.parentElement.querySelector(tag));
        const nearText = near ? textOf(near) : '';
        if (nearText) {
            out[tag] = { text: nearText, distance: 0 };
            continue;
        }
        let current = node;
        let distance = 0;
        while (current && current !== document.body && current !== document.documentElement) {
            const t = firstWithText(current, tag);
            if (t) {
                out[tag] = { text: t, distance };
                break;
            }
            current = current.parentElement;
            distance++;
        }
    }
    return out;
}
"#;

/// Resolve the per-family nearest texts for the element at `locator`.
///
/// A locator matching no live node yields an empty result, not an error.
pub async fn resolve_nearest_text(driver: &dyn PageDriver, locator: &Locator) -> Result<NearestText> {
    let value = driver
        .evaluate(NEAREST_TEXT_JS, json!({ "xpath": locator.as_str() }))
        .await?;
    let raw: NearestText = serde_json::from_value(value)
        .map_err(|e| Error::Script(format!("nearest text parse error: {}", e)))?;
    Ok(raw.normalized())
}
