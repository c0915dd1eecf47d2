//! DOM enumeration: every interactive element on the page, in document order.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::driver::PageDriver;
use crate::{Error, Result};

/// One interactive element as reported by the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawElement {
    /// Lowercased tag name.
    pub tag: String,
    /// Absolute XPath (`/html/body/div[2]/input`), valid for the current DOM only.
    pub xpath: String,
    /// Every attribute present on the element.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl RawElement {
    /// Attribute value, if present and not blank.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// JavaScript that enumerates clickable/focusable elements.
pub const INTERACTIVE_ELEMENTS_JS: &str = r#"
(opts) => {
    const INTERACTIVE = [
        'a[href]', 'button', 'input', 'select', 'textarea', 'summary', 'details',
        '[role="button"]', '[role="link"]', '[role="tab"]', '[role="menuitem"]',
        '[role="checkbox"]', '[role="radio"]', '[role="combobox"]', '[role="textbox"]',
        '[role="option"]', '[onclick]', '[tabindex]:not([tabindex="-1"])',
        '[contenteditable="true"]', '[contenteditable=""]'
    ].join(', ');
    const results = [];

    // Positional path; same-tag siblings get a 1-based predicate.
    function xpathOf(el) {
        const parts = [];
        let node = el;
        while (node && node.nodeType === 1) {
            const tag = node.tagName.toLowerCase();
            const parent = node.parentElement;
            if (parent) {
                const same = Array.from(parent.children).filter(c => c.tagName === node.tagName);
                parts.unshift(same.length > 1 ? tag + '[' + (same.indexOf(node) + 1) + ']' : tag);
            } else {
                parts.unshift(tag);
            }
            node = parent;
        }
        return '/' + parts.join('/');
    }

    function rendered(el) {
        const rect = el.getBoundingClientRect();
        if (rect.width < 1 || rect.height < 1) return false;

        const style = getComputedStyle(el);
        if (style.display === 'none' || style.visibility === 'hidden') return false;

        if (opts.viewport_only) {
            if (rect.bottom < 0 || rect.top > window.innerHeight) return false;
            if (rect.right < 0 || rect.left > window.innerWidth) return false;
        }
        return true;
    }

    if (!document.body) return results;
    for (const el of document.body.querySelectorAll('*')) {
        if (!el.matches(INTERACTIVE) || !rendered(el)) continue;
        const attributes = {};
        for (const a of el.attributes) attributes[a.name] = a.value;
        results.push({ tag: el.tagName.toLowerCase(), xpath: xpathOf(el), attributes });
    }
    return results;
}
"#;

/// Run the enumeration script and return elements in the page's native order.
pub async fn interactive_elements(
    driver: &dyn PageDriver,
    viewport_only: bool,
) -> Result<Vec<RawElement>> {
    let value = driver
        .evaluate(
            INTERACTIVE_ELEMENTS_JS,
            json!({ "viewport_only": viewport_only }),
        )
        .await?;

    serde_json::from_value(value)
        .map_err(|e| Error::Script(format!("element enumeration parse error: {}", e)))
}
