//! Catalog-addressed actions: resolve an index from the stored catalog back to
//! a live element and fill or click it.
//!
//! Each action reads the catalog from the store, never from memory, so it sees
//! whatever snapshot the caller last committed. Nothing is retried.

use std::fmt;

use serde::Serialize;
use tracing::{debug, warn};

use crate::catalog::{self, Catalog, CatalogOptions, CatalogStamp, ElementDescriptor};
use crate::driver::PageDriver;
use crate::store::CatalogStore;
use crate::{Error, Result};

/// A successful fill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Filled {
    pub index: usize,
    pub tag: String,
    pub description: String,
}

impl fmt::Display for Filled {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Filled")
    }
}

/// A successful click.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Clicked {
    pub index: usize,
    pub tag: String,
    pub description: String,
}

impl fmt::Display for Clicked {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Clicked")
    }
}

#[derive(Clone, Copy)]
enum Action {
    Fill,
    Click,
}

impl Action {
    fn failed(self, index: usize, reason: impl fmt::Display) -> Error {
        let reason = reason.to_string();
        match self {
            Action::Fill => Error::FillFailed { index, reason },
            Action::Click => Error::ClickFailed { index, reason },
        }
    }
}

/// Set the text of input-like element `index`, then press Enter on it.
pub async fn fill(
    driver: &dyn PageDriver,
    store: &dyn CatalogStore,
    options: &CatalogOptions,
    index: usize,
    text: &str,
) -> Result<Filled> {
    let (catalog, stamp) = load_catalog(store).await;
    let element = catalog.find_input(index).ok_or(Error::ElementNotFound { index })?;
    ensure_fresh(driver, options, stamp.as_ref(), element, Action::Fill).await?;

    debug!("Filling {} ({} chars)", element, text.len());
    driver
        .fill(&element.locator, text)
        .await
        .map_err(|e| Action::Fill.failed(index, e))?;
    driver
        .press_enter(&element.locator)
        .await
        .map_err(|e| Action::Fill.failed(index, e))?;

    Ok(Filled {
        index,
        tag: element.tag.clone(),
        description: element.description_text(),
    })
}

/// Click clickable element `index`.
pub async fn click(
    driver: &dyn PageDriver,
    store: &dyn CatalogStore,
    options: &CatalogOptions,
    index: usize,
) -> Result<Clicked> {
    let (catalog, stamp) = load_catalog(store).await;
    let element = catalog
        .find_clickable(index)
        .ok_or(Error::ElementNotFound { index })?;
    ensure_fresh(driver, options, stamp.as_ref(), element, Action::Click).await?;

    debug!("Clicking {}", element);
    driver
        .click(&element.locator)
        .await
        .map_err(|e| Action::Click.failed(index, e))?;

    Ok(Clicked {
        index,
        tag: element.tag.clone(),
        description: element.description_text(),
    })
}

/// The stored catalog, or an empty one when the store is empty or unreadable.
async fn load_catalog(store: &dyn CatalogStore) -> (Catalog, Option<CatalogStamp>) {
    match store.load().await {
        Ok(Some(stored)) => (stored.catalog, stored.stamp),
        Ok(None) => {
            warn!("No catalog stored yet; build one before acting");
            (Catalog::default(), None)
        }
        Err(e) => {
            warn!("Stored catalog unreadable, treating as empty: {}", e);
            (Catalog::default(), None)
        }
    }
}

/// Re-enumerate the live page and compare its structure to the stamp.
///
/// Unstamped catalogs, and all catalogs when `verify_fresh` is off, pass unchecked.
async fn ensure_fresh(
    driver: &dyn PageDriver,
    options: &CatalogOptions,
    stamp: Option<&CatalogStamp>,
    element: &ElementDescriptor,
    action: Action,
) -> Result<()> {
    let Some(stamp) = stamp.filter(|_| options.verify_fresh) else {
        return Ok(());
    };

    let live = catalog::page_fingerprint(driver)
        .await
        .map_err(|e| action.failed(element.index, e))?;
    if live != stamp.fingerprint {
        warn!(
            "Page changed since catalog generation {}; refusing to act on [{}]",
            stamp.generation, element.index
        );
        return Err(Error::StaleCatalog {
            index: element.index,
            generation: stamp.generation,
        });
    }
    Ok(())
}
