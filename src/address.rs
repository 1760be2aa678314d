//! Address-bar access for OAuth and magic-link callbacks.
//!
//! SYSTEM CONTEXT
//! ==============
//! Provider redirects land on the site with the session in the URL fragment
//! (`#access_token=...&refresh_token=...`). The synchronizer reads the
//! fragment once at startup and strips it without navigating so tokens do not
//! linger in the visible address or in history.

use std::collections::HashMap;
use std::sync::Mutex;

use reqwest::Url;

const ACCESS_TOKEN_KEY: &str = "access_token";

pub trait AddressBar: Send + Sync {
    /// Full current address, including any fragment.
    fn current(&self) -> String;

    /// Replace the visible address without navigating.
    fn replace(&self, address: &str);
}

/// Fragment portion of `address` (without `#`), if non-empty.
#[must_use]
pub fn fragment(address: &str) -> Option<&str> {
    address.split_once('#').map(|(_, f)| f).filter(|f| !f.is_empty())
}

/// True when the address carries a provider callback token.
#[must_use]
pub fn has_auth_fragment(address: &str) -> bool {
    fragment(address).is_some_and(|f| parse_fragment_params(f).contains_key(ACCESS_TOKEN_KEY))
}

/// `address` with the fragment removed. Unparseable addresses are cut at `#`.
#[must_use]
pub fn strip_fragment(address: &str) -> String {
    if let Ok(mut url) = Url::parse(address) {
        url.set_fragment(None);
        return url.into();
    }
    address.split_once('#').map_or(address, |(head, _)| head).to_owned()
}

/// Decode `key=value&...` pairs from a callback fragment.
#[must_use]
pub fn parse_fragment_params(fragment: &str) -> HashMap<String, String> {
    let fragment = fragment.trim_start_matches('#');
    let Ok(mut scratch) = Url::parse("http://fragment.invalid/") else {
        return HashMap::new();
    };
    scratch.set_query(Some(fragment));
    scratch
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

/// Strip the callback fragment if one is present. Returns whether it did.
pub fn clear_auth_fragment(bar: &dyn AddressBar) -> bool {
    let current = bar.current();
    if !has_auth_fragment(&current) {
        return false;
    }
    bar.replace(&strip_fragment(&current));
    true
}

// =============================================================================
// IN-MEMORY ADDRESS BAR
// =============================================================================

/// Address bar for hosts without a browser: the CLI and tests.
pub struct MemoryAddressBar {
    inner: Mutex<MemoryAddressInner>,
}

struct MemoryAddressInner {
    current: String,
    replacements: Vec<String>,
}

impl MemoryAddressBar {
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self { inner: Mutex::new(MemoryAddressInner { current: address.into(), replacements: Vec::new() }) }
    }

    /// Every address passed to `replace`, oldest first.
    #[must_use]
    pub fn replacements(&self) -> Vec<String> {
        self.inner
            .lock()
            .map(|inner| inner.replacements.clone())
            .unwrap_or_default()
    }
}

impl AddressBar for MemoryAddressBar {
    fn current(&self) -> String {
        self.inner
            .lock()
            .map(|inner| inner.current.clone())
            .unwrap_or_default()
    }

    fn replace(&self, address: &str) {
        if let Ok(mut inner) = self.inner.lock() {
            address.clone_into(&mut inner.current);
            inner.replacements.push(address.to_owned());
        }
    }
}

#[cfg(test)]
#[path = "address_test.rs"]
mod tests;
