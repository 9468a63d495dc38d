//! Fetched storefront pages and the DOM queries the capture flow needs.
//!
//! A page keeps its raw HTML and re-parses it per query. `scraper`'s
//! parsed DOM is not `Send`, so holding the source string is what lets
//! pages move across the worker thread boundary; parsing is cheap at
//! storefront page sizes.

use crate::error::{Error, Result};
use crate::CaptureConfig;
use log::debug;
use reqwest::blocking::Client;
use scraper::{ElementRef, Html, Selector};
use std::time::Duration;

/// A clickable control found on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageControl {
    /// Visible text of the element, whitespace-collapsed.
    pub label: String,
    /// `id` attribute, if the element carries one.
    pub id: Option<String>,
    /// Navigation target the control would trigger on its own.
    pub href: Option<String>,
}

/// Blocking HTTP client configured for storefront fetches.
pub struct PageClient {
    client: Client,
    user_agent: String,
}

impl PageClient {
    pub fn new(config: &CaptureConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| Error::InitializationError(format!("HTTP client: {}", e)))?;

        Ok(Self {
            client,
            user_agent: config.user_agent.clone(),
        })
    }

    /// Fetch `url` and wrap the body as a [`DesignPage`].
    pub fn fetch(&self, url: &str) -> Result<DesignPage> {
        debug!("Fetching page: {}", url);

        let response = self
            .client
            .get(url)
            .header("User-Agent", &self.user_agent)
            .send()
            .map_err(|e| Error::PageError(format!("{}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::PageError(format!("{}: HTTP {}", url, status)));
        }

        let html = response
            .text()
            .map_err(|e| Error::PageError(format!("{}: {}", url, e)))?;

        Ok(DesignPage::from_html(html, url))
    }
}

/// One fetched snapshot of the storefront design page.
pub struct DesignPage {
    html: String,
    url: String,
}

impl DesignPage {
    pub fn from_html(html: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn html(&self) -> &str {
        &self.html
    }

    fn document(&self) -> Html {
        Html::parse_document(&self.html)
    }

    fn id_selector(id: &str) -> Option<Selector> {
        Selector::parse(&format!("#{}", id)).ok()
    }

    /// Whether an element with the given id exists.
    pub fn has_element(&self, id: &str) -> bool {
        let sel = match Self::id_selector(id) {
            Some(s) => s,
            None => return false,
        };
        self.document().select(&sel).next().is_some()
    }

    /// Collapsed text content of the element with the given id.
    pub fn element_text(&self, id: &str) -> Option<String> {
        let sel = Self::id_selector(id)?;
        let document = self.document();
        let element = document.select(&sel).next()?;
        Some(collapse_whitespace(&element.text().collect::<String>()))
    }

    /// Attribute value of the element with the given id.
    pub fn attr(&self, id: &str, name: &str) -> Option<String> {
        let sel = Self::id_selector(id)?;
        let document = self.document();
        let element = document.select(&sel).next()?;
        element.value().attr(name).map(str::to_string)
    }

    /// `value` attribute of the input with the given id, parsed as an integer.
    /// Missing elements and unparseable values both read as `None`.
    pub fn slider_value(&self, id: &str) -> Option<i32> {
        self.attr(id, "value")?.trim().parse::<i32>().ok()
    }

    /// `content` of the first `<meta name="...">` tag with the given name.
    pub fn meta_content(&self, name: &str) -> Option<String> {
        let sel = Selector::parse(&format!("meta[name=\"{}\"]", name)).ok()?;
        let document = self.document();
        let element = document.select(&sel).next()?;
        let content = element.value().attr("content")?.trim();
        if content.is_empty() {
            None
        } else {
            Some(content.to_string())
        }
    }

    /// Cell texts for each `<tr>` under the tbody with the given id.
    pub fn table_rows(&self, tbody_id: &str) -> Vec<Vec<String>> {
        let tbody_sel = match Self::id_selector(tbody_id) {
            Some(s) => s,
            None => return Vec::new(),
        };
        let tr_sel = Selector::parse("tr").unwrap();
        let cell_sel = Selector::parse("td, th").unwrap();

        let document = self.document();
        let tbody = match document.select(&tbody_sel).next() {
            Some(t) => t,
            None => return Vec::new(),
        };

        tbody
            .select(&tr_sel)
            .map(|row| {
                row.select(&cell_sel)
                    .map(|cell| collapse_whitespace(&cell.text().collect::<String>()))
                    .collect()
            })
            .collect()
    }

    /// The control with the given id, if present.
    pub fn control_by_id(&self, id: &str) -> Option<PageControl> {
        let sel = Self::id_selector(id)?;
        let document = self.document();
        let element = document.select(&sel).next()?;
        Some(Self::control_from(element))
    }

    /// The first button or anchor whose collapsed text contains `phrase`.
    pub fn control_by_phrase(&self, phrase: &str) -> Option<PageControl> {
        let sel = Selector::parse("button, a").unwrap();
        let document = self.document();
        document
            .select(&sel)
            .find(|el| collapse_whitespace(&el.text().collect::<String>()).contains(phrase))
            .map(Self::control_from)
    }

    fn control_from(element: ElementRef) -> PageControl {
        PageControl {
            label: collapse_whitespace(&element.text().collect::<String>()),
            id: element.value().attr("id").map(str::to_string),
            href: element.value().attr("href").map(str::to_string),
        }
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
