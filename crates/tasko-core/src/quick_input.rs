use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, error};
use url::Url;
use url::form_urlencoded::byte_serialize;

use crate::settings::{SearchEngine, Settings};

const WEB_SEARCH: &str = "https://www.google.com/search?q=";
const QUERY_SLOT: &str = "{query}";

static ENGINE_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^@([A-Za-z0-9_]+)(?:\s+(.+))?$"));

/// What the quick-add box should do with a line of input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QuickAction {
    /// Open a search results page.
    Search { url: String },
    /// Open an engine's home page (`@prefix` without a query).
    OpenSite { url: String },
    AddTask { title: String },
}

impl QuickAction {
    /// `None` for blank input. Search shortcuts are only recognized while
    /// `quick_search` is on; anything unrecognized becomes a task title.
    pub fn parse(input: &str, settings: &Settings) -> Option<Self> {
        let value = input.trim();
        if value.is_empty() {
            return None;
        }

        if settings.quick_search
            && let Some(action) = search_action(value, settings)
        {
            debug!(?action, "quick input resolved to a search");
            return Some(action);
        }

        Some(Self::AddTask {
            title: value.to_string(),
        })
    }
}

fn search_action(value: &str, settings: &Settings) -> Option<QuickAction> {
    if let Some(rest) = value.strip_prefix("//") {
        let query = rest.trim();
        if query.is_empty() {
            return None;
        }
        return Some(QuickAction::Search {
            url: format!("{WEB_SEARCH}{}", encode(query)),
        });
    }

    if !value.starts_with('@') {
        return None;
    }

    let re = match &*ENGINE_RE {
        Ok(re) => re,
        Err(err) => {
            error!(error = %err, "engine prefix pattern failed to compile");
            return None;
        }
    };
    let caps = re.captures(value)?;
    let engine = settings.search_engine(caps.get(1)?.as_str())?;

    match caps.get(2).map(|m| m.as_str().trim()) {
        Some(query) if !query.is_empty() => Some(QuickAction::Search {
            url: engine.url_for(query),
        }),
        Some(_) => None,
        None => Some(QuickAction::OpenSite {
            url: site_url(engine),
        }),
    }
}

/// The template's origin, or the text ahead of `{query}` when the template
/// has no usable origin.
fn site_url(engine: &SearchEngine) -> String {
    if let Ok(parsed) = Url::parse(&engine.url) {
        let origin = parsed.origin();
        if origin.is_tuple() {
            return origin.ascii_serialization();
        }
    }

    let head = engine
        .url
        .split(QUERY_SLOT)
        .next()
        .unwrap_or(engine.url.as_str());
    head.strip_suffix(['?', '&']).unwrap_or(head).to_string()
}

fn encode(query: &str) -> String {
    byte_serialize(query.as_bytes()).collect()
}
