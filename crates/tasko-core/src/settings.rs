use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tasko_shared::{Priority, Theme};
use tracing::warn;
use url::form_urlencoded::byte_serialize;

const DEFAULT_PLACEHOLDER: &str = "Add task, // to search, @ for quick links...";
const DEFAULT_FONT: &str = "Inter";
const QUERY_SLOT: &str = "{query}";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PriorityColors {
    pub high: String,
    pub medium: String,
    pub low: String,
}

impl Default for PriorityColors {
    fn default() -> Self {
        Self {
            high: "#ef4444".to_string(),
            medium: "#f59e0b".to_string(),
            low: "#22c55e".to_string(),
        }
    }
}

impl PriorityColors {
    pub fn color_for(&self, priority: Priority) -> &str {
        match priority {
            Priority::High => &self.high,
            Priority::Medium => &self.medium,
            Priority::Low => &self.low,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Shortcuts {
    pub new_task: String,
    pub search: String,
    pub toggle_theme: String,
    pub settings: String,
}

impl Default for Shortcuts {
    fn default() -> Self {
        Self {
            new_task: "n".to_string(),
            search: "/".to_string(),
            toggle_theme: "d".to_string(),
            settings: ",".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchEngine {
    pub id: String,
    pub prefix: String,
    pub name: String,
    /// Template with a `{query}` slot.
    pub url: String,
}

impl SearchEngine {
    fn new(id: &str, name: &str, url: &str) -> Self {
        Self {
            id: id.to_string(),
            prefix: id.to_string(),
            name: name.to_string(),
            url: url.to_string(),
        }
    }

    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new("yt", "YouTube", "https://www.youtube.com/results?search_query={query}"),
            Self::new("gh", "GitHub", "https://github.com/search?q={query}"),
            Self::new(
                "wiki",
                "Wikipedia",
                "https://en.wikipedia.org/wiki/Special:Search?search={query}",
            ),
            Self::new("maps", "Google Maps", "https://www.google.com/maps/search/{query}"),
            Self::new("x", "X / Twitter", "https://x.com/search?q={query}"),
            Self::new("chat", "ChatGPT", "https://chatgpt.com/?q={query}"),
        ]
    }

    pub fn url_for(&self, query: &str) -> String {
        let encoded: String = byte_serialize(query.as_bytes()).collect();
        self.url.replacen(QUERY_SLOT, &encoded, 1)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct WidgetPosition {
    #[serde(default)]
    pub x: Option<String>,
    #[serde(default)]
    pub y: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Widget {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub position: Option<WidgetPosition>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub theme: Theme,
    pub colors: PriorityColors,
    pub shortcuts: Shortcuts,
    pub show_clock: bool,
    pub quick_search: bool,
    pub show_suggestions: bool,
    pub show_timestamps: bool,
    pub skip_delete_confirm: bool,
    pub placeholder: String,
    pub search_engines: Vec<SearchEngine>,
    pub font_family: String,
    pub name: String,
    pub widgets: Vec<Widget>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            theme: Theme::Light,
            colors: PriorityColors::default(),
            shortcuts: Shortcuts::default(),
            show_clock: true,
            quick_search: true,
            show_suggestions: false,
            show_timestamps: false,
            skip_delete_confirm: false,
            placeholder: DEFAULT_PLACEHOLDER.to_string(),
            search_engines: SearchEngine::defaults(),
            font_family: DEFAULT_FONT.to_string(),
            name: String::new(),
            widgets: Vec::new(),
        }
    }
}

impl Settings {
    /// Applies a persisted (possibly partial or malformed) settings blob on
    /// top of `base`.
    ///
    /// Scalar options absent from `raw`, or of the wrong shape, keep `base`'s
    /// value. Structural options never inherit from `base`: shortcuts fall
    /// back key by key to their defaults, `widgets` to an empty list and
    /// `searchEngines` to the built-in engines.
    pub fn merged(base: &Settings, raw: &Value) -> Settings {
        let Some(obj) = raw.as_object() else {
            warn!("settings blob is not an object; keeping current settings");
            return base.clone();
        };

        Settings {
            theme: field(obj, "theme").unwrap_or(base.theme),
            colors: merge_colors(&base.colors, obj.get("colors")),
            shortcuts: merge_shortcuts(obj.get("shortcuts")),
            show_clock: field(obj, "showClock").unwrap_or(base.show_clock),
            quick_search: field(obj, "quickSearch").unwrap_or(base.quick_search),
            show_suggestions: field(obj, "showSuggestions").unwrap_or(base.show_suggestions),
            show_timestamps: field(obj, "showTimestamps").unwrap_or(base.show_timestamps),
            skip_delete_confirm: field(obj, "skipDeleteConfirm")
                .unwrap_or(base.skip_delete_confirm),
            placeholder: field(obj, "placeholder").unwrap_or_else(|| base.placeholder.clone()),
            search_engines: list_field(obj, "searchEngines").unwrap_or_else(SearchEngine::defaults),
            font_family: field(obj, "fontFamily").unwrap_or_else(|| base.font_family.clone()),
            name: field(obj, "name").unwrap_or_else(|| base.name.clone()),
            widgets: list_field(obj, "widgets").unwrap_or_default(),
        }
    }

    pub fn toggle_theme(&mut self) -> Theme {
        self.theme = self.theme.toggled();
        self.theme
    }

    pub fn search_engine(&self, prefix: &str) -> Option<&SearchEngine> {
        self.search_engines
            .iter()
            .find(|engine| engine.prefix.eq_ignore_ascii_case(prefix))
    }
}

fn merge_colors(base: &PriorityColors, raw: Option<&Value>) -> PriorityColors {
    let Some(obj) = raw.and_then(Value::as_object) else {
        return base.clone();
    };
    PriorityColors {
        high: field(obj, "high").unwrap_or_else(|| base.high.clone()),
        medium: field(obj, "medium").unwrap_or_else(|| base.medium.clone()),
        low: field(obj, "low").unwrap_or_else(|| base.low.clone()),
    }
}

fn merge_shortcuts(raw: Option<&Value>) -> Shortcuts {
    let defaults = Shortcuts::default();
    let Some(obj) = raw.and_then(Value::as_object) else {
        return defaults;
    };
    Shortcuts {
        new_task: field(obj, "newTask").unwrap_or(defaults.new_task),
        search: field(obj, "search").unwrap_or(defaults.search),
        toggle_theme: field(obj, "toggleTheme").unwrap_or(defaults.toggle_theme),
        settings: field(obj, "settings").unwrap_or(defaults.settings),
    }
}

fn field<T>(obj: &Map<String, Value>, key: &str) -> Option<T>
where
    T: DeserializeOwned,
{
    let value = obj.get(key)?;
    if value.is_null() {
        return None;
    }
    match T::deserialize(value) {
        Ok(parsed) => Some(parsed),
        Err(err) => {
            warn!(key, error = %err, "ignoring malformed setting");
            None
        }
    }
}

/// Like [`field`] for arrays, but element by element: one malformed entry
/// is dropped instead of the whole list.
fn list_field<T>(obj: &Map<String, Value>, key: &str) -> Option<Vec<T>>
where
    T: DeserializeOwned,
{
    let value = obj.get(key)?;
    let Some(items) = value.as_array() else {
        if !value.is_null() {
            warn!(key, "ignoring setting that is not a list");
        }
        return None;
    };
    let list = items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| match T::deserialize(item) {
            Ok(parsed) => Some(parsed),
            Err(err) => {
                warn!(key, index, error = %err, "skipping malformed list entry");
                None
            }
        })
        .collect();
    Some(list)
}
