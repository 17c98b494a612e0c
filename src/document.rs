//! The dashboard document
//!
//! A single root aggregate holding scalar settings, link groups, the widget
//! collections and two layout views (`widgetOrder`, `colSpan`) that reference
//! groups and widgets by id. Every field is independently defaulted so that a
//! document written by an older release still loads.

use crate::config::DEFAULT_MONITOR_INTERVAL_SECS;
use crate::error::{IronDashError, Result};
use crate::utils::generate_id;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::str::FromStr;

/// Maximum number of tags kept on a link
pub const MAX_TAGS: usize = 10;
/// Maximum length of a single tag, in characters
pub const MAX_TAG_LEN: usize = 30;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Document {
    pub title: String,
    pub palette: String,
    pub dark_mode: bool,
    /// Seconds between health monitor cycles; zero or less disables probing
    pub ping_interval: i64,
    pub custom_css: String,
    pub weather: WeatherSettings,
    pub background: Background,
    pub groups: Vec<Group>,
    pub notes: Vec<Note>,
    pub feeds: Vec<FeedWidget>,
    pub iframes: Vec<IframeWidget>,
    pub countdowns: Vec<Countdown>,
    pub calendars: Vec<CalendarWidget>,
    /// Display order of groups and widgets
    pub widget_order: Vec<String>,
    /// Layout weight per group or widget id
    pub col_span: BTreeMap<String, u32>,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            title: "Iron Dash".to_string(),
            palette: "default".to_string(),
            dark_mode: true,
            ping_interval: DEFAULT_MONITOR_INTERVAL_SECS,
            custom_css: String::new(),
            weather: WeatherSettings::default(),
            background: Background::default(),
            groups: Vec::new(),
            notes: Vec::new(),
            feeds: Vec::new(),
            iframes: Vec::new(),
            countdowns: Vec::new(),
            calendars: Vec::new(),
            widget_order: Vec::new(),
            col_span: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WeatherSettings {
    pub enabled: bool,
    pub latitude: f64,
    pub longitude: f64,
    /// `celsius` or `fahrenheit`
    pub units: String,
}

impl Default for WeatherSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            latitude: 0.0,
            longitude: 0.0,
            units: "celsius".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Background {
    pub url: String,
    pub blur: u32,
}

/// A named collection of links
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Group {
    pub id: String,
    pub name: String,
    pub accent: String,
    pub icon: Option<String>,
    pub collapsed: bool,
    pub links: Vec<Link>,
}

impl Default for Group {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            accent: "blue".to_string(),
            icon: None,
            collapsed: false,
            links: Vec::new(),
        }
    }
}

/// How the dashboard opens a link
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OpenMode {
    #[default]
    Tab,
    #[serde(rename = "self")]
    SameTab,
    Modal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Link {
    pub id: String,
    pub name: String,
    pub url: String,
    pub icon: Option<String>,
    pub background: Option<String>,
    pub description: String,
    /// Whether the health monitor probes this link
    pub ping: bool,
    /// Probe target when it differs from the navigation URL
    pub ping_url: Option<String>,
    pub pinned: bool,
    pub hotkey: String,
    pub tags: Vec<String>,
    pub open_mode: OpenMode,
}

impl Default for Link {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: String::new(),
            url: String::new(),
            icon: None,
            background: None,
            description: String::new(),
            ping: true,
            ping_url: None,
            pinned: false,
            hotkey: String::new(),
            tags: Vec::new(),
            open_mode: OpenMode::Tab,
        }
    }
}

impl Link {
    /// URL the health monitor should probe
    #[must_use]
    pub fn probe_target(&self) -> &str {
        match self.ping_url.as_deref().map(str::trim) {
            Some(url) if !url.is_empty() => url,
            _ => &self.url,
        }
    }

    /// Bring the hotkey and tags into their canonical form.
    pub fn normalize(&mut self) {
        self.hotkey = self
            .hotkey
            .chars()
            .filter(char::is_ascii_alphanumeric)
            .map(|c| c.to_ascii_lowercase())
            .take(1)
            .collect();
        self.tags = self
            .tags
            .iter()
            .map(|tag| tag.trim())
            .filter(|tag| !tag.is_empty())
            .map(|tag| tag.chars().take(MAX_TAG_LEN).collect())
            .take(MAX_TAGS)
            .collect();
    }

    fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            return Err(IronDashError::Validation(
                "Link URL cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Note {
    pub id: String,
    pub title: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct FeedWidget {
    pub id: String,
    pub title: String,
    pub url: String,
    /// Number of items the widget shows
    pub limit: u32,
}

impl Default for FeedWidget {
    fn default() -> Self {
        Self {
            id: String::new(),
            title: String::new(),
            url: String::new(),
            limit: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct IframeWidget {
    pub id: String,
    pub title: String,
    pub url: String,
    pub height: u32,
}

impl Default for IframeWidget {
    fn default() -> Self {
        Self {
            id: String::new(),
            title: String::new(),
            url: String::new(),
            height: 300,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Countdown {
    pub id: String,
    pub title: String,
    /// RFC 3339 timestamp the countdown runs to
    pub target: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CalendarWidget {
    pub id: String,
    pub title: String,
    pub url: String,
}

/// The widget collections of a [`Document`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetKind {
    Notes,
    Feeds,
    Iframes,
    Countdowns,
    Calendars,
}

impl WidgetKind {
    fn id_prefix(self) -> &'static str {
        match self {
            WidgetKind::Notes => "note",
            WidgetKind::Feeds => "feed",
            WidgetKind::Iframes => "iframe",
            WidgetKind::Countdowns => "countdown",
            WidgetKind::Calendars => "cal",
        }
    }
}

impl FromStr for WidgetKind {
    type Err = IronDashError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "notes" => Ok(WidgetKind::Notes),
            "feeds" => Ok(WidgetKind::Feeds),
            "iframes" => Ok(WidgetKind::Iframes),
            "countdowns" => Ok(WidgetKind::Countdowns),
            "calendars" => Ok(WidgetKind::Calendars),
            other => Err(IronDashError::NotFound(format!("widget kind {other}"))),
        }
    }
}

/// Common behaviour of the widget records stored in a [`Document`]
trait WidgetRecord: Serialize + DeserializeOwned + Default {
    fn id(&self) -> &str;
    fn set_id(&mut self, id: String);

    /// External URL whose fetched content is cached on behalf of this widget
    fn source(&self) -> Option<&str> {
        None
    }

    /// Canonicalize the record and check it before it is stored.
    fn prepare(&mut self) -> Result<()> {
        Ok(())
    }
}

macro_rules! widget_record {
    ($ty:ty) => {
        widget_record!($ty, |_w| None, |_w| Ok(()));
    };
    ($ty:ty, |$w:ident| $source:expr, |$v:ident| $validate:expr) => {
        impl WidgetRecord for $ty {
            fn id(&self) -> &str {
                &self.id
            }

            fn set_id(&mut self, id: String) {
                self.id = id;
            }

            fn source(&self) -> Option<&str> {
                let $w = self;
                $source
            }

            fn prepare(&mut self) -> Result<()> {
                let $v = self;
                $validate
            }
        }
    };
}

widget_record!(Note);
widget_record!(Countdown);
widget_record!(IframeWidget, |_w| None, |w| require_url(&mut w.url));
widget_record!(FeedWidget, |w| Some(w.url.as_str()), |w| require_url(&mut w.url));
widget_record!(CalendarWidget, |w| Some(w.url.as_str()), |w| require_url(&mut w.url));

/// Trim `raw` in place and require an http(s) URL. The trimmed form is the key
/// the content caches use.
fn require_url(raw: &mut String) -> Result<()> {
    let trimmed = raw.trim();
    if trimmed.len() != raw.len() {
        *raw = trimmed.to_string();
    }
    match url::Url::parse(raw) {
        Ok(url) if matches!(url.scheme(), "http" | "https") => Ok(()),
        _ => Err(IronDashError::Validation(format!(
            "Invalid URL format: {raw}"
        ))),
    }
}

/// Run `$body` with `$list` bound to the collection for `$kind`.
macro_rules! with_widgets {
    ($doc:expr, $kind:expr, |$list:ident| $body:expr) => {
        match $kind {
            WidgetKind::Notes => {
                let $list = &mut $doc.notes;
                $body
            }
            WidgetKind::Feeds => {
                let $list = &mut $doc.feeds;
                $body
            }
            WidgetKind::Iframes => {
                let $list = &mut $doc.iframes;
                $body
            }
            WidgetKind::Countdowns => {
                let $list = &mut $doc.countdowns;
                $body
            }
            WidgetKind::Calendars => {
                let $list = &mut $doc.calendars;
                $body
            }
        }
    };
}

/// Outcome of a widget update
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetChange {
    /// The widget after the update
    pub widget: Value,
    /// Source URL the widget no longer uses, if the update changed it
    pub stale_source: Option<String>,
}

/// Overlay the fields present in `patch` onto `current`.
///
/// Fields named in `immutable` are skipped. Unknown fields are ignored; a
/// known field with the wrong type is a validation error.
///
/// # Errors
///
/// Returns [`IronDashError::Validation`] if `patch` is not an object or a field
/// has the wrong type.
pub fn merge_fields<T>(current: &T, patch: &Value, immutable: &[&str]) -> Result<T>
where
    T: Serialize + DeserializeOwned,
{
    let Value::Object(fields) = patch else {
        return Err(IronDashError::Validation(
            "Expected a JSON object".to_string(),
        ));
    };

    let mut merged = serde_json::to_value(current)?;
    if let Value::Object(target) = &mut merged {
        for (key, value) in fields {
            if !immutable.contains(&key.as_str()) {
                target.insert(key.clone(), value.clone());
            }
        }
    }

    serde_json::from_value(merged)
        .map_err(|e| IronDashError::Validation(format!("Invalid field value: {e}")))
}

impl Document {
    /// Every id that `widgetOrder` and `colSpan` may legitimately reference
    #[must_use]
    pub fn live_ids(&self) -> HashSet<&str> {
        let mut ids = HashSet::new();
        for group in &self.groups {
            ids.insert(group.id.as_str());
            ids.extend(group.links.iter().map(|l| l.id.as_str()));
        }
        ids.extend(self.notes.iter().map(|w| w.id.as_str()));
        ids.extend(self.feeds.iter().map(|w| w.id.as_str()));
        ids.extend(self.iframes.iter().map(|w| w.id.as_str()));
        ids.extend(self.countdowns.iter().map(|w| w.id.as_str()));
        ids.extend(self.calendars.iter().map(|w| w.id.as_str()));
        ids
    }

    /// Drop layout entries that no longer reference a live entity.
    ///
    /// Returns the number of entries removed.
    pub fn prune_layout(&mut self) -> usize {
        let live: HashSet<String> = self.live_ids().into_iter().map(String::from).collect();
        let before = self.widget_order.len() + self.col_span.len();

        let mut seen = HashSet::new();
        self.widget_order
            .retain(|id| live.contains(id) && seen.insert(id.clone()));
        self.col_span.retain(|id, _| live.contains(id));

        before - (self.widget_order.len() + self.col_span.len())
    }

    fn forget(&mut self, id: &str) {
        self.widget_order.retain(|entry| entry != id);
        self.col_span.remove(id);
    }

    /// Every link across all groups, in display order
    pub fn links(&self) -> impl Iterator<Item = &Link> {
        self.groups.iter().flat_map(|g| g.links.iter())
    }

    fn group_mut(&mut self, id: &str) -> Result<&mut Group> {
        self.groups
            .iter_mut()
            .find(|g| g.id == id)
            .ok_or_else(|| IronDashError::NotFound(format!("group {id}")))
    }

    fn link_mut(&mut self, id: &str) -> Result<&mut Link> {
        self.groups
            .iter_mut()
            .flat_map(|g| g.links.iter_mut())
            .find(|l| l.id == id)
            .ok_or_else(|| IronDashError::NotFound(format!("link {id}")))
    }

    /// Create a group from the fields in `patch` and append it to the layout.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed patch or an empty name.
    pub fn add_group(&mut self, patch: &Value) -> Result<Group> {
        let mut group: Group = merge_fields(&Group::default(), patch, &["id", "links"])?;
        if group.name.trim().is_empty() {
            return Err(IronDashError::Validation(
                "Group name cannot be empty".to_string(),
            ));
        }
        group.id = generate_id("g");
        self.widget_order.push(group.id.clone());
        self.groups.push(group.clone());
        Ok(group)
    }

    /// Apply a partial update to a group. Its links are managed separately.
    ///
    /// # Errors
    ///
    /// Returns not-found for an unknown id, or a validation error.
    pub fn update_group(&mut self, id: &str, patch: &Value) -> Result<Group> {
        let group = self.group_mut(id)?;
        let updated: Group = merge_fields(&*group, patch, &["id", "links"])?;
        if updated.name.trim().is_empty() {
            return Err(IronDashError::Validation(
                "Group name cannot be empty".to_string(),
            ));
        }
        *group = updated;
        Ok(group.clone())
    }

    /// Remove a group, its links, and every layout reference to any of them.
    ///
    /// # Errors
    ///
    /// Returns not-found for an unknown id.
    pub fn delete_group(&mut self, id: &str) -> Result<Group> {
        let index = self
            .groups
            .iter()
            .position(|g| g.id == id)
            .ok_or_else(|| IronDashError::NotFound(format!("group {id}")))?;
        let group = self.groups.remove(index);
        self.forget(&group.id);
        for link in &group.links {
            self.forget(&link.id);
        }
        Ok(group)
    }

    /// Create a link inside `group_id`.
    ///
    /// # Errors
    ///
    /// Returns not-found for an unknown group, or a validation error.
    pub fn add_link(&mut self, group_id: &str, patch: &Value) -> Result<Link> {
        let mut link: Link = merge_fields(&Link::default(), patch, &["id"])?;
        link.validate()?;
        link.normalize();
        if link.name.trim().is_empty() {
            link.name.clone_from(&link.url);
        }
        link.id = generate_id("l");

        let group = self.group_mut(group_id)?;
        group.links.push(link.clone());
        Ok(link)
    }

    /// Apply a partial update to a link.
    ///
    /// # Errors
    ///
    /// Returns not-found for an unknown id, or a validation error.
    pub fn update_link(&mut self, id: &str, patch: &Value) -> Result<Link> {
        let link = self.link_mut(id)?;
        let mut updated: Link = merge_fields(&*link, patch, &["id"])?;
        updated.validate()?;
        updated.normalize();
        *link = updated;
        Ok(link.clone())
    }

    /// Remove a link and every layout reference to it.
    ///
    /// # Errors
    ///
    /// Returns not-found for an unknown id.
    pub fn delete_link(&mut self, id: &str) -> Result<Link> {
        let removed = self.groups.iter_mut().find_map(|group| {
            let index = group.links.iter().position(|l| l.id == id)?;
            Some(group.links.remove(index))
        });
        let link = removed.ok_or_else(|| IronDashError::NotFound(format!("link {id}")))?;
        self.forget(&link.id);
        Ok(link)
    }

    /// Move a link into `target_group` at `index` (end of the group if absent
    /// or out of range).
    ///
    /// # Errors
    ///
    /// Returns not-found if the link or the target group does not exist.
    pub fn move_link(&mut self, id: &str, target_group: &str, index: Option<usize>) -> Result<()> {
        if !self.groups.iter().any(|g| g.id == target_group) {
            return Err(IronDashError::NotFound(format!("group {target_group}")));
        }
        let link = self
            .groups
            .iter_mut()
            .find_map(|group| {
                let pos = group.links.iter().position(|l| l.id == id)?;
                Some(group.links.remove(pos))
            })
            .ok_or_else(|| IronDashError::NotFound(format!("link {id}")))?;

        let group = self.group_mut(target_group)?;
        let at = index.unwrap_or(group.links.len()).min(group.links.len());
        group.links.insert(at, link);
        Ok(())
    }

    /// Create a widget of `kind` and append it to the layout.
    ///
    /// # Errors
    ///
    /// Returns a validation error for a malformed patch.
    pub fn add_widget(&mut self, kind: WidgetKind, patch: &Value) -> Result<Value> {
        let (id, widget) = with_widgets!(self, kind, |list| insert_widget(list, kind, patch))?;
        self.widget_order.push(id);
        Ok(widget)
    }

    /// Apply a partial update to a widget.
    ///
    /// # Errors
    ///
    /// Returns not-found for an unknown id, or a validation error.
    pub fn update_widget(&mut self, kind: WidgetKind, id: &str, patch: &Value) -> Result<WidgetChange> {
        with_widgets!(self, kind, |list| update_in(list, id, patch))
    }

    /// Remove a widget and its layout references.
    ///
    /// Returns the source URL of the removed widget, if it had one.
    ///
    /// # Errors
    ///
    /// Returns not-found for an unknown id.
    pub fn delete_widget(&mut self, kind: WidgetKind, id: &str) -> Result<Option<String>> {
        let source = with_widgets!(self, kind, |list| remove_from(list, id))?;
        self.forget(id);
        Ok(source)
    }

    /// Replace the layout views. Absent arguments are left unchanged;
    /// references to unknown ids are dropped.
    pub fn set_layout(&mut self, order: Option<Vec<String>>, col_span: Option<BTreeMap<String, u32>>) {
        if let Some(order) = order {
            self.widget_order = order;
        }
        if let Some(col_span) = col_span {
            self.col_span = col_span;
        }
        self.prune_layout();
    }
}

fn insert_widget<W: WidgetRecord>(list: &mut Vec<W>, kind: WidgetKind, patch: &Value) -> Result<(String, Value)> {
    let mut widget: W = merge_fields(&W::default(), patch, &["id"])?;
    widget.prepare()?;
    widget.set_id(generate_id(kind.id_prefix()));
    let value = serde_json::to_value(&widget)?;
    let id = widget.id().to_string();
    list.push(widget);
    Ok((id, value))
}

fn update_in<W: WidgetRecord>(list: &mut [W], id: &str, patch: &Value) -> Result<WidgetChange> {
    let widget = list
        .iter_mut()
        .find(|w| w.id() == id)
        .ok_or_else(|| IronDashError::NotFound(format!("widget {id}")))?;

    let mut updated: W = merge_fields(&*widget, patch, &["id"])?;
    updated.prepare()?;

    let stale_source = match (widget.source(), updated.source()) {
        (Some(old), new) if Some(old) != new => Some(old.to_string()),
        _ => None,
    };
    *widget = updated;

    Ok(WidgetChange {
        widget: serde_json::to_value(&*widget)?,
        stale_source,
    })
}

fn remove_from<W: WidgetRecord>(list: &mut Vec<W>, id: &str) -> Result<Option<String>> {
    let index = list
        .iter()
        .position(|w| w.id() == id)
        .ok_or_else(|| IronDashError::NotFound(format!("widget {id}")))?;
    let widget = list.remove(index);
    Ok(widget.source().map(String::from))
}
