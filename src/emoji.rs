//! Point-store emoji catalog and the `:code:` text transformer.
//!
//! The catalog is cached explicitly: call [`EmojiCache::initialize`] before
//! rendering, and [`EmojiCache::invalidate`] after a point-store purchase so
//! the next lookup refetches.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::{Client, Url};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::error::QueueError;

static EMOJI_CODE: Lazy<Regex> = Lazy::new(|| Regex::new(r":([\w-]+):").expect("valid emoji regex"));
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("valid whitespace regex"));

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Emoji {
    pub id: i64,
    pub name: String,
    pub code: String,
    pub image_url: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct PurchasedItem {
    item_id: i64,
    name: String,
    #[serde(default)]
    code: Option<String>,
    image_url: String,
}

impl From<PurchasedItem> for Emoji {
    fn from(p: PurchasedItem) -> Self {
        let code = p
            .code
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| fallback_code(&p.name));
        Emoji {
            id: p.item_id,
            name: p.name,
            code,
            image_url: p.image_url,
        }
    }
}

/// `:name-in-lowercase:` with every whitespace run, including leading and
/// trailing ones, replaced by a dash.
pub fn fallback_code(name: &str) -> String {
    let lower = name.to_lowercase();
    format!(":{}:", WHITESPACE.replace_all(&lower, "-"))
}

/// Which list the catalog is built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogScope {
    /// Every item sold in the point store.
    Store,
    /// Only the items the current session has bought.
    Purchased,
}

#[async_trait]
pub trait EmojiSource: Send + Sync + 'static {
    async fn fetch(&self, scope: CatalogScope) -> Result<Vec<Emoji>, QueueError>;
}

#[derive(Debug, Clone)]
pub struct HttpEmojiSource {
    http: Client,
    base_url: Url,
}

impl HttpEmojiSource {
    pub fn new(http: Client, base_url: Url) -> Self {
        Self { http, base_url }
    }

    fn endpoint(&self, scope: CatalogScope) -> Result<Url, QueueError> {
        let path = match scope {
            CatalogScope::Store => "api/v1/pointstore/items",
            CatalogScope::Purchased => "api/v1/pointstore/my-purchases",
        };
        self.base_url
            .join(path)
            .map_err(|e| QueueError::Malformed(format!("invalid endpoint {path}: {e}")))
    }
}

#[async_trait]
impl EmojiSource for HttpEmojiSource {
    async fn fetch(&self, scope: CatalogScope) -> Result<Vec<Emoji>, QueueError> {
        let url = self.endpoint(scope)?;
        debug!(%url, "fetching emoji catalog");
        let res = self.http.get(url).send().await?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().await.unwrap_or_default();
            return Err(QueueError::http(status, body));
        }
        let body = res.text().await?;
        let emojis = match scope {
            CatalogScope::Store => serde_json::from_str::<Vec<Emoji>>(&body)?,
            CatalogScope::Purchased => serde_json::from_str::<Vec<PurchasedItem>>(&body)?
                .into_iter()
                .map(Emoji::from)
                .collect(),
        };
        Ok(emojis)
    }
}

pub struct EmojiCache<S> {
    source: S,
    scope: CatalogScope,
    catalog: RwLock<Option<Arc<Vec<Emoji>>>>,
}

impl<S: EmojiSource> EmojiCache<S> {
    pub fn new(source: S, scope: CatalogScope) -> Self {
        Self {
            source,
            scope,
            catalog: RwLock::new(None),
        }
    }

    /// Load the catalog. A failed load is logged and leaves an empty catalog
    /// cached, so text renders unchanged until the next invalidate.
    pub async fn initialize(&self) -> Arc<Vec<Emoji>> {
        let loaded = match self.source.fetch(self.scope).await {
            Ok(emojis) => {
                info!(count = emojis.len(), scope = ?self.scope, "emoji catalog loaded");
                emojis
            }
            Err(err) => {
                warn!(?err, scope = ?self.scope, "emoji catalog unavailable");
                Vec::new()
            }
        };
        let loaded = Arc::new(loaded);
        *self.catalog.write().await = Some(loaded.clone());
        loaded
    }

    /// Cached catalog, loading it on first use.
    pub async fn get(&self) -> Arc<Vec<Emoji>> {
        if let Some(catalog) = self.catalog.read().await.as_ref() {
            return catalog.clone();
        }
        self.initialize().await
    }

    /// Drop the cached catalog. Call after a purchase changes what is owned.
    pub async fn invalidate(&self) {
        *self.catalog.write().await = None;
        debug!(scope = ?self.scope, "emoji catalog invalidated");
    }

    pub async fn is_loaded(&self) -> bool {
        self.catalog.read().await.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Text(String),
    Image { name: String, url: String },
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Segment::Text(text) => f.write_str(text),
            Segment::Image { name, .. } => write!(f, "[{}]", name),
        }
    }
}

fn push_text(out: &mut Vec<Segment>, text: &str) {
    if text.is_empty() {
        return;
    }
    if let Some(Segment::Text(prev)) = out.last_mut() {
        prev.push_str(text);
    } else {
        out.push(Segment::Text(text.to_string()));
    }
}

/// Split `text` into plain runs and emoji images. Codes missing from
/// `emojis` stay as literal text.
pub fn render_segments(text: &str, emojis: &[Emoji]) -> Vec<Segment> {
    let mut out = Vec::new();
    if emojis.is_empty() {
        push_text(&mut out, text);
        return out;
    }
    let mut last = 0;
    for m in EMOJI_CODE.find_iter(text) {
        push_text(&mut out, &text[last..m.start()]);
        match emojis.iter().find(|e| e.code == m.as_str()) {
            Some(emoji) => out.push(Segment::Image {
                name: emoji.name.clone(),
                url: emoji.image_url.clone(),
            }),
            None => push_text(&mut out, m.as_str()),
        }
        last = m.end();
    }
    push_text(&mut out, &text[last..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn catalog() -> Vec<Emoji> {
        vec![
            Emoji {
                id: 1,
                name: "Cat Jam".into(),
                code: ":catjam:".into(),
                image_url: "/emojis/catjam.gif".into(),
            },
            Emoji {
                id: 2,
                name: "Brain".into(),
                code: ":brain:".into(),
                image_url: "/emojis/brain.gif".into(),
            },
        ]
    }

    #[test]
    fn replaces_known_codes() {
        let segments = render_segments("day 3 :catjam: no phone :brain:", &catalog());
        assert_eq!(
            segments,
            vec![
                Segment::Text("day 3 ".into()),
                Segment::Image {
                    name: "Cat Jam".into(),
                    url: "/emojis/catjam.gif".into()
                },
                Segment::Text(" no phone ".into()),
                Segment::Image {
                    name: "Brain".into(),
                    url: "/emojis/brain.gif".into()
                },
            ]
        );
    }

    #[test]
    fn unknown_codes_stay_literal() {
        let segments = render_segments("hi :zeus: there", &catalog());
        assert_eq!(segments, vec![Segment::Text("hi :zeus: there".into())]);
    }

    #[test]
    fn empty_catalog_passes_text_through() {
        let segments = render_segments(":catjam:", &[]);
        assert_eq!(segments, vec![Segment::Text(":catjam:".into())]);
        assert!(render_segments("", &catalog()).is_empty());
    }

    #[test]
    fn display_renders_placeholders() {
        let rendered: String = render_segments("a:brain:b", &catalog())
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(rendered, "a[Brain]b");
    }

    #[test]
    fn purchased_item_without_code_gets_slug() {
        let item: PurchasedItem = serde_json::from_str(
            r#"{"itemId":4,"name":"Mild  Panic","imageUrl":"/emojis/panic.gif"}"#,
        )
        .unwrap();
        let emoji = Emoji::from(item);
        assert_eq!(emoji.code, ":mild-panic:");
        assert_eq!(emoji.id, 4);
    }

    #[test]
    fn fallback_code_keeps_edge_whitespace_as_dashes() {
        assert_eq!(fallback_code(" Mild Panic "), ":-mild-panic-:");
        assert_eq!(fallback_code("Cat\tJam"), ":cat-jam:");
    }

    struct CountingSource {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl EmojiSource for CountingSource {
        async fn fetch(&self, _scope: CatalogScope) -> Result<Vec<Emoji>, QueueError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(catalog())
        }
    }

    #[tokio::test]
    async fn cache_loads_once_until_invalidated() {
        let cache = EmojiCache::new(
            CountingSource {
                calls: AtomicUsize::new(0),
            },
            CatalogScope::Store,
        );
        assert!(!cache.is_loaded().await);
        assert_eq!(cache.get().await.len(), 2);
        assert_eq!(cache.get().await.len(), 2);
        assert_eq!(cache.source.calls.load(Ordering::SeqCst), 1);

        cache.invalidate().await;
        assert!(!cache.is_loaded().await);
        cache.get().await;
        assert_eq!(cache.source.calls.load(Ordering::SeqCst), 2);
    }
}
