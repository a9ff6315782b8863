use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

use crate::card::{CardType, Position, Size};

pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:5000";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Board geometry the card API does not keep, by card id.
    #[serde(default)]
    geometry: HashMap<String, Geometry>,
    #[serde(default)]
    viewport: SavedViewport,
    /// Whether setters write through to disk.
    #[serde(skip)]
    autosave: bool,
    /// Viewport changed since the last write.
    #[serde(skip)]
    dirty: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry {
    pub position: Position,
    pub size: Size,
    /// Type tag of the card, so refreshed cards come back as what they were.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl Geometry {
    pub fn new(position: Position, size: Size, kind: CardType) -> Self {
        Self {
            position,
            size,
            kind: Some(kind.as_str().to_string()),
        }
    }

    /// The saved card type. `Err` carries a tag this build does not know.
    pub fn card_type(&self) -> Result<Option<CardType>, &str> {
        match self.kind.as_deref() {
            None => Ok(None),
            Some(tag) => CardType::parse(tag).map(Some).ok_or(tag),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SavedViewport {
    pub x: f32,
    pub y: f32,
    pub zoom: f32,
}

impl Default for SavedViewport {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            zoom: 1.0,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            log_level: default_log_level(),
            geometry: HashMap::new(),
            viewport: SavedViewport::default(),
            autosave: false,
            dirty: false,
        }
    }
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    pub fn load() -> Option<Self> {
        let path = Self::config_path()?;
        let contents = fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&contents) {
            Ok(config) => Some(config),
            Err(err) => {
                log::warn!("event=config_load status=error path={} error={}", path.display(), err);
                None
            }
        }
    }

    pub fn with_autosave(mut self) -> Self {
        self.autosave = true;
        self
    }

    pub fn save(&self) -> Option<()> {
        let path = Self::config_path()?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).ok()?;
        }
        let contents = serde_json::to_string_pretty(self).ok()?;
        fs::write(&path, &contents).ok()
    }

    pub fn get_geometry(&self, id: &str) -> Option<Geometry> {
        self.geometry.get(id).cloned()
    }

    pub fn set_geometry(&mut self, id: &str, geometry: Geometry) {
        if self.geometry.get(id) == Some(&geometry) {
            return;
        }
        self.geometry.insert(id.to_string(), geometry);
        self.persist();
    }

    pub fn forget_geometry(&mut self, id: &str) {
        if self.geometry.remove(id).is_some() {
            self.persist();
        }
    }

    pub fn viewport(&self) -> SavedViewport {
        self.viewport
    }

    /// Record the viewport in memory. It reaches disk on the next [`flush`].
    ///
    /// [`flush`]: Config::flush
    pub fn set_viewport(&mut self, viewport: SavedViewport) {
        if self.viewport != viewport {
            self.viewport = viewport;
            self.dirty = true;
        }
    }

    pub fn has_unsaved_changes(&self) -> bool {
        self.dirty
    }

    /// Write pending in-memory changes, if any.
    pub fn flush(&mut self) {
        if self.dirty {
            self.persist();
        }
    }

    pub fn cards_url(&self) -> String {
        format!("{}/api/cards", self.base())
    }

    pub fn chat_stream_url(&self) -> String {
        format!("{}/api/chat/stream", self.base())
    }

    pub fn atomize_url(&self) -> String {
        format!("{}/api/chat/atomize", self.base())
    }

    fn base(&self) -> &str {
        self.api_base_url.trim_end_matches('/')
    }

    fn persist(&mut self) {
        self.dirty = false;
        if self.autosave && self.save().is_none() {
            log::warn!("event=config_save status=error");
        }
    }

    pub fn config_path() -> Option<PathBuf> {
        let dirs = ProjectDirs::from("", "", "cardboard")?;
        Some(dirs.config_dir().join("config.json"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_follow_base_url() {
        let config = Config {
            api_base_url: "http://localhost:8080/".to_string(),
            ..Config::default()
        };
        assert_eq!(config.cards_url(), "http://localhost:8080/api/cards");
        assert_eq!(config.chat_stream_url(), "http://localhost:8080/api/chat/stream");
        assert_eq!(config.atomize_url(), "http://localhost:8080/api/chat/atomize");
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: Config = serde_json::from_str("{}").unwrap();
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.viewport().zoom, 1.0);
        assert!(config.get_geometry("x").is_none());
    }

    #[test]
    fn geometry_survives_serialization() {
        let mut config = Config::default();
        config.geometry.insert(
            "a".to_string(),
            Geometry::new(Position::new(1.0, 2.0), Size::new(300.0, 400.0), CardType::Markdown),
        );
        let json = serde_json::to_string(&config).unwrap();
        let back: Config = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get_geometry("a"), config.get_geometry("a"));
        assert_eq!(back.get_geometry("a").unwrap().card_type(), Ok(Some(CardType::Markdown)));
    }

    #[test]
    fn viewport_waits_for_flush() {
        let mut config = Config::default();
        config.set_viewport(SavedViewport {
            x: 10.0,
            y: 0.0,
            zoom: 2.0,
        });
        assert!(config.has_unsaved_changes());
        assert_eq!(config.viewport().zoom, 2.0);

        config.flush();
        assert!(!config.has_unsaved_changes());

        config.set_viewport(config.viewport());
        assert!(!config.has_unsaved_changes());
    }

    #[test]
    fn unknown_type_tag_is_reported() {
        let geometry: Geometry = serde_json::from_str(
            r#"{"position":{"x":0,"y":0},"size":{"width":400,"height":300},"kind":"whiteboard"}"#,
        )
        .unwrap();
        assert_eq!(geometry.card_type(), Err("whiteboard"));

        let untagged: Geometry = serde_json::from_str(
            r#"{"position":{"x":0,"y":0},"size":{"width":400,"height":300}}"#,
        )
        .unwrap();
        assert_eq!(untagged.card_type(), Ok(None));
    }
}
