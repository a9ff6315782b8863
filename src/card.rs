use chrono::Local;
use serde::{Deserialize, Serialize};

use crate::links::Links;

pub const MIN_EDGE: f32 = 200.0;
pub const MAX_EDGE: f32 = 1000.0;
pub const DEFAULT_SIZE: Size = Size {
    width: 400.0,
    height: 300.0,
};

/// The closed set of things a card on the board can be.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CardType {
    Atomic,
    Markdown,
    Chat,
    Graph,
    CardList,
}

impl CardType {
    pub const ALL: [CardType; 5] = [
        CardType::Atomic,
        CardType::Markdown,
        CardType::Chat,
        CardType::Graph,
        CardType::CardList,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CardType::Atomic => "atomic",
            CardType::Markdown => "markdown",
            CardType::Chat => "chat",
            CardType::Graph => "graph",
            CardType::CardList => "cardList",
        }
    }

    /// Parse a persisted type tag. Unknown tags yield `None` so callers can skip
    /// the entry instead of failing the whole board.
    pub fn parse(tag: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.as_str() == tag)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Non-finite coordinates collapse to the origin axis they came from.
    pub fn sanitized(self) -> Self {
        let fix = |v: f32| if v.is_finite() { v } else { 0.0 };
        Self {
            x: fix(self.x),
            y: fix(self.y),
        }
    }
}

impl From<Position> for iced::Point {
    fn from(pos: Position) -> Self {
        iced::Point::new(pos.x, pos.y)
    }
}

impl From<iced::Point> for Position {
    fn from(point: iced::Point) -> Self {
        Position::new(point.x, point.y)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Size {
    pub width: f32,
    pub height: f32,
}

impl Default for Size {
    fn default() -> Self {
        DEFAULT_SIZE
    }
}

impl Size {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Clamp both axes into `[MIN_EDGE, MAX_EDGE]`; NaN becomes the minimum.
    pub fn clamped(self) -> Self {
        let clamp = |v: f32| {
            if v.is_nan() {
                MIN_EDGE
            } else {
                v.clamp(MIN_EDGE, MAX_EDGE)
            }
        };
        Self {
            width: clamp(self.width),
            height: clamp(self.height),
        }
    }
}

impl From<Size> for iced::Size {
    fn from(size: Size) -> Self {
        iced::Size::new(size.width, size.height)
    }
}

/// A card as the persistence API knows it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default)]
    pub links: Links,
}

impl Card {
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            content: content.into(),
            context: None,
            links: Links::default(),
        }
    }
}

/// A card placed on the board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UICard {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: CardType,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default)]
    pub position: Position,
    #[serde(default)]
    pub size: Size,
    #[serde(default)]
    pub links: Links,
    /// Embedded snapshots, only ever populated for `CardType::CardList`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cards: Vec<Card>,
}

impl UICard {
    pub fn to_card(&self) -> Card {
        Card {
            id: self.id.clone(),
            content: self.content.clone(),
            context: self.context.clone(),
            links: self.links.clone(),
        }
    }

    pub fn from_card(card: Card) -> Self {
        let links = without_self_link(&card.id, card.links);
        Self {
            id: card.id,
            kind: CardType::Atomic,
            content: card.content,
            context: card.context.filter(|c| !c.is_empty()),
            position: Position::default(),
            size: DEFAULT_SIZE,
            links,
            cards: Vec::new(),
        }
    }

    /// Short single-line label used by list and link presenters.
    pub fn preview(&self, max_chars: usize) -> String {
        preview_text(&self.content, max_chars)
    }
}

pub fn preview_text(content: &str, max_chars: usize) -> String {
    let first = content.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    let first = first.trim();
    if first.chars().count() > max_chars {
        let cut: String = first.chars().take(max_chars.saturating_sub(1)).collect();
        format!("{}…", cut)
    } else {
        first.to_string()
    }
}

/// Description of a card to add. Only the type is mandatory.
#[derive(Debug, Clone)]
pub struct NewCard {
    pub kind: CardType,
    pub id: Option<String>,
    pub content: Option<String>,
    pub context: Option<String>,
    pub position: Option<Position>,
    pub size: Option<Size>,
    pub links: Option<Links>,
    pub cards: Option<Vec<Card>>,
}

impl NewCard {
    pub fn new(kind: CardType) -> Self {
        Self {
            kind,
            id: None,
            content: None,
            context: None,
            position: None,
            size: None,
            links: None,
            cards: None,
        }
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn position(mut self, position: Position) -> Self {
        self.position = Some(position);
        self
    }

    pub fn size(mut self, size: Size) -> Self {
        self.size = Some(size);
        self
    }

    pub fn links(mut self, links: Links) -> Self {
        self.links = Some(links);
        self
    }

    pub fn cards(mut self, cards: Vec<Card>) -> Self {
        self.cards = Some(cards);
        self
    }

    pub(crate) fn into_card(self, id: String) -> UICard {
        let cards = match self.kind {
            CardType::CardList => self.cards.unwrap_or_default(),
            _ => Vec::new(),
        };
        UICard {
            kind: self.kind,
            content: self.content.unwrap_or_default(),
            context: self.context.filter(|c| !c.is_empty()),
            position: self.position.unwrap_or_default().sanitized(),
            size: self.size.unwrap_or(DEFAULT_SIZE).clamped(),
            links: without_self_link(&id, self.links.unwrap_or_default()),
            id,
            cards,
        }
    }
}

/// Shallow update of an existing card. Object-valued fields replace wholesale.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CardPatch {
    pub kind: Option<CardType>,
    pub content: Option<String>,
    pub context: Option<String>,
    pub position: Option<Position>,
    pub size: Option<Size>,
    pub links: Option<Links>,
    pub cards: Option<Vec<Card>>,
}

impl CardPatch {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Self::default()
        }
    }

    pub fn context(context: impl Into<String>) -> Self {
        Self {
            context: Some(context.into()),
            ..Self::default()
        }
    }

    pub fn position(position: Position) -> Self {
        Self {
            position: Some(position),
            ..Self::default()
        }
    }

    pub fn size(size: Size) -> Self {
        Self {
            size: Some(size),
            ..Self::default()
        }
    }

    pub fn links(links: Links) -> Self {
        Self {
            links: Some(links),
            ..Self::default()
        }
    }

    pub fn cards(cards: Vec<Card>) -> Self {
        Self {
            cards: Some(cards),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub(crate) fn apply(self, card: &mut UICard) {
        if let Some(kind) = self.kind {
            card.kind = kind;
        }
        if let Some(content) = self.content {
            card.content = content;
        }
        if let Some(context) = self.context {
            card.context = Some(context).filter(|c| !c.is_empty());
        }
        if let Some(position) = self.position {
            let sanitized = position.sanitized();
            if sanitized != position {
                log::debug!("event=geometry_clamped id={} field=position", card.id);
            }
            card.position = sanitized;
        }
        if let Some(size) = self.size {
            let clamped = size.clamped();
            if clamped != size {
                log::debug!("event=geometry_clamped id={} field=size", card.id);
            }
            card.size = clamped;
        }
        if let Some(links) = self.links {
            card.links = without_self_link(&card.id, links);
        }
        if let Some(cards) = self.cards {
            card.cards = cards
                .into_iter()
                .map(|mut embedded| {
                    embedded.links = without_self_link(&embedded.id, embedded.links);
                    embedded
                })
                .collect();
        }
        if card.kind != CardType::CardList {
            card.cards.clear();
        }
    }
}

/// A card never links to itself, whatever a caller or the server sent.
pub(crate) fn without_self_link(id: &str, mut links: Links) -> Links {
    if links.remove(id) {
        log::debug!("event=link_set status=ignored id={} reason=self_link", id);
    }
    links
}

/// Timestamp id in the `YYYYMMDDHHMMSS` form the card API uses.
pub fn timestamp_id() -> String {
    Local::now().format("%Y%m%d%H%M%S").to_string()
}

/// Timestamp id made unique against `taken` with a `-N` suffix.
pub fn unique_id(taken: impl Fn(&str) -> bool) -> String {
    let base = timestamp_id();
    if !taken(&base) {
        return base;
    }
    (2..)
        .map(|n| format!("{}-{}", base, n))
        .find(|candidate| !taken(candidate))
        .unwrap_or(base)
}
