//! Card type → presenter dispatch.
//!
//! Presenters turn a card into a [`CardView`]: plain lines of text (already
//! wrapped and cut to the card's body) plus, for graph cards, a small node
//! diagram. The board draws every view the same way.

use iced::Point;

use crate::card::{CardType, UICard, preview_text};
use crate::chat::{ChatSessions, Role};
use crate::gesture::HEADER_HEIGHT;
use crate::store::{CardStore, resolved_links};

pub const LINE_HEIGHT: f32 = 18.0;
pub const BODY_PADDING: f32 = 12.0;
pub const GLYPH_WIDTH: f32 = 7.0;
pub const CARET: char = '▏';

/// Which part of a focused card receives typed text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Content,
    Context,
    Draft,
}

impl Field {
    pub fn default_for(kind: CardType) -> Option<Field> {
        match kind {
            CardType::Atomic | CardType::Markdown => Some(Field::Content),
            CardType::Chat => Some(Field::Draft),
            CardType::Graph | CardType::CardList => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    Primary,
    Secondary,
    Accent,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ViewLine {
    pub text: String,
    pub tone: Tone,
}

impl ViewLine {
    fn new(text: impl Into<String>, tone: Tone) -> Self {
        Self {
            text: text.into(),
            tone,
        }
    }
}

/// Node diagram in body-relative coordinates (`0.0..=1.0` on both axes).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct GraphView {
    pub nodes: Vec<(Point, String)>,
    pub edges: Vec<(usize, usize, f32)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CardView {
    pub title: String,
    pub lines: Vec<ViewLine>,
    pub graph: Option<GraphView>,
}

pub struct RenderContext<'a> {
    pub store: &'a CardStore,
    pub chats: &'a ChatSessions,
    /// The field being edited, when this card has focus.
    pub editing: Option<Field>,
    /// Expanded embedded card of a focused card list.
    pub row: Option<usize>,
}

pub fn present(card: &UICard, ctx: &RenderContext<'_>) -> CardView {
    match card.kind {
        CardType::Atomic => atomic(card, ctx),
        CardType::Markdown => markdown(card, ctx),
        CardType::Chat => chat(card, ctx),
        CardType::Graph => graph(card, ctx),
        CardType::CardList => card_list(card, ctx),
    }
}

fn columns(card: &UICard) -> usize {
    (((card.size.width - BODY_PADDING * 2.0) / GLYPH_WIDTH) as usize).max(8)
}

fn rows(card: &UICard) -> usize {
    ((card.size.height - HEADER_HEIGHT - BODY_PADDING * 2.0) / LINE_HEIGHT).max(1.0) as usize
}

/// Greedy word wrap on character counts; long words are split.
pub fn wrap(text: &str, width: usize) -> Vec<String> {
    let width = width.max(1);
    let mut out = Vec::new();
    for raw in text.split('\n') {
        let mut line = String::new();
        let mut len = 0;
        for word in raw.split(' ') {
            let mut word = word;
            let mut word_len = word.chars().count();
            if len > 0 && len + 1 + word_len > width {
                out.push(std::mem::take(&mut line));
                len = 0;
            }
            if len > 0 {
                line.push(' ');
                len += 1;
            }
            while len == 0 && word_len > width {
                let split = word
                    .char_indices()
                    .nth(width)
                    .map(|(i, _)| i)
                    .unwrap_or(word.len());
                out.push(word[..split].to_string());
                word = &word[split..];
                word_len -= width;
            }
            line.push_str(word);
            len += word_len;
        }
        out.push(line);
    }
    out
}

fn with_caret(text: &str, editing: bool) -> String {
    if editing {
        format!("{}{}", text, CARET)
    } else {
        text.to_string()
    }
}

fn push_wrapped(lines: &mut Vec<ViewLine>, text: &str, width: usize, tone: Tone) {
    lines.extend(wrap(text, width).into_iter().map(|l| ViewLine::new(l, tone)));
}

fn atomic(card: &UICard, ctx: &RenderContext<'_>) -> CardView {
    let width = columns(card);
    let mut lines = Vec::new();

    let content = with_caret(&card.content, ctx.editing == Some(Field::Content));
    push_wrapped(&mut lines, &content, width, Tone::Primary);

    let context = card.context.as_deref().unwrap_or("");
    let editing_context = ctx.editing == Some(Field::Context);
    if !context.is_empty() || editing_context {
        lines.push(ViewLine::new("", Tone::Secondary));
        let text = format!("context: {}", with_caret(context, editing_context));
        push_wrapped(&mut lines, &text, width, Tone::Secondary);
    }

    if !card.links.is_empty() {
        lines.push(ViewLine::new("", Tone::Secondary));
        lines.push(ViewLine::new("Links", Tone::Accent));
        let resolved = resolved_links(ctx.store, &card.links);
        for (target, weight) in &resolved {
            let label = target.preview(width.saturating_sub(8).max(4));
            lines.push(ViewLine::new(format!("{:.1}  {}", weight, label), Tone::Secondary));
        }
        let dangling = card.links.len() - resolved.len();
        if dangling > 0 {
            lines.push(ViewLine::new(format!("+{} not on board", dangling), Tone::Secondary));
        }
    }

    lines.truncate(rows(card));
    CardView {
        title: format!("Card {}", card.id),
        lines,
        graph: None,
    }
}

fn markdown(card: &UICard, ctx: &RenderContext<'_>) -> CardView {
    let width = columns(card);
    let content = with_caret(&card.content, ctx.editing == Some(Field::Content));
    let mut lines = Vec::new();
    for raw in content.split('\n') {
        let tone = if raw.trim_start().starts_with('#') {
            Tone::Accent
        } else {
            Tone::Primary
        };
        push_wrapped(&mut lines, raw, width, tone);
    }
    lines.truncate(rows(card));
    CardView {
        title: "Markdown".to_string(),
        lines,
        graph: None,
    }
}

fn chat(card: &UICard, ctx: &RenderContext<'_>) -> CardView {
    let width = columns(card);
    let mut lines = Vec::new();
    let session = ctx.chats.get(&card.id);

    if let Some(session) = session {
        for message in &session.messages {
            let (prefix, tone) = match message.role {
                Role::User => ("you: ", Tone::User),
                Role::Assistant => ("ai: ", Tone::Assistant),
            };
            push_wrapped(&mut lines, &format!("{}{}", prefix, message.content), width, tone);
        }
    }

    let rows = rows(card);
    let draft = session.map(|s| s.draft.as_str()).unwrap_or("");
    let streaming = session.is_some_and(|s| s.streaming);
    let prompt = if streaming {
        "…".to_string()
    } else {
        format!("> {}", with_caret(draft, ctx.editing == Some(Field::Draft)))
    };
    let mut input = Vec::new();
    push_wrapped(&mut input, &prompt, width, Tone::Secondary);

    // transcript keeps its tail, the input line always shows
    let room = rows.saturating_sub(input.len());
    if lines.len() > room {
        lines.drain(..lines.len() - room);
    }
    lines.extend(input);
    lines.truncate(rows);

    CardView {
        title: "Chat".to_string(),
        lines,
        graph: None,
    }
}

fn graph(card: &UICard, ctx: &RenderContext<'_>) -> CardView {
    let mut members: Vec<&UICard> = ctx
        .store
        .iter()
        .filter(|c| c.kind == CardType::Atomic && !c.content.is_empty())
        .collect();
    members.sort_by(|a, b| a.id.cmp(&b.id));

    let count = members.len();
    let nodes: Vec<(Point, String)> = members
        .iter()
        .enumerate()
        .map(|(i, member)| {
            let angle = std::f32::consts::TAU * i as f32 / count.max(1) as f32;
            let (x, y) = if count == 1 {
                (0.5, 0.5)
            } else {
                (0.5 + 0.38 * angle.cos(), 0.5 + 0.38 * angle.sin())
            };
            (Point::new(x, y), preview_text(&member.content, 12))
        })
        .collect();

    let mut edges = Vec::new();
    for (from, member) in members.iter().enumerate() {
        for (target, weight) in member.links.sorted() {
            if let Some(to) = members.iter().position(|m| m.id == target) {
                edges.push((from, to, weight));
            }
        }
    }

    let lines = if count == 0 {
        vec![ViewLine::new("No cards to relate yet", Tone::Secondary)]
    } else {
        Vec::new()
    };

    CardView {
        title: format!("Relationship graph ({})", count),
        lines,
        graph: Some(GraphView { nodes, edges }),
    }
}

fn card_list(card: &UICard, ctx: &RenderContext<'_>) -> CardView {
    let width = columns(card);
    let mut lines = Vec::new();
    for (i, embedded) in card.cards.iter().enumerate() {
        let expanded = ctx.row == Some(i);
        let marker = if embedded.context.is_some() || !embedded.links.is_empty() {
            "◆"
        } else {
            "•"
        };
        let preview = preview_text(&embedded.content, width.saturating_sub(6));
        let preview = if preview.is_empty() {
            "Empty card".to_string()
        } else {
            preview
        };
        let tone = match ctx.row {
            Some(row) if row == i => Tone::Accent,
            Some(_) => Tone::Secondary,
            None => Tone::Primary,
        };
        lines.push(ViewLine::new(format!("{}. {} {}", i + 1, marker, preview), tone));
        if !expanded {
            continue;
        }

        let inner = width.saturating_sub(3);
        let content = with_caret(&embedded.content, ctx.editing == Some(Field::Content));
        for line in wrap(&content, inner) {
            lines.push(ViewLine::new(format!("   {}", line), Tone::Primary));
        }
        let context = embedded.context.as_deref().unwrap_or("");
        let editing_context = ctx.editing == Some(Field::Context);
        if !context.is_empty() || editing_context {
            let text = format!("context: {}", with_caret(context, editing_context));
            for line in wrap(&text, inner) {
                lines.push(ViewLine::new(format!("   {}", line), Tone::Secondary));
            }
        }
        for (target, weight) in embedded.links.sorted() {
            let label = match card.cards.iter().position(|c| c.id == target) {
                Some(index) => format!("{}.", index + 1),
                None => "not in list".to_string(),
            };
            lines.push(ViewLine::new(format!("   → {} {:.1}", label, weight), Tone::Secondary));
        }
    }
    if lines.is_empty() {
        lines.push(ViewLine::new("No cards", Tone::Secondary));
    }
    lines.truncate(rows(card));
    CardView {
        title: format!("Card List ({})", card.cards.len()),
        lines,
        graph: None,
    }
}
