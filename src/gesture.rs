//! Pointer and wheel interpretation for the board.
//!
//! [`Gesture`] is the single authority on what the pointer is doing. It takes
//! classified [`PointerInput`]s and answers with [`Intent`]s for the store and
//! the viewport; it never touches either directly.

use iced::{Point, Rectangle, Vector};

use crate::card::{Position, Size, UICard};

pub const HEADER_HEIGHT: f32 = 28.0;
pub const RESIZE_GRIP: f32 = 16.0;
pub const CLOSE_BOX: f32 = 20.0;

pub const MIN_ZOOM: f32 = 0.25;
pub const MAX_ZOOM: f32 = 4.0;

/// Pixels panned per wheel line.
pub const WHEEL_LINE: f32 = 40.0;

/// Pan/zoom transform from canvas space to screen space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub translation: Vector,
    pub zoom: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            translation: Vector::ZERO,
            zoom: 1.0,
        }
    }
}

impl Viewport {
    pub fn screen_to_canvas(&self, point: Point) -> Point {
        Point::new(
            (point.x - self.translation.x) / self.zoom,
            (point.y - self.translation.y) / self.zoom,
        )
    }

    pub fn canvas_to_screen(&self, point: Point) -> Point {
        Point::new(
            point.x * self.zoom + self.translation.x,
            point.y * self.zoom + self.translation.y,
        )
    }

    pub fn pan_by(&mut self, delta: Vector) {
        self.translation = self.translation + delta;
    }

    pub fn pan_to(&mut self, translation: Vector) {
        self.translation = translation;
    }

    /// Zoom by `delta` wheel steps keeping the canvas point under `cursor` fixed.
    pub fn zoom_at(&mut self, delta: f32, cursor: Point) {
        let old_zoom = self.zoom;
        self.zoom = (self.zoom * (1.0 + delta * 0.1)).clamp(MIN_ZOOM, MAX_ZOOM);

        let world_x = (cursor.x - self.translation.x) / old_zoom;
        let world_y = (cursor.y - self.translation.y) / old_zoom;
        self.translation.x = cursor.x - world_x * self.zoom;
        self.translation.y = cursor.y - world_y * self.zoom;
    }
}

/// What sits under the pointer, most specific first.
#[derive(Debug, Clone, PartialEq)]
pub enum HitRegion {
    Resize { id: String, size: Size },
    Close { id: String },
    Handle { id: String, position: Position },
    Body { id: String },
    Background,
}

fn card_bounds(card: &UICard) -> Rectangle {
    Rectangle::new(card.position.into(), card.size.into())
}

pub fn resize_bounds(card: &UICard) -> Rectangle {
    let b = card_bounds(card);
    Rectangle::new(
        Point::new(b.x + b.width - RESIZE_GRIP, b.y + b.height - RESIZE_GRIP),
        iced::Size::new(RESIZE_GRIP, RESIZE_GRIP),
    )
}

pub fn close_bounds(card: &UICard) -> Rectangle {
    let b = card_bounds(card);
    Rectangle::new(
        Point::new(b.x + b.width - CLOSE_BOX - 4.0, b.y + (HEADER_HEIGHT - CLOSE_BOX) / 2.0),
        iced::Size::new(CLOSE_BOX, CLOSE_BOX),
    )
}

pub fn header_bounds(card: &UICard) -> Rectangle {
    let b = card_bounds(card);
    Rectangle::new(b.position(), iced::Size::new(b.width, HEADER_HEIGHT))
}

/// Classify a screen point against cards given topmost-last.
///
/// Only the topmost card under the point is considered; a card covered at
/// that point cannot be hit through the one above it. Within that card the
/// resize grip beats the close box, which beats the header.
pub fn classify<'a, I>(cards: I, viewport: &Viewport, point: Point) -> HitRegion
where
    I: IntoIterator<Item = &'a UICard>,
    I::IntoIter: DoubleEndedIterator,
{
    let world = viewport.screen_to_canvas(point);
    let Some(card) = cards
        .into_iter()
        .rev()
        .find(|card| card_bounds(card).contains(world))
    else {
        return HitRegion::Background;
    };

    if resize_bounds(card).contains(world) {
        HitRegion::Resize {
            id: card.id.clone(),
            size: card.size,
        }
    } else if close_bounds(card).contains(world) {
        HitRegion::Close { id: card.id.clone() }
    } else if header_bounds(card).contains(world) {
        HitRegion::Handle {
            id: card.id.clone(),
            position: card.position,
        }
    } else {
        HitRegion::Body { id: card.id.clone() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Primary,
    Secondary,
    Middle,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PointerInput {
    Down {
        position: Point,
        button: Button,
        region: HitRegion,
        link_modifier: bool,
    },
    Move {
        position: Point,
    },
    Up {
        position: Point,
    },
    /// The pointer left the surface or capture was otherwise lost.
    CaptureLost,
    Wheel {
        delta: Vector,
        cursor: Point,
        zoom: bool,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Intent {
    PanTo(Vector),
    PanBy(Vector),
    /// A pointer pan finished; the viewport is worth remembering.
    PanEnded,
    Zoom { delta: f32, cursor: Point },
    Focus(Option<String>),
    MoveCard { id: String, position: Position },
    MoveEnded { id: String },
    ResizeCard { id: String, size: Size },
    CycleLink { target: String },
    Close { id: String },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Gesture {
    #[default]
    Idle,
    PanningCanvas {
        start: Point,
        anchor: Vector,
    },
    DraggingCard {
        id: String,
        start: Point,
        origin: Position,
    },
    ResizingCard {
        id: String,
        start: Point,
        origin: Size,
        proposed: Size,
    },
}

impl Gesture {
    pub fn is_idle(&self) -> bool {
        matches!(self, Gesture::Idle)
    }

    /// The size a resize would commit right now, for live preview.
    pub fn resize_preview(&self) -> Option<(&str, Size)> {
        match self {
            Gesture::ResizingCard { id, proposed, .. } => Some((id.as_str(), *proposed)),
            _ => None,
        }
    }

    pub fn handle(&mut self, input: PointerInput, viewport: &Viewport) -> Vec<Intent> {
        match input {
            PointerInput::Down {
                position,
                button,
                region,
                link_modifier,
            } => self.pointer_down(position, button, region, link_modifier, viewport),
            PointerInput::Move { position } => self.pointer_move(position, viewport),
            PointerInput::Up { .. } => self.release(),
            PointerInput::CaptureLost => self.cancel(),
            PointerInput::Wheel { delta, cursor, zoom } => {
                if !self.is_idle() {
                    return Vec::new();
                }
                if zoom {
                    vec![Intent::Zoom {
                        delta: delta.y,
                        cursor,
                    }]
                } else {
                    vec![Intent::PanBy(delta * WHEEL_LINE)]
                }
            }
        }
    }

    fn pointer_down(
        &mut self,
        position: Point,
        button: Button,
        region: HitRegion,
        link_modifier: bool,
        viewport: &Viewport,
    ) -> Vec<Intent> {
        if !self.is_idle() || button != Button::Primary {
            return Vec::new();
        }
        match region {
            HitRegion::Resize { id, size } => {
                *self = Gesture::ResizingCard {
                    id: id.clone(),
                    start: position,
                    origin: size,
                    proposed: size,
                };
                vec![Intent::Focus(Some(id))]
            }
            HitRegion::Close { id } => vec![Intent::Close { id }],
            HitRegion::Handle { id, position: origin } => {
                *self = Gesture::DraggingCard {
                    id: id.clone(),
                    start: position,
                    origin,
                };
                vec![Intent::Focus(Some(id))]
            }
            // Card content swallows the press: no pan, no drag.
            HitRegion::Body { id } if link_modifier => vec![Intent::CycleLink { target: id }],
            HitRegion::Body { id } => vec![Intent::Focus(Some(id))],
            HitRegion::Background => {
                *self = Gesture::PanningCanvas {
                    start: position,
                    anchor: viewport.translation,
                };
                vec![Intent::Focus(None)]
            }
        }
    }

    fn pointer_move(&mut self, position: Point, viewport: &Viewport) -> Vec<Intent> {
        match self {
            Gesture::Idle => Vec::new(),
            Gesture::PanningCanvas { start, anchor } => {
                vec![Intent::PanTo(*anchor + (position - *start))]
            }
            Gesture::DraggingCard { id, start, origin } => {
                let delta = (position - *start) * (1.0 / viewport.zoom);
                vec![Intent::MoveCard {
                    id: id.clone(),
                    position: Position::new(origin.x + delta.x, origin.y + delta.y),
                }]
            }
            Gesture::ResizingCard {
                start,
                origin,
                proposed,
                ..
            } => {
                let delta = (position - *start) * (1.0 / viewport.zoom);
                *proposed = Size::new(origin.width + delta.x, origin.height + delta.y).clamped();
                Vec::new()
            }
        }
    }

    fn release(&mut self) -> Vec<Intent> {
        match std::mem::take(self) {
            Gesture::DraggingCard { id, .. } => vec![Intent::MoveEnded { id }],
            Gesture::ResizingCard { id, proposed, .. } => {
                vec![Intent::ResizeCard { id, size: proposed }]
            }
            Gesture::PanningCanvas { .. } => vec![Intent::PanEnded],
            Gesture::Idle => Vec::new(),
        }
    }

    /// Force back to idle. A drag keeps the position it already committed;
    /// an uncommitted resize is dropped.
    fn cancel(&mut self) -> Vec<Intent> {
        match std::mem::take(self) {
            Gesture::DraggingCard { id, .. } => vec![Intent::MoveEnded { id }],
            Gesture::ResizingCard { id, .. } => {
                log::debug!("event=resize_cancelled id={}", id);
                Vec::new()
            }
            Gesture::PanningCanvas { .. } => vec![Intent::PanEnded],
            Gesture::Idle => Vec::new(),
        }
    }
}
