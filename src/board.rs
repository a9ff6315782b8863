use iced::keyboard::{self, Key, Modifiers};
use iced::mouse;
use iced::widget::canvas::{self, Cache, Frame, Geometry, Path, Stroke, Text};
use iced::{Color, Point, Rectangle, Size, Vector};

use crate::atomize;
use crate::card::{CardPatch, CardType, NewCard, UICard};
use crate::chat::ChatSessions;
use crate::config::{Config, Geometry as SavedGeometry, SavedViewport};
use crate::gesture::{
    self, Button, Gesture, HEADER_HEIGHT, HitRegion, Intent, PointerInput, RESIZE_GRIP, Viewport,
    WHEEL_LINE,
};
use crate::layout;
use crate::links;
use crate::render::{self, BODY_PADDING, CardView, Field, LINE_HEIGHT, RenderContext, Tone};
use crate::store::{CardStore, resolved_links};
use crate::Message;

const CORNER_RADIUS: f32 = 8.0;
const GRID_SPACING: f32 = 40.0;

#[derive(Debug, Clone)]
pub enum BoardMessage {
    Gesture(Vec<Intent>),
    Key(KeyCommand),
}

#[derive(Debug, Clone, PartialEq)]
pub enum KeyCommand {
    /// Create a card near `at` (screen space).
    NewCard { kind: CardType, at: Point },
    DeleteFocused,
    SaveFocused,
    ReloadFocused,
    Refresh,
    AtomizeFocused,
    Escape,
    Insert(String),
    Backspace,
    Enter,
    NextField,
    /// Expand the previous or next embedded card of a focused card list.
    PreviousRow,
    NextRow,
    /// Cycle the expanded card's link to its sibling at this index.
    CycleSiblingLink(usize),
    ToggleHelp,
}

/// Side effects the board asks the application to carry out.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Save(String),
    Reload(String),
    Delete(String),
    Refresh,
    /// `PUT` one embedded card of a card list.
    SaveEmbedded { list: String, id: String },
    /// Replace a card list's cards with every card the API has.
    RefreshList(String),
    Atomize { source: String, prompt: String },
    SendChat { card_id: String, message: String },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Focus {
    pub id: String,
    pub field: Option<Field>,
    /// Expanded embedded card, for card lists.
    pub row: Option<usize>,
}

pub struct Board {
    pub viewport: Viewport,
    /// Card ids bottom to top.
    z_order: Vec<String>,
    focus: Option<Focus>,
    status: Option<String>,
    pub show_help: bool,
    cache: Cache,
}

impl Board {
    pub fn new(config: &Config) -> Self {
        let saved = config.viewport();
        Self {
            viewport: Viewport {
                translation: Vector::new(saved.x, saved.y),
                zoom: saved.zoom.clamp(gesture::MIN_ZOOM, gesture::MAX_ZOOM),
            },
            z_order: Vec::new(),
            focus: None,
            status: None,
            show_help: false,
            cache: Cache::new(),
        }
    }

    pub fn invalidate(&mut self) {
        self.cache.clear();
    }

    pub fn focus(&self) -> Option<&Focus> {
        self.focus.as_ref()
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = Some(status.into());
    }

    pub fn clear_status(&mut self) {
        self.status = None;
    }

    /// Bring the stacking order in line with the store: forget removed cards,
    /// put new ones on top.
    pub fn sync_order(&mut self, store: &CardStore) {
        self.z_order.retain(|id| store.contains(id));
        let mut fresh: Vec<&str> = store
            .ids()
            .filter(|id| !self.z_order.iter().any(|known| known == id))
            .collect();
        fresh.sort_unstable();
        self.z_order.extend(fresh.into_iter().map(str::to_string));

        if self.focus.as_ref().is_some_and(|f| !store.contains(&f.id)) {
            self.focus = None;
        }
        if let Some(focus) = self.focus.as_mut() {
            let rows = store.get(&focus.id).map_or(0, |card| card.cards.len());
            if focus.row.is_some_and(|row| row >= rows) {
                focus.row = None;
                focus.field = None;
            }
        }
    }

    pub fn raise(&mut self, id: &str) {
        self.z_order.retain(|known| known != id);
        self.z_order.push(id.to_string());
    }

    /// Cards bottom to top.
    pub fn ordered<'a>(&self, store: &'a CardStore) -> Vec<&'a UICard> {
        self.z_order.iter().filter_map(|id| store.get(id)).collect()
    }

    pub fn update(
        &mut self,
        message: BoardMessage,
        store: &mut CardStore,
        chats: &mut ChatSessions,
        config: &mut Config,
    ) -> Option<Command> {
        let mut in_motion = false;
        let command = match message {
            BoardMessage::Gesture(intents) => {
                in_motion = intents.iter().all(moves_viewport);
                let mut command = None;
                for intent in intents {
                    command = self.apply_intent(intent, store, config).or(command);
                }
                command
            }
            BoardMessage::Key(key) => self.apply_key(key, store, chats, config),
        };
        // wheel ticks and pan steps settle on disk once the motion stops
        if !in_motion {
            config.flush();
        }
        self.invalidate();
        command
    }

    fn apply_intent(
        &mut self,
        intent: Intent,
        store: &mut CardStore,
        config: &mut Config,
    ) -> Option<Command> {
        match intent {
            Intent::PanTo(translation) => self.viewport.pan_to(translation),
            Intent::PanBy(delta) => {
                self.viewport.pan_by(delta);
                self.remember_viewport(config);
            }
            Intent::PanEnded => {
                self.remember_viewport(config);
                config.flush();
            }
            Intent::Zoom { delta, cursor } => {
                self.viewport.zoom_at(delta, cursor);
                self.remember_viewport(config);
            }
            Intent::Focus(Some(id)) => self.focus_card(&id, store),
            Intent::Focus(None) => self.focus = None,
            Intent::MoveCard { id, position } => {
                store.update(&id, CardPatch::position(position));
            }
            Intent::MoveEnded { id } => remember_geometry(config, store, &id),
            Intent::ResizeCard { id, size } => {
                store.update(&id, CardPatch::size(size));
                remember_geometry(config, store, &id);
            }
            Intent::CycleLink { target } => {
                let Some(source) = self.focus.as_ref().map(|f| f.id.clone()) else {
                    log::debug!("event=link_cycle status=ignored target={} reason=no_focus", target);
                    return None;
                };
                let current = store.get(&source).and_then(|card| card.links.weight(&target));
                let weight = links::next_step(current);
                if store.set_link(&source, &target, weight) {
                    log::info!(
                        "event=link_cycle source={} target={} weight={:.1}",
                        source,
                        target,
                        weight
                    );
                }
            }
            Intent::Close { id } => {
                self.remove_card(&id, store);
            }
        }
        None
    }

    fn apply_key(
        &mut self,
        key: KeyCommand,
        store: &mut CardStore,
        chats: &mut ChatSessions,
        config: &mut Config,
    ) -> Option<Command> {
        match key {
            KeyCommand::NewCard { kind, at } => {
                let near = self.viewport.screen_to_canvas(at).into();
                let position = layout::find_free_position(store, near);
                match store.add(NewCard::new(kind).position(position)) {
                    Ok(id) => {
                        remember_geometry(config, store, &id);
                        self.sync_order(store);
                        self.focus_card(&id, store);
                    }
                    Err(err) => self.set_status(err.to_string()),
                }
                None
            }
            KeyCommand::DeleteFocused => {
                let id = self.focus.as_ref()?.id.clone();
                self.remove_card(&id, store).then_some(Command::Delete(id))
            }
            KeyCommand::SaveFocused => {
                let focus = self.focus.as_ref()?;
                match focus.row {
                    Some(row) => {
                        let id = store.get(&focus.id)?.cards.get(row)?.id.clone();
                        Some(Command::SaveEmbedded {
                            list: focus.id.clone(),
                            id,
                        })
                    }
                    None => Some(Command::Save(focus.id.clone())),
                }
            }
            KeyCommand::ReloadFocused => {
                let id = self.focus.as_ref()?.id.clone();
                match store.get(&id)?.kind {
                    CardType::CardList => Some(Command::RefreshList(id)),
                    _ => Some(Command::Reload(id)),
                }
            }
            KeyCommand::Refresh => Some(Command::Refresh),
            KeyCommand::AtomizeFocused => {
                let id = &self.focus.as_ref()?.id;
                match store.get(id) {
                    Some(card) if card.kind == CardType::Markdown => Some(Command::Atomize {
                        source: card.id.clone(),
                        prompt: atomize::prompt(&card.content),
                    }),
                    _ => {
                        self.set_status("Only markdown cards can be atomized");
                        None
                    }
                }
            }
            KeyCommand::Escape => {
                if self.show_help {
                    self.show_help = false;
                } else if self.status.is_some() {
                    self.status = None;
                } else if let Some(focus) = self.focus.as_mut().filter(|f| f.row.is_some()) {
                    focus.row = None;
                    focus.field = None;
                } else {
                    self.focus = None;
                }
                None
            }
            KeyCommand::Insert(text) => {
                self.edit(store, chats, |value| value.push_str(&text));
                None
            }
            KeyCommand::Backspace => {
                self.edit(store, chats, |value| {
                    value.pop();
                });
                None
            }
            KeyCommand::Enter => {
                let focus = self.focus.as_ref()?;
                match focus.field? {
                    Field::Draft => {
                        let message = chats.get_mut(&focus.id)?.begin()?;
                        Some(Command::SendChat {
                            card_id: focus.id.clone(),
                            message,
                        })
                    }
                    Field::Content => {
                        self.edit(store, chats, |value| value.push('\n'));
                        None
                    }
                    Field::Context => None,
                }
            }
            KeyCommand::NextField => {
                if let Some(focus) = self.focus.as_mut() {
                    focus.field = match focus.field {
                        Some(Field::Content) => Some(Field::Context),
                        Some(Field::Context) => Some(Field::Content),
                        other => other,
                    };
                }
                None
            }
            KeyCommand::PreviousRow => {
                self.select_row(store, |row, rows| match row {
                    Some(row) => row.saturating_sub(1),
                    None => rows - 1,
                });
                None
            }
            KeyCommand::NextRow => {
                self.select_row(store, |row, rows| match row {
                    Some(row) => (row + 1).min(rows - 1),
                    None => 0,
                });
                None
            }
            KeyCommand::CycleSiblingLink(target) => {
                let focus = self.focus.as_ref()?;
                let row = focus.row?;
                let list = store.get(&focus.id)?;
                let target_id = list.cards.get(target)?.id.clone();
                if row == target {
                    log::debug!("event=link_cycle status=ignored list={} reason=self_link", list.id);
                    return None;
                }
                let current = list.cards.get(row)?.links.weight(&target_id);
                let weight = links::next_step(current);
                let list = focus.id.clone();
                if store.set_embedded_link(&list, row, target, weight) {
                    log::info!(
                        "event=link_cycle list={} row={} target={} weight={:.1}",
                        list,
                        row,
                        target_id,
                        weight
                    );
                }
                None
            }
            KeyCommand::ToggleHelp => {
                self.show_help = !self.show_help;
                None
            }
        }
    }

    /// Move the expanded row of a focused card list. `pick` gets the current
    /// row and the row count, which is never zero.
    fn select_row(
        &mut self,
        store: &CardStore,
        pick: impl FnOnce(Option<usize>, usize) -> usize,
    ) {
        let Some(focus) = self.focus.as_mut() else { return };
        let rows = match store.get(&focus.id) {
            Some(card) if card.kind == CardType::CardList => card.cards.len(),
            _ => return,
        };
        if rows == 0 {
            return;
        }
        let row = pick(focus.row, rows);
        if focus.row != Some(row) {
            focus.row = Some(row);
            focus.field = Some(Field::Content);
        }
    }

    fn focus_card(&mut self, id: &str, store: &CardStore) {
        let Some(card) = store.get(id) else {
            log::debug!("event=focus status=ignored id={} reason=unknown", id);
            return;
        };
        let (field, row) = match &self.focus {
            Some(focus) if focus.id == id => (focus.field, focus.row),
            _ => (Field::default_for(card.kind), None),
        };
        self.focus = Some(Focus {
            id: id.to_string(),
            field,
            row,
        });
        self.raise(id);
    }

    /// Take a card off the board. The card API is not told.
    fn remove_card(&mut self, id: &str, store: &mut CardStore) -> bool {
        if store.remove(id).is_none() {
            return false;
        }
        self.sync_order(store);
        log::info!("event=card_close id={}", id);
        true
    }

    /// Run `change` over the text the focused card is editing.
    fn edit(
        &self,
        store: &mut CardStore,
        chats: &mut ChatSessions,
        change: impl FnOnce(&mut String),
    ) {
        let Some(Focus {
            id,
            field: Some(field),
            row,
        }) = &self.focus
        else {
            return;
        };
        if let Some(row) = *row {
            let field = *field;
            store.update_embedded(id, row, |card| match field {
                Field::Content => change(&mut card.content),
                Field::Context => {
                    let mut context = card.context.take().unwrap_or_default();
                    change(&mut context);
                    card.context = Some(context);
                }
                Field::Draft => {}
            });
            return;
        }
        match field {
            Field::Draft => {
                if let Some(session) = chats.get_mut(id) {
                    change(&mut session.draft);
                }
            }
            Field::Content => {
                let Some(card) = store.get(id) else { return };
                let mut content = card.content.clone();
                change(&mut content);
                store.update(id, CardPatch::content(content));
            }
            Field::Context => {
                let Some(card) = store.get(id) else { return };
                let mut context = card.context.clone().unwrap_or_default();
                change(&mut context);
                store.update(id, CardPatch::context(context));
            }
        }
    }

    fn remember_viewport(&self, config: &mut Config) {
        config.set_viewport(SavedViewport {
            x: self.viewport.translation.x,
            y: self.viewport.translation.y,
            zoom: self.viewport.zoom,
        });
    }
}

fn moves_viewport(intent: &Intent) -> bool {
    matches!(intent, Intent::PanTo(_) | Intent::PanBy(_) | Intent::Zoom { .. })
}

/// Save the board geometry of `id` so it survives a restart.
pub fn remember_geometry(config: &mut Config, store: &CardStore, id: &str) {
    if let Some(card) = store.get(id) {
        config.set_geometry(id, SavedGeometry::new(card.position, card.size, card.kind));
    }
}

/// Translate a key press into a board command. Plain keys are shortcuts only
/// while no text field has focus.
pub fn key_command(
    key: Key<&str>,
    modifiers: Modifiers,
    text: Option<&str>,
    editing: bool,
    at: Point,
) -> Option<KeyCommand> {
    use iced::keyboard::key::Named;

    if modifiers.control() {
        return match key {
            Key::Character("s") | Key::Character("S") => Some(KeyCommand::SaveFocused),
            Key::Character("r") if !modifiers.shift() => Some(KeyCommand::Refresh),
            Key::Character("r") | Key::Character("R") => Some(KeyCommand::ReloadFocused),
            Key::Character("a") | Key::Character("A") => Some(KeyCommand::AtomizeFocused),
            Key::Character(digit) => match digit.parse::<usize>() {
                Ok(n @ 1..=9) => Some(KeyCommand::CycleSiblingLink(n - 1)),
                _ => None,
            },
            _ => None,
        };
    }

    match key {
        Key::Named(Named::Escape) => return Some(KeyCommand::Escape),
        Key::Named(Named::F1) => return Some(KeyCommand::ToggleHelp),
        Key::Named(Named::ArrowUp) => return Some(KeyCommand::PreviousRow),
        Key::Named(Named::ArrowDown) => return Some(KeyCommand::NextRow),
        _ => {}
    }

    if editing {
        return match key {
            Key::Named(Named::Backspace) => Some(KeyCommand::Backspace),
            Key::Named(Named::Enter) => Some(KeyCommand::Enter),
            Key::Named(Named::Tab) => Some(KeyCommand::NextField),
            _ => {
                let input = text.filter(|t| !t.is_empty() && !modifiers.alt())?;
                if input.chars().all(|c| !c.is_control()) {
                    Some(KeyCommand::Insert(input.to_string()))
                } else {
                    None
                }
            }
        };
    }

    let kind = match key {
        Key::Named(Named::Delete) => return Some(KeyCommand::DeleteFocused),
        Key::Character("n") => CardType::Atomic,
        Key::Character("m") => CardType::Markdown,
        Key::Character("c") => CardType::Chat,
        Key::Character("g") => CardType::Graph,
        Key::Character("?") => return Some(KeyCommand::ToggleHelp),
        _ => return None,
    };
    Some(KeyCommand::NewCard { kind, at })
}

/// What the canvas draws: the board plus the data it presents.
pub struct BoardView<'a> {
    board: &'a Board,
    store: &'a CardStore,
    chats: &'a ChatSessions,
}

impl<'a> BoardView<'a> {
    pub fn new(board: &'a Board, store: &'a CardStore, chats: &'a ChatSessions) -> Self {
        Self { board, store, chats }
    }

    fn classify(&self, position: Point) -> HitRegion {
        gesture::classify(self.board.ordered(self.store), &self.board.viewport, position)
    }

    fn dispatch(
        &self,
        state: &mut Interaction,
        input: PointerInput,
    ) -> Option<canvas::Action<Message>> {
        let intents = state.gesture.handle(input, &self.board.viewport);
        if !intents.is_empty() {
            Some(canvas::Action::publish(Message::Board(BoardMessage::Gesture(intents))))
        } else if state.gesture.is_idle() {
            None
        } else {
            Some(canvas::Action::request_redraw())
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Interaction {
    pub gesture: Gesture,
    pub modifiers: Modifiers,
}

impl canvas::Program<Message> for BoardView<'_> {
    type State = Interaction;

    fn draw(
        &self,
        state: &Self::State,
        renderer: &iced::Renderer,
        _theme: &iced::Theme,
        bounds: Rectangle,
        _cursor: mouse::Cursor,
    ) -> Vec<Geometry> {
        let viewport = self.board.viewport;
        let content = self.board.cache.draw(renderer, bounds.size(), |frame| {
            frame.fill_rectangle(Point::ORIGIN, bounds.size(), palette::BACKGROUND);
            draw_grid(frame, bounds.size(), &viewport);

            frame.translate(viewport.translation);
            frame.scale(viewport.zoom);

            let ordered = self.board.ordered(self.store);
            for card in &ordered {
                for (target, weight) in resolved_links(self.store, &card.links) {
                    draw_link(frame, card, target, weight);
                }
            }

            let focus = self.board.focus();
            for card in &ordered {
                let focused = focus.filter(|f| f.id == card.id);
                let ctx = RenderContext {
                    store: self.store,
                    chats: self.chats,
                    editing: focused.and_then(|f| f.field),
                    row: focused.and_then(|f| f.row),
                };
                let view = render::present(card, &ctx);
                draw_card(frame, card, &view, focused.is_some());
            }
        });

        let mut layers = vec![content];

        if let Some((id, size)) = state.gesture.resize_preview() {
            if let Some(card) = self.store.get(id) {
                let mut frame = Frame::new(renderer, bounds.size());
                frame.translate(viewport.translation);
                frame.scale(viewport.zoom);
                draw_resize_preview(&mut frame, card.position.into(), size.into());
                layers.push(frame.into_geometry());
            }
        }

        if let Some(status) = self.board.status() {
            let mut frame = Frame::new(renderer, bounds.size());
            draw_status(&mut frame, bounds.size(), status);
            layers.push(frame.into_geometry());
        }

        if self.board.show_help {
            let mut frame = Frame::new(renderer, bounds.size());
            draw_help_overlay(&mut frame, bounds.size());
            layers.push(frame.into_geometry());
        }

        layers
    }

    fn update(
        &self,
        state: &mut Self::State,
        event: &iced::Event,
        bounds: Rectangle,
        cursor: mouse::Cursor,
    ) -> Option<canvas::Action<Message>> {
        match event {
            iced::Event::Keyboard(keyboard::Event::ModifiersChanged(modifiers)) => {
                state.modifiers = *modifiers;
                None
            }
            iced::Event::Keyboard(keyboard::Event::KeyPressed {
                key,
                modifiers,
                text,
                ..
            }) => {
                let editing = self.board.focus().is_some_and(|f| f.field.is_some());
                let at = cursor
                    .position_in(bounds)
                    .unwrap_or_else(|| Point::new(bounds.width / 2.0, bounds.height / 2.0));
                let text = text.as_ref().map(|t| t.to_string());
                let command = key_command(key.as_ref(), *modifiers, text.as_deref(), editing, at)?;
                Some(canvas::Action::publish(Message::Board(BoardMessage::Key(command))))
            }
            iced::Event::Mouse(mouse_event) => {
                let position = cursor.position_in(bounds);
                match mouse_event {
                    mouse::Event::ButtonPressed(button) => {
                        let position = position?;
                        let button = match button {
                            mouse::Button::Left => Button::Primary,
                            mouse::Button::Right => Button::Secondary,
                            mouse::Button::Middle => Button::Middle,
                            _ => return None,
                        };
                        let input = PointerInput::Down {
                            position,
                            button,
                            region: self.classify(position),
                            link_modifier: state.modifiers.alt(),
                        };
                        self.dispatch(state, input)
                    }
                    mouse::Event::ButtonReleased(mouse::Button::Left) => {
                        if state.gesture.is_idle() {
                            return None;
                        }
                        let input = match position {
                            Some(position) => PointerInput::Up { position },
                            None => PointerInput::CaptureLost,
                        };
                        self.dispatch(state, input)
                    }
                    mouse::Event::CursorMoved { .. } => match position {
                        Some(position) => self.dispatch(state, PointerInput::Move { position }),
                        None if !state.gesture.is_idle() => {
                            self.dispatch(state, PointerInput::CaptureLost)
                        }
                        None => None,
                    },
                    mouse::Event::CursorLeft if !state.gesture.is_idle() => {
                        self.dispatch(state, PointerInput::CaptureLost)
                    }
                    mouse::Event::WheelScrolled { delta } => {
                        let cursor = position?;
                        let delta = match delta {
                            mouse::ScrollDelta::Lines { x, y } => Vector::new(*x, *y),
                            mouse::ScrollDelta::Pixels { x, y } => {
                                Vector::new(*x / WHEEL_LINE, *y / WHEEL_LINE)
                            }
                        };
                        let input = PointerInput::Wheel {
                            delta,
                            cursor,
                            zoom: state.modifiers.control(),
                        };
                        self.dispatch(state, input)
                    }
                    _ => None,
                }
            }
            _ => None,
        }
    }

    fn mouse_interaction(
        &self,
        state: &Self::State,
        bounds: Rectangle,
        cursor: mouse::Cursor,
    ) -> mouse::Interaction {
        let Some(position) = cursor.position_in(bounds) else {
            return mouse::Interaction::default();
        };
        match &state.gesture {
            Gesture::PanningCanvas { .. } | Gesture::DraggingCard { .. } => {
                mouse::Interaction::Grabbing
            }
            Gesture::ResizingCard { .. } => mouse::Interaction::Crosshair,
            Gesture::Idle => match self.classify(position) {
                HitRegion::Resize { .. } => mouse::Interaction::Crosshair,
                HitRegion::Close { .. } => mouse::Interaction::Pointer,
                HitRegion::Handle { .. } => mouse::Interaction::Grab,
                HitRegion::Body { id } => match self.store.get(&id) {
                    Some(card) if Field::default_for(card.kind).is_some() => {
                        mouse::Interaction::Text
                    }
                    _ => mouse::Interaction::default(),
                },
                HitRegion::Background => mouse::Interaction::default(),
            },
        }
    }
}

mod palette {
    use iced::Color;

    pub const BACKGROUND: Color = Color::from_rgb(0.075, 0.075, 0.085);
    pub const GRID_DOT: Color = Color::from_rgba(1.0, 1.0, 1.0, 0.04);

    pub const CARD_BG: Color = Color::from_rgb(0.11, 0.11, 0.13);
    pub const CARD_HEADER: Color = Color::from_rgb(0.15, 0.15, 0.18);
    pub const CARD_BORDER: Color = Color::from_rgb(0.22, 0.22, 0.26);
    pub const CARD_SHADOW: Color = Color::from_rgba(0.0, 0.0, 0.0, 0.35);
    pub const FOCUS_BORDER: Color = Color::from_rgb(0.92, 0.65, 0.25);

    pub const TEXT_PRIMARY: Color = Color::from_rgb(0.92, 0.92, 0.94);
    pub const TEXT_SECONDARY: Color = Color::from_rgb(0.55, 0.55, 0.60);
    pub const ACCENT: Color = Color::from_rgb(0.30, 0.75, 0.85);
    pub const USER: Color = Color::from_rgb(0.92, 0.65, 0.25);
    pub const ASSISTANT: Color = Color::from_rgb(0.35, 0.75, 0.45);

    pub const LINK: Color = Color::from_rgb(0.50, 0.70, 0.80);
    pub const STATUS_BG: Color = Color::from_rgba(0.45, 0.12, 0.12, 0.9);
}

fn tone_color(tone: Tone) -> Color {
    match tone {
        Tone::Primary => palette::TEXT_PRIMARY,
        Tone::Secondary => palette::TEXT_SECONDARY,
        Tone::Accent => palette::ACCENT,
        Tone::User => palette::USER,
        Tone::Assistant => palette::ASSISTANT,
    }
}

fn rounded_rect(pos: Point, size: Size, radius: f32) -> Path {
    Path::new(|builder| {
        let r = radius.min(size.width / 2.0).min(size.height / 2.0);
        let (x, y, w, h) = (pos.x, pos.y, size.width, size.height);

        builder.move_to(Point::new(x + r, y));
        builder.line_to(Point::new(x + w - r, y));
        builder.arc_to(Point::new(x + w, y), Point::new(x + w, y + r), r);
        builder.line_to(Point::new(x + w, y + h - r));
        builder.arc_to(Point::new(x + w, y + h), Point::new(x + w - r, y + h), r);
        builder.line_to(Point::new(x + r, y + h));
        builder.arc_to(Point::new(x, y + h), Point::new(x, y + h - r), r);
        builder.line_to(Point::new(x, y + r));
        builder.arc_to(Point::new(x, y), Point::new(x + r, y), r);
        builder.close();
    })
}

fn draw_grid(frame: &mut Frame, size: Size, viewport: &Viewport) {
    let spacing = GRID_SPACING * viewport.zoom;
    let offset_x = viewport.translation.x.rem_euclid(spacing);
    let offset_y = viewport.translation.y.rem_euclid(spacing);
    let cols = (size.width / spacing) as i32 + 2;
    let rows = (size.height / spacing) as i32 + 2;

    for row in 0..rows {
        for col in 0..cols {
            let x = offset_x + col as f32 * spacing;
            let y = offset_y + row as f32 * spacing;
            frame.fill(&Path::circle(Point::new(x, y), 1.0), palette::GRID_DOT);
        }
    }
}

fn center(card: &UICard) -> Point {
    Point::new(
        card.position.x + card.size.width / 2.0,
        card.position.y + card.size.height / 2.0,
    )
}

fn draw_link(frame: &mut Frame, source: &UICard, target: &UICard, weight: f32) {
    let start = center(source);
    let end = center(target);
    let color = Color {
        a: 0.25 + 0.6 * weight,
        ..palette::LINK
    };
    frame.stroke(
        &Path::line(start, end),
        Stroke::default()
            .with_color(color)
            .with_width(1.0 + 3.0 * weight)
            .with_line_cap(canvas::LineCap::Round),
    );
    frame.fill(&Path::circle(end, 3.0 + 2.0 * weight), color);
}

fn draw_card(frame: &mut Frame, card: &UICard, view: &CardView, focused: bool) {
    let pos: Point = card.position.into();
    let size: Size = card.size.into();

    frame.fill(
        &rounded_rect(pos + Vector::new(3.0, 4.0), size, CORNER_RADIUS),
        palette::CARD_SHADOW,
    );
    frame.fill(&rounded_rect(pos, size, CORNER_RADIUS), palette::CARD_BG);

    // header, squared off where it meets the body
    frame.fill(
        &rounded_rect(pos, Size::new(size.width, HEADER_HEIGHT), CORNER_RADIUS),
        palette::CARD_HEADER,
    );
    frame.fill_rectangle(
        Point::new(pos.x, pos.y + HEADER_HEIGHT / 2.0),
        Size::new(size.width, HEADER_HEIGHT / 2.0),
        palette::CARD_HEADER,
    );

    frame.fill_text(Text {
        content: view.title.clone(),
        position: Point::new(pos.x + 10.0, pos.y + 7.0),
        color: palette::TEXT_PRIMARY,
        size: iced::Pixels(13.0),
        ..Text::default()
    });

    let close = gesture::close_bounds(card);
    frame.fill_text(Text {
        content: "×".to_string(),
        position: Point::new(close.x + 5.0, close.y + 1.0),
        color: palette::TEXT_SECONDARY,
        size: iced::Pixels(15.0),
        ..Text::default()
    });

    let body_top = pos.y + HEADER_HEIGHT + BODY_PADDING;
    for (i, line) in view.lines.iter().enumerate() {
        if line.text.is_empty() {
            continue;
        }
        frame.fill_text(Text {
            content: line.text.clone(),
            position: Point::new(pos.x + BODY_PADDING, body_top + i as f32 * LINE_HEIGHT),
            color: tone_color(line.tone),
            size: iced::Pixels(13.0),
            ..Text::default()
        });
    }

    if let Some(graph) = &view.graph {
        let body = Rectangle::new(
            Point::new(pos.x + BODY_PADDING, body_top),
            Size::new(
                size.width - BODY_PADDING * 2.0,
                size.height - HEADER_HEIGHT - BODY_PADDING * 2.0,
            ),
        );
        let place = |p: Point| Point::new(body.x + p.x * body.width, body.y + p.y * body.height);

        for &(from, to, weight) in &graph.edges {
            if let (Some((a, _)), Some((b, _))) = (graph.nodes.get(from), graph.nodes.get(to)) {
                frame.stroke(
                    &Path::line(place(*a), place(*b)),
                    Stroke::default()
                        .with_color(Color {
                            a: 0.3 + 0.6 * weight,
                            ..palette::LINK
                        })
                        .with_width(1.0 + 2.0 * weight),
                );
            }
        }
        for (point, label) in &graph.nodes {
            let at = place(*point);
            frame.fill(&Path::circle(at, 5.0), palette::ACCENT);
            frame.fill_text(Text {
                content: label.clone(),
                position: Point::new(at.x + 8.0, at.y - 6.0),
                color: palette::TEXT_SECONDARY,
                size: iced::Pixels(11.0),
                ..Text::default()
            });
        }
    }

    // resize grip
    let corner = Point::new(pos.x + size.width - 4.0, pos.y + size.height - 4.0);
    for step in [RESIZE_GRIP * 0.25, RESIZE_GRIP * 0.5, RESIZE_GRIP * 0.75] {
        frame.stroke(
            &Path::line(
                Point::new(corner.x - step, corner.y),
                Point::new(corner.x, corner.y - step),
            ),
            Stroke::default()
                .with_color(palette::TEXT_SECONDARY)
                .with_width(1.0),
        );
    }

    let (border, width) = if focused {
        (palette::FOCUS_BORDER, 2.0)
    } else {
        (palette::CARD_BORDER, 1.0)
    };
    frame.stroke(
        &rounded_rect(pos, size, CORNER_RADIUS),
        Stroke::default().with_color(border).with_width(width),
    );
}

fn draw_resize_preview(frame: &mut Frame, pos: Point, size: Size) {
    frame.stroke(
        &rounded_rect(pos, size, CORNER_RADIUS),
        Stroke {
            line_dash: canvas::LineDash {
                segments: &[6.0, 4.0],
                offset: 0,
            },
            ..Stroke::default()
                .with_color(palette::FOCUS_BORDER)
                .with_width(1.5)
        },
    );
}

fn draw_status(frame: &mut Frame, size: Size, status: &str) {
    let width = (status.chars().count() as f32 * 7.5 + 32.0).min(size.width - 32.0);
    let pos = Point::new(16.0, size.height - 48.0);
    frame.fill(
        &rounded_rect(pos, Size::new(width, 32.0), 8.0),
        palette::STATUS_BG,
    );
    frame.fill_text(Text {
        content: status.to_string(),
        position: Point::new(pos.x + 16.0, pos.y + 9.0),
        color: palette::TEXT_PRIMARY,
        size: iced::Pixels(13.0),
        ..Text::default()
    });
}

fn draw_help_overlay(frame: &mut Frame, size: Size) {
    frame.fill_rectangle(Point::ORIGIN, size, Color::from_rgba(0.0, 0.0, 0.0, 0.75));

    let shortcuts = [
        ("N / M / C / G", "New atomic / markdown / chat / graph card"),
        ("Tab", "Switch content / context"),
        ("Enter", "New line, or send chat"),
        ("Ctrl+S", "Save focused card"),
        ("Ctrl+R", "Refresh all cards"),
        ("Ctrl+Shift+R", "Reload focused card or list"),
        ("Ctrl+A", "Atomize focused markdown"),
        ("Up / Down", "Expand a card in a list"),
        ("Ctrl+1..9", "Cycle link to list card N"),
        ("Delete", "Delete focused card on server"),
        ("?  /  F1", "Toggle help"),
        ("Esc", "Close overlay / unfocus"),
        ("", ""),
        ("Mouse", ""),
        ("Drag header", "Move card"),
        ("Drag corner", "Resize card"),
        ("Click ×", "Remove card from board"),
        ("Alt+click card", "Cycle link weight from focus"),
        ("Drag empty", "Pan"),
        ("Scroll", "Pan"),
        ("Ctrl+Scroll", "Zoom"),
    ];

    let box_width = 420.0;
    let line_height = 24.0;
    let box_height = shortcuts.len() as f32 * line_height + 60.0;
    let box_x = (size.width - box_width) / 2.0;
    let box_y = (size.height - box_height) / 2.0;

    frame.fill(
        &rounded_rect(
            Point::new(box_x, box_y),
            Size::new(box_width, box_height),
            12.0,
        ),
        Color::from_rgb(0.12, 0.12, 0.14),
    );

    frame.fill_text(Text {
        content: "Keyboard Shortcuts".to_string(),
        position: Point::new(box_x + 20.0, box_y + 20.0),
        color: palette::TEXT_PRIMARY,
        size: iced::Pixels(16.0),
        ..Text::default()
    });

    for (i, (key, action)) in shortcuts.iter().enumerate() {
        let y = box_y + 55.0 + i as f32 * line_height;
        if !key.is_empty() {
            frame.fill_text(Text {
                content: key.to_string(),
                position: Point::new(box_x + 20.0, y),
                color: palette::ACCENT,
                size: iced::Pixels(12.0),
                ..Text::default()
            });
        }
        if !action.is_empty() {
            frame.fill_text(Text {
                content: action.to_string(),
                position: Point::new(box_x + 150.0, y),
                color: palette::TEXT_SECONDARY,
                size: iced::Pixels(12.0),
                ..Text::default()
            });
        }
    }

    frame.fill_text(Text {
        content: "Press ? or F1 to close".to_string(),
        position: Point::new(box_x + 20.0, box_y + box_height - 25.0),
        color: Color::from_rgba(1.0, 1.0, 1.0, 0.4),
        size: iced::Pixels(10.0),
        ..Text::default()
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::{Card, Position};
    use crate::chat::ChatSession;

    struct Fixture {
        board: Board,
        store: CardStore,
        chats: ChatSessions,
        config: Config,
    }

    impl Fixture {
        fn new() -> Self {
            let config = Config::default();
            let mut store = CardStore::new();
            store.reset_to_default();
            let mut chats = ChatSessions::new();
            chats.insert("chat-1".into(), ChatSession::default());
            let mut board = Board::new(&config);
            board.sync_order(&store);
            Self {
                board,
                store,
                chats,
                config,
            }
        }

        fn send(&mut self, message: BoardMessage) -> Option<Command> {
            self.board
                .update(message, &mut self.store, &mut self.chats, &mut self.config)
        }

        fn key(&mut self, key: KeyCommand) -> Option<Command> {
            self.send(BoardMessage::Key(key))
        }

        fn intents(&mut self, intents: Vec<Intent>) -> Option<Command> {
            self.send(BoardMessage::Gesture(intents))
        }
    }

    #[test]
    fn focusing_raises_card() {
        let mut f = Fixture::new();
        assert_eq!(
            f.board.ordered(&f.store).last().map(|c| c.id.as_str()),
            Some("editor-1")
        );
        f.intents(vec![Intent::Focus(Some("chat-1".into()))]);
        f.intents(vec![Intent::Focus(Some("editor-1".into()))]);
        assert_eq!(f.board.focus().map(|x| x.id.as_str()), Some("editor-1"));
        assert_eq!(
            f.board.ordered(&f.store).last().map(|c| c.id.as_str()),
            Some("editor-1")
        );
        f.intents(vec![Intent::Focus(Some("chat-1".into()))]);
        assert_eq!(
            f.board.ordered(&f.store).last().map(|c| c.id.as_str()),
            Some("chat-1")
        );
    }

    #[test]
    fn typing_edits_focused_content_and_context() {
        let mut f = Fixture::new();
        f.intents(vec![Intent::Focus(Some("editor-1".into()))]);
        f.key(KeyCommand::Insert("!".into()));
        f.key(KeyCommand::Enter);
        f.key(KeyCommand::Insert("x".into()));
        f.key(KeyCommand::Backspace);
        assert_eq!(f.store.get("editor-1").unwrap().content, "# Hello World!\n");

        f.key(KeyCommand::NextField);
        f.key(KeyCommand::Insert("ctx".into()));
        assert_eq!(f.store.get("editor-1").unwrap().context.as_deref(), Some("ctx"));
    }

    #[test]
    fn enter_in_chat_draft_sends_message() {
        let mut f = Fixture::new();
        f.intents(vec![Intent::Focus(Some("chat-1".into()))]);
        f.key(KeyCommand::Insert("hello".into()));
        let command = f.key(KeyCommand::Enter);
        assert_eq!(
            command,
            Some(Command::SendChat {
                card_id: "chat-1".into(),
                message: "hello".into(),
            })
        );
        assert!(f.chats["chat-1"].streaming);
        assert!(f.key(KeyCommand::Enter).is_none());
    }

    #[test]
    fn move_and_resize_go_through_store() {
        let mut f = Fixture::new();
        f.intents(vec![Intent::MoveCard {
            id: "editor-1".into(),
            position: Position::new(5.0, 6.0),
        }]);
        f.intents(vec![Intent::ResizeCard {
            id: "editor-1".into(),
            size: crate::card::Size::new(5000.0, 10.0),
        }]);
        let card = f.store.get("editor-1").unwrap();
        assert_eq!(card.position, Position::new(5.0, 6.0));
        assert_eq!(card.size, crate::card::Size::new(1000.0, 200.0));
        assert_eq!(
            f.config.get_geometry("editor-1").map(|g| g.size),
            Some(crate::card::Size::new(1000.0, 200.0))
        );
    }

    #[test]
    fn alt_click_cycles_link_weight_from_focus() {
        let mut f = Fixture::new();
        f.intents(vec![Intent::Focus(Some("editor-1".into()))]);
        let cycle = || vec![Intent::CycleLink { target: "chat-1".into() }];
        let mut seen = Vec::new();
        for _ in 0..4 {
            f.intents(cycle());
            seen.push(f.store.get("editor-1").unwrap().links.weight("chat-1"));
        }
        assert_eq!(seen, vec![Some(0.3), Some(0.6), Some(0.9), None]);
    }

    #[test]
    fn cycle_without_focus_does_nothing() {
        let mut f = Fixture::new();
        f.intents(vec![Intent::CycleLink { target: "chat-1".into() }]);
        assert!(f.store.iter().all(|c| c.links.is_empty()));
    }

    #[test]
    fn close_only_takes_card_off_the_board() {
        let mut f = Fixture::new();
        f.store.set_link("chat-1", "editor-1", 0.6);
        f.intents(vec![Intent::Focus(Some("editor-1".into()))]);
        let command = f.intents(vec![Intent::Close { id: "editor-1".into() }]);
        assert_eq!(command, None);
        assert!(!f.store.contains("editor-1"));
        assert!(f.store.get("chat-1").unwrap().links.is_empty());
        assert!(f.board.focus().is_none());
        assert_eq!(f.board.ordered(&f.store).len(), 1);
    }

    #[test]
    fn delete_key_removes_card_and_requests_delete() {
        let mut f = Fixture::new();
        f.intents(vec![Intent::Focus(Some("editor-1".into()))]);
        let command = f.key(KeyCommand::DeleteFocused);
        assert_eq!(command, Some(Command::Delete("editor-1".into())));
        assert!(!f.store.contains("editor-1"));
        assert!(f.key(KeyCommand::DeleteFocused).is_none());
    }

    #[test]
    fn new_card_lands_on_free_spot_and_takes_focus() {
        let mut f = Fixture::new();
        f.key(KeyCommand::NewCard {
            kind: CardType::Atomic,
            at: Point::new(100.0, 100.0),
        });
        assert_eq!(f.store.len(), 3);
        let id = f.board.focus().map(|x| x.id.clone()).unwrap();
        let card = f.store.get(&id).unwrap();
        assert_eq!(card.kind, CardType::Atomic);
        assert_ne!(card.position, Position::new(100.0, 100.0));
        assert_eq!(f.board.ordered(&f.store).last().map(|c| c.id.clone()), Some(id));
    }

    #[test]
    fn atomize_needs_focused_markdown() {
        let mut f = Fixture::new();
        f.intents(vec![Intent::Focus(Some("chat-1".into()))]);
        assert!(f.key(KeyCommand::AtomizeFocused).is_none());
        assert!(f.board.status().is_some());

        f.key(KeyCommand::Escape);
        assert!(f.board.status().is_none());

        f.intents(vec![Intent::Focus(Some("editor-1".into()))]);
        match f.key(KeyCommand::AtomizeFocused) {
            Some(Command::Atomize { source, prompt }) => {
                assert_eq!(source, "editor-1");
                assert!(prompt.contains("# Hello World"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn panning_updates_viewport() {
        let mut f = Fixture::new();
        f.intents(vec![Intent::PanTo(Vector::new(30.0, 40.0)), Intent::PanEnded]);
        assert_eq!(f.board.viewport.translation, Vector::new(30.0, 40.0));
        assert_eq!(f.config.viewport().x, 30.0);
    }

    #[test]
    fn wheel_steps_reach_disk_once_motion_stops() {
        let mut f = Fixture::new();
        f.intents(vec![Intent::PanBy(Vector::new(5.0, 0.0))]);
        f.intents(vec![Intent::Zoom {
            delta: 1.0,
            cursor: Point::ORIGIN,
        }]);
        assert!(f.config.has_unsaved_changes());

        f.intents(vec![Intent::Focus(None)]);
        assert!(!f.config.has_unsaved_changes());

        f.intents(vec![Intent::PanTo(Vector::new(1.0, 1.0))]);
        f.intents(vec![Intent::PanEnded]);
        assert!(!f.config.has_unsaved_changes());
    }

    #[test]
    fn delete_key_types_nothing_while_editing() {
        let delete = || Key::Named(keyboard::key::Named::Delete);
        let at = Point::ORIGIN;
        assert_eq!(key_command(delete(), Modifiers::empty(), None, true, at), None);
        assert_eq!(
            key_command(delete(), Modifiers::empty(), Some("\u{7f}"), true, at),
            None
        );
        assert_eq!(
            key_command(delete(), Modifiers::empty(), None, false, at),
            Some(KeyCommand::DeleteFocused)
        );
    }

    fn with_card_list(f: &mut Fixture) {
        f.store
            .add(
                NewCard::new(CardType::CardList)
                    .id("list")
                    .cards(vec![Card::new("e1", "first"), Card::new("e2", "second")]),
            )
            .unwrap();
        f.board.sync_order(&f.store);
        f.intents(vec![Intent::Focus(Some("list".into()))]);
    }

    #[test]
    fn arrows_expand_embedded_cards() {
        let mut f = Fixture::new();
        with_card_list(&mut f);
        assert_eq!(f.board.focus().unwrap().field, None);

        f.key(KeyCommand::PreviousRow);
        assert_eq!(f.board.focus().unwrap().row, Some(1));
        f.key(KeyCommand::NextRow);
        assert_eq!(f.board.focus().unwrap().row, Some(1));
        f.key(KeyCommand::PreviousRow);
        f.key(KeyCommand::PreviousRow);
        let focus = f.board.focus().unwrap();
        assert_eq!((focus.row, focus.field), (Some(0), Some(Field::Content)));

        f.key(KeyCommand::Escape);
        let focus = f.board.focus().unwrap();
        assert_eq!((focus.row, focus.field), (None, None));
        f.key(KeyCommand::Escape);
        assert!(f.board.focus().is_none());
    }

    #[test]
    fn typing_edits_the_expanded_embedded_card() {
        let mut f = Fixture::new();
        with_card_list(&mut f);
        f.key(KeyCommand::NextRow);
        f.key(KeyCommand::Insert("!".into()));
        f.key(KeyCommand::NextField);
        f.key(KeyCommand::Insert("c".into()));

        let cards = &f.store.get("list").unwrap().cards;
        assert_eq!(cards[0].content, "first!");
        assert_eq!(cards[0].context.as_deref(), Some("c"));

        f.key(KeyCommand::Backspace);
        assert_eq!(f.store.get("list").unwrap().cards[0].context, None);
        assert_eq!(f.store.get("list").unwrap().cards[1].content, "second");
    }

    #[test]
    fn sibling_links_cycle_on_the_expanded_card() {
        let mut f = Fixture::new();
        with_card_list(&mut f);
        f.key(KeyCommand::NextRow);

        let mut seen = Vec::new();
        for _ in 0..4 {
            f.key(KeyCommand::CycleSiblingLink(1));
            seen.push(f.store.get("list").unwrap().cards[0].links.weight("e2"));
        }
        assert_eq!(seen, vec![Some(0.3), Some(0.6), Some(0.9), None]);

        f.key(KeyCommand::CycleSiblingLink(0));
        f.key(KeyCommand::CycleSiblingLink(7));
        assert!(f.store.get("list").unwrap().cards[0].links.is_empty());
    }

    #[test]
    fn save_and_reload_on_card_lists() {
        let mut f = Fixture::new();
        with_card_list(&mut f);
        assert_eq!(f.key(KeyCommand::SaveFocused), Some(Command::Save("list".into())));
        assert_eq!(
            f.key(KeyCommand::ReloadFocused),
            Some(Command::RefreshList("list".into()))
        );

        f.key(KeyCommand::NextRow);
        f.key(KeyCommand::NextRow);
        assert_eq!(
            f.key(KeyCommand::SaveFocused),
            Some(Command::SaveEmbedded {
                list: "list".into(),
                id: "e2".into(),
            })
        );

        f.store.update("list", CardPatch::cards(vec![Card::new("e1", "only")]));
        f.board.sync_order(&f.store);
        assert_eq!(f.board.focus().unwrap().row, None);
    }

    #[test]
    fn plain_keys_create_cards_only_when_not_editing() {
        let at = Point::new(1.0, 2.0);
        assert_eq!(
            key_command(Key::Character("m"), Modifiers::empty(), Some("m"), false, at),
            Some(KeyCommand::NewCard {
                kind: CardType::Markdown,
                at
            })
        );
        assert_eq!(
            key_command(Key::Character("m"), Modifiers::empty(), Some("m"), true, at),
            Some(KeyCommand::Insert("m".into()))
        );
        assert_eq!(
            key_command(Key::Character("s"), Modifiers::CTRL, Some("s"), true, at),
            Some(KeyCommand::SaveFocused)
        );
        assert_eq!(
            key_command(
                Key::Character("R"),
                Modifiers::CTRL | Modifiers::SHIFT,
                None,
                false,
                at
            ),
            Some(KeyCommand::ReloadFocused)
        );
        assert_eq!(
            key_command(
                Key::Named(keyboard::key::Named::Tab),
                Modifiers::empty(),
                None,
                true,
                at
            ),
            Some(KeyCommand::NextField)
        );
        assert_eq!(
            key_command(Key::Character("2"), Modifiers::CTRL, Some("2"), true, at),
            Some(KeyCommand::CycleSiblingLink(1))
        );
    }
}
