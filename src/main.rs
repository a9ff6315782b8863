mod api;
mod atomize;
mod board;
mod card;
mod chat;
mod config;
mod gesture;
mod layout;
mod links;
mod logging;
mod render;
mod store;

use std::collections::HashSet;
use std::sync::mpsc;

use iced::widget::canvas;
use iced::{Element, Length, Task, Theme};

use api::{ApiError, CardApi};
use board::{Board, BoardMessage, BoardView, Command};
use card::{Card, CardPatch, CardType};
use chat::{ChatEvent, ChatSessions};
use config::Config;
use store::{CardStore, StoreChange};

fn main() -> iced::Result {
    iced::application(init, update, view)
        .title("Cardboard")
        .theme(theme)
        .antialiasing(true)
        .run()
}

fn theme(_state: &Cardboard) -> Theme {
    Theme::Dark
}

fn init() -> (Cardboard, Task<Message>) {
    let config = Config::load().unwrap_or_default().with_autosave();
    if let Err(err) = logging::init_logging(&config.log_level) {
        eprintln!("cardboard: file logging disabled: {err}");
    }

    let mut store = CardStore::new();
    let (sender, changes) = mpsc::channel();
    store.subscribe(Box::new(move |change: &StoreChange| {
        let _ = sender.send(change.clone());
    }));
    store.reset_to_default();

    let mut state = Cardboard {
        api: CardApi::new(config.cards_url()),
        board: Board::new(&config),
        store,
        chats: ChatSessions::new(),
        config,
        changes,
        synced: HashSet::new(),
    };
    state.restore_geometry();
    state.drain_changes();

    let task = state.run(Command::Refresh);
    (state, task)
}

#[derive(Debug, Clone)]
pub enum Message {
    Board(BoardMessage),
    CardsLoaded(Result<Vec<Card>, ApiError>),
    /// Server copy of one card after a save.
    CardSynced(Result<Card, ApiError>),
    CardReloaded(Result<Card, ApiError>),
    EmbeddedSaved {
        list: String,
        result: Result<Card, ApiError>,
    },
    ListRefreshed {
        list: String,
        result: Result<Vec<Card>, ApiError>,
    },
    CardDeleted {
        id: String,
        result: Result<(), ApiError>,
    },
    Chat {
        card_id: String,
        event: ChatEvent,
    },
    Atomized {
        source: String,
        result: Result<String, ApiError>,
    },
}

struct Cardboard {
    store: CardStore,
    board: Board,
    chats: ChatSessions,
    config: Config,
    api: CardApi,
    changes: mpsc::Receiver<StoreChange>,
    /// Ids the card API is known to have.
    synced: HashSet<String>,
}

impl Cardboard {
    fn run(&mut self, command: Command) -> Task<Message> {
        match command {
            Command::Save(id) => {
                let Some(card) = self.store.get(&id).map(|c| c.to_card()) else {
                    return Task::none();
                };
                log::info!("event=card_save id={} new={}", id, !self.synced.contains(&id));
                if self.synced.contains(&id) {
                    Task::perform(self.api.clone().update_card(card), Message::CardSynced)
                } else {
                    Task::perform(self.api.clone().create_card(card), Message::CardSynced)
                }
            }
            Command::Reload(id) => {
                Task::perform(self.api.clone().get_card(id), Message::CardReloaded)
            }
            Command::Delete(id) => {
                if !self.synced.contains(&id) {
                    log::debug!("event=card_delete status=skipped id={} reason=never_saved", id);
                    return Task::none();
                }
                Task::perform(self.api.clone().delete_card(id.clone()), move |result| {
                    Message::CardDeleted { id: id.clone(), result }
                })
            }
            Command::Refresh => Task::perform(self.api.clone().list_cards(), Message::CardsLoaded),
            Command::SaveEmbedded { list, id } => {
                let Some(card) = self
                    .store
                    .get(&list)
                    .and_then(|l| l.cards.iter().find(|c| c.id == id))
                    .cloned()
                else {
                    return Task::none();
                };
                log::info!("event=embedded_save list={} id={}", list, id);
                Task::perform(self.api.clone().update_card(card), move |result| {
                    Message::EmbeddedSaved {
                        list: list.clone(),
                        result,
                    }
                })
            }
            Command::RefreshList(list) => {
                Task::perform(self.api.clone().list_cards(), move |result| {
                    Message::ListRefreshed {
                        list: list.clone(),
                        result,
                    }
                })
            }
            Command::Atomize { source, prompt } => {
                self.board.set_status("Atomizing…");
                Task::perform(api::atomize(self.config.atomize_url(), prompt), move |result| {
                    Message::Atomized {
                        source: source.clone(),
                        result,
                    }
                })
            }
            Command::SendChat { card_id, message } => {
                log::info!("event=chat_send card={} chars={}", card_id, message.chars().count());
                Task::run(chat::stream(self.config.chat_stream_url(), message), move |event| {
                    Message::Chat {
                        card_id: card_id.clone(),
                        event,
                    }
                })
            }
        }
    }

    fn network_failed(&mut self, action: &str, err: &ApiError) {
        log::warn!("event={} status=error error={}", action, err);
        self.board.set_status(format!("{} failed: {}", action, err));
    }

    fn cards_loaded(&mut self, cards: Vec<Card>) {
        let total = cards.len();
        let mut skipped = 0;
        for (index, card) in cards.into_iter().enumerate() {
            let id = card.id.clone();
            let saved = self.config.get_geometry(&id);
            let kind = match saved.as_ref().map(|g| g.card_type()) {
                Some(Err(tag)) => {
                    log::debug!("event=card_refresh status=skipped id={} type={}", id, tag);
                    skipped += 1;
                    continue;
                }
                Some(Ok(kind)) => kind,
                None => None,
            };

            let is_new = !self.store.contains(&id);
            let position = saved
                .as_ref()
                .map(|g| g.position)
                .unwrap_or_else(|| layout::refresh_slot(index));
            self.store.upsert_remote(card, position);
            self.synced.insert(id.clone());

            if is_new {
                self.store.update(
                    &id,
                    CardPatch {
                        kind: kind.filter(|k| *k != CardType::Atomic),
                        size: saved.map(|g| g.size),
                        ..CardPatch::default()
                    },
                );
            }
        }
        log::info!("event=card_refresh status=ok cards={} skipped={}", total, skipped);
    }

    /// Put seeded cards back where the user last left them.
    fn restore_geometry(&mut self) {
        let ids: Vec<String> = self.store.ids().map(str::to_string).collect();
        for id in ids {
            if let Some(saved) = self.config.get_geometry(&id) {
                self.store.update(
                    &id,
                    CardPatch {
                        position: Some(saved.position),
                        size: Some(saved.size),
                        ..CardPatch::default()
                    },
                );
            }
        }
    }

    /// Keep chat sessions, saved geometry and the board in step with the store.
    fn drain_changes(&mut self) {
        let mut dirty = false;
        while let Ok(change) = self.changes.try_recv() {
            dirty = true;
            match change {
                StoreChange::Added(id) => {
                    if self.store.get(&id).is_some_and(|c| c.kind == CardType::Chat) {
                        self.chats.entry(id.clone()).or_default();
                    }
                    board::remember_geometry(&mut self.config, &self.store, &id);
                }
                StoreChange::Updated(id) => {
                    if self.store.get(&id).is_some_and(|c| c.kind == CardType::Chat) {
                        self.chats.entry(id).or_default();
                    }
                }
                StoreChange::Removed(id) => {
                    self.chats.remove(&id);
                    self.config.forget_geometry(&id);
                }
                StoreChange::Reset => {
                    let store = &self.store;
                    self.chats.retain(|id, _| store.contains(id));
                    for card in store.list_by_type(CardType::Chat) {
                        self.chats.entry(card.id.clone()).or_default();
                    }
                }
            }
        }
        if dirty {
            self.board.sync_order(&self.store);
            self.board.invalidate();
        }
    }
}

fn update(state: &mut Cardboard, message: Message) -> Task<Message> {
    let task = match message {
        Message::Board(msg) => {
            match state
                .board
                .update(msg, &mut state.store, &mut state.chats, &mut state.config)
            {
                Some(command) => state.run(command),
                None => Task::none(),
            }
        }
        Message::CardsLoaded(Ok(cards)) => {
            state.cards_loaded(cards);
            state.board.clear_status();
            Task::none()
        }
        Message::CardsLoaded(Err(err)) => {
            state.network_failed("refresh", &err);
            Task::none()
        }
        Message::CardSynced(Ok(card)) | Message::CardReloaded(Ok(card)) => {
            let id = card.id.clone();
            if state.store.merge_remote(card) || state.store.contains(&id) {
                state.synced.insert(id);
            }
            state.board.clear_status();
            Task::none()
        }
        Message::CardSynced(Err(err)) => {
            state.network_failed("save", &err);
            Task::none()
        }
        Message::CardReloaded(Err(err)) => {
            state.network_failed("reload", &err);
            Task::none()
        }
        Message::EmbeddedSaved { list, result } => {
            match result {
                Ok(card) => {
                    state.store.merge_embedded(&list, card);
                    state.board.clear_status();
                }
                Err(err) => state.network_failed("embedded_save", &err),
            }
            Task::none()
        }
        Message::ListRefreshed { list, result } => {
            match result {
                Ok(cards) => {
                    let count = cards.len();
                    if state.store.update(&list, CardPatch::cards(cards)) {
                        log::info!("event=list_refresh status=ok list={} cards={}", list, count);
                    }
                    state.board.clear_status();
                }
                Err(err) => state.network_failed("list_refresh", &err),
            }
            Task::none()
        }
        Message::CardDeleted { id, result } => {
            match result {
                Ok(()) => {
                    state.synced.remove(&id);
                    log::info!("event=card_delete status=ok id={}", id);
                    state.board.clear_status();
                }
                Err(err) => state.network_failed("delete", &err),
            }
            Task::none()
        }
        Message::Chat { card_id, event } => {
            match state.chats.get_mut(&card_id) {
                Some(session) => match event {
                    ChatEvent::Fragment(text) => session.push_fragment(&text),
                    ChatEvent::Finished => {
                        session.finish();
                        log::info!("event=chat_reply status=ok card={}", card_id);
                    }
                    ChatEvent::Failed(reason) => {
                        session.finish();
                        log::warn!("event=chat_reply status=error card={} error={}", card_id, reason);
                        state.board.set_status(format!("chat failed: {}", reason));
                    }
                },
                None => {
                    log::debug!("event=chat_fragment status=dropped card={} reason=removed", card_id);
                }
            }
            state.board.invalidate();
            Task::none()
        }
        Message::Atomized { source, result } => {
            match result {
                Ok(reply) => match state.store.get(&source) {
                    Some(card) => {
                        let list = atomize::card_list(card, &reply);
                        match state.store.add(list) {
                            Ok(_) => state.board.clear_status(),
                            Err(err) => state.board.set_status(err.to_string()),
                        }
                    }
                    None => {
                        log::debug!("event=atomize status=dropped source={} reason=removed", source);
                        state.board.clear_status();
                    }
                },
                Err(err) => state.network_failed("atomize", &err),
            }
            Task::none()
        }
    };
    state.drain_changes();
    task
}

fn view(state: &Cardboard) -> Element<'_, Message> {
    canvas(BoardView::new(&state.board, &state.store, &state.chats))
        .width(Length::Fill)
        .height(Length::Fill)
        .into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> Cardboard {
        let config = Config::default();
        let mut store = CardStore::new();
        let (sender, changes) = mpsc::channel();
        store.subscribe(Box::new(move |change: &StoreChange| {
            let _ = sender.send(change.clone());
        }));
        store.reset_to_default();
        store
            .add(
                card::NewCard::new(CardType::CardList)
                    .id("list")
                    .cards(vec![Card::new("e1", "first")]),
            )
            .unwrap();
        let mut state = Cardboard {
            api: CardApi::new(config.cards_url()),
            board: Board::new(&config),
            store,
            chats: ChatSessions::new(),
            config,
            changes,
            synced: HashSet::new(),
        };
        state.drain_changes();
        state
    }

    fn failure() -> ApiError {
        ApiError::Status {
            url: "http://localhost/api/cards/x".into(),
            status: 500,
        }
    }

    #[test]
    fn reload_and_save_failures_are_told_apart() {
        let mut state = state();
        let _ = update(&mut state, Message::CardReloaded(Err(failure())));
        assert!(state.board.status().unwrap().starts_with("reload failed"));

        let _ = update(&mut state, Message::CardSynced(Err(failure())));
        assert!(state.board.status().unwrap().starts_with("save failed"));
    }

    #[test]
    fn list_refresh_replaces_embedded_cards() {
        let mut state = state();
        let cards = vec![Card::new("s1", "one"), Card::new("s2", "two")];
        let _ = update(
            &mut state,
            Message::ListRefreshed {
                list: "list".into(),
                result: Ok(cards.clone()),
            },
        );
        assert_eq!(state.store.get("list").unwrap().cards, cards);
    }

    #[test]
    fn embedded_save_merges_server_copy() {
        let mut state = state();
        let _ = update(
            &mut state,
            Message::EmbeddedSaved {
                list: "list".into(),
                result: Ok(Card::new("e1", "saved")),
            },
        );
        assert_eq!(state.store.get("list").unwrap().cards[0].content, "saved");

        let _ = update(
            &mut state,
            Message::EmbeddedSaved {
                list: "gone".into(),
                result: Ok(Card::new("e1", "late")),
            },
        );
        assert_eq!(state.store.get("list").unwrap().cards[0].content, "saved");
    }
}
