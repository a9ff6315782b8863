//! The card graph store: sole owner of every card on the board.
//!
//! Mutations are synchronous. Each one that changes something bumps
//! [`CardStore::revision`] and notifies subscribers before returning.

use std::collections::HashMap;

use crate::card::{
    Card, CardPatch, CardType, NewCard, Position, UICard, unique_id, without_self_link,
};
use crate::links::Links;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    #[error("card id `{0}` is already on the board")]
    DuplicateId(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreChange {
    Added(String),
    Updated(String),
    Removed(String),
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

pub type Listener = Box<dyn FnMut(&StoreChange) + Send>;

#[derive(Default)]
pub struct CardStore {
    cards: HashMap<String, UICard>,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: u64,
    revision: u64,
}

impl std::fmt::Debug for CardStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CardStore")
            .field("cards", &self.cards)
            .field("listeners", &self.listeners.len())
            .field("revision", &self.revision)
            .finish()
    }
}

impl CardStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a card, filling in defaults for everything the caller left out.
    ///
    /// A caller-supplied id that is already taken is rejected; generated ids
    /// are always unique.
    pub fn add(&mut self, card: NewCard) -> Result<String, StoreError> {
        let id = match card.id.clone() {
            Some(id) if self.cards.contains_key(&id) => {
                log::warn!("event=card_add status=rejected id={} reason=duplicate", id);
                return Err(StoreError::DuplicateId(id));
            }
            Some(id) => id,
            None => unique_id(|candidate| self.cards.contains_key(candidate)),
        };
        let kind = card.kind;
        self.cards.insert(id.clone(), card.into_card(id.clone()));
        log::debug!("event=card_add id={} type={}", id, kind.as_str());
        self.notify(StoreChange::Added(id.clone()));
        Ok(id)
    }

    /// Shallow-merge `patch` into the card. An unknown id is a deliberate
    /// no-op: stale references from gestures or late responses are expected.
    pub fn update(&mut self, id: &str, patch: CardPatch) -> bool {
        let Some(card) = self.cards.get_mut(id) else {
            log::debug!("event=card_update status=ignored id={} reason=unknown", id);
            return false;
        };
        if patch.is_empty() {
            return false;
        }
        patch.apply(card);
        self.notify(StoreChange::Updated(id.to_string()));
        true
    }

    /// Remove a card and delete every link pointing at it from the remaining
    /// cards, in one step.
    pub fn remove(&mut self, id: &str) -> Option<UICard> {
        let removed = self.cards.remove(id)?;
        let mut unlinked = 0;
        for card in self.cards.values_mut() {
            if card.links.remove(id) {
                unlinked += 1;
            }
        }
        log::debug!("event=card_remove id={} unlinked={}", id, unlinked);
        self.notify(StoreChange::Removed(id.to_string()));
        Some(removed)
    }

    pub fn get(&self, id: &str) -> Option<&UICard> {
        self.cards.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.cards.contains_key(id)
    }

    pub fn list_by_type(&self, kind: CardType) -> Vec<&UICard> {
        self.cards.values().filter(|card| card.kind == kind).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &UICard> {
        self.cards.values()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.cards.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.cards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cards.is_empty()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// Set, reweight or delete the link `source -> target`.
    ///
    /// Self-links are ignored. Creating or reweighting needs both cards on the
    /// board; deleting (weight zero) only needs the source, so dangling keys
    /// can always be cleaned up.
    pub fn set_link(&mut self, source: &str, target: &str, weight: f32) -> bool {
        if source == target {
            log::debug!("event=link_set status=ignored id={} reason=self_link", source);
            return false;
        }
        if weight != 0.0 && !self.cards.contains_key(target) {
            log::debug!(
                "event=link_set status=ignored source={} target={} reason=unknown_target",
                source,
                target
            );
            return false;
        }
        let Some(card) = self.cards.get_mut(source) else {
            log::debug!("event=link_set status=ignored source={} reason=unknown_source", source);
            return false;
        };
        if !card.links.set(target, weight) {
            return false;
        }
        self.notify(StoreChange::Updated(source.to_string()));
        true
    }

    /// Apply a server response to a card that is still on the board.
    /// Responses for removed cards are dropped rather than resurrecting them.
    pub fn merge_remote(&mut self, card: Card) -> bool {
        if !self.cards.contains_key(&card.id) {
            log::debug!("event=remote_merge status=dropped id={} reason=removed", card.id);
            return false;
        }
        let id = card.id.clone();
        self.update(
            &id,
            CardPatch {
                content: Some(card.content),
                context: Some(card.context.unwrap_or_default()),
                links: Some(card.links),
                ..CardPatch::default()
            },
        )
    }

    /// Merge a listed server card, adding it as an atomic card when missing.
    pub fn upsert_remote(&mut self, card: Card, position: Position) -> bool {
        if self.cards.contains_key(&card.id) {
            return self.merge_remote(card);
        }
        let mut ui = UICard::from_card(card);
        ui.position = position.sanitized();
        let id = ui.id.clone();
        self.cards.insert(id.clone(), ui);
        self.notify(StoreChange::Added(id));
        true
    }

    /// Change one embedded card of a card list. The edit lands as a `cards`
    /// patch of the list, so subscribers see an ordinary update.
    pub fn update_embedded(
        &mut self,
        list: &str,
        index: usize,
        change: impl FnOnce(&mut Card),
    ) -> bool {
        let Some(mut cards) = self
            .cards
            .get(list)
            .filter(|card| card.kind == CardType::CardList)
            .map(|card| card.cards.clone())
        else {
            log::debug!("event=embedded_update status=ignored list={} reason=unknown", list);
            return false;
        };
        let Some(card) = cards.get_mut(index) else {
            log::debug!(
                "event=embedded_update status=ignored list={} index={} reason=out_of_range",
                list,
                index
            );
            return false;
        };
        let before = card.clone();
        change(card);
        card.context = card.context.take().filter(|c| !c.is_empty());
        card.links = without_self_link(&card.id, std::mem::take(&mut card.links));
        if *card == before {
            return false;
        }
        self.update(list, CardPatch::cards(cards))
    }

    /// Set, reweight or delete the link between two embedded cards of a list.
    pub fn set_embedded_link(
        &mut self,
        list: &str,
        index: usize,
        target: usize,
        weight: f32,
    ) -> bool {
        if index == target {
            return false;
        }
        let Some(target_id) = self
            .cards
            .get(list)
            .and_then(|card| card.cards.get(target))
            .map(|card| card.id.clone())
        else {
            return false;
        };
        self.update_embedded(list, index, |card| {
            card.links.set(&target_id, weight);
        })
    }

    /// Apply a server response to the embedded card with the same id. Dropped
    /// when the list or the card is gone.
    pub fn merge_embedded(&mut self, list: &str, remote: Card) -> bool {
        let Some(index) = self
            .cards
            .get(list)
            .and_then(|card| card.cards.iter().position(|e| e.id == remote.id))
        else {
            log::debug!(
                "event=embedded_merge status=dropped list={} id={} reason=removed",
                list,
                remote.id
            );
            return false;
        };
        self.update_embedded(list, index, |card| *card = remote)
    }

    pub fn clear(&mut self) {
        self.cards.clear();
        self.notify(StoreChange::Reset);
    }

    /// Replace the board with the demo seed.
    pub fn reset_to_default(&mut self) {
        self.cards = default_cards()
            .into_iter()
            .map(|card| (card.id.clone(), card))
            .collect();
        self.notify(StoreChange::Reset);
    }

    pub fn subscribe(&mut self, listener: Listener) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.push((id, listener));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(sub, _)| *sub != id);
        self.listeners.len() != before
    }

    fn notify(&mut self, change: StoreChange) {
        self.revision += 1;
        for (_, listener) in &mut self.listeners {
            listener(&change);
        }
    }
}

fn default_cards() -> Vec<UICard> {
    vec![
        NewCard::new(CardType::Markdown)
            .content("# Hello World")
            .position(Position::new(100.0, 100.0))
            .into_card("editor-1".to_string()),
        NewCard::new(CardType::Chat)
            .position(Position::new(600.0, 100.0))
            .size(crate::card::Size::new(400.0, 500.0))
            .into_card("chat-1".to_string()),
    ]
}

/// Links of `card` that resolve to cards still on the board.
pub fn resolved_links<'a>(store: &'a CardStore, links: &'a Links) -> Vec<(&'a UICard, f32)> {
    links
        .sorted()
        .into_iter()
        .filter_map(|(target, weight)| store.get(target).map(|card| (card, weight)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn atomic(content: &str) -> NewCard {
        NewCard::new(CardType::Atomic).content(content)
    }

    #[test]
    fn add_assigns_distinct_ids() {
        let mut store = CardStore::new();
        let a = store.add(NewCard::new(CardType::Markdown)).unwrap();
        let b = store.add(NewCard::new(CardType::Markdown)).unwrap();
        assert_ne!(a, b);
        assert!(store.get(&a).is_some());
        assert!(store.get(&b).is_some());
    }

    #[test]
    fn add_rejects_duplicate_supplied_id() {
        let mut store = CardStore::new();
        store.add(atomic("one").id("x")).unwrap();
        assert_eq!(
            store.add(atomic("two").id("x")),
            Err(StoreError::DuplicateId("x".into()))
        );
        assert_eq!(store.get("x").unwrap().content, "one");
    }

    #[test]
    fn update_unknown_id_is_noop() {
        let mut store = CardStore::new();
        store.add(atomic("a").id("a")).unwrap();
        let before: Vec<UICard> = store.iter().cloned().collect();
        let revision = store.revision();

        assert!(!store.update("nonexistent", CardPatch::content("x")));

        let after: Vec<UICard> = store.iter().cloned().collect();
        assert_eq!(before, after);
        assert_eq!(store.revision(), revision);
        assert!(store.get("nonexistent").is_none());
    }

    #[test]
    fn update_replaces_links_wholesale() {
        let mut store = CardStore::new();
        store.add(atomic("a").id("a")).unwrap();
        store.add(atomic("b").id("b")).unwrap();
        store.add(atomic("c").id("c")).unwrap();
        store.set_link("a", "b", 0.4);

        let replacement: Links = [("c", 0.7)].into_iter().collect();
        store.update("a", CardPatch::links(replacement));

        let links = &store.get("a").unwrap().links;
        assert!(!links.contains("b"));
        assert_eq!(links.weight("c"), Some(0.7));
    }

    #[test]
    fn update_clamps_size() {
        let mut store = CardStore::new();
        let id = store.add(NewCard::new(CardType::Markdown)).unwrap();
        store.update(&id, CardPatch::size(crate::card::Size::new(10.0, 4000.0)));
        let size = store.get(&id).unwrap().size;
        assert_eq!(size.width, 200.0);
        assert_eq!(size.height, 1000.0);
    }

    #[test]
    fn set_link_zero_removes_after_any_weight() {
        let mut store = CardStore::new();
        store.add(atomic("a").id("a")).unwrap();
        store.add(atomic("b").id("b")).unwrap();
        for weight in [0.1, 0.5, 1.0] {
            store.set_link("a", "b", weight);
            store.set_link("a", "b", 0.0);
            assert!(!store.get("a").unwrap().links.contains("b"));
        }
    }

    #[test]
    fn set_link_zero_cleans_dangling_key() {
        let mut store = CardStore::new();
        let links: Links = [("ghost", 0.5)].into_iter().collect();
        store.add(atomic("a").id("a").links(links)).unwrap();
        assert!(store.set_link("a", "ghost", 0.0));
        assert!(store.get("a").unwrap().links.is_empty());
    }

    #[test]
    fn self_link_is_ignored() {
        let mut store = CardStore::new();
        store.add(atomic("a").id("a")).unwrap();
        assert!(!store.set_link("a", "a", 0.8));
        assert!(store.get("a").unwrap().links.is_empty());
    }

    #[test]
    fn link_to_unknown_target_is_ignored() {
        let mut store = CardStore::new();
        store.add(atomic("a").id("a")).unwrap();
        assert!(!store.set_link("a", "missing", 0.5));
        assert!(!store.set_link("missing", "a", 0.5));
        assert!(store.get("a").unwrap().links.is_empty());
    }

    #[test]
    fn links_are_directed() {
        let mut store = CardStore::new();
        store.add(atomic("a").id("a")).unwrap();
        store.add(atomic("b").id("b")).unwrap();
        store.set_link("a", "b", 0.6);
        assert!(store.get("b").unwrap().links.is_empty());
    }

    #[test]
    fn remove_cascades_links_store_wide() {
        let mut store = CardStore::new();
        for id in ["a", "b", "c", "d"] {
            store.add(atomic(id).id(id)).unwrap();
        }
        store.set_link("a", "b", 0.6);
        store.set_link("c", "b", 0.3);
        store.set_link("c", "d", 0.9);
        store.set_link("b", "a", 0.2);

        assert!(store.remove("b").is_some());

        assert!(store.iter().all(|card| !card.links.contains("b")));
        assert_eq!(store.get("c").unwrap().links.weight("d"), Some(0.9));
        assert!(store.get("b").is_none());
    }

    #[test]
    fn remove_unknown_is_noop() {
        let mut store = CardStore::new();
        store.add(atomic("a").id("a")).unwrap();
        let revision = store.revision();
        assert!(store.remove("zzz").is_none());
        assert_eq!(store.len(), 1);
        assert_eq!(store.revision(), revision);
    }

    #[test]
    fn list_by_type_filters() {
        let mut store = CardStore::new();
        store.add(NewCard::new(CardType::Chat)).unwrap();
        store.add(atomic("x")).unwrap();
        store.add(atomic("y").id("y")).unwrap();
        assert_eq!(store.list_by_type(CardType::Atomic).len(), 2);
        assert_eq!(store.list_by_type(CardType::Graph).len(), 0);
    }

    #[test]
    fn merge_remote_drops_removed_cards() {
        let mut store = CardStore::new();
        store.add(atomic("a").id("a")).unwrap();
        store.remove("a");
        assert!(!store.merge_remote(Card::new("a", "late response")));
        assert!(store.get("a").is_none());
    }

    #[test]
    fn upsert_remote_keeps_geometry_of_existing_cards() {
        let mut store = CardStore::new();
        store
            .add(atomic("old").id("a").position(Position::new(10.0, 20.0)))
            .unwrap();
        store.upsert_remote(Card::new("a", "new"), Position::default());
        store.upsert_remote(Card::new("b", "fresh"), Position::new(5.0, 5.0));

        let a = store.get("a").unwrap();
        assert_eq!(a.content, "new");
        assert_eq!(a.position, Position::new(10.0, 20.0));
        let b = store.get("b").unwrap();
        assert_eq!(b.kind, CardType::Atomic);
        assert_eq!(b.position, Position::new(5.0, 5.0));
    }

    #[test]
    fn subscribers_see_every_mutation() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut store = CardStore::new();
        let sink = Arc::clone(&seen);
        let sub = store.subscribe(Box::new(move |change| {
            sink.lock().unwrap().push(change.clone());
        }));

        let id = store.add(atomic("a")).unwrap();
        store.update(&id, CardPatch::content("b"));
        store.remove(&id);
        store.reset_to_default();
        assert!(store.unsubscribe(sub));
        store.clear();

        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                StoreChange::Added(id.clone()),
                StoreChange::Updated(id.clone()),
                StoreChange::Removed(id),
                StoreChange::Reset,
            ]
        );
    }

    fn card_list(store: &mut CardStore) -> String {
        store
            .add(
                NewCard::new(CardType::CardList)
                    .id("list")
                    .cards(vec![Card::new("e1", "first"), Card::new("e2", "second")]),
            )
            .unwrap()
    }

    #[test]
    fn embedded_edits_patch_the_list() {
        let mut store = CardStore::new();
        let list = card_list(&mut store);
        let revision = store.revision();

        assert!(store.update_embedded(&list, 0, |card| card.content.push_str(" edit")));
        assert!(store.update_embedded(&list, 1, |card| card.context = Some("ctx".into())));
        assert!(!store.update_embedded(&list, 5, |card| card.content.clear()));
        assert!(!store.update_embedded("missing", 0, |card| card.content.clear()));
        assert!(!store.update_embedded(&list, 0, |_| {}));

        let cards = &store.get(&list).unwrap().cards;
        assert_eq!(cards[0].content, "first edit");
        assert_eq!(cards[1].context.as_deref(), Some("ctx"));
        assert_eq!(store.revision(), revision + 2);
    }

    #[test]
    fn embedded_edits_only_apply_to_card_lists() {
        let mut store = CardStore::new();
        store.add(atomic("a").id("a")).unwrap();
        assert!(!store.update_embedded("a", 0, |card| card.content.clear()));
    }

    #[test]
    fn embedded_links_cycle_between_siblings() {
        let mut store = CardStore::new();
        let list = card_list(&mut store);

        assert!(store.set_embedded_link(&list, 0, 1, 0.6));
        assert!(!store.set_embedded_link(&list, 0, 0, 0.6));
        assert!(!store.set_embedded_link(&list, 0, 9, 0.6));
        assert_eq!(store.get(&list).unwrap().cards[0].links.weight("e2"), Some(0.6));

        assert!(store.set_embedded_link(&list, 0, 1, 0.0));
        assert!(store.get(&list).unwrap().cards[0].links.is_empty());
    }

    #[test]
    fn embedded_merge_drops_unknown_cards() {
        let mut store = CardStore::new();
        let list = card_list(&mut store);

        assert!(store.merge_embedded(&list, Card::new("e2", "from server")));
        assert_eq!(store.get(&list).unwrap().cards[1].content, "from server");

        assert!(!store.merge_embedded(&list, Card::new("gone", "x")));
        store.remove(&list);
        assert!(!store.merge_embedded(&list, Card::new("e1", "x")));
    }

    #[test]
    fn remote_self_links_are_dropped() {
        let mut store = CardStore::new();
        store.add(atomic("a").id("a")).unwrap();
        let mut remote = Card::new("a", "a");
        remote.links.set("a", 0.9);
        store.merge_remote(remote.clone());
        assert!(store.get("a").unwrap().links.is_empty());

        remote.id = "b".into();
        remote.links.set("b", 0.3);
        store.upsert_remote(remote, Position::default());
        assert!(!store.get("b").unwrap().links.contains("b"));
    }

    #[test]
    fn reset_seeds_demo_board() {
        let mut store = CardStore::new();
        store.reset_to_default();
        assert_eq!(store.get("editor-1").unwrap().content, "# Hello World");
        assert_eq!(store.list_by_type(CardType::Chat).len(), 1);
        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn link_then_remove_scenario() {
        let mut store = CardStore::new();
        let id1 = store.add(atomic("note1")).unwrap();
        let id2 = store.add(atomic("note2")).unwrap();
        assert!(store.set_link(&id1, &id2, 0.6));
        store.remove(&id2);

        assert!(store.get(&id1).unwrap().links.is_empty());
        assert!(store.get(&id2).is_none());
    }
}
