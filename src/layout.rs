use crate::card::{Position, Size, UICard};
use crate::store::CardStore;

const GRID_SPACING_X: f32 = 450.0;
const GRID_SPACING_Y: f32 = 120.0;
const INITIAL_X: f32 = 80.0;
const INITIAL_Y: f32 = 80.0;

/// Gap between a card and a card derived from it.
pub const BESIDE_GAP: f32 = 100.0;

/// Position for a card derived from `source`, to its right at the same height.
pub fn beside(source: &UICard) -> Position {
    Position::new(
        source.position.x + source.size.width + BESIDE_GAP,
        source.position.y,
    )
}

/// Find a spot near `near` (canvas space) that no existing card's top-left
/// crowds, walking down and then across in a grid.
pub fn find_free_position(store: &CardStore, near: Position) -> Position {
    for col in 0..10 {
        for row in 0..30 {
            let candidate = Position::new(
                near.x + col as f32 * GRID_SPACING_X,
                near.y + row as f32 * GRID_SPACING_Y,
            );
            if !crowded(store, candidate) {
                return candidate;
            }
        }
    }

    near
}

/// Position for the `index`-th card pulled in by a refresh.
pub fn refresh_slot(index: usize) -> Position {
    let per_column = 8;
    Position::new(
        INITIAL_X + (index / per_column) as f32 * GRID_SPACING_X,
        INITIAL_Y + (index % per_column) as f32 * GRID_SPACING_Y,
    )
}

fn crowded(store: &CardStore, candidate: Position) -> bool {
    store.iter().any(|card| {
        let dx = (card.position.x - candidate.x).abs();
        let dy = (card.position.y - candidate.y).abs();
        dx < GRID_SPACING_X * 0.8 && dy < GRID_SPACING_Y * 0.6
    })
}

/// Size used for card lists made by atomization.
pub const CARD_LIST_SIZE: Size = Size {
    width: 400.0,
    height: 600.0,
};

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::{CardType, NewCard};

    #[test]
    fn beside_places_to_the_right() {
        let card = NewCard::new(CardType::Markdown)
            .position(Position::new(100.0, 50.0))
            .into_card("m".into());
        assert_eq!(beside(&card), Position::new(600.0, 50.0));
    }

    #[test]
    fn free_position_skips_occupied_slots() {
        let mut store = CardStore::new();
        assert_eq!(
            find_free_position(&store, Position::new(0.0, 0.0)),
            Position::new(0.0, 0.0)
        );
        store
            .add(NewCard::new(CardType::Atomic).position(Position::new(0.0, 0.0)))
            .unwrap();
        assert_eq!(
            find_free_position(&store, Position::new(0.0, 0.0)),
            Position::new(0.0, GRID_SPACING_Y)
        );
    }

    #[test]
    fn refresh_slots_wrap_into_columns() {
        assert_eq!(refresh_slot(0), Position::new(INITIAL_X, INITIAL_Y));
        assert_eq!(refresh_slot(8).x, INITIAL_X + GRID_SPACING_X);
    }
}
