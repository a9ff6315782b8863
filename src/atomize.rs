//! Splitting a long note into atomic cards.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::card::{Card, CardType, NewCard, UICard, timestamp_id};
use crate::layout::{CARD_LIST_SIZE, beside};

static SEGMENT: Lazy<Option<Regex>> =
    Lazy::new(|| Regex::new(r"(?s)<content>(.*?)</content>").ok());

pub fn prompt(content: &str) -> String {
    format!(
        "Split the note below into several atomic cards following the \
         zettelkasten principle, without making them too granular.\n\
         Only split; do not rewrite the text. Keep closely related passages \
         together. This is a draft that will be refined later.\n\n\
         Note:\n{content}\n\n\
         Output format:\n\
         <content>\n[atomic content]\n</content>\n\
         <content>\n[atomic content]\n</content>\n..."
    )
}

/// Every `<content>…</content>` segment of `reply`, trimmed, in order.
pub fn parse_segments(reply: &str) -> Vec<String> {
    let Some(segment) = SEGMENT.as_ref() else {
        return Vec::new();
    };
    segment
        .captures_iter(reply)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .collect()
}

/// Fresh embedded cards for each segment, with empty links and context.
pub fn segment_cards(segments: Vec<String>) -> Vec<Card> {
    let stamp = timestamp_id();
    segments
        .into_iter()
        .enumerate()
        .map(|(index, content)| Card::new(format!("{}-{}", stamp, index + 1), content))
        .collect()
}

/// The card list that presents the result, placed beside `source`.
pub fn card_list(source: &UICard, reply: &str) -> NewCard {
    let cards = segment_cards(parse_segments(reply));
    log::info!(
        "event=atomize status=ok source={} segments={}",
        source.id,
        cards.len()
    );
    NewCard::new(CardType::CardList)
        .position(beside(source))
        .size(CARD_LIST_SIZE)
        .cards(cards)
}
