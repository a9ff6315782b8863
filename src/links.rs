use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Weights offered when cycling a link from the board: weak, medium, strong, gone.
pub const WEIGHT_STEPS: [f32; 4] = [0.3, 0.6, 0.9, 0.0];

/// Directed weighted links from one card to others, keyed by target id.
///
/// A stored weight is always in `(0, 1]`. Writing zero removes the key, so an
/// absent key and a zero weight are the same thing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "HashMap<String, f32>", into = "HashMap<String, f32>")]
pub struct Links(HashMap<String, f32>);

impl Links {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn weight(&self, target: &str) -> Option<f32> {
        self.0.get(target).copied()
    }

    pub fn contains(&self, target: &str) -> bool {
        self.0.contains_key(target)
    }

    /// Upsert or delete a link. Returns whether anything changed.
    ///
    /// Weights are clamped into `[0, 1]`; NaN is ignored.
    pub fn set(&mut self, target: &str, weight: f32) -> bool {
        let Some(weight) = normalize_weight(weight) else {
            log::debug!("event=link_weight_ignored target={} reason=nan", target);
            return false;
        };
        if weight == 0.0 {
            return self.0.remove(target).is_some();
        }
        match self.0.insert(target.to_string(), weight) {
            Some(previous) => previous != weight,
            None => true,
        }
    }

    pub fn remove(&mut self, target: &str) -> bool {
        self.0.remove(target).is_some()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f32)> {
        self.0.iter().map(|(id, w)| (id.as_str(), *w))
    }

    /// Links sorted by descending weight, then id, for stable presentation.
    pub fn sorted(&self) -> Vec<(&str, f32)> {
        let mut entries: Vec<_> = self.iter().collect();
        entries.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        entries
    }
}

impl From<HashMap<String, f32>> for Links {
    fn from(raw: HashMap<String, f32>) -> Self {
        let mut links = Links::new();
        for (target, weight) in raw {
            links.set(&target, weight);
        }
        links
    }
}

impl From<Links> for HashMap<String, f32> {
    fn from(links: Links) -> Self {
        links.0
    }
}

impl<'a> FromIterator<(&'a str, f32)> for Links {
    fn from_iter<I: IntoIterator<Item = (&'a str, f32)>>(iter: I) -> Self {
        let mut links = Links::new();
        for (target, weight) in iter {
            links.set(target, weight);
        }
        links
    }
}

fn normalize_weight(weight: f32) -> Option<f32> {
    if weight.is_nan() {
        None
    } else {
        Some(weight.clamp(0.0, 1.0))
    }
}

/// Next weight in the weak → medium → strong → removed cycle.
pub fn next_step(current: Option<f32>) -> f32 {
    let Some(current) = current else {
        return WEIGHT_STEPS[0];
    };
    WEIGHT_STEPS
        .iter()
        .copied()
        .find(|step| *step > current + f32::EPSILON)
        .unwrap_or(0.0)
}
