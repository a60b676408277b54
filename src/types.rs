//! Core data types shared by every stage of a run: categories, stimuli,
//! block configurations, session metadata and trial results.
//!
//! All of these are immutable once created. The only mutable state in a run is
//! [`crate::engine::TestRunState`], which the trial engine owns.

use serde::{Deserialize, Serialize};

/// Stimulus category. Two concept categories are sorted against two
/// attribute categories.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    /// Concept A (word stimuli).
    Bashkir,
    /// Concept B (word stimuli).
    Russian,
    /// Attribute X (image stimuli).
    Mountain,
    /// Attribute Y (image stimuli).
    Swamp,
}

impl Category {
    /// Every category, in canonical order (concepts first, then attributes).
    pub const ALL: [Category; 4] = [
        Category::Bashkir,
        Category::Russian,
        Category::Mountain,
        Category::Swamp,
    ];

    #[inline]
    fn bit(self) -> u8 {
        1 << self as u8
    }

    /// Whether the category is a concept (word) category.
    pub fn is_concept(self) -> bool {
        matches!(self, Category::Bashkir | Category::Russian)
    }

    /// Kind of stimulus carried by this category.
    pub fn stimulus_type(self) -> StimulusType {
        if self.is_concept() {
            StimulusType::Word
        } else {
            StimulusType::Image
        }
    }
}

/// Small set of categories stored as a bitmask.
///
/// Iteration always follows [`Category::ALL`] order, so instruction text built
/// from a set lists the concept before the attribute.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(into = "Vec<Category>")]
pub struct CategorySet(u8);

impl CategorySet {
    pub const EMPTY: CategorySet = CategorySet(0);

    pub fn of(categories: &[Category]) -> Self {
        let mut set = Self::EMPTY;
        for &c in categories {
            set.insert(c);
        }
        set
    }

    pub fn insert(&mut self, category: Category) {
        self.0 |= category.bit();
    }

    pub fn contains(self, category: Category) -> bool {
        self.0 & category.bit() != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn len(self) -> usize {
        self.0.count_ones() as usize
    }

    pub fn union(self, other: CategorySet) -> CategorySet {
        CategorySet(self.0 | other.0)
    }

    pub fn intersection(self, other: CategorySet) -> CategorySet {
        CategorySet(self.0 & other.0)
    }

    pub fn is_disjoint(self, other: CategorySet) -> bool {
        self.intersection(other).is_empty()
    }

    pub fn iter(self) -> impl Iterator<Item = Category> {
        Category::ALL.into_iter().filter(move |c| self.contains(*c))
    }
}

impl From<CategorySet> for Vec<Category> {
    fn from(set: CategorySet) -> Self {
        set.iter().collect()
    }
}

/// Whether a stimulus is shown as text or as an image.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StimulusType {
    Word,
    Image,
}

/// One word or image presented to the participant.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stimulus {
    /// Unique across the whole pool (`bash_0`, `mountain_3`, ...).
    pub id: String,
    /// Word text, or image URL for image stimuli.
    pub content: String,
    #[serde(rename = "type")]
    pub kind: StimulusType,
    pub category: Category,
}

/// Counterbalancing group, drawn once per session by a fair coin flip.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Group {
    /// Standard pairing: BASHKIR shares a side with MOUNTAIN in block 3.
    A,
    /// Inverted pairing: BASHKIR shares a side with SWAMP in block 3.
    B,
}

impl Group {
    pub fn as_str(self) -> &'static str {
        match self {
            Group::A => "A",
            Group::B => "B",
        }
    }
}

/// Response side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Side {
    Left,
    Right,
}

/// Logical input consumed by the engine, independent of the physical source
/// (key, on-screen button, touch).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Left,
    Right,
    Acknowledge,
}

impl Action {
    /// Map a key to an action: `E` → left, `I` → right, space → acknowledge.
    pub fn from_key(key: char) -> Option<Action> {
        match key.to_ascii_uppercase() {
            crate::constants::LEFT_KEY => Some(Action::Left),
            crate::constants::RIGHT_KEY => Some(Action::Right),
            ' ' => Some(Action::Acknowledge),
            _ => None,
        }
    }

    /// The response side this action selects, if any.
    pub fn side(self) -> Option<Side> {
        match self {
            Action::Left => Some(Side::Left),
            Action::Right => Some(Side::Right),
            Action::Acknowledge => None,
        }
    }
}

impl From<Side> for Action {
    fn from(side: Side) -> Self {
        match side {
            Side::Left => Action::Left,
            Side::Right => Action::Right,
        }
    }
}

/// One block of the run: which categories sort to which side, and how many
/// trials to present.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockConfig {
    /// 1-based block number (1..=7).
    pub id: u8,
    pub title: String,
    pub instruction: String,
    pub left_categories: CategorySet,
    pub right_categories: CategorySet,
    pub trials: usize,
}

impl BlockConfig {
    /// All categories sorted in this block, either side.
    pub fn active_categories(&self) -> CategorySet {
        self.left_categories.union(self.right_categories)
    }
}

/// Outcome of one stimulus presentation, written when the participant gives
/// the accepted (correct) response.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialResult {
    pub block_id: u8,
    pub block_title: String,
    pub stimulus_id: String,
    pub category: Category,
    /// True when no wrong response was given to this presentation.
    pub is_correct: bool,
    /// Milliseconds from presentation to the accepted response.
    pub reaction_time_ms: f64,
    /// Wall-clock time of the accepted response (Unix epoch, ms).
    pub timestamp_ms: i64,
}

/// Per-participant session metadata.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: String,
    pub referrer: String,
    pub start_time_ms: i64,
    pub group: Group,
}

/// Body handed to the results sink at completion.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResultsPayload {
    pub group: Group,
    pub data: Vec<TrialResult>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_set_iterates_in_canonical_order() {
        let set = CategorySet::of(&[Category::Swamp, Category::Russian]);
        let v: Vec<Category> = set.iter().collect();
        assert_eq!(v, vec![Category::Russian, Category::Swamp]);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn category_set_disjointness() {
        let left = CategorySet::of(&[Category::Bashkir, Category::Mountain]);
        let right = CategorySet::of(&[Category::Russian, Category::Swamp]);
        assert!(left.is_disjoint(right));
        assert!(!left.is_disjoint(CategorySet::of(&[Category::Mountain])));
        assert_eq!(left.union(right).len(), 4);
    }

    #[test]
    fn category_set_serializes_as_list() {
        let set = CategorySet::of(&[Category::Bashkir, Category::Mountain]);
        let json = serde_json::to_string(&set).unwrap();
        assert_eq!(json, r#"["BASHKIR","MOUNTAIN"]"#);
    }

    #[test]
    fn key_mapping() {
        assert_eq!(Action::from_key('e'), Some(Action::Left));
        assert_eq!(Action::from_key('I'), Some(Action::Right));
        assert_eq!(Action::from_key(' '), Some(Action::Acknowledge));
        assert_eq!(Action::from_key('x'), None);
    }

    #[test]
    fn action_side_mapping() {
        for side in [Side::Left, Side::Right] {
            assert_eq!(Action::from(side).side(), Some(side));
        }
        assert_eq!(Action::Acknowledge.side(), None);
    }

    #[test]
    fn trial_result_wire_names() {
        let r = TrialResult {
            block_id: 1,
            block_title: "t".into(),
            stimulus_id: "bash_0".into(),
            category: Category::Bashkir,
            is_correct: true,
            reaction_time_ms: 512.5,
            timestamp_ms: 1,
        };
        let json = serde_json::to_value(&r).unwrap();
        assert_eq!(json["blockId"], 1);
        assert_eq!(json["stimulusId"], "bash_0");
        assert_eq!(json["category"], "BASHKIR");
        assert_eq!(json["isCorrect"], true);
        assert_eq!(json["reactionTimeMs"], 512.5);
    }
}
