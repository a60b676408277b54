//! Response evaluation: pure function of category-set membership.

use crate::types::{BlockConfig, Category, Side};

/// Result of comparing a pressed side with the stimulus's side.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Verdict {
    Correct,
    Incorrect,
}

/// Side a category sorts to in `block`. Left wins if a category were on both
/// sides, which block construction rules out.
pub fn correct_side(category: Category, block: &BlockConfig) -> Side {
    if block.left_categories.contains(category) {
        Side::Left
    } else {
        Side::Right
    }
}

pub fn evaluate(category: Category, block: &BlockConfig, pressed: Side) -> Verdict {
    if correct_side(category, block) == pressed {
        Verdict::Correct
    } else {
        Verdict::Incorrect
    }
}
