//! Block plan generation: counterbalancing group → the 7 block configurations.
//!
//! The plan is a pure function of the group. Blocks 1, 2 and 5 are identical
//! for both groups; the combined blocks (3, 4, 6, 7) swap the two attribute
//! categories between groups:
//!
//! | Block | Group A left / right | Group B left / right |
//! |-------|----------------------|----------------------|
//! | 1 | BASHKIR / RUSSIAN | same |
//! | 2 | MOUNTAIN / SWAMP | same |
//! | 3, 4 | BASHKIR+MOUNTAIN / RUSSIAN+SWAMP | BASHKIR+SWAMP / RUSSIAN+MOUNTAIN |
//! | 5 | RUSSIAN / BASHKIR | same |
//! | 6, 7 | RUSSIAN+MOUNTAIN / BASHKIR+SWAMP | RUSSIAN+SWAMP / BASHKIR+MOUNTAIN |
//!
//! In blocks 6 and 7 the attribute sides stay where blocks 3 and 4 put them
//! while the concepts change sides, so each concept meets the other attribute.

use thiserror::Error;

use crate::constants::{BLOCK_COUNT, BLOCK_TRIALS};
use crate::labels::{combined_instruction, training_instruction, TrainingLead, FASTER_PREFIX};
use crate::stimulus_pool::StimulusPool;
use crate::types::{BlockConfig, Category, CategorySet, Group};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("block {block_id}: category {category:?} is mapped to both sides")]
    OverlappingSides { block_id: u8, category: Category },
    #[error("block {block_id}: a response side has no categories")]
    EmptySide { block_id: u8 },
    #[error("block {block_id}: trial count must be positive")]
    NoTrials { block_id: u8 },
    #[error("block {block_id}: no stimuli for category {category:?}")]
    MissingStimuli { block_id: u8, category: Category },
}

const BLOCK_TITLES: [&str; BLOCK_COUNT] = [
    "Блок 1 из 7: Тренировка слов",
    "Блок 2 из 7: Тренировка изображений",
    "Блок 3 из 7: Совмещение (Тренировка)",
    "Блок 4 из 7: Совмещение (Тест)",
    "Блок 5 из 7: Смена сторон (Слова)",
    "Блок 6 из 7: Обратное совмещение (Тренировка)",
    "Блок 7 из 7: Обратное совмещение (Тест)",
];

impl BlockConfig {
    /// Construct a block, rejecting overlapping or empty sides.
    pub fn new(
        id: u8,
        title: impl Into<String>,
        instruction: impl Into<String>,
        left_categories: CategorySet,
        right_categories: CategorySet,
        trials: usize,
    ) -> Result<Self, PlanError> {
        if let Some(category) = left_categories.intersection(right_categories).iter().next() {
            return Err(PlanError::OverlappingSides {
                block_id: id,
                category,
            });
        }
        if left_categories.is_empty() || right_categories.is_empty() {
            return Err(PlanError::EmptySide { block_id: id });
        }
        if trials == 0 {
            return Err(PlanError::NoTrials { block_id: id });
        }
        Ok(Self {
            id,
            title: title.into(),
            instruction: instruction.into(),
            left_categories,
            right_categories,
            trials,
        })
    }
}

/// Attribute sharing a side with `concept` in the first combined blocks (3, 4).
fn first_pairing(group: Group, concept: Category) -> Category {
    match (group, concept) {
        (Group::A, Category::Bashkir) | (Group::B, Category::Russian) => Category::Mountain,
        _ => Category::Swamp,
    }
}

/// Generate the 7 blocks for `group`. Deterministic; no randomness.
pub fn generate_blocks(group: Group) -> Result<Vec<BlockConfig>, PlanError> {
    use Category::*;

    let combined1_left = CategorySet::of(&[Bashkir, first_pairing(group, Bashkir)]);
    let combined1_right = CategorySet::of(&[Russian, first_pairing(group, Russian)]);
    let combined1_instruction = combined_instruction(combined1_left, combined1_right);

    // Concepts change sides; each attribute keeps its side.
    let combined2_left = CategorySet::of(&[Russian, first_pairing(group, Bashkir)]);
    let combined2_right = CategorySet::of(&[Bashkir, first_pairing(group, Russian)]);
    let combined2_instruction = combined_instruction(combined2_left, combined2_right);

    let specs: [(String, CategorySet, CategorySet); BLOCK_COUNT] = [
        (
            training_instruction(TrainingLead::Words, Bashkir, Russian),
            CategorySet::of(&[Bashkir]),
            CategorySet::of(&[Russian]),
        ),
        (
            training_instruction(TrainingLead::Images, Mountain, Swamp),
            CategorySet::of(&[Mountain]),
            CategorySet::of(&[Swamp]),
        ),
        (combined1_instruction.clone(), combined1_left, combined1_right),
        (
            format!("{}{}", FASTER_PREFIX, combined1_instruction),
            combined1_left,
            combined1_right,
        ),
        (
            training_instruction(TrainingLead::SidesSwapped, Russian, Bashkir),
            CategorySet::of(&[Russian]),
            CategorySet::of(&[Bashkir]),
        ),
        (combined2_instruction.clone(), combined2_left, combined2_right),
        (
            format!("{}{}", FASTER_PREFIX, combined2_instruction),
            combined2_left,
            combined2_right,
        ),
    ];

    specs
        .into_iter()
        .enumerate()
        .map(|(i, (instruction, left, right))| {
            BlockConfig::new(
                (i + 1) as u8,
                BLOCK_TITLES[i],
                instruction,
                left,
                right,
                BLOCK_TRIALS[i],
            )
        })
        .collect()
}

/// Check that every category a block sorts has at least one stimulus.
pub fn validate_against_pool(blocks: &[BlockConfig], pool: &StimulusPool) -> Result<(), PlanError> {
    for block in blocks {
        for category in block.active_categories().iter() {
            if pool.count(category) == 0 {
                return Err(PlanError::MissingStimuli {
                    block_id: block.id,
                    category,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Category::*;

    #[test]
    fn test_trial_counts_and_ids() {
        for group in [Group::A, Group::B] {
            let blocks = generate_blocks(group).unwrap();
            assert_eq!(blocks.len(), 7);
            let counts: Vec<usize> = blocks.iter().map(|b| b.trials).collect();
            assert_eq!(counts, vec![20, 20, 20, 40, 40, 20, 40]);
            let ids: Vec<u8> = blocks.iter().map(|b| b.id).collect();
            assert_eq!(ids, vec![1, 2, 3, 4, 5, 6, 7]);
        }
    }

    #[test]
    fn test_group_a_pairings() {
        let b = generate_blocks(Group::A).unwrap();
        assert_eq!(b[2].left_categories, CategorySet::of(&[Bashkir, Mountain]));
        assert_eq!(b[2].right_categories, CategorySet::of(&[Russian, Swamp]));
        assert_eq!(b[5].left_categories, CategorySet::of(&[Russian, Mountain]));
        assert_eq!(b[5].right_categories, CategorySet::of(&[Bashkir, Swamp]));
        assert_eq!(b[4].left_categories, CategorySet::of(&[Russian]));
        assert_eq!(b[4].right_categories, CategorySet::of(&[Bashkir]));
    }

    #[test]
    fn test_group_b_swaps_attributes_only() {
        let a = generate_blocks(Group::A).unwrap();
        let b = generate_blocks(Group::B).unwrap();
        assert_eq!(b[2].left_categories, CategorySet::of(&[Bashkir, Swamp]));
        assert_eq!(b[2].right_categories, CategorySet::of(&[Russian, Mountain]));
        assert_eq!(b[5].left_categories, CategorySet::of(&[Russian, Swamp]));
        assert_eq!(b[5].right_categories, CategorySet::of(&[Bashkir, Mountain]));
        for i in [0, 1, 4] {
            assert_eq!(a[i], b[i], "block {} must not depend on group", i + 1);
        }
        assert_ne!(a[2].left_categories, b[2].left_categories);
    }

    #[test]
    fn test_test_blocks_repeat_practice_pairing() {
        for group in [Group::A, Group::B] {
            let b = generate_blocks(group).unwrap();
            assert_eq!(b[3].left_categories, b[2].left_categories);
            assert_eq!(b[3].right_categories, b[2].right_categories);
            assert_eq!(b[6].left_categories, b[5].left_categories);
            assert!(b[3].instruction.starts_with(FASTER_PREFIX));
            assert!(b[6].instruction.ends_with(&b[5].instruction));
        }
    }

    #[test]
    fn test_original_instruction_text() {
        let b = generate_blocks(Group::B).unwrap();
        assert_eq!(
            b[5].instruction,
            "Нажимайте 'E' для РУССКИЕ или БОЛОТА.\nНажимайте 'I' для БАШКИРЫ или ГОРЫ."
        );
        assert_eq!(
            b[0].instruction,
            "Запомните слова для каждой категории.\nНажимайте 'E' (слева) для БАШКИРСКИХ слов.\nНажимайте 'I' (справа) для РУССКИХ слов."
        );
    }

    #[test]
    fn test_overlap_rejected() {
        let err = BlockConfig::new(
            9,
            "x",
            "x",
            CategorySet::of(&[Bashkir, Mountain]),
            CategorySet::of(&[Mountain]),
            10,
        )
        .unwrap_err();
        assert_eq!(
            err,
            PlanError::OverlappingSides {
                block_id: 9,
                category: Mountain
            }
        );
    }

    #[test]
    fn test_pool_without_images_fails_validation() {
        let pool = StimulusPool::from_sources(&[], &[]).unwrap();
        let blocks = generate_blocks(Group::A).unwrap();
        let err = validate_against_pool(&blocks, &pool).unwrap_err();
        assert_eq!(
            err,
            PlanError::MissingStimuli {
                block_id: 2,
                category: Mountain
            }
        );
    }
}
