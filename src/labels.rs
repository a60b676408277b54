//! Display labels for categories and the instruction text built from them.
//!
//! Every category has an entry in each table; the `match` arms are exhaustive
//! so a new category cannot be added without its labels.

use crate::constants::{LEFT_KEY, RIGHT_KEY};
use crate::types::{Category, CategorySet};

/// Display strings for one category.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CategoryLabels {
    /// Title-case heading ("Башкиры").
    pub heading: &'static str,
    /// Upper-case name used in combined-block instructions ("БАШКИРЫ").
    pub combined: &'static str,
    /// Genitive form used in training-block instructions ("БАШКИРСКИХ слов").
    pub training: &'static str,
}

pub fn labels(category: Category) -> CategoryLabels {
    match category {
        Category::Bashkir => CategoryLabels {
            heading: "Башкиры",
            combined: "БАШКИРЫ",
            training: "БАШКИРСКИХ слов",
        },
        Category::Russian => CategoryLabels {
            heading: "Русские",
            combined: "РУССКИЕ",
            training: "РУССКИХ слов",
        },
        Category::Mountain => CategoryLabels {
            heading: "Горы",
            combined: "ГОРЫ",
            training: "ГОР",
        },
        Category::Swamp => CategoryLabels {
            heading: "Болота",
            combined: "БОЛОТА",
            training: "БОЛОТ",
        },
    }
}

/// Prefix of the test-block instructions (blocks 4 and 7).
pub const FASTER_PREFIX: &str = "То же самое задание, но быстрее.\n";

/// Lead line of the training and side-swap blocks.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TrainingLead {
    Words,
    Images,
    SidesSwapped,
}

impl TrainingLead {
    fn text(self) -> &'static str {
        match self {
            TrainingLead::Words => "Запомните слова для каждой категории.",
            TrainingLead::Images => "Запомните изображения для каждой категории.",
            TrainingLead::SidesSwapped => "ВНИМАНИЕ: Стороны для слов поменялись!",
        }
    }
}

/// Instruction for a single-category-per-side block.
pub fn training_instruction(lead: TrainingLead, left: Category, right: Category) -> String {
    format!(
        "{}\nНажимайте '{}' (слева) для {}.\nНажимайте '{}' (справа) для {}.",
        lead.text(),
        LEFT_KEY,
        labels(left).training,
        RIGHT_KEY,
        labels(right).training,
    )
}

/// Instruction for a combined block ("... для БАШКИРЫ или ГОРЫ.").
pub fn combined_instruction(left: CategorySet, right: CategorySet) -> String {
    format!(
        "Нажимайте '{}' для {}.\nНажимайте '{}' для {}.",
        LEFT_KEY,
        join_combined(left),
        RIGHT_KEY,
        join_combined(right),
    )
}

fn join_combined(set: CategorySet) -> String {
    set.iter()
        .map(|c| labels(c).combined)
        .collect::<Vec<_>>()
        .join(" или ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_category_has_labels() {
        for c in Category::ALL {
            let l = labels(c);
            assert!(!l.heading.is_empty());
            assert!(!l.combined.is_empty());
            assert!(!l.training.is_empty());
        }
    }

    #[test]
    fn combined_text() {
        let left = CategorySet::of(&[Category::Bashkir, Category::Mountain]);
        let right = CategorySet::of(&[Category::Russian, Category::Swamp]);
        assert_eq!(
            combined_instruction(left, right),
            "Нажимайте 'E' для БАШКИРЫ или ГОРЫ.\nНажимайте 'I' для РУССКИЕ или БОЛОТА."
        );
    }

    #[test]
    fn training_text() {
        assert_eq!(
            training_instruction(TrainingLead::Images, Category::Mountain, Category::Swamp),
            "Запомните изображения для каждой категории.\nНажимайте 'E' (слева) для ГОР.\nНажимайте 'I' (справа) для БОЛОТ."
        );
    }
}
