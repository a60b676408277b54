//! Static registry of every stimulus, tagged by category.
//!
//! Words come from the two fixed lists in [`crate::constants`]; images come
//! from a directory scan of `mountain_<n>.jpg` and `swamp_<n>.jpg`, ordered by
//! the embedded number. Pool order is: Bashkir words, Russian words, mountain
//! images, swamp images. Ids are `bash_i`, `rus_i`, `mountain_i`, `swamp_i`
//! with `i` the position inside its category.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use crate::constants::*;
use crate::types::{Category, CategorySet, Stimulus, StimulusType};

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("duplicate stimulus id `{0}`")]
    DuplicateId(String),
    #[error("cannot read image directory {path}: {source}")]
    ImageDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Immutable stimulus registry, built once at startup.
#[derive(Clone, Debug)]
pub struct StimulusPool {
    stimuli: Vec<Stimulus>,
}

impl StimulusPool {
    /// Build from an explicit stimulus list. Fails on a repeated id.
    pub fn from_stimuli(stimuli: Vec<Stimulus>) -> Result<Self, PoolError> {
        let mut seen = HashSet::with_capacity(stimuli.len());
        for s in &stimuli {
            if !seen.insert(s.id.as_str()) {
                return Err(PoolError::DuplicateId(s.id.clone()));
            }
        }
        Ok(Self { stimuli })
    }

    /// Build from the fixed word lists plus already-ordered image URLs.
    pub fn from_sources(mountain_urls: &[String], swamp_urls: &[String]) -> Result<Self, PoolError> {
        let mut stimuli = Vec::with_capacity(
            BASHKIR_WORDS.len() + RUSSIAN_WORDS.len() + mountain_urls.len() + swamp_urls.len(),
        );
        push_words(&mut stimuli, "bash", &BASHKIR_WORDS, Category::Bashkir);
        push_words(&mut stimuli, "rus", &RUSSIAN_WORDS, Category::Russian);
        push_images(&mut stimuli, "mountain", mountain_urls, Category::Mountain);
        push_images(&mut stimuli, "swamp", swamp_urls, Category::Swamp);
        Self::from_stimuli(stimuli)
    }

    /// Scan `image_dir` for category images and build the full pool.
    ///
    /// A missing directory or a category with no images is logged, not fatal:
    /// whether the pool suffices is decided against the block plan.
    pub fn load(image_dir: &Path) -> Result<Self, PoolError> {
        let mountain = image_urls(image_dir, MOUNTAIN_IMAGE_PREFIX)?;
        let swamp = image_urls(image_dir, SWAMP_IMAGE_PREFIX)?;
        if mountain.is_empty() {
            warn!(dir = %image_dir.display(), "no mountain images found (expected mountain_<n>.jpg)");
        }
        if swamp.is_empty() {
            warn!(dir = %image_dir.display(), "no swamp images found (expected swamp_<n>.jpg)");
        }
        let pool = Self::from_sources(&mountain, &swamp)?;
        info!(
            stimuli = pool.len(),
            mountain = mountain.len(),
            swamp = swamp.len(),
            "stimulus pool loaded"
        );
        Ok(pool)
    }

    pub fn stimuli(&self) -> &[Stimulus] {
        &self.stimuli
    }

    pub fn len(&self) -> usize {
        self.stimuli.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stimuli.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Stimulus> {
        self.stimuli.get(index)
    }

    pub fn find(&self, id: &str) -> Option<&Stimulus> {
        self.stimuli.iter().find(|s| s.id == id)
    }

    pub fn by_category(&self, category: Category) -> impl Iterator<Item = &Stimulus> {
        self.stimuli.iter().filter(move |s| s.category == category)
    }

    pub fn count(&self, category: Category) -> usize {
        self.by_category(category).count()
    }

    /// Pool indices of every stimulus whose category is in `categories`,
    /// in pool order.
    pub fn candidates(&self, categories: CategorySet) -> Vec<usize> {
        self.stimuli
            .iter()
            .enumerate()
            .filter(|(_, s)| categories.contains(s.category))
            .map(|(i, _)| i)
            .collect()
    }
}

fn push_words(out: &mut Vec<Stimulus>, prefix: &str, words: &[&str], category: Category) {
    for (i, w) in words.iter().enumerate() {
        out.push(Stimulus {
            id: format!("{}_{}", prefix, i),
            content: (*w).to_string(),
            kind: StimulusType::Word,
            category,
        });
    }
}

fn push_images(out: &mut Vec<Stimulus>, prefix: &str, urls: &[String], category: Category) {
    for (i, url) in urls.iter().enumerate() {
        out.push(Stimulus {
            id: format!("{}_{}", prefix, i),
            content: url.clone(),
            kind: StimulusType::Image,
            category,
        });
    }
}

/// Number embedded as `_<n>.` in a filename; names without one sort as 0.
pub fn numeric_suffix(name: &str) -> u64 {
    let Some(dot) = name.rfind('.') else {
        return 0;
    };
    let stem = &name[..dot];
    let Some(underscore) = stem.rfind('_') else {
        return 0;
    };
    let digits = &stem[underscore + 1..];
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return 0;
    }
    digits.parse().unwrap_or(0)
}

/// Filenames in `dir` matching `<prefix>*.jpg`, sorted by numeric suffix.
pub fn sorted_image_files(dir: &Path, prefix: &str) -> Result<Vec<String>, PoolError> {
    let read_dir = match std::fs::read_dir(dir) {
        Ok(rd) => rd,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(PoolError::ImageDir {
                path: dir.to_path_buf(),
                source,
            })
        }
    };

    let suffix = format!(".{}", IMAGE_EXTENSION);
    let mut names: Vec<String> = read_dir
        .flatten()
        .map(|entry| entry.file_name().to_string_lossy().to_string())
        .filter(|name| name.starts_with(prefix) && name.ends_with(&suffix))
        .collect();
    // Ties break by name.
    names.sort_by(|a, b| numeric_suffix(a).cmp(&numeric_suffix(b)).then_with(|| a.cmp(b)));
    Ok(names)
}

fn image_urls(dir: &Path, prefix: &str) -> Result<Vec<String>, PoolError> {
    Ok(sorted_image_files(dir, prefix)?
        .into_iter()
        .map(|name| format!("{}/{}", IMAGE_URL_PREFIX, name))
        .collect())
}
