//! Fixed experiment constants: stimulus word lists, block trial counts,
//! input timing and default locations.
//!
//! The block structure is the standard 7-block IAT protocol. Trial counts are
//! indexed by block position (block id − 1):
//!
//! | Block | Kind | Trials |
//! |-------|------|--------|
//! | 1 | Word training | 20 |
//! | 2 | Image training | 20 |
//! | 3 | Combined practice | 20 |
//! | 4 | Combined test | 40 |
//! | 5 | Side-swap words | 40 |
//! | 6 | Reversed combined practice | 20 |
//! | 7 | Reversed combined test | 40 |

/// Number of blocks in one IAT run.
pub const BLOCK_COUNT: usize = 7;

/// Trials per block, in block order.
pub const BLOCK_TRIALS: [usize; BLOCK_COUNT] = [20, 20, 20, 40, 40, 20, 40];

/// Total trials over a full run (sum of [`BLOCK_TRIALS`]).
pub const TOTAL_TRIALS: usize = 200;

/// Inputs arriving closer together than this are dropped as double-fires.
pub const DEBOUNCE_MS: f64 = 150.0;

/// Key bound to the left response side.
pub const LEFT_KEY: char = 'E';

/// Key bound to the right response side.
pub const RIGHT_KEY: char = 'I';

/// Words for the BASHKIR concept category.
pub const BASHKIR_WORDS: [&str; 9] = [
    "Юрта",
    "Сабантуй",
    "Тюбетейка",
    "Агидель",
    "Урал-Батыр",
    "Бешмет",
    "Кумыс",
    "Курай",
    "Бешбармак",
];

/// Words for the RUSSIAN concept category.
pub const RUSSIAN_WORDS: [&str; 9] = [
    "Шапка-ушанка",
    "Квас",
    "Пельмени",
    "Балалайка",
    "Изба",
    "Илья Муромец",
    "Волга",
    "Масленица",
    "Кокошник",
];

/// Filename prefix of MOUNTAIN images (`mountain_<n>.jpg`).
pub const MOUNTAIN_IMAGE_PREFIX: &str = "mountain_";

/// Filename prefix of SWAMP images (`swamp_<n>.jpg`).
pub const SWAMP_IMAGE_PREFIX: &str = "swamp_";

/// Image file extension accepted by the pool scan.
pub const IMAGE_EXTENSION: &str = "jpg";

/// URL prefix under which image stimuli are served.
pub const IMAGE_URL_PREFIX: &str = "/images";

/// Number of example images per category shown on the intro screen.
pub const CATALOGUE_IMAGES_PER_CATEGORY: usize = 4;

/// Seconds without a request after which a server session is dropped.
pub const SESSION_IDLE_TTL_SECS: u64 = 2 * 60 * 60;

/// Seconds a session is kept after its results were saved.
pub const FINISHED_SESSION_TTL_SECS: u64 = 10 * 60;

/// Referrer recorded when the navigation context carries none.
pub const DIRECT_REFERRER: &str = "direct";

/// Supabase URL left in place by an unconfigured deployment.
pub const PLACEHOLDER_SUPABASE_URL: &str = "https://your-project-id.supabase.co";

/// Default table receiving the results of this test phase.
pub const DEFAULT_RESULTS_TABLE: &str = "iat_results";

/// Survey-panel page the participant returns to; `{user_id}` is substituted.
pub const DEFAULT_COMPLETION_URL: &str = "https://panel.anketolog.ru/s/exf?s=0&ui={user_id}";
