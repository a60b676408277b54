//! Session bootstrap: participant id, referrer and counterbalancing group.
//!
//! A participant arriving from the first test phase carries their id in the
//! `originalUserId` (preferred) or `pid` query parameter; otherwise a fresh
//! random v4 UUID is generated. The group is a fair coin flip from the
//! injected RNG.

use rand::Rng;
use serde::Deserialize;
use tracing::info;

use crate::clock::Clock;
use crate::constants::DIRECT_REFERRER;
use crate::types::{Group, Session};

/// Inbound identifiers, as taken from the page URL and navigation context.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BootstrapParams {
    pub original_user_id: Option<String>,
    pub pid: Option<String>,
    pub referrer: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Random RFC 4122 version-4 UUID: `xxxxxxxx-xxxx-4xxx-yxxx-xxxxxxxxxxxx`
/// with `y` one of `8 9 a b`.
pub fn generate_uuid<R: Rng>(rng: &mut R) -> String {
    let mut bytes = [0u8; 16];
    rng.fill(&mut bytes);
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

pub fn assign_group<R: Rng>(rng: &mut R) -> Group {
    if rng.random_bool(0.5) {
        Group::A
    } else {
        Group::B
    }
}

/// Create the session for one participant.
pub fn bootstrap<R: Rng, C: Clock>(params: &BootstrapParams, rng: &mut R, clock: &C) -> Session {
    let user_id = non_empty(&params.original_user_id)
        .or_else(|| non_empty(&params.pid))
        .map(str::to_string)
        .unwrap_or_else(|| generate_uuid(rng));
    let referrer = non_empty(&params.referrer)
        .unwrap_or(DIRECT_REFERRER)
        .to_string();
    let group = assign_group(rng);

    info!(user_id = %user_id, group = group.as_str(), referrer = %referrer, "user initialized");
    Session {
        user_id,
        referrer,
        start_time_ms: clock.wall_ms(),
        group,
    }
}
