//! Wall-clock helpers
//!
//! Capability and credential expiry is a logical comparison against unix
//! seconds; verification paths accept an explicit `now` so tests can pin
//! the clock.

use std::time::{SystemTime, UNIX_EPOCH};

/// Current unix time in seconds.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unix_now_is_past_2020() {
        assert!(unix_now() > 1_577_836_800);
    }
}
