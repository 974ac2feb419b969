use std::time::Duration;
use std::time::Instant;

use super::PlateText;

pub const DEBOUNCE_TIME: Duration = Duration::from_secs(3);

/// Suppresses repeats of the last reported plate inside a time window.
///
/// Check and update happen in one `&mut self` call, so a caller can never
/// observe a "yes" without the state having moved along with it.
#[derive(Debug)]
pub struct DebounceGate {
    window: Duration,
    last_plate: String,
    last_sent: Option<Instant>,
}

impl Default for DebounceGate {
    fn default() -> Self {
        Self::new(DEBOUNCE_TIME)
    }
}

impl DebounceGate {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            last_plate: String::new(),
            last_sent: None,
        }
    }

    pub fn should_publish(&mut self, candidate: &PlateText, now: Instant) -> bool {
        let expired = match self.last_sent {
            Some(sent) => now.saturating_duration_since(sent) > self.window,
            None => true,
        };

        if candidate.as_str() != self.last_plate || expired {
            self.last_plate.clear();
            self.last_plate.push_str(candidate.as_str());
            self.last_sent = Some(now);
            return true;
        }
        false
    }

    pub fn last_plate(&self) -> &str {
        &self.last_plate
    }
}
