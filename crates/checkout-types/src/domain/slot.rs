use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A fixed-duration interval on one service's calendar.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct Slot {
    pub service_id: Uuid,
    pub starts_at: DateTime<Utc>,
    pub duration_min: i64,
}

impl Slot {
    pub fn new(service_id: Uuid, starts_at: DateTime<Utc>, duration_min: i64) -> Self {
        Self {
            service_id,
            starts_at,
            duration_min,
        }
    }

    pub fn ends_at(&self) -> DateTime<Utc> {
        self.starts_at + Duration::minutes(self.duration_min)
    }

    /// Half-open interval overlap for the same service. Slots on different
    /// services never collide.
    pub fn collides_with(&self, other: &Slot) -> bool {
        self.service_id == other.service_id
            && self.starts_at < other.ends_at()
            && other.starts_at < self.ends_at()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, hour, min, 0).unwrap()
    }

    #[test]
    fn sixty_minute_slot_blocks_the_open_window_around_it() {
        let sid = Uuid::new_v4();
        let held = Slot::new(sid, at(10, 0), 60);

        // anything starting within (t-60, t+60) collides
        assert!(held.collides_with(&Slot::new(sid, at(9, 30), 60)));
        assert!(held.collides_with(&Slot::new(sid, at(10, 0), 60)));
        assert!(held.collides_with(&Slot::new(sid, at(10, 59), 60)));

        // boundaries are half-open
        assert!(!held.collides_with(&Slot::new(sid, at(9, 0), 60)));
        assert!(!held.collides_with(&Slot::new(sid, at(11, 0), 60)));
        // t + 120min is clear
        assert!(!held.collides_with(&Slot::new(sid, at(12, 0), 60)));
    }

    #[test]
    fn different_services_never_collide() {
        let held = Slot::new(Uuid::new_v4(), at(10, 0), 60);
        let other = Slot::new(Uuid::new_v4(), at(10, 0), 60);
        assert!(!held.collides_with(&other));
    }

    #[test]
    fn mixed_durations_overlap_correctly() {
        let sid = Uuid::new_v4();
        let long = Slot::new(sid, at(9, 0), 180);
        assert!(long.collides_with(&Slot::new(sid, at(11, 30), 30)));
        assert!(!long.collides_with(&Slot::new(sid, at(12, 0), 30)));
    }
}
