use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use crate::errors::AppError;
use checkout_types::domain::slot::Slot;
use checkout_types::ports::catalog::CatalogPort;
use checkout_types::ports::slot_repository::{ReserveOutcome, SlotRepository};

pub const SLOT_TAKEN: &str = "SLOT_TAKEN";

/// Daily window inside which service slots are offered, in UTC hours.
#[derive(Debug, Clone, Copy)]
pub struct BusinessHours {
    pub open_hour: u32,
    pub close_hour: u32,
}

impl Default for BusinessHours {
    fn default() -> Self {
        Self {
            open_hour: 8,
            close_hour: 18,
        }
    }
}

/// Lists open slots (advisory) and reserves them (authoritative). The
/// availability listing never guards the reservation: `reserve` re-checks
/// collision under the repository's atomic check-and-insert, so two clients
/// racing for one displayed slot cannot both win.
#[derive(Clone)]
pub struct SlotAllocator {
    slots: Arc<dyn SlotRepository>,
    catalog: Arc<dyn CatalogPort>,
    hours: BusinessHours,
}

impl SlotAllocator {
    pub fn new(
        slots: Arc<dyn SlotRepository>,
        catalog: Arc<dyn CatalogPort>,
        hours: BusinessHours,
    ) -> Self {
        Self {
            slots,
            catalog,
            hours,
        }
    }

    async fn service_duration(&self, service_id: Uuid) -> Result<i64, AppError> {
        let svc = self
            .catalog
            .service(service_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("service {service_id}")))?;
        Ok(svc.duration_min)
    }

    /// Open slots for the service between `from` and `to`, on a grid of the
    /// service's duration inside business hours, ordered by start time.
    pub async fn available_slots(
        &self,
        service_id: Uuid,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, AppError> {
        if to <= from {
            return Err(AppError::BadRequest("empty date range".into()));
        }
        let duration = self.service_duration(service_id).await?;
        let taken = self
            .slots
            .active_reservations(service_id, from, to)
            .await?;

        let mut open = Vec::new();
        let mut day = from.date_naive();
        let last_day = to.date_naive();
        while day <= last_day {
            let mut start = day
                .and_hms_opt(self.hours.open_hour, 0, 0)
                .map(|dt| dt.and_utc())
                .ok_or_else(|| AppError::BadRequest("invalid business hours".into()))?;
            let close = day
                .and_hms_opt(self.hours.close_hour, 0, 0)
                .map(|dt| dt.and_utc())
                .ok_or_else(|| AppError::BadRequest("invalid business hours".into()))?;
            while start + Duration::minutes(duration) <= close {
                let candidate = Slot::new(service_id, start, duration);
                let in_range = start >= from && candidate.ends_at() <= to;
                if in_range && !taken.iter().any(|t| t.collides_with(&candidate)) {
                    open.push(start);
                }
                start += Duration::minutes(duration);
            }
            match day.succ_opt() {
                Some(next) => day = next,
                None => break,
            }
        }
        Ok(open)
    }

    /// Authoritative reservation. Returns the reserved slot or
    /// `Conflict(SLOT_TAKEN)` when an active booking overlaps.
    pub async fn reserve(
        &self,
        service_id: Uuid,
        starts_at: DateTime<Utc>,
        order_id: Uuid,
    ) -> Result<Slot, AppError> {
        let duration = self.service_duration(service_id).await?;
        let slot = Slot::new(service_id, starts_at, duration);

        // the whole interval must sit inside the start day's window, so a
        // late start whose end wraps past midnight cannot slip through
        let day = starts_at.date_naive();
        let window = day
            .and_hms_opt(self.hours.open_hour, 0, 0)
            .zip(day.and_hms_opt(self.hours.close_hour, 0, 0))
            .map(|(open, close)| (open.and_utc(), close.and_utc()));
        let Some((open, close)) = window else {
            return Err(AppError::BadRequest("invalid business hours".into()));
        };
        if starts_at < open || slot.ends_at() > close {
            return Err(AppError::BadRequest(
                "booking outside business hours".into(),
            ));
        }

        match self.slots.reserve(slot, order_id).await? {
            ReserveOutcome::Reserved => Ok(slot),
            ReserveOutcome::Taken => Err(AppError::Conflict(SLOT_TAKEN.into())),
        }
    }

    /// Frees every reservation held by the order. Safe to call repeatedly.
    pub async fn release_for_order(&self, order_id: Uuid) -> Result<u32, AppError> {
        Ok(self.slots.release_for_order(order_id).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use checkout_repo::catalog::InMemoryCatalog;
    use checkout_repo::memory::InMemoryRepo;
    use checkout_types::ports::catalog::ServiceInfo;
    use chrono::TimeZone;

    fn fixture(duration_min: i64) -> (SlotAllocator, Uuid, Arc<InMemoryRepo>) {
        let repo = Arc::new(InMemoryRepo::new());
        let catalog = Arc::new(InMemoryCatalog::new());
        let service_id = Uuid::new_v4();
        catalog.seed_service(ServiceInfo {
            id: service_id,
            name: "Grooming".into(),
            price: 150_000,
            duration_min,
        });
        let alloc = SlotAllocator::new(repo.clone(), catalog, BusinessHours::default());
        (alloc, service_id, repo)
    }

    fn at(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, hour, min, 0).unwrap()
    }

    #[tokio::test]
    async fn grid_fills_business_hours_when_calendar_is_empty() {
        let (alloc, sid, _repo) = fixture(60);
        let open = alloc.available_slots(sid, at(0, 0), at(23, 0)).await.unwrap();
        // 08:00 .. 17:00 inclusive starts for 60-minute slots
        assert_eq!(open.len(), 10);
        assert_eq!(open.first().copied(), Some(at(8, 0)));
        assert_eq!(open.last().copied(), Some(at(17, 0)));
        assert!(open.windows(2).all(|w| w[0] < w[1]));
    }

    #[tokio::test]
    async fn reserved_slot_disappears_from_the_listing() {
        let (alloc, sid, _repo) = fixture(60);
        alloc.reserve(sid, at(10, 0), Uuid::new_v4()).await.unwrap();
        let open = alloc.available_slots(sid, at(0, 0), at(23, 0)).await.unwrap();
        assert!(!open.contains(&at(10, 0)));
        assert!(open.contains(&at(9, 0)));
        assert!(open.contains(&at(11, 0)));
    }

    #[tokio::test]
    async fn sixty_minute_booking_blocks_the_overlap_window() {
        let (alloc, sid, _repo) = fixture(60);
        alloc.reserve(sid, at(10, 0), Uuid::new_v4()).await.unwrap();

        // start within (t-60, t+60) is rejected
        let clash = alloc.reserve(sid, at(9, 30), Uuid::new_v4()).await;
        assert!(matches!(clash, Err(AppError::Conflict(m)) if m == SLOT_TAKEN));
        let clash = alloc.reserve(sid, at(10, 30), Uuid::new_v4()).await;
        assert!(matches!(clash, Err(AppError::Conflict(_))));

        // t + 120min succeeds
        alloc.reserve(sid, at(12, 0), Uuid::new_v4()).await.unwrap();
    }

    #[tokio::test]
    async fn released_booking_frees_its_slot() {
        let (alloc, sid, _repo) = fixture(60);
        let order = Uuid::new_v4();
        alloc.reserve(sid, at(10, 0), order).await.unwrap();
        assert_eq!(alloc.release_for_order(order).await.unwrap(), 1);
        // releasing again is a no-op
        assert_eq!(alloc.release_for_order(order).await.unwrap(), 0);
        alloc.reserve(sid, at(10, 0), Uuid::new_v4()).await.unwrap();
    }

    #[tokio::test]
    async fn out_of_hours_and_unknown_service_are_rejected() {
        let (alloc, sid, _repo) = fixture(60);
        let early = alloc.reserve(sid, at(6, 0), Uuid::new_v4()).await;
        assert!(matches!(early, Err(AppError::BadRequest(_))));
        let late = alloc.reserve(sid, at(17, 30), Uuid::new_v4()).await;
        assert!(matches!(late, Err(AppError::BadRequest(_))));

        let unknown = alloc.reserve(Uuid::new_v4(), at(10, 0), Uuid::new_v4()).await;
        assert!(matches!(unknown, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn booking_wrapping_past_midnight_is_rejected() {
        let (alloc, sid, _repo) = fixture(60);
        // ends 00:30 the next day; the wrapped end time must not read as
        // "before closing"
        let late = alloc.reserve(sid, at(23, 30), Uuid::new_v4()).await;
        assert!(matches!(late, Err(AppError::BadRequest(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reservations_have_exactly_one_winner() {
        let (alloc, sid, _repo) = fixture(60);
        let mut handles = Vec::new();
        for i in 0..8u32 {
            let alloc = alloc.clone();
            // overlapping starts straddling the same hour
            let start = if i % 2 == 0 { at(10, 0) } else { at(10, 30) };
            handles.push(tokio::spawn(async move {
                alloc.reserve(sid, start, Uuid::new_v4()).await.is_ok()
            }));
        }
        let mut wins = 0;
        for h in handles {
            if h.await.unwrap() {
                wins += 1;
            }
        }
        assert_eq!(wins, 1);
    }
}
