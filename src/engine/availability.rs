use chrono::{Days, FixedOffset, NaiveDate};

use crate::config::PlannerConfig;
use crate::limits::*;
use crate::model::*;

use super::{Engine, EngineError};

/// Days after `today` on which the doctor still has room, earliest first.
///
/// A day is open while fewer than `capacity_per_day` bookings (any status)
/// start on it. Scans `today + 1 ..= today + horizon_days` and stops once
/// `limit` days are found.
pub fn plan_open_dates(
    cal: Option<&DoctorCalendar>,
    today: NaiveDate,
    offset: &FixedOffset,
    planner: &PlannerConfig,
) -> Vec<NaiveDate> {
    let mut open = Vec::new();
    if planner.limit == 0 {
        return open;
    }
    for i in 1..=u64::from(planner.horizon_days) {
        let Some(date) = today.checked_add_days(Days::new(i)) else {
            break;
        };
        let busy = cal.map_or(0, |c| c.on_date(date, offset, None).count());
        if busy < planner.capacity_per_day {
            open.push(date);
            if open.len() >= planner.limit {
                break;
            }
        }
    }
    open
}

impl Engine {
    /// `plan_open_dates` with the configured planner defaults.
    pub async fn next_available_dates(
        &self,
        doctor_id: DoctorId,
        now: Ms,
    ) -> Result<Vec<NaiveDate>, EngineError> {
        let planner = self.config.planner;
        self.next_available_dates_with(doctor_id, now, &planner).await
    }

    pub async fn next_available_dates_with(
        &self,
        doctor_id: DoctorId,
        now: Ms,
        planner: &PlannerConfig,
    ) -> Result<Vec<NaiveDate>, EngineError> {
        if planner.horizon_days > MAX_HORIZON_DAYS {
            return Err(EngineError::LimitExceeded("planning horizon too long"));
        }
        let offset = self.config.utc_offset;
        let today = local_date(now, &offset);
        match self.store.calendar(&doctor_id) {
            Some(cal) => {
                let guard = cal.read().await;
                Ok(plan_open_dates(Some(&guard), today, &offset, planner))
            }
            None => Ok(plan_open_dates(None, today, &offset, planner)),
        }
    }
}
