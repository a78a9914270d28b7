use std::sync::Arc;

use chrono::{DateTime, Duration, FixedOffset, LocalResult, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use tracing::{info, warn};

use mediawatch_sites::SiteSpec;

use crate::jobs::DiscoverJob;
use crate::queue::JobQueueSet;

/// Emits the discover jobs that keep the collection complete.
///
/// On startup and then at every full hour, every (site, instant) of the
/// configured window is re-emitted; the discover stage's existence check
/// makes the replay idempotent.
pub struct Watchdog {
    queues: Arc<JobQueueSet>,
    sites: Vec<SiteSpec>,
    days_in_past: u32,
    hours: Vec<u32>,
}

impl Watchdog {
    pub fn new(
        queues: Arc<JobQueueSet>,
        sites: Vec<SiteSpec>,
        days_in_past: u32,
        hours: Vec<u32>,
    ) -> Self {
        Self {
            queues,
            sites,
            days_in_past,
            hours,
        }
    }

    pub async fn run(self) {
        loop {
            let now = Utc::now();
            let mut emitted = 0usize;
            for site in &self.sites {
                for instant in capture_instants(site.tz, self.days_in_past, &self.hours, now) {
                    self.queues
                        .discover
                        .put(DiscoverJob::new(site.clone(), instant));
                    emitted += 1;
                }
            }
            info!(jobs = emitted, sites = self.sites.len(), "Watchdog emitted discover jobs");

            sleep_until_next_full_hour(Utc::now()).await;
        }
    }
}

/// All capture instants for one site: each configured hour of today and
/// of the `days` previous days, in the site's own time zone, keeping
/// only instants in the past.
pub fn capture_instants(
    tz: Tz,
    days: u32,
    hours: &[u32],
    now: DateTime<Utc>,
) -> Vec<DateTime<FixedOffset>> {
    let today = now.with_timezone(&tz).date_naive();

    let mut instants = Vec::new();
    for day_offset in 0..=days {
        let date = today - Duration::days(day_offset as i64);
        for &hour in hours {
            let Some(naive) = date.and_hms_opt(hour, 0, 0) else {
                warn!(hour, "Ignoring invalid capture hour");
                continue;
            };
            let local = match tz.from_local_datetime(&naive) {
                LocalResult::Single(dt) => dt,
                // Autumn DST fold: prefer the first occurrence.
                LocalResult::Ambiguous(first, _) => first,
                // Spring-forward gap: that wall-clock time never existed.
                LocalResult::None => continue,
            };
            if local.with_timezone(&Utc) < now {
                instants.push(local.fixed_offset());
            }
        }
    }
    instants
}

async fn sleep_until_next_full_hour(now: DateTime<Utc>) {
    let this_hour = now
        .with_minute(0)
        .and_then(|dt| dt.with_second(0))
        .and_then(|dt| dt.with_nanosecond(0))
        .unwrap_or(now);
    let next_hour = this_hour + Duration::hours(1);

    let wait = (next_hour - now).to_std().unwrap_or_default();
    tokio::time::sleep(wait).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    /// 2024-05-22 09:30 in Paris (CEST, UTC+2) as a UTC instant.
    fn paris_0930() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 22, 7, 30, 0).unwrap()
    }

    #[test]
    fn window_covers_past_hours_of_the_last_days() {
        let instants = capture_instants(
            chrono_tz::Europe::Paris,
            2,
            &[8, 18],
            paris_0930(),
        );

        let expected: Vec<(NaiveDate, u32)> = vec![
            (NaiveDate::from_ymd_opt(2024, 5, 22).unwrap(), 8),
            (NaiveDate::from_ymd_opt(2024, 5, 21).unwrap(), 8),
            (NaiveDate::from_ymd_opt(2024, 5, 21).unwrap(), 18),
            (NaiveDate::from_ymd_opt(2024, 5, 20).unwrap(), 8),
            (NaiveDate::from_ymd_opt(2024, 5, 20).unwrap(), 18),
        ];
        let mut actual: Vec<(NaiveDate, u32)> = instants
            .iter()
            .map(|dt| (dt.date_naive(), dt.hour()))
            .collect();
        let mut expected_sorted = expected.clone();
        actual.sort_unstable();
        expected_sorted.sort_unstable();

        // (today, 18h) is in the future and must be absent.
        assert_eq!(actual, expected_sorted);
    }

    #[test]
    fn instants_preserve_the_local_offset() {
        let instants = capture_instants(chrono_tz::Europe::Paris, 0, &[8], paris_0930());
        assert_eq!(instants.len(), 1);
        // CEST is UTC+2.
        assert_eq!(instants[0].offset().local_minus_utc(), 2 * 3600);
        assert_eq!(instants[0].hour(), 8);
    }

    #[test]
    fn instant_exactly_now_is_excluded() {
        let now = Utc.with_ymd_and_hms(2024, 5, 22, 6, 0, 0).unwrap(); // 08:00 CEST
        let instants = capture_instants(chrono_tz::Europe::Paris, 0, &[8], now);
        assert!(instants.is_empty());
    }

    #[test]
    fn invalid_hour_is_skipped() {
        let instants = capture_instants(chrono_tz::Europe::Paris, 0, &[8, 25], paris_0930());
        assert_eq!(instants.len(), 1);
    }
}
