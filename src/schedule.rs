use std::time::Duration;

use anyhow::Result;
use chrono::{DateTime, Datelike, Local, NaiveDate, TimeZone, Timelike, Weekday};
use tracing::{error, info};

use crate::config::{Config, ScheduleConfig};
use crate::db::Database;
use crate::runner::{RefreshMode, Runner};
use crate::staleness::Priority;

const TICK: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DayRule {
    Daily,
    Weekday(Weekday),
    DayOfMonth(u32),
}

/// One cron-like entry: a priority tier refreshed at a fixed hour.
struct Job {
    name: &'static str,
    priority: Priority,
    limit: usize,
    hour: u32,
    day_rule: DayRule,
    last_run: Option<NaiveDate>,
}

impl Job {
    /// Due when the day matches, the hour has been reached, and the job
    /// has not yet run today. A job missed earlier in the day (daemon
    /// started late, or a previous job overran its hour) still fires on
    /// the next tick.
    fn due<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> bool {
        if self.last_run == Some(now.date_naive()) {
            return false;
        }
        if now.hour() < self.hour {
            return false;
        }
        match self.day_rule {
            DayRule::Daily => true,
            DayRule::Weekday(day) => now.weekday() == day,
            DayRule::DayOfMonth(day) => now.day() == day,
        }
    }

    fn cadence(&self) -> &'static str {
        match self.day_rule {
            DayRule::Daily => "every day",
            DayRule::Weekday(_) => "sundays",
            DayRule::DayOfMonth(_) => "1st of the month",
        }
    }
}

fn jobs_from(schedule: &ScheduleConfig) -> Vec<Job> {
    vec![
        Job {
            name: "daily-critical",
            priority: Priority::Critical,
            limit: schedule.daily_limit,
            hour: schedule.daily_hour,
            day_rule: DayRule::Daily,
            last_run: None,
        },
        Job {
            name: "weekly-high",
            priority: Priority::High,
            limit: schedule.weekly_limit,
            hour: schedule.weekly_hour,
            day_rule: DayRule::Weekday(Weekday::Sun),
            last_run: None,
        },
        Job {
            name: "monthly-medium",
            priority: Priority::Medium,
            limit: schedule.monthly_limit,
            hour: schedule.monthly_hour,
            day_rule: DayRule::DayOfMonth(1),
            last_run: None,
        },
    ]
}

/// In-process updater daemon: a one-minute tick loop that runs due jobs
/// serially. The interrupt lands between ticks; a running batch finishes
/// before the daemon stops.
pub async fn run(config: &Config, db: &Database, dry_run: bool) -> Result<()> {
    let runner = Runner::new(config, db, dry_run)?;
    let mut jobs = jobs_from(&config.schedule);
    for job in &jobs {
        info!(
            job = job.name,
            cadence = job.cadence(),
            hour = job.hour,
            limit = job.limit,
            "scheduled"
        );
    }

    loop {
        let now = Local::now();
        for job in &mut jobs {
            if !job.due(&now) {
                continue;
            }
            // Mark first so a failed run waits for the next slot instead
            // of retrying every tick.
            job.last_run = Some(now.date_naive());
            info!(job = job.name, tier = %job.priority, "starting scheduled refresh");
            match runner
                .refresh(
                    RefreshMode::Incremental,
                    None,
                    Some(job.priority),
                    None,
                    job.limit,
                )
                .await
            {
                Ok(stats) => info!(
                    job = job.name,
                    updated = stats.updated,
                    skipped = stats.skipped,
                    failed = stats.failed,
                    "scheduled refresh finished"
                ),
                Err(err) => error!(job = job.name, "scheduled refresh failed: {err:#}"),
            }
        }

        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupt received, stopping the scheduler");
                return Ok(());
            }
            _ = tokio::time::sleep(TICK) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;

    fn daily_job() -> Job {
        Job {
            name: "daily-critical",
            priority: Priority::Critical,
            limit: 30,
            hour: 2,
            day_rule: DayRule::Daily,
            last_run: None,
        }
    }

    #[test]
    fn daily_job_waits_for_its_hour() {
        let job = daily_job();
        let before = Utc.with_ymd_and_hms(2025, 8, 20, 1, 59, 0).unwrap();
        let at = Utc.with_ymd_and_hms(2025, 8, 20, 2, 0, 0).unwrap();
        assert!(!job.due(&before));
        assert!(job.due(&at));
    }

    #[test]
    fn daily_job_fires_once_per_day() {
        let mut job = daily_job();
        let first_tick = Utc.with_ymd_and_hms(2025, 8, 20, 2, 0, 0).unwrap();
        assert!(job.due(&first_tick));
        job.last_run = Some(first_tick.date_naive());

        let next_tick = Utc.with_ymd_and_hms(2025, 8, 20, 2, 1, 0).unwrap();
        assert!(!job.due(&next_tick));

        let tomorrow = Utc.with_ymd_and_hms(2025, 8, 21, 2, 0, 0).unwrap();
        assert!(job.due(&tomorrow));
    }

    #[test]
    fn missed_slot_still_fires_later_the_same_day() {
        let job = daily_job();
        let afternoon = Utc.with_ymd_and_hms(2025, 8, 20, 14, 30, 0).unwrap();
        assert!(job.due(&afternoon));
    }

    #[test]
    fn weekly_job_only_fires_on_sunday() {
        let job = Job {
            name: "weekly-high",
            priority: Priority::High,
            limit: 100,
            hour: 3,
            day_rule: DayRule::Weekday(Weekday::Sun),
            last_run: None,
        };
        // 2025-08-24 is a Sunday; the 25th a Monday.
        let sunday = Utc.with_ymd_and_hms(2025, 8, 24, 3, 5, 0).unwrap();
        let monday = Utc.with_ymd_and_hms(2025, 8, 25, 3, 5, 0).unwrap();
        assert!(job.due(&sunday));
        assert!(!job.due(&monday));
    }

    #[test]
    fn monthly_job_only_fires_on_the_first() {
        let job = Job {
            name: "monthly-medium",
            priority: Priority::Medium,
            limit: 300,
            hour: 4,
            day_rule: DayRule::DayOfMonth(1),
            last_run: None,
        };
        let first = Utc.with_ymd_and_hms(2025, 9, 1, 4, 0, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2025, 9, 2, 4, 0, 0).unwrap();
        assert!(job.due(&first));
        assert!(!job.due(&second));
    }
}
