//! Periodic execution of network cycles.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use time::{OffsetDateTime, format_description::well_known::Rfc3339};
use tracing::{Instrument as _, Level, event, span};

/// When to run cycles.
///
/// Cycle times are aligned to `from`, so a restarted simulator resumes on the
/// same grid.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Scheduler {
    /// An RFC3339 timestamp to align cycles to (defaults to now)
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub from: Option<OffsetDateTime>,
    /// How often to run a cycle
    #[serde(default, with = "humantime_serde::option")]
    pub every: Option<Duration>,
}

impl Scheduler {
    /// The first cycle time at or after `now`
    pub fn first_after(&self, now: OffsetDateTime, every: Duration) -> OffsetDateTime {
        match self.from {
            Some(from) if from < now => {
                let steps = ((now - from) / every).ceil() as u32;
                from + every * steps
            }
            Some(from) => from,
            None => now,
        }
    }

    /// Call `f` at every scheduled time until it fails.
    ///
    /// Returns immediately when no interval is configured.
    pub async fn schedule<T, E>(
        &self,
        mut f: impl AsyncFnMut(OffsetDateTime) -> Result<T, E>,
    ) -> Result<(), E> {
        let Some(every) = self.every else {
            return Ok(());
        };

        let now = OffsetDateTime::now_utc();
        let mut anchor = self.first_after(now, every);

        let wait = Duration::try_from(anchor - now).unwrap_or_default();
        tokio::time::sleep(wait).await;

        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;

            let span = span!(Level::INFO, "scheduled cycle");
            async {
                if let Ok(at) = anchor.format(&Rfc3339) {
                    event!(Level::INFO, cycle_time = %at);
                }
                f(anchor).await
            }
            .instrument(span)
            .await?;

            anchor += every;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn first_cycle_stays_on_the_grid() {
        let every = Duration::from_secs(300);
        let scheduler = Scheduler {
            from: Some(datetime!(2024-06-01 00:00 UTC)),
            every: Some(every),
        };
        assert_eq!(
            scheduler.first_after(datetime!(2024-06-01 10:02 UTC), every),
            datetime!(2024-06-01 10:05 UTC)
        );
        assert_eq!(
            scheduler.first_after(datetime!(2024-05-31 23:00 UTC), every),
            datetime!(2024-06-01 00:00 UTC)
        );
    }

    #[tokio::test]
    async fn without_interval_nothing_runs() {
        let mut calls = 0;
        Scheduler::default()
            .schedule(async |_| {
                calls += 1;
                Ok::<(), ()>(())
            })
            .await
            .unwrap();
        assert_eq!(calls, 0);
    }
}
