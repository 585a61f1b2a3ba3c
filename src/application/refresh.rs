use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::time::{sleep_until, Duration, Instant};

pub type RefreshFn = Arc<dyn Fn(&str) + Send + Sync>;

/// Timing knobs for the route refresh scheduler.
#[derive(Debug, Clone)]
pub struct RefreshTiming {
    pub debounce: Duration,
    pub min_interval: Duration,
    pub max_wait: Duration,
    pub reason_dedupe: Duration,
}

impl Default for RefreshTiming {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(250),
            min_interval: Duration::from_millis(700),
            max_wait: Duration::from_millis(1200),
            reason_dedupe: Duration::from_millis(300),
        }
    }
}

#[derive(Default)]
struct RouteState {
    pending: Option<PendingRefresh>,
    last_refresh: Option<Instant>,
    reasons: HashMap<String, Instant>,
    driver_running: bool,
}

struct PendingRefresh {
    first_pending: Instant,
    deadline: Instant,
}

enum DeadlineStep {
    Sleep(Instant),
    Invoke,
    Done,
}

/// Collapses bursts of change notifications into a bounded number of
/// route refreshes. Per route: repeats of a reason inside its dedupe
/// window are dropped; accepted calls re-arm a debounce deadline that
/// never extends past the first pending call plus `max_wait`; a fire
/// closer than `min_interval` to the previous refresh re-arms for the
/// remaining wait instead of refreshing.
pub struct RouteRefreshScheduler {
    timing: RefreshTiming,
    refresh: RefreshFn,
    state: Mutex<HashMap<String, RouteState>>,
}

impl RouteRefreshScheduler {
    pub fn new(refresh: RefreshFn) -> Self {
        Self {
            timing: RefreshTiming::default(),
            refresh,
            state: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_timing(mut self, timing: RefreshTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn schedule(self: &Arc<Self>, route: &str, reason: &str) {
        let now = Instant::now();
        let spawn_driver = {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            let route_state = state.entry(route.to_string()).or_default();

            let dedupe = self.timing.reason_dedupe;
            route_state
                .reasons
                .retain(|_, seen| now.duration_since(*seen) < dedupe);
            if route_state.reasons.contains_key(reason) {
                return;
            }
            route_state.reasons.insert(reason.to_string(), now);

            match route_state.pending.as_mut() {
                Some(pending) => {
                    let cap = pending.first_pending + self.timing.max_wait;
                    pending.deadline = (now + self.timing.debounce).min(cap);
                }
                None => {
                    route_state.pending = Some(PendingRefresh {
                        first_pending: now,
                        deadline: now + self.timing.debounce,
                    });
                }
            }

            if route_state.driver_running {
                false
            } else {
                route_state.driver_running = true;
                true
            }
        };
        if spawn_driver {
            self.spawn_driver(route.to_string());
        }
    }

    fn spawn_driver(self: &Arc<Self>, route: String) {
        let scheduler = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                match scheduler.deadline_step(&route) {
                    DeadlineStep::Sleep(deadline) => sleep_until(deadline).await,
                    DeadlineStep::Invoke => (scheduler.refresh)(&route),
                    DeadlineStep::Done => break,
                }
            }
        });
    }

    /// One wake of the driver. Re-reads the armed deadline (it may have
    /// moved since the sleep started), applies the rate limit, and
    /// decides whether to fire.
    fn deadline_step(&self, route: &str) -> DeadlineStep {
        let now = Instant::now();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(route_state) = state.get_mut(route) else {
            return DeadlineStep::Done;
        };
        let deadline = match route_state.pending {
            Some(ref pending) => pending.deadline,
            None => {
                route_state.driver_running = false;
                return DeadlineStep::Done;
            }
        };
        if now < deadline {
            return DeadlineStep::Sleep(deadline);
        }
        if let Some(last) = route_state.last_refresh {
            if now.duration_since(last) < self.timing.min_interval {
                let rearmed = last + self.timing.min_interval;
                if let Some(pending) = route_state.pending.as_mut() {
                    pending.deadline = rearmed;
                }
                return DeadlineStep::Sleep(rearmed);
            }
        }
        route_state.pending = None;
        route_state.last_refresh = Some(now);
        DeadlineStep::Invoke
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::sleep;

    fn recording_scheduler() -> (Arc<RouteRefreshScheduler>, Arc<Mutex<Vec<String>>>) {
        let calls: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&calls);
        let scheduler = Arc::new(RouteRefreshScheduler::new(Arc::new(move |route: &str| {
            recorded.lock().unwrap().push(route.to_string());
        })));
        (scheduler, calls)
    }

    #[tokio::test(start_paused = true)]
    async fn a_burst_collapses_into_one_refresh() {
        let (scheduler, calls) = recording_scheduler();
        scheduler.schedule("/focus", "session:update");
        scheduler.schedule("/focus", "task:update");
        scheduler.schedule("/focus", "queue:update");

        sleep(Duration::from_millis(400)).await;
        assert_eq!(calls.lock().unwrap().as_slice(), ["/focus".to_string()]);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_reasons_are_dropped_and_refreshes_rate_limited() {
        let (scheduler, calls) = recording_scheduler();
        scheduler.schedule("/focus", "tick");
        scheduler.schedule("/focus", "tick");

        sleep(Duration::from_millis(400)).await;
        assert_eq!(calls.lock().unwrap().len(), 1);

        // The reason window has passed, so the same reason re-arms; the
        // fire then waits out the minimum interval since the refresh at
        // t=250ms before running at t=950ms.
        scheduler.schedule("/focus", "tick");
        sleep(Duration::from_millis(300)).await;
        assert_eq!(calls.lock().unwrap().len(), 1);

        sleep(Duration::from_millis(300)).await;
        assert_eq!(calls.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn a_steady_stream_cannot_push_the_refresh_past_max_wait() {
        let (scheduler, calls) = recording_scheduler();
        scheduler.schedule("/focus", "reason-0");
        for index in 1..=5 {
            sleep(Duration::from_millis(200)).await;
            scheduler.schedule("/focus", &format!("reason-{index}"));
        }

        // t=1150ms: the capped deadline (t=1200ms) has not yet passed.
        sleep(Duration::from_millis(150)).await;
        assert_eq!(calls.lock().unwrap().len(), 0);

        sleep(Duration::from_millis(100)).await;
        assert_eq!(calls.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn routes_refresh_independently() {
        let (scheduler, calls) = recording_scheduler();
        scheduler.schedule("/focus", "session:update");
        scheduler.schedule("/tasks", "task:update");

        sleep(Duration::from_millis(400)).await;
        let recorded = calls.lock().unwrap();
        assert_eq!(recorded.len(), 2);
        assert!(recorded.contains(&"/focus".to_string()));
        assert!(recorded.contains(&"/tasks".to_string()));
    }
}
