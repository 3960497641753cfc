use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use indexmap::IndexMap;
use tracing::{debug, error, info, trace, warn};

use crate::{
    matcher::RuleSet,
    store::{catalog::Catalog, KeyValueStore},
    tracker::{
        events::{StoreCommand, TrackerEvent},
        session::{FlushPlan, Session},
        TrackerSettings,
    },
    utils::clock::Clock,
};

use super::module::EventProcessor;

/// Result of a single flush. Mostly useful for logging and tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    Idle,
    Carried,
    Restarted,
    Credited { rule: Arc<str>, seconds: u64, total: u64 },
    /// Every write attempt failed. The window was kept so a later flush can recover it.
    Failed,
}

/// Owns the tracking [Session] and is the single writer of accumulated seconds.
///
/// Time is always computed from wall-clock timestamps, never from the tick period, because the
/// host can be dormant for an arbitrary time between two events.
pub struct TrackingController<S: KeyValueStore> {
    store: S,
    session: Session,
    clock: Box<dyn Clock>,
    /// Url of the active tab as last reported. Used to match again after the rule set changes.
    last_url: Option<Arc<str>>,
    /// Credits of rules that are no longer active and couldn't be written yet. One entry per rule.
    unsaved: IndexMap<Arc<str>, u64>,
    max_flush: Duration,
    write_attempts: u32,
}

impl<S: KeyValueStore> TrackingController<S> {
    pub fn new(store: S, clock: Box<dyn Clock>, settings: &TrackerSettings) -> Self {
        let session = Session::new(clock.time());
        Self {
            store,
            session,
            clock,
            last_url: None,
            unsaved: IndexMap::new(),
            max_flush: settings.max_flush,
            write_attempts: settings.write_attempts.max(1),
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub async fn handle(&mut self, event: TrackerEvent) -> Result<()> {
        match event {
            TrackerEvent::ActiveTabChanged { url } => self.on_active_tab_changed(url).await,
            TrackerEvent::Tick => {
                self.on_periodic_tick().await;
                Ok(())
            }
            TrackerEvent::Suspend => {
                self.on_process_suspend().await;
                Ok(())
            }
            TrackerEvent::Command(command) => self.on_command(command).await,
        }
    }

    async fn on_active_tab_changed(&mut self, url: Option<Arc<str>>) -> Result<()> {
        let Some(url) = url else {
            debug!("Active tab has no url, keeping {:?}", self.session.state());
            return Ok(());
        };
        self.last_url = Some(url);
        self.rematch().await
    }

    /// Matches the last reported url against the current rule set and switches the session if
    /// the result differs.
    async fn rematch(&mut self) -> Result<()> {
        let Some(url) = self.last_url.clone() else {
            return Ok(());
        };
        let data = self
            .store
            .get_all()
            .await
            .context("Failed to read tracking rules")?;
        let new_rule = RuleSet::from_store(&data).match_url(&url);

        if self.session.is_tracking(new_rule.as_deref()) {
            trace!("{url} still resolves to {new_rule:?}");
            return Ok(());
        }

        let now = self.clock.time();
        self.flush_at(now).await;
        info!(
            "Switching from {:?} to {:?}",
            self.session.current_rule(),
            new_rule
        );
        if let FlushPlan::Credit { rule, seconds, .. } = self.session.plan_flush(now, self.max_flush) {
            // The window couldn't be stored. Keep the credit until the store recovers.
            self.keep_unsaved(rule, seconds);
        }
        self.session.switch_to(new_rule, now);
        Ok(())
    }

    async fn on_periodic_tick(&mut self) {
        if self.session.current_rule().is_none() && self.unsaved.is_empty() {
            return;
        }
        let now = self.clock.time();
        self.flush_at(now).await;
    }

    async fn on_process_suspend(&mut self) {
        let now = self.clock.time();
        let outcome = self.flush_at(now).await;
        info!("Suspending with {outcome:?}");
    }

    async fn on_command(&mut self, command: StoreCommand) -> Result<()> {
        // Everything up to now is accounted before the user action applies, so a reset never
        // races a pending window.
        let now = self.clock.time();
        self.flush_at(now).await;

        let changes_rules = command.changes_rules();
        let catalog = Catalog::new(&self.store);
        match command {
            StoreCommand::AddSite { site, project } => {
                catalog.add_site(&site, project.as_deref()).await?
            }
            StoreCommand::RemoveSite { site } => catalog.remove_site(&site).await?,
            StoreCommand::RenameSite { from, to } => catalog.rename_site(&from, &to).await?,
            StoreCommand::ResetSite { site } => catalog.reset_site(&site).await?,
            StoreCommand::ResetProject { project } => {
                catalog.reset_project(&project).await?;
            }
            StoreCommand::ResetAll => {
                catalog.reset_all().await?;
            }
        }

        if changes_rules {
            self.rematch().await?;
        }
        Ok(())
    }

    /// Credits the open window up to `now`. Never fails; failures are logged and the window is
    /// kept for the next attempt.
    async fn flush_at(&mut self, now: DateTime<Utc>) -> FlushOutcome {
        self.retry_unsaved().await;

        match self.session.plan_flush(now, self.max_flush) {
            FlushPlan::Idle => FlushOutcome::Idle,
            FlushPlan::Carry => FlushOutcome::Carried,
            FlushPlan::Restart { at } => {
                warn!(
                    "Clock went backwards from {} to {at}, restarting window",
                    self.session.window_start()
                );
                self.session.advance_to(at);
                FlushOutcome::Restarted
            }
            FlushPlan::Credit {
                rule,
                seconds,
                advance_to,
                capped,
            } => {
                if capped {
                    warn!(
                        "Window of {rule} started at {} is implausibly long, crediting only {seconds}s",
                        self.session.window_start()
                    );
                }
                match self.credit(&rule, seconds).await {
                    Ok(total) => {
                        self.session.advance_to(advance_to);
                        debug!("Credited {seconds}s to {rule}, total {total}s");
                        FlushOutcome::Credited {
                            rule,
                            seconds,
                            total,
                        }
                    }
                    Err(e) => {
                        error!("Failed to credit {seconds}s to {rule}: {e:?}");
                        FlushOutcome::Failed
                    }
                }
            }
        }
    }

    async fn retry_unsaved(&mut self) {
        if self.unsaved.is_empty() {
            return;
        }
        let pending = std::mem::take(&mut self.unsaved);
        for (rule, seconds) in pending {
            match self.credit(&rule, seconds).await {
                Ok(total) => info!("Recovered {seconds}s for {rule}, total {total}s"),
                Err(e) => {
                    warn!("Still can't credit {seconds}s to {rule}: {e:?}");
                    self.keep_unsaved(rule, seconds);
                }
            }
        }
    }

    fn keep_unsaved(&mut self, rule: Arc<str>, seconds: u64) {
        let pending = self.unsaved.entry(rule).or_default();
        *pending = pending.saturating_add(seconds);
    }

    /// Adds seconds to a rule, retrying failed writes. A rule deleted in the meantime is created
    /// again by the store.
    async fn credit(&self, rule: &str, seconds: u64) -> Result<u64> {
        let mut attempt = 1;
        loop {
            match self.store.increment(rule, seconds).await {
                Ok(total) => return Ok(total),
                Err(e) if attempt < self.write_attempts => {
                    warn!("Attempt {attempt} to credit {rule} failed: {e:?}");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

impl<S: KeyValueStore> EventProcessor for TrackingController<S> {
    async fn process_next(&mut self, event: TrackerEvent) -> Result<()> {
        self.handle(event).await
    }

    async fn finalize(&mut self) -> Result<()> {
        self.on_process_suspend().await;
        if !self.unsaved.is_empty() {
            error!("Dropping uncredited time: {:?}", self.unsaved);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::{anyhow, Result};
    use serde_json::{json, Map, Value};

    use crate::{
        store::{memory::MemoryStore, KeyValueStore, MockKeyValueStore},
        tracker::session::TrackingState,
        utils::{clock::test_clock::ManualClock, logging::TEST_LOGGING},
    };

    use super::*;

    const GITHUB: &str = "https://github.com/rust-lang/rust";
    const UNTRACKED: &str = "https://untracked.example.com/";

    fn tab(url: &str) -> TrackerEvent {
        TrackerEvent::ActiveTabChanged {
            url: Some(url.into()),
        }
    }

    fn store_with(rules: &[&str]) -> Arc<MemoryStore> {
        let mut data = Map::new();
        for rule in rules {
            data.insert(rule.to_string(), json!(0));
        }
        Arc::new(MemoryStore::new(data))
    }

    fn controller<S: KeyValueStore>(
        store: S,
        clock: &ManualClock,
    ) -> TrackingController<S> {
        TrackingController::new(store, Box::new(clock.clone()), &TrackerSettings::default())
    }

    async fn seconds(store: &impl KeyValueStore, rule: &str) -> Result<Option<Value>> {
        store.get(rule).await
    }

    #[tokio::test]
    async fn test_periodic_ticks_accumulate() -> Result<()> {
        *TEST_LOGGING;
        let store = store_with(&["github.com"]);
        let clock = ManualClock::new();
        let mut controller = controller(store.clone(), &clock);

        controller.handle(tab(GITHUB)).await?;
        for _ in 0..2 {
            clock.advance_secs(10);
            controller.handle(TrackerEvent::Tick).await?;
        }
        clock.advance_secs(5);

        let total = seconds(&store, "github.com").await?.and_then(|v| v.as_u64()).unwrap();
        assert!((20..=25).contains(&total));

        controller.handle(TrackerEvent::Suspend).await?;
        assert_eq!(seconds(&store, "github.com").await?, Some(json!(25)));
        Ok(())
    }

    #[tokio::test]
    async fn test_wildcard_rule_is_tracked() -> Result<()> {
        let store = store_with(&["*.jira.com/browse/*"]);
        let clock = ManualClock::new();
        let mut controller = controller(store.clone(), &clock);

        controller
            .handle(tab("https://mycompany.jira.com/browse/PROJ-123"))
            .await?;

        assert_eq!(
            controller.session().state(),
            TrackingState::Tracking("*.jira.com/browse/*")
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_leaving_tracked_site_flushes_once() -> Result<()> {
        let store = store_with(&["github.com"]);
        let clock = ManualClock::new();
        let mut controller = controller(store.clone(), &clock);

        controller.handle(tab(GITHUB)).await?;
        clock.advance_secs(15);
        controller.handle(tab(UNTRACKED)).await?;

        assert_eq!(controller.session().state(), TrackingState::Idle);
        assert_eq!(seconds(&store, "github.com").await?, Some(json!(15)));

        clock.advance_secs(60);
        controller.handle(TrackerEvent::Tick).await?;
        controller.handle(tab(UNTRACKED)).await?;
        controller.handle(TrackerEvent::Suspend).await?;
        assert_eq!(seconds(&store, "github.com").await?, Some(json!(15)));
        Ok(())
    }

    #[tokio::test]
    async fn test_repeated_tab_event_does_not_flush() -> Result<()> {
        let mut store = MockKeyValueStore::new();
        store
            .expect_get_all()
            .returning(|| Ok(json!({"github.com": 0}).as_object().cloned().unwrap()));
        store.expect_increment().times(1).returning(|_, delta| Ok(delta));
        let clock = ManualClock::new();
        let mut controller = controller(store, &clock);

        controller.handle(tab(GITHUB)).await?;
        clock.advance_secs(4);
        controller.handle(tab("https://github.com/other/page")).await?;
        clock.advance_secs(4);
        controller.handle(TrackerEvent::Tick).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_reset_between_flushes_is_respected() -> Result<()> {
        let store = store_with(&["jira.com"]);
        store.set("jira.com", json!(3000)).await?;
        let clock = ManualClock::new();
        let mut controller = controller(store.clone(), &clock);

        controller.handle(tab("https://team.jira.com/")).await?;
        clock.advance_secs(5);
        // Another process resets the total directly in the store.
        store.set("jira.com", json!(0)).await?;
        controller.handle(TrackerEvent::Tick).await?;

        assert_eq!(seconds(&store, "jira.com").await?, Some(json!(5)));
        Ok(())
    }

    #[tokio::test]
    async fn test_reset_command_flushes_first() -> Result<()> {
        let store = store_with(&["jira.com"]);
        let clock = ManualClock::new();
        let mut controller = controller(store.clone(), &clock);

        controller.handle(tab("https://team.jira.com/")).await?;
        clock.advance_secs(5);
        controller
            .handle(TrackerEvent::Command(StoreCommand::ResetSite {
                site: "jira.com".into(),
            }))
            .await?;
        clock.advance_secs(3);
        controller.handle(TrackerEvent::Tick).await?;

        assert_eq!(seconds(&store, "jira.com").await?, Some(json!(3)));
        Ok(())
    }

    #[tokio::test]
    async fn test_no_double_counting_across_switches() -> Result<()> {
        let store = store_with(&["github.com", "jira.com"]);
        let clock = ManualClock::new();
        let mut controller = controller(store.clone(), &clock);

        controller.handle(tab(GITHUB)).await?;
        clock.advance_ms(10_400);
        controller.handle(TrackerEvent::Tick).await?;
        clock.advance_ms(10_400);
        controller.handle(TrackerEvent::Tick).await?;
        clock.advance_ms(3_300);
        controller.handle(tab("https://team.jira.com/")).await?;
        clock.advance_ms(7_900);
        controller.handle(TrackerEvent::Tick).await?;
        clock.advance_ms(2_000);
        controller.handle(tab(GITHUB)).await?;
        clock.advance_ms(1_500);
        controller.handle(TrackerEvent::Suspend).await?;

        // github.com was active 24.1s + 1.5s, jira.com 9.9s.
        assert_eq!(seconds(&store, "github.com").await?, Some(json!(25)));
        assert_eq!(seconds(&store, "jira.com").await?, Some(json!(9)));
        Ok(())
    }

    #[tokio::test]
    async fn test_sub_second_dwell_writes_nothing() -> Result<()> {
        let store = store_with(&["github.com"]);
        let clock = ManualClock::new();
        let mut controller = controller(store.clone(), &clock);

        controller.handle(tab(GITHUB)).await?;
        clock.advance_ms(600);
        controller.handle(TrackerEvent::Tick).await?;
        assert_eq!(seconds(&store, "github.com").await?, Some(json!(0)));

        // The remainder is carried into the next flush of the same window.
        clock.advance_ms(600);
        controller.handle(TrackerEvent::Tick).await?;
        assert_eq!(seconds(&store, "github.com").await?, Some(json!(1)));
        Ok(())
    }

    #[tokio::test]
    async fn test_dormant_gap_is_capped() -> Result<()> {
        let store = store_with(&["github.com"]);
        let clock = ManualClock::new();
        let mut controller = controller(store.clone(), &clock);

        controller.handle(tab(GITHUB)).await?;
        clock.advance(Duration::days(3));
        controller.handle(TrackerEvent::Tick).await?;
        clock.advance_secs(10);
        controller.handle(TrackerEvent::Tick).await?;

        let cap = TrackerSettings::default().max_flush.num_seconds();
        assert_eq!(seconds(&store, "github.com").await?, Some(json!(cap + 10)));
        Ok(())
    }

    #[tokio::test]
    async fn test_clock_going_backwards_credits_nothing() -> Result<()> {
        let store = store_with(&["github.com"]);
        let clock = ManualClock::new();
        let mut controller = controller(store.clone(), &clock);

        controller.handle(tab(GITHUB)).await?;
        clock.advance_secs(-30);
        controller.handle(TrackerEvent::Tick).await?;
        clock.advance_secs(4);
        controller.handle(TrackerEvent::Tick).await?;

        assert_eq!(seconds(&store, "github.com").await?, Some(json!(4)));
        Ok(())
    }

    #[tokio::test]
    async fn test_write_is_retried_once() -> Result<()> {
        let mut store = MockKeyValueStore::new();
        store
            .expect_get_all()
            .returning(|| Ok(json!({"github.com": 0}).as_object().cloned().unwrap()));
        let mut calls = 0;
        store.expect_increment().times(2).returning(move |rule, delta| {
            calls += 1;
            assert_eq!(rule, "github.com");
            assert_eq!(delta, 10);
            if calls == 1 {
                Err(anyhow!("store busy"))
            } else {
                Ok(delta)
            }
        });
        let clock = ManualClock::new();
        let mut controller = controller(store, &clock);

        controller.handle(tab(GITHUB)).await?;
        clock.advance_secs(10);
        let outcome = controller.flush_at(clock.time()).await;

        assert_eq!(
            outcome,
            FlushOutcome::Credited {
                rule: "github.com".into(),
                seconds: 10,
                total: 10
            }
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_flush_keeps_window() -> Result<()> {
        let mut store = MockKeyValueStore::new();
        store
            .expect_get_all()
            .returning(|| Ok(json!({"github.com": 0}).as_object().cloned().unwrap()));
        let mut calls = 0;
        store.expect_increment().times(3).returning(move |_, delta| {
            calls += 1;
            if calls <= 2 {
                Err(anyhow!("disk full"))
            } else {
                Ok(delta)
            }
        });
        let clock = ManualClock::new();
        let mut controller = controller(store, &clock);

        controller.handle(tab(GITHUB)).await?;
        let start = controller.session().window_start();
        clock.advance_secs(10);
        assert_eq!(controller.flush_at(clock.time()).await, FlushOutcome::Failed);
        assert_eq!(controller.session().window_start(), start);

        clock.advance_secs(10);
        assert_eq!(
            controller.flush_at(clock.time()).await,
            FlushOutcome::Credited {
                rule: "github.com".into(),
                seconds: 20,
                total: 20
            }
        );
        Ok(())
    }

    #[tokio::test]
    async fn test_failed_switch_flush_is_recovered_later() -> Result<()> {
        let mut store = MockKeyValueStore::new();
        store.expect_get_all().returning(|| {
            Ok(json!({"github.com": 0, "jira.com": 0})
                .as_object()
                .cloned()
                .unwrap())
        });
        let mut calls = 0;
        store.expect_increment().times(4).returning(move |rule, delta| {
            calls += 1;
            match calls {
                1 | 2 => Err(anyhow!("disk full")),
                3 => {
                    assert_eq!((rule, delta), ("github.com", 15));
                    Ok(delta)
                }
                _ => {
                    assert_eq!((rule, delta), ("jira.com", 5));
                    Ok(delta)
                }
            }
        });
        let clock = ManualClock::new();
        let mut controller = controller(store, &clock);

        controller.handle(tab(GITHUB)).await?;
        clock.advance_secs(15);
        controller.handle(tab("https://team.jira.com/")).await?;
        clock.advance_secs(5);
        controller.handle(TrackerEvent::Tick).await?;

        assert!(controller.unsaved.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_unsaved_credits_merge_per_rule() -> Result<()> {
        let mut store = MockKeyValueStore::new();
        store.expect_get_all().returning(|| {
            Ok(json!({"github.com": 0, "jira.com": 0})
                .as_object()
                .cloned()
                .unwrap())
        });
        store
            .expect_increment()
            .returning(|_, _| Err(anyhow!("disk full")));
        let clock = ManualClock::new();
        let mut controller = controller(store, &clock);

        controller.handle(tab(GITHUB)).await?;
        for (secs, url) in [
            (10, "https://team.jira.com/"),
            (4, GITHUB),
            (6, "https://team.jira.com/"),
            (3, GITHUB),
        ] {
            clock.advance_secs(secs);
            controller.handle(tab(url)).await?;
        }

        let unsaved = controller
            .unsaved
            .iter()
            .map(|(rule, seconds)| (rule.as_ref(), *seconds))
            .collect::<Vec<_>>();
        assert_eq!(unsaved, vec![("github.com", 16), ("jira.com", 7)]);
        Ok(())
    }

    #[tokio::test]
    async fn test_unreadable_rules_keep_state() -> Result<()> {
        let mut store = MockKeyValueStore::new();
        store
            .expect_get_all()
            .returning(|| Err(anyhow!("permission denied")));
        store.expect_increment().never();
        let clock = ManualClock::new();
        let mut controller = controller(store, &clock);

        assert!(controller.handle(tab(GITHUB)).await.is_err());
        assert_eq!(controller.session().state(), TrackingState::Idle);
        controller.handle(TrackerEvent::Tick).await?;
        Ok(())
    }

    #[tokio::test]
    async fn test_missing_url_and_malformed_url() -> Result<()> {
        let store = store_with(&["github.com"]);
        let clock = ManualClock::new();
        let mut controller = controller(store.clone(), &clock);

        controller.handle(tab(GITHUB)).await?;
        clock.advance_secs(3);
        controller
            .handle(TrackerEvent::ActiveTabChanged { url: None })
            .await?;
        assert_eq!(controller.session().state(), TrackingState::Tracking("github.com"));
        assert_eq!(seconds(&store, "github.com").await?, Some(json!(0)));

        controller.handle(tab("definitely not a url")).await?;
        assert_eq!(controller.session().state(), TrackingState::Idle);
        assert_eq!(seconds(&store, "github.com").await?, Some(json!(3)));
        Ok(())
    }

    #[tokio::test]
    async fn test_rule_deleted_mid_session_is_recreated() -> Result<()> {
        let store = store_with(&["github.com"]);
        let clock = ManualClock::new();
        let mut controller = controller(store.clone(), &clock);

        controller.handle(tab(GITHUB)).await?;
        clock.advance_secs(8);
        store.remove("github.com").await?;
        controller.handle(TrackerEvent::Tick).await?;

        assert_eq!(seconds(&store, "github.com").await?, Some(json!(8)));
        Ok(())
    }

    #[tokio::test]
    async fn test_site_commands_rematch_active_tab() -> Result<()> {
        let store = store_with(&[]);
        let clock = ManualClock::new();
        let mut controller = controller(store.clone(), &clock);

        controller.handle(tab(GITHUB)).await?;
        assert_eq!(controller.session().state(), TrackingState::Idle);

        controller
            .handle(TrackerEvent::Command(StoreCommand::AddSite {
                site: "github.com".into(),
                project: None,
            }))
            .await?;
        assert_eq!(controller.session().state(), TrackingState::Tracking("github.com"));

        clock.advance_secs(6);
        controller
            .handle(TrackerEvent::Command(StoreCommand::RenameSite {
                from: "github.com".into(),
                to: "*github.com*".into(),
            }))
            .await?;
        assert_eq!(controller.session().state(), TrackingState::Tracking("*github.com*"));
        assert_eq!(seconds(&store, "*github.com*").await?, Some(json!(6)));

        clock.advance_secs(2);
        controller
            .handle(TrackerEvent::Command(StoreCommand::RemoveSite {
                site: "*github.com*".into(),
            }))
            .await?;
        assert_eq!(controller.session().state(), TrackingState::Idle);
        assert_eq!(seconds(&store, "*github.com*").await?, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_idle_tick_touches_nothing() -> Result<()> {
        let store = MockKeyValueStore::new();
        let clock = ManualClock::new();
        let mut controller = controller(store, &clock);

        clock.advance_secs(100);
        controller.handle(TrackerEvent::Tick).await?;
        controller.handle(TrackerEvent::Suspend).await?;
        controller.finalize().await?;
        Ok(())
    }
}
