//! End-to-end guard cycles against in-memory sources, sink and backend

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use budget_guard::billing::{BillingSource, FetchError};
use budget_guard::mitigation::{
    BackendError, MitigationBackend, MitigationController, MitigationOutcome,
};
use budget_guard::models::{
    dollars_to_cents, CostReport, GapReason, MitigationLatch, MitigationTarget, Severity,
    ThresholdConfig,
};
use budget_guard::config::DayBoundary;
use budget_guard::{alerting::Notifier, BudgetGuard};
use chrono::{DateTime, NaiveDate, Utc};
use pretty_assertions::assert_eq;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 3).unwrap()
}

fn now() -> DateTime<Utc> {
    today().and_hms_opt(12, 0, 0).unwrap().and_utc()
}

struct FakeSource {
    id: String,
    result: Result<CostReport, FetchError>,
}

impl FakeSource {
    fn reporting(id: &str, dollars: f64) -> Arc<dyn BillingSource> {
        Arc::new(Self {
            id: id.into(),
            result: Ok(CostReport::new().with_day(today(), dollars_to_cents(dollars))),
        })
    }

    fn failing(id: &str) -> Arc<dyn BillingSource> {
        Arc::new(Self {
            id: id.into(),
            result: Err(FetchError::ConnectionFailure("connection refused".into())),
        })
    }
}

#[async_trait::async_trait]
impl BillingSource for FakeSource {
    fn id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self) -> Result<CostReport, FetchError> {
        self.result.clone()
    }
}

#[derive(Default)]
struct Sink(Mutex<Vec<String>>);

impl Sink {
    fn take(&self) -> Vec<String> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

#[async_trait::async_trait]
impl Notifier for Sink {
    async fn notify(&self, message: &str) {
        self.0.lock().unwrap().push(message.to_string());
    }
}

#[derive(Default)]
struct FakeBackend {
    calls: Mutex<Vec<String>>,
    failing: Mutex<HashMap<String, usize>>,
}

impl FakeBackend {
    fn fail_times(&self, target: &str, times: usize) {
        self.failing.lock().unwrap().insert(target.into(), times);
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl MitigationBackend for FakeBackend {
    async fn set_priority(&self, target: &MitigationTarget) -> Result<(), BackendError> {
        self.calls.lock().unwrap().push(target.name.clone());
        let mut failing = self.failing.lock().unwrap();
        match failing.get_mut(&target.name) {
            Some(left) if *left > 0 => {
                *left -= 1;
                Err(BackendError::MissingCredentials("token expired".into()))
            }
            _ => Ok(()),
        }
    }
}

fn targets() -> Vec<MitigationTarget> {
    vec![
        MitigationTarget {
            name: "LFMH/ICO".into(),
            target_id: "arn:aws:elasticloadbalancing:eu-central-1:1:listener-rule/app/a/1/2/3".into(),
            region: "eu-central-1".into(),
            desired_priority: 120,
        },
        MitigationTarget {
            name: "NNA".into(),
            target_id: "arn:aws:elasticloadbalancing:us-east-1:1:listener-rule/app/b/4/5/6".into(),
            region: "us-east-1".into(),
            desired_priority: 1,
        },
    ]
}

fn guard(
    sources: Vec<Arc<dyn BillingSource>>,
) -> (BudgetGuard, Arc<Sink>, Arc<FakeBackend>) {
    let sink = Arc::new(Sink::default());
    let backend = Arc::new(FakeBackend::default());
    let guard = BudgetGuard::new(
        "Runpod",
        ThresholdConfig::new(100.0, 150.0).unwrap(),
        sources,
        MitigationController::new("Runpod", backend.clone(), targets()),
        sink.clone(),
    )
    .with_day_boundary(DayBoundary::Utc);
    (guard, sink, backend)
}

#[tokio::test]
async fn below_soft_threshold_takes_no_action() {
    let (mut guard, sink, backend) = guard(vec![
        FakeSource::reporting("runpod", 60.0),
        FakeSource::reporting("cerebrium", 30.0),
    ]);

    let report = guard.run_cycle(now()).await;

    assert_eq!(report.total_dollars, 90.0);
    assert_eq!(report.severity, Severity::Ok);
    assert_eq!(report.mitigation, MitigationOutcome::None);
    assert!(sink.take().is_empty());
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn soft_breach_notifies_once_and_keeps_latch() {
    let (mut guard, sink, backend) = guard(vec![
        FakeSource::reporting("runpod", 80.0),
        FakeSource::reporting("cerebrium", 40.0),
    ]);

    let report = guard.run_cycle(now()).await;

    assert_eq!(report.total_dollars, 120.0);
    assert_eq!(report.severity, Severity::Soft);
    assert_eq!(report.latch, MitigationLatch::Armed);

    let messages = sink.take();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("`$120.00`"));
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn hard_breach_trips_kill_switch_exactly_once() {
    let (mut guard, sink, backend) = guard(vec![
        FakeSource::reporting("runpod", 100.0),
        FakeSource::reporting("cerebrium", 60.0),
    ]);

    let report = guard.run_cycle(now()).await;

    assert_eq!(report.total_dollars, 160.0);
    assert_eq!(report.severity, Severity::Hard);
    assert_eq!(report.latch, MitigationLatch::Activated);
    assert_eq!(backend.calls(), vec!["LFMH/ICO", "NNA"]);
    let messages = sink.take();
    assert!(messages[0].contains("URGENT: CODE RED"));
    assert_eq!(messages.len(), 3);

    for _ in 0..3 {
        let report = guard.run_cycle(now()).await;
        assert_eq!(report.severity, Severity::Hard);
        assert_eq!(report.mitigation, MitigationOutcome::AlreadyActivated);

        let messages = sink.take();
        assert_eq!(messages.len(), 1);
        assert!(messages[0].contains("URGENT: CODE RED"));
    }
    assert_eq!(backend.calls().len(), 2);
}

#[tokio::test]
async fn partial_kill_switch_failure_retries_every_target() {
    let (mut guard, _sink, backend) = guard(vec![
        FakeSource::reporting("runpod", 100.0),
        FakeSource::reporting("cerebrium", 60.0),
    ]);
    backend.fail_times("NNA", 1);

    let first = guard.run_cycle(now()).await;
    assert_eq!(first.latch, MitigationLatch::Armed);

    let second = guard.run_cycle(now()).await;
    assert_eq!(second.latch, MitigationLatch::Activated);
    assert_eq!(backend.calls(), vec!["LFMH/ICO", "NNA", "LFMH/ICO", "NNA"]);
}

#[tokio::test]
async fn failed_source_degrades_but_still_evaluates() {
    let (mut guard, sink, backend) = guard(vec![
        FakeSource::failing("runpod"),
        FakeSource::reporting("cerebrium", 50.0),
    ]);

    let report = guard.run_cycle(now()).await;

    assert_eq!(report.total_dollars, 50.0);
    assert!(report.spend.degraded);
    assert_eq!(report.spend.gaps[0].source_id, "runpod");
    assert_eq!(report.spend.gaps[0].reason, GapReason::FetchFailed);
    assert_eq!(report.severity, Severity::Ok);

    let messages = sink.take();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("`runpod`"));
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn report_serializes_for_json_output() {
    let (mut guard, _sink, _backend) = guard(vec![FakeSource::reporting("runpod", 12.5)]);

    let report = guard.run_cycle(now()).await;
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["guard"], "Runpod");
    assert_eq!(json["severity"], "ok");
    assert_eq!(json["mitigation"]["action"], "none");
    assert_eq!(json["spend"]["total_cents"], 1250);
}
