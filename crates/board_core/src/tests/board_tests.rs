use super::*;
use crate::test_support::{now, overdue, risk, unavailable, FakeGateway, RecordingNotifier};
use shared::protocol::Severity;

struct Harness {
    board: RiskBoard,
    gateway: Arc<FakeGateway>,
    notifier: Arc<RecordingNotifier>,
}

fn harness(risks: Vec<Risk>, gateway: FakeGateway, policy: RetryPolicy) -> Harness {
    let gateway = Arc::new(gateway);
    let notifier = Arc::new(RecordingNotifier::default());
    let board = RiskBoard::new(
        BoardContext {
            tenant_id: TenantId::new(),
        },
        risks,
        gateway.clone(),
        notifier.clone(),
        policy,
    )
    .with_clock(Arc::new(FixedClock(now())));
    Harness {
        board,
        gateway,
        notifier,
    }
}

fn status_of(board: &RiskBoard, risk_id: RiskId) -> RiskStatus {
    board.risk(risk_id).expect("risk on board").status
}

#[tokio::test]
async fn dropping_on_a_column_moves_and_persists() {
    let assessed = risk("Fornecedor crítico", RiskStatus::Avaliado);
    let mut h = harness(
        vec![assessed.clone()],
        FakeGateway::default(),
        RetryPolicy::default(),
    );

    h.board
        .start_drag(assessed.id, DragSource::Pointer)
        .expect("start");
    let outcome = h
        .board
        .drop_on(DropTarget::Column(RiskStatus::EmTratamento))
        .expect("drop");
    assert!(matches!(outcome, DropOutcome::Transition { .. }));

    // Visible before the write resolves.
    assert_eq!(status_of(&h.board, assessed.id), RiskStatus::EmTratamento);
    assert_eq!(
        h.board.columns().column_ids(RiskStatus::EmTratamento),
        vec![assessed.id]
    );

    let toast = &h.notifier.seen()[0];
    assert_eq!(toast.severity, Severity::Success);
    assert!(toast.message.contains("Fornecedor crítico"));
    assert!(toast.message.contains("Em Tratamento"));

    let reconciled = h.board.settle().await;
    assert_eq!(
        reconciled,
        vec![Reconciliation::Committed {
            risk_id: assessed.id,
            status: RiskStatus::EmTratamento,
        }]
    );
    assert_eq!(
        h.gateway.calls(),
        vec![(assessed.id, RiskStatus::EmTratamento)]
    );
    assert!(!h.board.has_pending_writes());
}

#[tokio::test]
async fn dropping_within_the_same_column_writes_nothing() {
    let first = risk("a", RiskStatus::Avaliado);
    let second = risk("b", RiskStatus::Avaliado);
    let mut h = harness(
        vec![first.clone(), second.clone()],
        FakeGateway::default(),
        RetryPolicy::default(),
    );

    h.board
        .start_drag(first.id, DragSource::Pointer)
        .expect("start");
    let outcome = h
        .board
        .drop_on(DropTarget::Card(second.id))
        .expect("drop");

    assert_eq!(outcome, DropOutcome::Unchanged { risk_id: first.id });
    assert!(!h.board.has_pending_writes());
    assert!(h.notifier.seen().is_empty());
    tokio::task::yield_now().await;
    assert!(h.gateway.calls().is_empty());
}

#[tokio::test]
async fn same_status_change_is_a_no_op() {
    let monitored = risk("a", RiskStatus::Monitorado);
    let mut h = harness(
        vec![monitored.clone()],
        FakeGateway::default(),
        RetryPolicy::default(),
    );
    let before = h.board.columns().to_snapshot();

    let outcome = h
        .board
        .change_status(monitored.id, RiskStatus::Monitorado)
        .expect("change");

    assert_eq!(outcome, ChangeOutcome::Unchanged);
    assert_eq!(
        serde_json::to_value(before).expect("json"),
        serde_json::to_value(h.board.columns().to_snapshot()).expect("json")
    );
    tokio::task::yield_now().await;
    assert!(h.gateway.calls().is_empty());
    assert!(h.notifier.seen().is_empty());
}

#[tokio::test]
async fn unknown_risk_is_rejected_without_side_effects() {
    let mut h = harness(
        vec![risk("a", RiskStatus::Identificado)],
        FakeGateway::default(),
        RetryPolicy::default(),
    );
    let missing = RiskId::new();

    assert_eq!(
        h.board.change_status(missing, RiskStatus::Fechado),
        Err(BoardError::RiskNotFound(missing))
    );
    assert!(!h.board.has_pending_writes());
    assert!(h.notifier.seen().is_empty());
}

#[tokio::test]
async fn rejected_write_rolls_back_and_notifies() {
    let identified = risk("Phishing", RiskStatus::Identificado);
    let gateway = FakeGateway::failing_with([GatewayError::Rejected {
        risk_id: identified.id,
        status: RiskStatus::Fechado,
        reason: "policy violation".into(),
    }]);
    let mut h = harness(vec![identified.clone()], gateway, RetryPolicy::default());

    h.board
        .change_status(identified.id, RiskStatus::Fechado)
        .expect("change");
    assert_eq!(status_of(&h.board, identified.id), RiskStatus::Fechado);

    let reconciled = h.board.settle().await;
    assert_eq!(
        reconciled,
        vec![Reconciliation::RolledBack {
            risk_id: identified.id,
            restored: RiskStatus::Identificado,
        }]
    );
    assert_eq!(status_of(&h.board, identified.id), RiskStatus::Identificado);

    let seen = h.notifier.seen();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[1].severity, Severity::Error);
    assert!(seen[1].message.contains("Phishing"));
    assert!(seen[1].message.contains("Identificado"));
}

#[tokio::test(start_paused = true)]
async fn transient_failure_is_retried_before_committing() {
    let assessed = risk("a", RiskStatus::Avaliado);
    let mut h = harness(
        vec![assessed.clone()],
        FakeGateway::failing_with([unavailable(), unavailable()]),
        RetryPolicy::default(),
    );

    h.board
        .change_status(assessed.id, RiskStatus::Monitorado)
        .expect("change");
    let reconciled = h.board.settle().await;

    assert_eq!(
        reconciled,
        vec![Reconciliation::Committed {
            risk_id: assessed.id,
            status: RiskStatus::Monitorado,
        }]
    );
    assert_eq!(status_of(&h.board, assessed.id), RiskStatus::Monitorado);
    assert_eq!(h.gateway.calls().len(), 3);
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_roll_back() {
    let assessed = risk("a", RiskStatus::Avaliado);
    let mut h = harness(
        vec![assessed.clone()],
        FakeGateway::failing_with([unavailable(), unavailable()]),
        RetryPolicy {
            max_attempts: 2,
            ..RetryPolicy::default()
        },
    );

    h.board
        .change_status(assessed.id, RiskStatus::Monitorado)
        .expect("change");
    h.board.settle().await;

    assert_eq!(status_of(&h.board, assessed.id), RiskStatus::Avaliado);
    assert_eq!(h.gateway.calls().len(), 2);
}

#[tokio::test]
async fn rapid_moves_persist_the_last_intent() {
    let identified = risk("a", RiskStatus::Identificado);
    let mut h = harness(
        vec![identified.clone()],
        FakeGateway::default(),
        RetryPolicy::default(),
    );

    for status in [
        RiskStatus::Avaliado,
        RiskStatus::EmTratamento,
        RiskStatus::Monitorado,
    ] {
        h.board
            .change_status(identified.id, status)
            .expect("change");
    }
    h.board.settle().await;

    let calls = h.gateway.calls();
    assert_eq!(calls.last(), Some(&(identified.id, RiskStatus::Monitorado)));
    assert!(!calls.contains(&(identified.id, RiskStatus::EmTratamento)));
    assert_eq!(status_of(&h.board, identified.id), RiskStatus::Monitorado);
    assert!(!h.board.has_pending_writes());
}

#[tokio::test]
async fn failed_stale_write_does_not_undo_newer_intent() {
    let identified = risk("a", RiskStatus::Identificado);
    let gateway = FakeGateway::failing_with([GatewayError::Rejected {
        risk_id: identified.id,
        status: RiskStatus::Avaliado,
        reason: "conflict".into(),
    }]);
    let mut h = harness(vec![identified.clone()], gateway, RetryPolicy::default());

    h.board
        .change_status(identified.id, RiskStatus::Avaliado)
        .expect("first");
    h.board
        .change_status(identified.id, RiskStatus::Fechado)
        .expect("second");
    let reconciled = h.board.settle().await;

    assert_eq!(reconciled[0], Reconciliation::Ignored);
    assert_eq!(
        reconciled.last(),
        Some(&Reconciliation::Committed {
            risk_id: identified.id,
            status: RiskStatus::Fechado,
        })
    );
    assert_eq!(status_of(&h.board, identified.id), RiskStatus::Fechado);
}

#[tokio::test]
async fn outcomes_for_removed_risks_are_ignored() {
    let identified = risk("a", RiskStatus::Identificado);
    let mut h = harness(
        vec![identified.clone()],
        FakeGateway::default(),
        RetryPolicy::default(),
    );

    h.board
        .change_status(identified.id, RiskStatus::Avaliado)
        .expect("change");
    let removed = h.board.remove_risk(identified.id).expect("removed");
    assert_eq!(removed.id, identified.id);
    assert!(!h.board.has_pending_writes());

    assert_eq!(h.board.next_outcome().await, Some(Reconciliation::Ignored));
    assert!(h.board.risks().is_empty());
}

#[tokio::test]
async fn drain_outcomes_applies_delivered_results_without_waiting() {
    let identified = risk("a", RiskStatus::Identificado);
    let mut h = harness(
        vec![identified.clone()],
        FakeGateway::default(),
        RetryPolicy::default(),
    );

    assert!(h.board.drain_outcomes().is_empty());
    h.board
        .change_status(identified.id, RiskStatus::Avaliado)
        .expect("change");
    assert!(h.board.is_pending(identified.id));

    tokio::task::yield_now().await;
    let applied = h.board.drain_outcomes();
    assert_eq!(applied.len(), 1);
    assert!(!h.board.is_pending(identified.id));
}

#[tokio::test]
async fn overdue_flips_when_moved_to_closed() {
    let monitored = overdue(risk("a", RiskStatus::Monitorado));
    let mut h = harness(
        vec![monitored.clone()],
        FakeGateway::default(),
        RetryPolicy::default(),
    );
    h.board.set_filter(RiskFilter::default().overdue_only());
    assert_eq!(h.board.filtered().len(), 1);

    h.board
        .change_status(monitored.id, RiskStatus::Fechado)
        .expect("change");

    assert!(h.board.filtered().is_empty());
    assert_eq!(
        h.board.risk(monitored.id).expect("risk").due_date,
        monitored.due_date
    );
}

#[tokio::test]
async fn search_narrows_columns() {
    let lgpd = risk("LGPD Compliance Risk", RiskStatus::Avaliado);
    let other = risk("Câmbio", RiskStatus::Avaliado);
    let mut h = harness(
        vec![lgpd.clone(), other],
        FakeGateway::default(),
        RetryPolicy::default(),
    );

    h.board.set_search("lgpd");
    assert_eq!(
        h.board.columns().column_ids(RiskStatus::Avaliado),
        vec![lgpd.id]
    );
}

#[tokio::test]
async fn load_reads_tenant_risks_from_gateway() {
    let risks = vec![
        risk("a", RiskStatus::Identificado),
        risk("b", RiskStatus::Fechado),
    ];
    let board = RiskBoard::load(
        BoardContext {
            tenant_id: TenantId::new(),
        },
        Arc::new(FakeGateway::with_risks(risks.clone())),
        Arc::new(RecordingNotifier::default()),
        RetryPolicy::default(),
    )
    .await
    .expect("load");

    assert_eq!(board.risks(), risks.as_slice());
}

#[tokio::test]
async fn insert_risk_replaces_existing_record() {
    let original = risk("a", RiskStatus::Identificado);
    let mut h = harness(
        vec![original.clone()],
        FakeGateway::default(),
        RetryPolicy::default(),
    );

    let mut refreshed = original.clone();
    refreshed.name = "a (renamed)".into();
    h.board.insert_risk(refreshed);
    h.board.insert_risk(risk("b", RiskStatus::Avaliado));

    assert_eq!(h.board.risks().len(), 2);
    assert_eq!(h.board.risk(original.id).expect("risk").name, "a (renamed)");
}

#[tokio::test]
async fn refresh_during_pending_write_becomes_rollback_target() {
    let identified = risk("a", RiskStatus::Identificado);
    let gateway = FakeGateway::failing_with([GatewayError::Rejected {
        risk_id: identified.id,
        status: RiskStatus::Avaliado,
        reason: "stale".into(),
    }]);
    let mut h = harness(vec![identified.clone()], gateway, RetryPolicy::default());

    h.board
        .change_status(identified.id, RiskStatus::Avaliado)
        .expect("change");
    let mut refreshed = identified.clone();
    refreshed.status = RiskStatus::Monitorado;
    h.board.insert_risk(refreshed);
    assert_eq!(status_of(&h.board, identified.id), RiskStatus::Avaliado);

    assert_eq!(
        h.board.settle().await,
        vec![Reconciliation::RolledBack {
            risk_id: identified.id,
            restored: RiskStatus::Monitorado,
        }]
    );
    assert_eq!(status_of(&h.board, identified.id), RiskStatus::Monitorado);
}

#[tokio::test]
async fn refresh_during_pending_write_keeps_optimistic_status_on_commit() {
    let identified = risk("a", RiskStatus::Identificado);
    let mut h = harness(
        vec![identified.clone()],
        FakeGateway::default(),
        RetryPolicy::default(),
    );

    h.board
        .change_status(identified.id, RiskStatus::Avaliado)
        .expect("change");
    let mut refreshed = identified.clone();
    refreshed.name = "a (renamed)".into();
    h.board.insert_risk(refreshed);

    assert_eq!(
        h.board.settle().await,
        vec![Reconciliation::Committed {
            risk_id: identified.id,
            status: RiskStatus::Avaliado,
        }]
    );
    let risk = h.board.risk(identified.id).expect("risk");
    assert_eq!(risk.status, RiskStatus::Avaliado);
    assert_eq!(risk.name, "a (renamed)");
}
