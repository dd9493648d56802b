use std::sync::Arc;

use anyhow::Result;
use platform_db::DbDealStore;
use products_crm::{
    BoardState, DealSort, DealStore, Resolution, StageId, StageRegistry, TransitionController,
    TransitionError,
};
use suite_tests::{ControlledStore, seed_deals, sqlite_store};

const ROWS: [(&str, &str, &str, i64); 4] = [
    ("Acme renewal", "jane@acme.test", "Qualification", 5_000),
    ("Globex pilot", "hank@globex.test", "Prospecting", 120_000),
    ("Initech upsell", "bill@initech.test", "Needs Analysis", 85_000),
    ("Hooli expansion", "gavin@hooli.test", "Negotiation", 1_250_000),
];

struct Harness {
    registry: Arc<StageRegistry>,
    store: Arc<ControlledStore<DbDealStore>>,
    controller: TransitionController<ControlledStore<DbDealStore>>,
}

async fn harness() -> Result<Harness> {
    let registry = Arc::new(StageRegistry::default());
    let store = Arc::new(ControlledStore::new(sqlite_store().await?));
    seed_deals(store.as_ref(), &registry, &ROWS).await?;
    let controller = TransitionController::new(registry.clone(), store.clone());
    Ok(Harness {
        registry,
        store,
        controller,
    })
}

fn id_of(state: &BoardState, title: &str) -> products_crm::DealId {
    state
        .deals()
        .iter()
        .find(|deal| deal.title == title)
        .map(|deal| deal.id.clone())
        .unwrap_or_else(|| panic!("no deal titled {title}"))
}

#[tokio::test]
async fn drop_moves_deal_and_persists_with_history() -> Result<()> {
    let h = harness().await?;
    let mut state = BoardState::load(h.store.as_ref(), Some(DealSort::Title)).await?;
    let acme = id_of(&state, "Acme renewal");
    let destination = StageId::from("Needs Analysis");

    let pending = state
        .drag(&h.controller, &acme, &destination)?
        .expect("cross-column drop persists");

    // Visible before the store answers.
    let deal = state.deal(&acme).unwrap();
    assert_eq!(deal.stage, destination);
    assert_eq!(deal.probability, 20);
    assert_eq!(deal.value, Some(5_000));
    assert!(state.is_in_flight(&acme));
    let view = state.view(&h.registry, "");
    assert_eq!(view.column(&destination).unwrap().count, 2);
    assert_eq!(view.column(&"Qualification".into()).unwrap().count, 0);

    let resolution = state.resolve(h.store.as_ref(), pending.settle().await).await?;
    assert_eq!(resolution, Resolution::Kept);
    assert_eq!(state.in_flight_count(), 0);

    let stored = h.store.inner().find(&acme).await?.unwrap();
    assert_eq!(stored.stage, destination);
    assert_eq!(stored.probability, 20);
    assert_eq!(stored.contact.as_deref(), Some("jane@acme.test"));

    let history = h.store.inner().stage_history(&acme).await?;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].from_stage, Some(StageId::from("Qualification")));
    assert_eq!(history[0].to_stage, destination);
    Ok(())
}

#[tokio::test]
async fn rejected_write_reloads_the_board() -> Result<()> {
    let h = harness().await?;
    let mut state = BoardState::load(h.store.as_ref(), None).await?;
    let globex = id_of(&state, "Globex pilot");
    h.store.reject_updates(true);

    let pending = state
        .drag(&h.controller, &globex, &"Closed Won".into())?
        .expect("cross-column drop persists");
    assert_eq!(state.deal(&globex).unwrap().probability, 100);

    let settled = pending.settle().await;
    assert!(!settled.is_confirmed());
    let resolution = state.resolve(h.store.as_ref(), settled).await?;
    assert_eq!(resolution, Resolution::Reloaded);

    let deal = state.deal(&globex).unwrap();
    assert_eq!(deal.stage, StageId::from("Prospecting"));
    assert_eq!(deal.probability, 10);
    assert!(h.store.inner().stage_history(&globex).await?.is_empty());
    assert_eq!(state.deals(), h.store.list(None).await?.as_slice());
    Ok(())
}

#[tokio::test]
async fn moves_of_different_deals_overlap() -> Result<()> {
    let h = harness().await?;
    let mut state = BoardState::load(h.store.as_ref(), None).await?;
    let acme = id_of(&state, "Acme renewal");
    let hooli = id_of(&state, "Hooli expansion");
    h.store.hold_updates();

    let first = state
        .drag(&h.controller, &acme, &"Value Proposition".into())?
        .unwrap();
    let second = state
        .drag(&h.controller, &hooli, &"Closed Won".into())?
        .unwrap();
    assert_eq!(state.in_flight_count(), 2);

    let again = state.drag(&h.controller, &acme, &"Negotiation".into());
    assert!(matches!(again, Err(TransitionError::MoveInFlight(ref id)) if *id == acme));
    assert_eq!(state.deal(&acme).unwrap().stage, StageId::from("Value Proposition"));

    h.store.release_all();
    for pending in [second, first] {
        let resolution = state.resolve(h.store.as_ref(), pending.settle().await).await?;
        assert_eq!(resolution, Resolution::Kept);
    }
    assert_eq!(state.in_flight_count(), 0);
    assert_eq!(h.store.update_calls(), 2);

    let view = state.view(&h.registry, "");
    let won = view.column(&"Closed Won".into()).unwrap();
    assert_eq!(won.count, 1);
    assert_eq!(won.expected_value, 1_250_000);
    Ok(())
}

#[tokio::test]
async fn failed_move_reload_keeps_other_pending_moves() -> Result<()> {
    let h = harness().await?;
    let mut state = BoardState::load(h.store.as_ref(), None).await?;
    let acme = id_of(&state, "Acme renewal");
    let globex = id_of(&state, "Globex pilot");
    h.store.reject_deal(&acme);
    h.store.hold_deal(&globex);

    let rejected = state
        .drag(&h.controller, &acme, &"Closed Lost".into())?
        .unwrap();
    let held = state
        .drag(&h.controller, &globex, &"Closed Won".into())?
        .unwrap();

    let resolution = state.resolve(h.store.as_ref(), rejected.settle().await).await?;
    assert_eq!(resolution, Resolution::Reloaded);
    assert_eq!(state.deal(&acme).unwrap().stage, StageId::from("Qualification"));
    let view = state.view(&h.registry, "");
    assert_eq!(view.column(&"Closed Won".into()).unwrap().count, 1);
    assert!(state.is_in_flight(&globex));

    h.store.release_all();
    let resolution = state.resolve(h.store.as_ref(), held.settle().await).await?;
    assert_eq!(resolution, Resolution::Kept);
    let deal = state.deal(&globex).unwrap();
    assert_eq!(deal.stage, StageId::from("Closed Won"));
    assert_eq!(deal.probability, 100);
    assert_eq!(state.deals(), h.store.list(None).await?.as_slice());
    Ok(())
}

#[tokio::test]
async fn invalid_and_same_column_drops_never_reach_the_store() -> Result<()> {
    let h = harness().await?;
    let mut state = BoardState::load(h.store.as_ref(), None).await?;
    let before = state.deals().to_vec();
    let initech = id_of(&state, "Initech upsell");

    let err = state
        .drag(&h.controller, &initech, &"Archived".into())
        .unwrap_err();
    assert!(matches!(err, TransitionError::InvalidStage(_)));
    assert_eq!(state.deals(), before.as_slice());

    let err = state
        .drag(&h.controller, &"missing".into(), &"Negotiation".into())
        .unwrap_err();
    assert!(matches!(err, TransitionError::DealNotFound(_)));

    let unchanged = state.drag(&h.controller, &initech, &"Needs Analysis".into())?;
    assert!(unchanged.is_none());
    assert_eq!(state.deals(), before.as_slice());
    assert_eq!(h.store.update_calls(), 0);
    Ok(())
}

#[tokio::test]
async fn board_groups_and_filters_stored_deals() -> Result<()> {
    let h = harness().await?;
    let state = BoardState::load(h.store.as_ref(), Some(DealSort::ValueDesc)).await?;

    let view = state.view(&h.registry, "");
    assert_eq!(view.columns.len(), h.registry.len());
    assert_eq!(view.total_count, ROWS.len());
    assert_eq!(view.total_value, 5_000 + 120_000 + 85_000 + 1_250_000);
    assert!(view.uncategorized.is_empty());

    let filtered = state.view(&h.registry, "GLOBEX");
    assert_eq!(filtered.total_count, 1);
    assert_eq!(filtered.column(&"Prospecting".into()).unwrap().count, 1);
    assert_eq!(filtered.columns.len(), h.registry.len());

    let by_contact = state.view(&h.registry, "initech.test");
    assert_eq!(by_contact.column(&"Needs Analysis".into()).unwrap().count, 1);

    assert_eq!(state.view(&h.registry, "  GLOBEX ").total_count, 0);
    assert_eq!(state.view(&h.registry, " pilot").total_count, 1);
    Ok(())
}
