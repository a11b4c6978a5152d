use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rk_core::{ColumnId, ProviderEvent, ProviderEventKind, RankingEvent, RankingEventKind, RankingId};
use rk_data::schema::ColumnDesc;
use rk_model::column::NumberFilter;
use rk_model::ColumnFilter;
use rk_provider::{BlockingSortBackend, DataProvider, DelayedSortBackend, ProviderSettings};
use serde_json::{json, Value};

fn rows() -> Vec<Value> {
    [10, 5, 2, 7].iter().map(|v| json!({ "v": v, "w": 1 })).collect()
}

fn provider() -> DataProvider {
    let descs = vec![
        ColumnDesc::new("number", "v").with_domain(0.0, 10.0),
        ColumnDesc::new("number", "w").with_domain(0.0, 10.0),
    ];
    DataProvider::new(rows(), descs, ProviderSettings::default())
}

fn column(provider: &DataProvider, ranking: &RankingId, label: &str) -> ColumnId {
    provider
        .ranking(ranking)
        .unwrap()
        .columns()
        .iter()
        .find(|c| c.label() == label)
        .map(|c| c.id().clone())
        .unwrap()
}

fn record_ranking_events(provider: &DataProvider) -> Arc<Mutex<Vec<RankingEventKind>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    provider
        .events()
        .subscribe_fn(move |e: &RankingEvent| sink.lock().push(e.kind.clone()));
    events
}

#[tokio::test(start_paused = true)]
async fn test_stale_sort_result_is_discarded() {
    let mut provider = provider().with_backend(Arc::new(DelayedSortBackend::new(Duration::from_millis(100))));
    let id = provider.push_default_ranking().unwrap();
    let v = column(&provider, &id, "v");
    let events = record_ranking_events(&provider);

    provider.sort_by(&id, &v, true).unwrap();
    let first = provider.request_sort(&id).unwrap();
    provider.sort_by(&id, &v, false).unwrap();
    let second = provider.request_sort(&id).unwrap();
    assert_eq!((first.generation(), second.generation()), (1, 2));

    let (first, second) = tokio::join!(first.resolve(), second.resolve());
    // the older request finishing last must not win
    assert!(provider.commit(second.unwrap()));
    assert!(!provider.commit(first.unwrap()));

    let ranking = provider.ranking(&id).unwrap();
    assert_eq!(ranking.order(), vec![0, 3, 1, 2]);
    assert_eq!(ranking.committed_generation(), 2);
    let events = events.lock();
    assert!(events.contains(&RankingEventKind::OrderChanged { generation: 2, rows: 4 }));
    assert_eq!(events.last(), Some(&RankingEventKind::StaleOrderDiscarded { generation: 1 }));
}

#[tokio::test(start_paused = true)]
async fn test_stale_result_arriving_first_is_discarded_too() {
    let mut provider = provider().with_backend(Arc::new(DelayedSortBackend::new(Duration::from_millis(10))));
    let id = provider.push_default_ranking().unwrap();
    let v = column(&provider, &id, "v");

    provider.sort_by(&id, &v, true).unwrap();
    let first = provider.request_sort(&id).unwrap();
    provider.sort_by(&id, &v, false).unwrap();
    let second = provider.request_sort(&id).unwrap();

    assert!(!provider.commit(first.resolve().await.unwrap()));
    assert!(provider.ranking(&id).unwrap().is_pending());
    assert!(provider.commit(second.resolve().await.unwrap()));
    assert_eq!(provider.ranking(&id).unwrap().order(), vec![0, 3, 1, 2]);
}

#[tokio::test(start_paused = true)]
async fn test_burst_of_changes_sorts_once() {
    let mut provider = provider();
    let id = provider.push_default_ranking().unwrap();
    let v = column(&provider, &id, "v");
    let w = column(&provider, &id, "w");
    provider.settle().await.unwrap();
    let events = record_ranking_events(&provider);

    provider.sort_by(&id, &v, true).unwrap();
    provider
        .set_filter(&id, &w, ColumnFilter::Number(NumberFilter::new(Some(0.0), None, true)))
        .unwrap();
    provider.set_domain(&id, &v, 0.0, 20.0).unwrap();
    tokio::time::advance(Duration::from_millis(20)).await;
    provider.toggle_sort(&id, &v).unwrap();

    let start = tokio::time::Instant::now();
    let sorted = provider.settle().await.unwrap();
    assert_eq!(sorted, vec![id.clone()]);
    assert!(start.elapsed() >= Duration::from_millis(50));

    let commits = events
        .lock()
        .iter()
        .filter(|e| matches!(e, RankingEventKind::OrderChanged { .. }))
        .count();
    assert_eq!(commits, 1);
    assert_eq!(provider.ranking(&id).unwrap().order(), vec![0, 3, 1, 2]);
    assert!(provider.settle().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_blocking_backend_matches_local_sort() {
    let mut local = provider();
    let mut blocking = provider().with_backend(Arc::new(BlockingSortBackend));
    for p in [&mut local, &mut blocking] {
        let id = p.push_default_ranking().unwrap();
        let v = column(p, &id, "v");
        p.sort_by(&id, &v, true).unwrap();
        p.resort(&id).await.unwrap();
    }
    let id = RankingId::from("rank0");
    assert_eq!(local.ranking(&id).unwrap().order(), vec![2, 1, 3, 0]);
    assert_eq!(blocking.ranking(&id).unwrap().order(), local.ranking(&id).unwrap().order());
}

#[tokio::test]
async fn test_removed_ranking_drops_its_sort() {
    let mut provider = provider();
    let id = provider.push_default_ranking().unwrap();
    let ticket = provider.request_sort(&id).unwrap();
    provider.remove_ranking(&id).unwrap();
    assert!(!provider.commit(ticket.resolve().await.unwrap()));
}

#[test]
fn test_selection_and_aggregation_events() {
    let mut provider = DataProvider::new(
        rows(),
        Vec::new(),
        ProviderSettings {
            multi_selection: false,
            ..ProviderSettings::default()
        },
    );
    let id = provider.push_ranking().unwrap();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    provider
        .events()
        .subscribe_fn(move |e: &ProviderEvent| sink.lock().push(e.kind.clone()));

    assert!(provider.toggle_selection(1));
    assert!(provider.toggle_selection(2));
    assert!(!provider.toggle_selection(2));
    assert!(!provider.clear_selection());
    assert!(provider.set_aggregated(&id, "Default", true).unwrap());

    let events = events.lock();
    assert_eq!(
        *events,
        vec![
            ProviderEventKind::SelectionChanged { selected: vec![1] },
            ProviderEventKind::SelectionChanged { selected: vec![2] },
            ProviderEventKind::SelectionChanged { selected: vec![] },
            ProviderEventKind::AggregationChanged {
                ranking: id.clone(),
                group: "Default".to_string(),
                collapsed: true,
            },
        ]
    );
}

#[test]
fn test_clone_ranking_keeps_ids_unique() {
    let mut provider = provider();
    let id = provider.push_default_ranking().unwrap();
    let copy = provider.clone_ranking(&id, false).unwrap();

    let mut ids: Vec<String> = provider
        .rankings()
        .iter()
        .flat_map(|r| r.flat_columns().into_iter().map(|c| c.id().to_string()))
        .collect();
    let total = ids.len();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), total);
    assert!(provider.is_dirty(&copy));
}
