use std::sync::Arc;

use parking_lot::Mutex;
use rk_core::{ColumnId, ProviderEvent, ProviderEventKind, RankingId};
use rk_data::schema::ColumnDesc;
use rk_data::MappingFunction;
use rk_model::column::{CategoricalFilter, NumberFilter};
use rk_model::{ColumnDump, ColumnFilter, ProviderDump, RankingDump, SortCriterionDump};
use rk_provider::{DataProvider, ProviderSettings};
use serde_json::{json, Value};

fn rows() -> Vec<Value> {
    vec![
        json!({"name": "a", "math": 10, "art": 3, "team": "x"}),
        json!({"name": "b", "math": 5, "art": 9, "team": "y"}),
        json!({"name": "c", "math": 2, "art": 4, "team": "x"}),
        json!({"name": "d", "math": 7, "art": null, "team": "y"}),
    ]
}

fn descs() -> Vec<ColumnDesc> {
    vec![
        ColumnDesc::new("string", "name"),
        ColumnDesc::new("number", "math").with_domain(0.0, 10.0),
        ColumnDesc::new("number", "art").with_domain(0.0, 10.0),
        ColumnDesc::new("categorical", "team"),
    ]
}

fn provider() -> DataProvider {
    let settings = ProviderSettings {
        max_sort_criteria: 2,
        ..ProviderSettings::default()
    };
    DataProvider::new(rows(), descs(), settings)
}

/// A session touching every kind of dumped state
fn busy_session() -> (DataProvider, RankingId) {
    let mut provider = provider();
    let id = provider.push_default_ranking().unwrap();
    let ranking = provider.ranking(&id).unwrap();
    let find = |kind: &str, label: &str| {
        ranking
            .flat_columns()
            .into_iter()
            .find(|c| c.type_name() == kind && c.label() == label)
            .map(|c| c.id().clone())
            .unwrap()
    };
    let math = find("number", "math");
    let art = find("number", "art");
    let team = find("categorical", "team");

    let stack = provider.push_desc(&id, "stack").unwrap();
    for desc_ref in ["number@math", "number@art"] {
        let child = provider.create_column_for(desc_ref).unwrap();
        provider.push_child(&id, &stack, child).unwrap();
    }
    provider.set_weights(&id, &stack, &[0.25, 0.75]).unwrap();

    provider
        .set_filter(&id, &math, ColumnFilter::Number(NumberFilter::new(Some(3.0), None, false)))
        .unwrap();
    provider
        .set_filter(&id, &team, ColumnFilter::Categorical(CategoricalFilter::new(["x", "y"], true)))
        .unwrap();
    provider
        .set_mapping(&id, &art, MappingFunction::power(2.0, 0.0, 10.0).unwrap())
        .unwrap();
    provider.set_width(&id, &art, 42.0).unwrap();
    provider.set_compressed(&id, &math, true).unwrap();
    provider.sort_by(&id, &stack, false).unwrap();
    provider.group_by(&id, Some(&team)).unwrap();
    provider.set_selection([2, 0]);
    provider.set_aggregated(&id, "y", true).unwrap();
    (provider, id)
}

#[test]
fn test_dump_restore_dump_is_identity() {
    let (source, _) = busy_session();
    let dump = source.dump();

    let mut target = provider();
    target.restore(&dump).unwrap();
    assert_eq!(target.dump(), dump);
}

#[test]
fn test_dump_survives_json() {
    let (source, id) = busy_session();
    let text = source.dump_json().unwrap();

    let mut target = provider();
    target.restore_json(&text).unwrap();
    assert_eq!(target.dump(), source.dump());
    assert!(target.is_aggregated(&id, "y"));
    assert_eq!(target.selection().rows(), vec![2, 0]);
}

#[test]
fn test_dump_uses_camel_case_and_desc_refs() {
    let (source, _) = busy_session();
    let value = serde_json::to_value(source.dump()).unwrap();
    let ranking = &value["rankings"][0];
    assert!(ranking["sortCriteria"][0]["columnId"].is_string());
    assert_eq!(ranking["sortCriteria"][0]["asc"], json!(false));
    assert_eq!(ranking["columns"][1]["desc"], json!("string@name"));
    assert_eq!(ranking["columns"][0]["desc"], json!("rank"));
}

#[tokio::test]
async fn test_restored_session_sorts_like_the_original() {
    let (mut source, id) = busy_session();
    source.resort(&id).await.unwrap();

    let mut target = provider();
    target.restore(&source.dump()).unwrap();
    target.resort_all().await.unwrap();
    assert_eq!(target.ranking(&id).unwrap().order(), source.ranking(&id).unwrap().order());
    let names: Vec<&str> = target.ranking(&id).unwrap().groups().iter().map(|g| g.group.name.as_str()).collect();
    assert_eq!(names, vec!["x", "y"]);
}

#[test]
fn test_restore_without_rank_column_inserts_one_first() {
    let column = ColumnDump::new(ColumnId::from("col4"), "number@math", 100.0, "math");
    let dump = ProviderDump {
        uid: 5,
        selection: Vec::new(),
        aggregations: Vec::new(),
        rankings: vec![RankingDump {
            id: RankingId::from("rank3"),
            columns: vec![column],
            sort_criteria: vec![SortCriterionDump {
                column_id: ColumnId::from("col4"),
                asc: true,
            }],
            group_criteria: Vec::new(),
        }],
    };

    let mut provider = provider();
    provider.restore(&dump).unwrap();
    let ranking = provider.ranking(&RankingId::from("rank3")).unwrap();
    assert_eq!(ranking.columns()[0].type_name(), "rank");
    assert_eq!(ranking.columns()[0].id().as_str(), "col5");
    assert_eq!(ranking.columns()[1].id().as_str(), "col4");
    assert_eq!(ranking.sort_criteria()[0].column, ColumnId::from("col4"));
    assert_eq!(provider.uid(), 6);
}

#[test]
fn test_restore_skips_unknown_types_and_descriptors() {
    let dump = ProviderDump {
        uid: 9,
        selection: vec![1],
        aggregations: Vec::new(),
        rankings: vec![RankingDump {
            id: RankingId::from("rank0"),
            columns: vec![
                ColumnDump::new(ColumnId::from("col1"), "rank", 40.0, "Rank"),
                ColumnDump::new(ColumnId::from("col2"), "sparkline@math", 100.0, "spark"),
                ColumnDump::new(ColumnId::from("col3"), "number@height", 100.0, "height"),
                ColumnDump::new(ColumnId::from("col4"), "string@name", 100.0, "name"),
            ],
            sort_criteria: vec![SortCriterionDump {
                column_id: ColumnId::from("col3"),
                asc: true,
            }],
            group_criteria: Vec::new(),
        }],
    };

    let mut provider = provider();
    provider.restore(&dump).unwrap();
    let ranking = provider.ranking(&RankingId::from("rank0")).unwrap();
    let ids: Vec<&str> = ranking.columns().iter().map(|c| c.id().as_str()).collect();
    assert_eq!(ids, vec!["col1", "col4"]);
    assert!(ranking.sort_criteria().is_empty());
    assert_eq!(ranking.columns()[0].width(), 40.0);
}

#[test]
fn test_restore_replaces_rankings_and_publishes() {
    let mut provider = provider();
    let old = provider.push_default_ranking().unwrap();
    let events = Arc::new(Mutex::new(Vec::new()));
    let sink = events.clone();
    provider
        .events()
        .subscribe_fn(move |e: &ProviderEvent| sink.lock().push(e.kind.clone()));

    let (source, _) = busy_session();
    let mut dump = source.dump();
    dump.rankings[0].id = RankingId::from("rank40");
    provider.restore(&dump).unwrap();

    assert!(provider.ranking(&old).is_err());
    assert!(provider.ranking(&RankingId::from("rank40")).is_ok());
    let events = events.lock();
    assert_eq!(events.first(), Some(&ProviderEventKind::RankingRemoved(old)));
    assert_eq!(events.last(), Some(&ProviderEventKind::Restored));
    assert!(provider.uid() > 40);
}

#[test]
fn test_restore_into_used_provider_resets_uid() {
    let mut source = provider();
    source.push_default_ranking().unwrap();
    let dump = source.dump();

    let mut target = provider();
    for _ in 0..3 {
        target.push_default_ranking().unwrap();
    }
    assert!(target.uid() > dump.uid);
    target.restore(&dump).unwrap();
    assert_eq!(target.uid(), dump.uid);
    assert_eq!(target.dump(), dump);
}

#[test]
fn test_restore_skips_duplicate_ranking_and_keeps_selection() {
    let mut source = provider();
    source.push_default_ranking().unwrap();
    source.set_selection([1]);
    let mut dump = source.dump();
    dump.rankings.push(dump.rankings[0].clone());

    let mut target = provider();
    target.restore(&dump).unwrap();
    assert_eq!(target.rankings().len(), 1);
    assert_eq!(target.selection().rows(), vec![1]);
}

#[test]
fn test_restore_skips_column_ids_used_by_an_earlier_ranking() {
    let ranking = |id: &str, columns: Vec<ColumnDump>| RankingDump {
        id: RankingId::from(id),
        columns,
        sort_criteria: Vec::new(),
        group_criteria: Vec::new(),
    };
    let dump = ProviderDump {
        uid: 5,
        selection: Vec::new(),
        aggregations: Vec::new(),
        rankings: vec![
            ranking(
                "rank0",
                vec![
                    ColumnDump::new(ColumnId::from("col1"), "rank", 40.0, "Rank"),
                    ColumnDump::new(ColumnId::from("col2"), "string@name", 100.0, "name"),
                ],
            ),
            ranking(
                "rank3",
                vec![
                    ColumnDump::new(ColumnId::from("col4"), "rank", 40.0, "Rank"),
                    ColumnDump::new(ColumnId::from("col2"), "number@math", 100.0, "math"),
                ],
            ),
        ],
    };

    let mut provider = provider();
    provider.restore(&dump).unwrap();
    let second = provider.ranking(&RankingId::from("rank3")).unwrap();
    let ids: Vec<&str> = second.columns().iter().map(|c| c.id().as_str()).collect();
    assert_eq!(ids, vec!["col4"]);
    assert_eq!(provider.ranking(&RankingId::from("rank0")).unwrap().columns().len(), 2);
}
