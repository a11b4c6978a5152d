//! Session dump format
//!
//! Dumps carry mutable state only. Static configuration is referenced by a
//! descriptor reference (`<type>@<column>`) and resolved by the provider.

use rk_core::{ColumnId, RankingId};
use rk_data::schema::MappingDesc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

fn is_false(b: &bool) -> bool {
    !*b
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDump {
    pub id: ColumnId,
    pub desc: String,
    pub width: f64,
    #[serde(default)]
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub map: Option<MappingDesc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color_mapping: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub compressed: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub hidden: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renderer: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub threshold: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_grouper: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weights: Option<Vec<f64>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<ColumnDump>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reduce: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub script: Option<String>,
}

impl ColumnDump {
    pub fn new(id: ColumnId, desc: impl Into<String>, width: f64, label: impl Into<String>) -> Self {
        Self {
            id,
            desc: desc.into(),
            width,
            label: label.into(),
            filter: None,
            sort_method: None,
            map: None,
            color_mapping: None,
            compressed: false,
            hidden: false,
            renderer: None,
            threshold: None,
            date_grouper: None,
            weights: None,
            children: Vec::new(),
            reduce: None,
            script: None,
        }
    }

    /// Type part of the descriptor reference
    pub fn type_name(&self) -> &str {
        match self.desc.split_once('@') {
            Some((kind, _)) => kind,
            None => &self.desc,
        }
    }

    /// Largest numeric suffix among this column's ids, children included
    pub(crate) fn max_id_suffix(&self) -> Option<u64> {
        let own = id_suffix(self.id.as_str());
        self.children.iter().filter_map(ColumnDump::max_id_suffix).chain(own).max()
    }
}

fn id_suffix(id: &str) -> Option<u64> {
    let digits = id.trim_start_matches(|c: char| !c.is_ascii_digit());
    digits.parse().ok()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortCriterionDump {
    pub column_id: ColumnId,
    pub asc: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankingDump {
    pub id: RankingId,
    pub columns: Vec<ColumnDump>,
    #[serde(default)]
    pub sort_criteria: Vec<SortCriterionDump>,
    #[serde(default)]
    pub group_criteria: Vec<ColumnId>,
}

impl RankingDump {
    /// Largest numeric id suffix in use, rankings and columns alike
    pub fn max_id_suffix(&self) -> Option<u64> {
        self.columns
            .iter()
            .filter_map(ColumnDump::max_id_suffix)
            .chain(id_suffix(self.id.as_str()))
            .max()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderDump {
    pub uid: u64,
    #[serde(default)]
    pub selection: Vec<usize>,
    #[serde(default)]
    pub aggregations: Vec<String>,
    #[serde(default)]
    pub rankings: Vec<RankingDump>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_column_dump_wire_format() {
        let mut dump = ColumnDump::new(ColumnId::from("col3"), "number@a", 100.0, "a");
        dump.sort_method = Some("median".to_string());
        dump.color_mapping = Some("#ff0000".to_string());
        let value = serde_json::to_value(&dump).unwrap();
        assert_eq!(
            value,
            json!({
                "id": "col3",
                "desc": "number@a",
                "width": 100.0,
                "label": "a",
                "sortMethod": "median",
                "colorMapping": "#ff0000"
            })
        );
        assert_eq!(dump.type_name(), "number");
    }

    #[test]
    fn test_provider_dump_defaults() {
        let dump: ProviderDump = serde_json::from_value(json!({"uid": 4})).unwrap();
        assert_eq!(dump.uid, 4);
        assert!(dump.rankings.is_empty());
    }

    #[test]
    fn test_ranking_dump_criteria_format() {
        let dump: RankingDump = serde_json::from_value(json!({
            "id": "rank0",
            "columns": [{"id": "col1", "desc": "rank", "width": 50}],
            "sortCriteria": [{"columnId": "col1", "asc": false}],
            "groupCriteria": []
        }))
        .unwrap();
        assert!(!dump.sort_criteria[0].asc);
        assert_eq!(dump.max_id_suffix(), Some(1));
    }
}
