use ahash::AHashMap;
use serde::Serialize;

/// Name of the partition collecting rows without a group value
pub const MISSING_GROUP: &str = "Missing values";

/// Name of the single partition of an ungrouped ranking
pub const DEFAULT_GROUP: &str = "Default";

const MISSING_COLOR: &str = "#dddddd";
const DEFAULT_COLOR: &str = "#808080";

/// Separator joining the names of a multi-criteria group
const JOIN: &str = " ∩ ";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct Group {
    pub name: String,
    pub color: String,
    /// Set only for the reserved partition of rows without a value; a real
    /// value spelled like [`MISSING_GROUP`] is an ordinary group
    #[serde(skip)]
    missing: bool,
}

impl Group {
    pub fn new(name: impl Into<String>, color: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            color: color.into(),
            missing: false,
        }
    }

    pub fn missing() -> Self {
        Self {
            missing: true,
            ..Self::new(MISSING_GROUP, MISSING_COLOR)
        }
    }

    pub fn default_group() -> Self {
        Self::new(DEFAULT_GROUP, DEFAULT_COLOR)
    }

    pub fn is_missing(&self) -> bool {
        self.missing
    }

    /// Combine the groups of several criteria; missing only when every
    /// part is missing
    pub fn join(parts: Vec<Group>) -> Group {
        if parts.iter().all(Group::is_missing) {
            return Group::missing();
        }
        if parts.len() == 1 {
            return parts.into_iter().next().unwrap_or_else(Group::missing);
        }
        let color = parts
            .iter()
            .find(|g| !g.is_missing())
            .map(|g| g.color.clone())
            .unwrap_or_else(|| MISSING_COLOR.to_string());
        let name = parts.iter().map(|g| g.name.as_str()).collect::<Vec<_>>().join(JOIN);
        Group::new(name, color)
    }
}

/// A group together with its rows in sorted order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderedGroup {
    pub group: Group,
    pub order: Vec<usize>,
}

/// Partition rows by group, keeping first-seen group order and moving the
/// missing partition last
pub fn partition(rows: impl IntoIterator<Item = usize>, mut key: impl FnMut(usize) -> Group) -> Vec<(Group, Vec<usize>)> {
    let mut slots: AHashMap<Group, usize> = AHashMap::new();
    let mut partitions: Vec<(Group, Vec<usize>)> = Vec::new();
    let mut missing: Vec<usize> = Vec::new();
    for row in rows {
        let group = key(row);
        if group.is_missing() {
            missing.push(row);
            continue;
        }
        match slots.get(&group) {
            Some(&slot) => partitions[slot].1.push(row),
            None => {
                slots.insert(group.clone(), partitions.len());
                partitions.push((group, vec![row]));
            }
        }
    }
    if !missing.is_empty() {
        partitions.push((Group::missing(), missing));
    }
    partitions
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_keeps_first_seen_order_and_missing_last() {
        let labels = ["b", "", "a", "b", "a", ""];
        let parts = partition(0..labels.len(), |i| match labels[i] {
            "" => Group::missing(),
            name => Group::new(name, "#000"),
        });
        let names: Vec<&str> = parts.iter().map(|(g, _)| g.name.as_str()).collect();
        assert_eq!(names, vec!["b", "a", MISSING_GROUP]);
        assert_eq!(parts[0].1, vec![0, 3]);
        assert_eq!(parts[2].1, vec![1, 5]);
    }

    #[test]
    fn test_join() {
        let joined = Group::join(vec![Group::new("x", "#111"), Group::missing()]);
        assert_eq!(joined.name, format!("x{}{}", JOIN, MISSING_GROUP));
        assert_eq!(joined.color, "#111");
        assert!(Group::join(vec![Group::missing(), Group::missing()]).is_missing());
        assert_eq!(Group::join(vec![Group::new("y", "#222")]).name, "y");
    }

    #[test]
    fn test_value_named_like_missing_group_is_its_own_partition() {
        let labels = [MISSING_GROUP, "a", ""];
        let parts = partition(0..labels.len(), |i| match labels[i] {
            "" => Group::missing(),
            name => Group::new(name, "#000"),
        });
        let rows: Vec<(&str, bool, Vec<usize>)> = parts
            .iter()
            .map(|(g, rows)| (g.name.as_str(), g.is_missing(), rows.clone()))
            .collect();
        assert_eq!(
            rows,
            vec![
                (MISSING_GROUP, false, vec![0]),
                ("a", false, vec![1]),
                (MISSING_GROUP, true, vec![2]),
            ]
        );
    }
}
