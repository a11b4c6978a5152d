//! Descriptor `type` string to column constructor registry

use std::fmt;
use std::sync::Arc;

use ahash::AHashMap;
use rk_core::ColumnId;
use rk_data::schema::ColumnDesc;

use crate::column::{
    BooleanColumn, BooleansColumn, BoxPlotColumn, CategoricalColumn, CategoricalsColumn, Column, ColumnKind,
    DateColumn, ImposeColumn, NestedColumn, NumberColumn, NumbersColumn, ReduceColumn, ReduceOp, ScriptColumn,
    SelectionColumn, StackColumn, StringColumn,
};
use crate::dump::ColumnDump;
use crate::ModelError;

/// Builds the variant state for a descriptor
pub type Constructor = fn(&ColumnDesc) -> Result<ColumnKind, ModelError>;

/// Column types that do not read a row attribute
pub const VIRTUAL_TYPES: &[&str] = &["rank", "selection", "aggregate", "stack", "nested", "impose", "reduce", "script"];

#[derive(Clone)]
pub struct ColumnFactory {
    constructors: AHashMap<String, Constructor>,
}

impl fmt::Debug for ColumnFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut types: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        types.sort_unstable();
        f.debug_struct("ColumnFactory").field("types", &types).finish()
    }
}

impl Default for ColumnFactory {
    fn default() -> Self {
        let mut factory = Self::empty();
        factory.register("rank", |_| Ok(ColumnKind::Rank));
        factory.register("selection", |_| Ok(ColumnKind::Selection(SelectionColumn::default())));
        factory.register("aggregate", |_| Ok(ColumnKind::Aggregate));
        factory.register("string", |d| Ok(ColumnKind::String(StringColumn::from_desc(d))));
        factory.register("boolean", |d| Ok(ColumnKind::Boolean(BooleanColumn::from_desc(d))));
        factory.register("categorical", |d| Ok(ColumnKind::Categorical(CategoricalColumn::from_desc(d, false)?)));
        factory.register("ordinal", |d| Ok(ColumnKind::Categorical(CategoricalColumn::from_desc(d, true)?)));
        factory.register("date", |d| Ok(ColumnKind::Date(DateColumn::from_desc(d))));
        factory.register("number", |d| Ok(ColumnKind::Number(NumberColumn::from_desc(d)?)));
        factory.register("boxplot", |d| Ok(ColumnKind::BoxPlot(BoxPlotColumn::from_desc(d)?)));
        factory.register("numbers", |d| Ok(ColumnKind::Numbers(NumbersColumn::from_desc(d)?)));
        factory.register("booleans", |d| Ok(ColumnKind::Booleans(BooleansColumn::from_desc(d))));
        factory.register("categoricals", |d| Ok(ColumnKind::Categoricals(CategoricalsColumn::from_desc(d)?)));
        factory.register("stack", |_| Ok(ColumnKind::Stack(StackColumn::default())));
        factory.register("nested", |_| Ok(ColumnKind::Nested(NestedColumn::default())));
        factory.register("impose", |_| Ok(ColumnKind::Impose(ImposeColumn::default())));
        factory.register("reduce", |d| {
            let op = d.reduce.as_deref().and_then(ReduceOp::parse).unwrap_or_default();
            Ok(ColumnKind::Reduce(ReduceColumn { op, ..ReduceColumn::default() }))
        });
        factory.register("script", |d| {
            Ok(ColumnKind::Script(match &d.script {
                Some(code) => ScriptColumn::with_code(code)?,
                None => ScriptColumn::default(),
            }))
        });
        factory
    }
}

impl ColumnFactory {
    /// A factory knowing no types at all
    pub fn empty() -> Self {
        Self { constructors: AHashMap::new() }
    }

    /// Register or replace the constructor of a type
    pub fn register(&mut self, kind: impl Into<String>, constructor: Constructor) {
        self.constructors.insert(kind.into(), constructor);
    }

    pub fn knows(&self, kind: &str) -> bool {
        self.constructors.contains_key(kind)
    }

    /// Create a column; `None` for an unknown type or an unusable descriptor
    pub fn create(&self, id: ColumnId, desc: Arc<ColumnDesc>) -> Option<Column> {
        let Some(constructor) = self.constructors.get(&desc.kind) else {
            tracing::warn!(kind = %desc.kind, "unknown column type");
            return None;
        };
        match constructor(&desc) {
            Ok(kind) => Some(Column::new(id, desc, kind)),
            Err(e) => {
                tracing::warn!(kind = %desc.kind, column = %desc.column, "cannot create column: {}", e);
                None
            }
        }
    }

    /// Rebuild a dumped column tree
    ///
    /// `resolve` maps a descriptor reference to its descriptor. Columns whose
    /// descriptor or type cannot be resolved are skipped, children
    /// included; a composite keeps the children that could be restored.
    pub fn restore(&self, dump: &ColumnDump, resolve: &dyn Fn(&str) -> Option<Arc<ColumnDesc>>) -> Option<Column> {
        let Some(desc) = resolve(&dump.desc) else {
            tracing::warn!(desc = %dump.desc, "skipping column with unresolvable descriptor");
            return None;
        };
        let mut column = self.create(dump.id.clone(), desc)?;
        for child_dump in &dump.children {
            let Some(child) = self.restore(child_dump, resolve) else {
                continue;
            };
            if let Err(e) = column.push_child(child) {
                tracing::warn!(column = %dump.id, "skipping child {}: {}", child_dump.id, e);
            }
        }
        column.restore_state(dump);
        Some(column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_type_yields_none() {
        let factory = ColumnFactory::default();
        let desc = Arc::new(ColumnDesc::new("sparkline", "a"));
        assert!(factory.create(ColumnId::from("col1"), desc).is_none());
        assert!(!factory.knows("sparkline"));
    }

    #[test]
    fn test_creates_each_builtin_type() {
        let factory = ColumnFactory::default();
        for kind in VIRTUAL_TYPES {
            let column = factory
                .create(ColumnId::from("col1"), Arc::new(ColumnDesc::virtual_of(*kind)))
                .unwrap();
            assert_eq!(column.type_name(), *kind);
        }
        let ordinal = ColumnDesc::new("ordinal", "o").with_categories(["s", "m", "l"]);
        let column = factory.create(ColumnId::from("col2"), Arc::new(ordinal)).unwrap();
        assert!(column.is_numeric());
    }

    #[test]
    fn test_restore_skips_unresolvable_children() {
        let factory = ColumnFactory::default();
        let number = Arc::new(ColumnDesc::new("number", "a").with_domain(0.0, 1.0));
        let mut stack = factory
            .create(ColumnId::from("col1"), Arc::new(ColumnDesc::virtual_of("stack")))
            .unwrap();
        stack.push_child(factory.create(ColumnId::from("col2"), number.clone()).unwrap()).unwrap();
        let mut dump = stack.dump();
        let mut orphan = dump.children[0].clone();
        orphan.id = ColumnId::from("col3");
        orphan.desc = "number@gone".to_string();
        dump.children.push(orphan);

        let resolve = |r: &str| match r {
            "number@a" => Some(number.clone()),
            "stack" => Some(Arc::new(ColumnDesc::virtual_of("stack"))),
            _ => None,
        };
        let restored = factory.restore(&dump, &resolve).unwrap();
        assert_eq!(restored.children().len(), 1);
        assert_eq!(restored.children()[0].id().as_str(), "col2");
    }
}
