//! Migration resolver.
//!
//! Compares two versions of a table and decides how rows of the prior
//! version are carried into the target version. Pure and deterministic: the
//! plan depends only on its inputs, and every list in it follows the
//! declaration order of the schemas.

use std::collections::HashSet;

use crate::column::Compatibility;
use crate::error::Result;
use crate::schema::{MigrationSpec, TableSchema};
use crate::value::Value;

/// Outcome of comparing a prior and a target table version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationPlan {
    /// Same columns, same shapes, same constraints.
    NoChange,
    /// Every prior column survives; some columns are new, widened, renamed,
    /// or the constraints changed.
    Additive {
        new_columns: Vec<String>,
        widened: Vec<String>,
    },
    /// Some prior columns are not carried into the target.
    Destructive {
        dropped_columns: Vec<String>,
        new_columns: Vec<String>,
    },
    /// Rows cannot be carried over.
    Incompatible { reason: String },
}

impl MigrationPlan {
    #[must_use]
    pub fn is_incompatible(&self) -> bool {
        matches!(self, Self::Incompatible { .. })
    }

    /// Short label used in logs and the catalog.
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::NoChange => "no-change",
            Self::Additive { .. } => "additive",
            Self::Destructive { .. } => "destructive",
            Self::Incompatible { .. } => "incompatible",
        }
    }

    fn incompatible(reason: String) -> Self {
        Self::Incompatible { reason }
    }
}

/// Resolves a straight carry-over from `prior` to `target`.
#[must_use]
pub fn resolve(prior: &TableSchema, target: &TableSchema) -> MigrationPlan {
    resolve_with(prior, target, &MigrationSpec::default())
}

/// Resolves a migration from `prior` to `target`, honoring the renames and
/// fills of `spec`.
#[must_use]
pub fn resolve_with(prior: &TableSchema, target: &TableSchema, spec: &MigrationSpec) -> MigrationPlan {
    let mut new_columns = Vec::new();
    let mut widened = Vec::new();
    let mut renamed = false;

    for column in &target.columns {
        let fill = spec.fill_for(&column.name);
        let source_name = match spec.renamed_from(&column.name) {
            Some(from) => {
                renamed = true;
                from
            }
            None => column.name.as_str(),
        };

        let Some(source) = prior.column(source_name) else {
            if spec.renamed_from(&column.name).is_some() {
                return MigrationPlan::incompatible(format!(
                    "column '{}' is renamed from '{source_name}', which {} does not have",
                    column.name, prior.id
                ));
            }
            if !column.nullable && column.default.is_none() && fill.is_none() {
                return MigrationPlan::incompatible(format!(
                    "new column '{}' is NOT NULL without a default or fill value",
                    column.name
                ));
            }
            new_columns.push(column.name.clone());
            continue;
        };

        match source.shape.compare(&column.shape) {
            Compatibility::Same => {}
            Compatibility::Widened => widened.push(column.name.clone()),
            Compatibility::Narrowed => {
                return MigrationPlan::incompatible(format!(
                    "column '{}' narrows from {} to {}",
                    column.name, source.shape, column.shape
                ))
            }
            Compatibility::Unrelated => {
                return MigrationPlan::incompatible(format!(
                    "column '{}' changes type from {} to {}",
                    column.name, source.shape, column.shape
                ))
            }
        }

        if source.nullable && !column.nullable && fill.is_none() {
            return MigrationPlan::incompatible(format!(
                "column '{}' becomes NOT NULL but prior rows may hold NULL",
                column.name
            ));
        }
    }

    let dropped_columns: Vec<String> = prior
        .columns
        .iter()
        .filter(|c| target.column(&c.name).is_none() && !spec.consumes(&c.name))
        .map(|c| c.name.clone())
        .collect();

    let prior_constraints: HashSet<_> = prior.constraints.iter().collect();
    let target_constraints: HashSet<_> = target.constraints.iter().collect();
    let constraints_changed = prior_constraints != target_constraints;

    if !dropped_columns.is_empty() {
        MigrationPlan::Destructive {
            dropped_columns,
            new_columns,
        }
    } else if !new_columns.is_empty()
        || !widened.is_empty()
        || renamed
        || constraints_changed
        || !spec.fills.is_empty()
    {
        MigrationPlan::Additive {
            new_columns,
            widened,
        }
    } else {
        MigrationPlan::NoChange
    }
}

/// Resolves a chain of versions pairwise, in version order.
///
/// Each link uses the renames and fills recorded in the later schema's
/// migration source when it points at the earlier schema. A column dropped
/// in one link and declared again in a later link makes the chain
/// incompatible: the re-added column would not hold the dropped data.
#[must_use]
pub fn resolve_chain(versions: &[&TableSchema]) -> MigrationPlan {
    let mut ordered: Vec<&TableSchema> = versions.to_vec();
    ordered.sort_by(|a, b| a.id.version.cmp(&b.id.version));

    let empty = MigrationSpec::default();
    let mut dropped: Vec<String> = Vec::new();
    let mut added: Vec<String> = Vec::new();
    let mut widened: Vec<String> = Vec::new();
    let mut changed = false;

    for pair in ordered.windows(2) {
        let (prior, target) = (pair[0], pair[1]);
        let spec = target
            .source
            .as_ref()
            .filter(|source| source.prior == prior.id)
            .map_or(&empty, |source| &source.spec);

        let (link_dropped, link_new, link_widened) = match resolve_with(prior, target, spec) {
            MigrationPlan::Incompatible { reason } => {
                return MigrationPlan::incompatible(format!(
                    "{} -> {}: {reason}",
                    prior.id, target.id
                ))
            }
            MigrationPlan::NoChange => continue,
            MigrationPlan::Additive {
                new_columns,
                widened,
            } => (Vec::new(), new_columns, widened),
            MigrationPlan::Destructive {
                dropped_columns,
                new_columns,
            } => (dropped_columns, new_columns, Vec::new()),
        };
        changed = true;

        if let Some(readded) = link_new.iter().find(|c| dropped.contains(c)) {
            return MigrationPlan::incompatible(format!(
                "column '{readded}' is dropped before {} and declared again in {}",
                prior.id, target.id
            ));
        }

        added.retain(|c| !link_dropped.contains(c));
        widened.retain(|c| !link_dropped.contains(c));
        for column in link_dropped {
            if !dropped.contains(&column) {
                dropped.push(column);
            }
        }
        added.extend(link_new);
        for column in link_widened {
            if !widened.contains(&column) {
                widened.push(column);
            }
        }
    }

    if !dropped.is_empty() {
        MigrationPlan::Destructive {
            dropped_columns: dropped,
            new_columns: added,
        }
    } else if changed {
        MigrationPlan::Additive {
            new_columns: added,
            widened,
        }
    } else {
        MigrationPlan::NoChange
    }
}

/// Converts one stored row of `prior` into a stored row of `target`.
///
/// `row` holds the values of `prior.columns` in order. Each target column
/// takes its fill value, else the value of its source column, else its
/// default, else NULL.
pub fn carry_row(
    prior: &TableSchema,
    target: &TableSchema,
    spec: &MigrationSpec,
    row: &[Value],
) -> Result<Vec<Value>> {
    target
        .columns
        .iter()
        .map(|column| {
            if let Some(fill) = spec.fill_for(&column.name) {
                return column.shape.coerce(fill.clone());
            }
            let source_name = spec.renamed_from(&column.name).unwrap_or(&column.name);
            let source = prior
                .columns
                .iter()
                .position(|c| c.name == source_name)
                .and_then(|index| row.get(index).map(|value| (&prior.columns[index], value)));
            match source {
                Some((source, value)) => column.shape.carry(&source.shape, value.clone()),
                None => Ok(column.stored_default()?.unwrap_or(Value::Null)),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::{ColumnShape, ColumnSpec, ScalarType};
    use crate::constraint::ConstraintKind;
    use crate::schema::MigrationSource;

    fn table(id: &str, columns: Vec<ColumnSpec>) -> TableSchema {
        let mut schema = TableSchema::new(id.parse().unwrap());
        for column in columns {
            schema.add_column(column).unwrap();
        }
        schema
    }

    fn article_v1() -> TableSchema {
        table(
            "article 0.1.0",
            vec![
                ColumnSpec::new("id", ColumnShape::FixedBytes(4)).not_null(),
                ColumnSpec::scalar("title", ScalarType::Text),
            ],
        )
    }

    #[test]
    fn test_no_change() {
        assert_eq!(resolve(&article_v1(), &article_v1()), MigrationPlan::NoChange);
    }

    #[test]
    fn test_additive_with_default() {
        let mut target = article_v1();
        target.id = "article 0.2.0".parse().unwrap();
        target
            .add_column(ColumnSpec::scalar("body", ScalarType::Text).default("empty"))
            .unwrap();

        let plan = resolve(&article_v1(), &target);
        assert_eq!(
            plan,
            MigrationPlan::Additive {
                new_columns: vec!["body".to_string()],
                widened: vec![],
            }
        );
        assert_eq!(plan, resolve(&article_v1(), &target));
    }

    #[test]
    fn test_widening_and_narrowing() {
        let narrow = table(
            "t 1.0.0",
            vec![ColumnSpec::new("id", ColumnShape::FixedBytes(4))],
        );
        let wide = table(
            "t 2.0.0",
            vec![ColumnSpec::new("id", ColumnShape::FixedBytes(8))],
        );

        assert_eq!(
            resolve(&narrow, &wide),
            MigrationPlan::Additive {
                new_columns: vec![],
                widened: vec!["id".to_string()],
            }
        );
        assert!(resolve(&wide, &narrow).is_incompatible());

        let int32 = table("n 1.0.0", vec![ColumnSpec::scalar("n", ScalarType::Int32)]);
        let int64 = table("n 2.0.0", vec![ColumnSpec::scalar("n", ScalarType::Int64)]);
        assert!(!resolve(&int32, &int64).is_incompatible());
        assert!(resolve(&int64, &int32).is_incompatible());
    }

    #[test]
    fn test_type_family_change() {
        let text = table("t 1.0.0", vec![ColumnSpec::scalar("v", ScalarType::Text)]);
        let int = table("t 2.0.0", vec![ColumnSpec::scalar("v", ScalarType::Int64)]);
        assert!(resolve(&text, &int).is_incompatible());
    }

    #[test]
    fn test_destructive() {
        let target = table(
            "article 0.2.0",
            vec![ColumnSpec::new("id", ColumnShape::FixedBytes(4)).not_null()],
        );
        assert_eq!(
            resolve(&article_v1(), &target),
            MigrationPlan::Destructive {
                dropped_columns: vec!["title".to_string()],
                new_columns: vec![],
            }
        );
    }

    #[test]
    fn test_not_null_requirements() {
        let mut target = article_v1();
        target
            .add_column(ColumnSpec::scalar("views", ScalarType::Int64).not_null())
            .unwrap();
        assert!(resolve(&article_v1(), &target).is_incompatible());

        let spec = MigrationSpec::new().fill("views", 0);
        assert!(!resolve_with(&article_v1(), &target, &spec).is_incompatible());

        let tightened = table(
            "article 0.2.0",
            vec![
                ColumnSpec::new("id", ColumnShape::FixedBytes(4)).not_null(),
                ColumnSpec::scalar("title", ScalarType::Text).not_null(),
            ],
        );
        assert!(resolve(&article_v1(), &tightened).is_incompatible());
    }

    #[test]
    fn test_rename_is_additive() {
        let target = table(
            "article 0.2.0",
            vec![
                ColumnSpec::new("id", ColumnShape::FixedBytes(4)).not_null(),
                ColumnSpec::scalar("headline", ScalarType::Text),
            ],
        );
        let spec = MigrationSpec::new().rename("headline", "title");
        assert_eq!(
            resolve_with(&article_v1(), &target, &spec),
            MigrationPlan::Additive {
                new_columns: vec![],
                widened: vec![],
            }
        );
        assert!(matches!(
            resolve(&article_v1(), &target),
            MigrationPlan::Destructive { .. }
        ));
    }

    #[test]
    fn test_constraint_change_is_additive() {
        let mut target = article_v1();
        target
            .add_constraint(ConstraintKind::Unique, vec!["title".to_string()])
            .unwrap();
        assert!(matches!(
            resolve(&article_v1(), &target),
            MigrationPlan::Additive { .. }
        ));
    }

    #[test]
    fn test_chain_rejects_drop_then_readd() {
        let v1 = article_v1();
        let v2 = table(
            "article 0.2.0",
            vec![ColumnSpec::new("id", ColumnShape::FixedBytes(4)).not_null()],
        );
        let v3 = article_v1_as("article 0.3.0");

        assert!(resolve_chain(&[&v3, &v1, &v2]).is_incompatible());
        assert!(!resolve(&v2, &v3).is_incompatible());
    }

    #[test]
    fn test_chain_accumulates() {
        let v1 = article_v1();
        let mut v2 = article_v1_as("article 0.2.0");
        v2.add_column(ColumnSpec::scalar("body", ScalarType::Text))
            .unwrap();
        let mut v3 = table(
            "article 0.3.0",
            vec![
                ColumnSpec::new("id", ColumnShape::FixedBytes(8)).not_null(),
                ColumnSpec::scalar("headline", ScalarType::Text),
                ColumnSpec::scalar("body", ScalarType::Text),
            ],
        );
        v3.source = Some(MigrationSource {
            prior: v2.id.clone(),
            spec: MigrationSpec::new().rename("headline", "title"),
        });

        assert_eq!(
            resolve_chain(&[&v1, &v2, &v3]),
            MigrationPlan::Additive {
                new_columns: vec!["body".to_string()],
                widened: vec!["id".to_string()],
            }
        );
    }

    #[test]
    fn test_carry_row() {
        let prior = article_v1();
        let target = table(
            "article 0.2.0",
            vec![
                ColumnSpec::new("id", ColumnShape::FixedBytes(8)).not_null(),
                ColumnSpec::scalar("headline", ScalarType::Text),
                ColumnSpec::scalar("body", ScalarType::Text).default("empty"),
                ColumnSpec::scalar("views", ScalarType::Int64),
            ],
        );
        let spec = MigrationSpec::new()
            .rename("headline", "title")
            .fill("views", 7);
        let row = vec![Value::Blob(vec![1, 2, 3, 4]), Value::from("hello")];

        let carried = carry_row(&prior, &target, &spec, &row).unwrap();
        assert_eq!(
            carried,
            vec![
                Value::Blob(vec![1, 2, 3, 4, 0, 0, 0, 0]),
                Value::from("hello"),
                Value::from("empty"),
                Value::Int(7),
            ]
        );
    }

    #[test]
    fn test_lengthened_array_carries() {
        let shape = |len| ColumnShape::FixedArray {
            element: ScalarType::Int64,
            len,
        };
        let prior = table("m 0.1.0", vec![ColumnSpec::new("xs", shape(3))]);
        let target = table("m 0.2.0", vec![ColumnSpec::new("xs", shape(4))]);
        assert_eq!(
            resolve(&prior, &target),
            MigrationPlan::Additive {
                new_columns: vec![],
                widened: vec!["xs".to_string()],
            }
        );

        let row = vec![Value::Text("[1,2,3]".to_string())];
        let carried = carry_row(&prior, &target, &MigrationSpec::new(), &row).unwrap();
        assert_eq!(carried, vec![Value::Text("[1,2,3,null]".to_string())]);
    }

    fn article_v1_as(id: &str) -> TableSchema {
        let mut schema = article_v1();
        schema.id = id.parse().unwrap();
        schema
    }
}
