//! The relation tree behind joins and eager loading.
//!
//! A [`RelationNode`] tree is rooted at the queried model. Every foreign key
//! path used by `filter`, `order_by`, `select_related`, or `values` is
//! interned into the tree exactly once, so the same path always resolves to
//! the same node and alias. Walking the tree yields the projected columns,
//! the joins, and, in reverse, nested [`Record`]s from flat result rows.

use indexmap::map::Entry;
use indexmap::IndexMap;
use minorm_core::{OrmError, OrmResult};

use super::expressions::{JoinExpression, JoinKind, WhereCondition};
use super::lookups::LOOKUP_SEP;
use crate::model::{ModelMeta, Record};
use crate::value::Value;

/// One table occurrence in a query: the root model or a model reached
/// through a chain of foreign keys.
#[derive(Debug, Clone)]
pub struct RelationNode {
    meta: &'static ModelMeta,
    depth: usize,
    position: usize,
    selected: bool,
    nullable: bool,
    link_column: Option<String>,
    children: IndexMap<&'static str, RelationNode>,
    /// Per-depth creation counters; only used on the root.
    positions: Vec<usize>,
}

impl RelationNode {
    /// Creates the root node for a query over `meta`. The root is always selected.
    pub fn root(meta: &'static ModelMeta) -> Self {
        Self {
            meta,
            depth: 0,
            position: 0,
            selected: true,
            nullable: false,
            link_column: None,
            children: IndexMap::new(),
            positions: Vec::new(),
        }
    }

    /// Returns the model of this node.
    pub const fn meta(&self) -> &'static ModelMeta {
        self.meta
    }

    /// Returns the distance from the root.
    pub const fn depth(&self) -> usize {
        self.depth
    }

    /// Returns the 1-based creation order of this node among the nodes at its depth.
    pub const fn position(&self) -> usize {
        self.position
    }

    /// Returns `true` if this node's columns are projected and materialized.
    pub const fn is_selected(&self) -> bool {
        self.selected
    }

    /// Returns `true` if any foreign key from the root to this node is nullable.
    pub const fn is_nullable(&self) -> bool {
        self.nullable
    }

    /// Returns `true` if the tree joins any related table.
    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    /// Returns the child reached through `field`, if it was resolved before.
    pub fn child(&self, field: &str) -> Option<&Self> {
        self.children.get(field)
    }

    /// Unselects every node below the root. Joins stay in place.
    pub fn clear_selection(&mut self) {
        for child in self.children.values_mut() {
            child.selected = false;
            child.clear_selection();
        }
    }

    /// Returns the name under which this node's columns are referenced.
    ///
    /// The root uses the bare table name, every other node `T{depth}{position}`.
    ///
    /// `position` is 1-based and counts every node created at the same depth
    /// anywhere in the tree, not only the node's siblings under one parent.
    /// Two parents at depth 1 each joining a child therefore yield `T21` and
    /// `T22`, where sibling-local numbering would give both `T21`.
    pub fn alias(&self) -> String {
        if self.depth == 0 {
            self.meta.table_name().to_string()
        } else {
            format!("T{}{}", self.depth, self.position)
        }
    }

    /// Resolves a `__`-separated foreign key path, creating missing nodes.
    ///
    /// Each segment must name a foreign key on the model reached so far. With
    /// `mark_selected` every node along the path becomes selected; a node is
    /// never unselected by a later resolution. An empty path is the root.
    pub fn resolve(&mut self, path: &str, mark_selected: bool) -> OrmResult<&Self> {
        let segments = split_path(path);
        let mut positions = std::mem::take(&mut self.positions);
        let interned = self.intern(&segments, mark_selected, &mut positions);
        self.positions = positions;
        interned?;
        self.find(&segments)
    }

    fn intern(
        &mut self,
        segments: &[&str],
        mark_selected: bool,
        positions: &mut Vec<usize>,
    ) -> OrmResult<()> {
        let Some((first, rest)) = segments.split_first() else {
            return Ok(());
        };
        let field = self.meta.check_field(first)?;
        let target = field.related_model().ok_or_else(|| {
            OrmError::InvalidRelation(format!(
                "'{first}' on model '{}' is not a foreign key",
                self.meta.table_name()
            ))
        })?;
        let link_column = field.query_name(&self.alias());
        let nullable = self.nullable || field.null;
        let depth = self.depth + 1;

        let child = match self.children.entry(field.name) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                if positions.len() < depth {
                    positions.resize(depth, 0);
                }
                positions[depth - 1] += 1;
                tracing::trace!(
                    "Interned relation '{first}' -> {} as T{depth}{}",
                    target.table_name(),
                    positions[depth - 1]
                );
                entry.insert(Self {
                    meta: target,
                    depth,
                    position: positions[depth - 1],
                    selected: false,
                    nullable,
                    link_column: Some(link_column),
                    children: IndexMap::new(),
                    positions: Vec::new(),
                })
            }
        };
        if mark_selected {
            child.selected = true;
        }
        child.intern(rest, mark_selected, positions)
    }

    fn find(&self, segments: &[&str]) -> OrmResult<&Self> {
        let mut node = self;
        for segment in segments {
            let field = node.meta.check_field(segment)?;
            node = node.children.get(field.name).ok_or_else(|| {
                OrmError::InvalidRelation(format!("relation '{segment}' was not resolved"))
            })?;
        }
        Ok(node)
    }

    /// Returns the qualified column of every field of every selected node,
    /// in pre-order with each node before its children.
    pub fn get_column_names(&self) -> Vec<String> {
        let mut columns = Vec::new();
        self.collect_columns(&mut columns);
        columns
    }

    fn collect_columns(&self, out: &mut Vec<String>) {
        if !self.selected {
            return;
        }
        let alias = self.alias();
        out.extend(self.meta.fields.iter().map(|f| f.query_name(&alias)));
        for child in self.children.values() {
            child.collect_columns(out);
        }
    }

    /// Returns one join per edge of the tree, in the same traversal order as
    /// [`get_column_names`](Self::get_column_names).
    ///
    /// A join is `LEFT OUTER` once any foreign key on its path is nullable.
    pub fn get_joins(&self) -> Vec<JoinExpression> {
        let mut joins = Vec::new();
        self.collect_joins(&mut joins);
        joins
    }

    fn collect_joins(&self, out: &mut Vec<JoinExpression>) {
        for child in self.children.values() {
            if let Some(link) = &child.link_column {
                let alias = child.alias();
                out.push(JoinExpression {
                    table: child.meta.table_name().to_string(),
                    on: WhereCondition::columns_equal(
                        link.clone(),
                        child.meta.pk_field().query_name(&alias),
                    ),
                    alias,
                    kind: if child.nullable {
                        JoinKind::Left
                    } else {
                        JoinKind::Inner
                    },
                });
            }
            child.collect_joins(out);
        }
    }

    /// Rebuilds a nested [`Record`] from a flat row, starting at `shift`.
    ///
    /// Consumes one value per field of this node, then the widths of its
    /// selected children in order. Returns the record and the number of values
    /// consumed. A selected child whose primary key came back NULL (an
    /// unmatched outer join) is consumed but not attached.
    pub fn row_to_instance(&self, row: &[Value], shift: usize) -> OrmResult<(Record, usize)> {
        let width = self.meta.fields.len();
        let own = row.get(shift..shift + width).ok_or_else(|| {
            OrmError::DatabaseError(format!(
                "row of {} values is too short for '{}' at offset {shift}",
                row.len(),
                self.meta.table_name()
            ))
        })?;

        let mut consumed = width;
        let mut related = IndexMap::new();
        for (name, child) in &self.children {
            if !child.selected {
                continue;
            }
            let (record, used) = child.row_to_instance(row, shift + consumed)?;
            consumed += used;
            if !record.pk().is_null() {
                related.insert(*name, record);
            }
        }
        Ok((Record::new(self.meta, own.to_vec(), related), consumed))
    }
}

/// Splits a relation path into its segments; the empty path has none.
pub fn split_path(path: &str) -> Vec<&str> {
    if path.is_empty() {
        Vec::new()
    } else {
        path.split(LOOKUP_SEP).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::LazyLock;

    use super::*;
    use crate::fields::{FieldDef, FieldType};

    fn author() -> &'static ModelMeta {
        static META: LazyLock<ModelMeta> = LazyLock::new(|| {
            ModelMeta::new(
                "author",
                vec![
                    FieldDef::new("name", FieldType::CharField).max_length(50),
                    FieldDef::foreign_key("mentor", author).nullable(),
                ],
            )
        });
        &META
    }

    fn book() -> &'static ModelMeta {
        static META: LazyLock<ModelMeta> = LazyLock::new(|| {
            ModelMeta::new(
                "book",
                vec![
                    FieldDef::new("title", FieldType::CharField).max_length(50),
                    FieldDef::foreign_key("author", author),
                    FieldDef::foreign_key("editor", author).nullable(),
                ],
            )
        });
        &META
    }

    #[test]
    fn test_root_alias() {
        let root = RelationNode::root(book());
        assert_eq!(root.alias(), "book");
        assert!(root.is_selected());
        assert!(!root.has_children());
        assert_eq!(root.clone().resolve("", false).unwrap().alias(), "book");
    }

    #[test]
    fn test_resolve_interns_paths() {
        let mut root = RelationNode::root(book());
        let first = root.resolve("author__mentor", false).unwrap().alias();
        let again = root.resolve("author__mentor", true).unwrap().alias();
        assert_eq!(first, "T21");
        assert_eq!(first, again);
        assert_eq!(root.resolve("author", false).unwrap().alias(), "T11");
        assert_eq!(root.get_joins().len(), 2);
    }

    #[test]
    fn test_sibling_positions_follow_creation_order() {
        let mut root = RelationNode::root(book());
        assert_eq!(root.resolve("editor", false).unwrap().alias(), "T11");
        assert_eq!(root.resolve("author", false).unwrap().alias(), "T12");
    }

    #[test]
    fn test_aliases_unique_across_parents() {
        let mut root = RelationNode::root(book());
        let a = root.resolve("author__mentor", false).unwrap().alias();
        let b = root.resolve("editor__mentor", false).unwrap().alias();
        assert_eq!(a, "T21");
        assert_eq!(b, "T22");
    }

    #[test]
    fn test_self_reference() {
        let mut root = RelationNode::root(author());
        let node = root.resolve("mentor__mentor", false).unwrap();
        assert!(node.meta().is(author()));
        assert_eq!(node.depth(), 2);
        let joins: Vec<String> = root.get_joins().iter().map(ToString::to_string).collect();
        assert_eq!(
            joins,
            vec![
                "LEFT OUTER JOIN author AS T11 ON author.mentor_id = T11.id",
                "LEFT OUTER JOIN author AS T21 ON T11.mentor_id = T21.id",
            ]
        );
    }

    #[test]
    fn test_resolve_errors() {
        let mut root = RelationNode::root(book());
        assert!(matches!(
            root.resolve("title", false),
            Err(OrmError::InvalidRelation(_))
        ));
        assert!(matches!(
            root.resolve("publisher", false),
            Err(OrmError::InvalidField(_))
        ));
        assert!(matches!(
            root.resolve("author__name__x", false),
            Err(OrmError::InvalidRelation(_))
        ));
    }

    #[test]
    fn test_join_kinds() {
        let mut root = RelationNode::root(book());
        root.resolve("author__mentor", false).unwrap();
        root.resolve("editor", false).unwrap();
        let joins: Vec<String> = root.get_joins().iter().map(ToString::to_string).collect();
        assert_eq!(
            joins,
            vec![
                "INNER JOIN author AS T11 ON book.author_id = T11.id",
                "LEFT OUTER JOIN author AS T21 ON T11.mentor_id = T21.id",
                "LEFT OUTER JOIN author AS T12 ON book.editor_id = T12.id",
            ]
        );
    }

    #[test]
    fn test_column_names_only_for_selected() {
        let mut root = RelationNode::root(book());
        root.resolve("editor", false).unwrap();
        root.resolve("author", true).unwrap();
        assert_eq!(
            root.get_column_names(),
            vec![
                "book.id",
                "book.title",
                "book.author_id",
                "book.editor_id",
                "T12.id",
                "T12.name",
                "T12.mentor_id",
            ]
        );
    }

    #[test]
    fn test_marking_is_sticky() {
        let mut root = RelationNode::root(book());
        root.resolve("author__mentor", true).unwrap();
        root.resolve("author", false).unwrap();
        assert!(root.child("author").unwrap().is_selected());
        assert!(root.child("author").unwrap().child("mentor").unwrap().is_selected());
    }

    #[test]
    fn test_clear_selection_keeps_joins() {
        let mut root = RelationNode::root(book());
        root.resolve("author__mentor", true).unwrap();
        root.clear_selection();
        assert_eq!(root.get_column_names().len(), 4);
        assert_eq!(root.get_joins().len(), 2);
        assert!(root.is_selected());
    }

    #[test]
    fn test_row_round_trip() {
        let mut root = RelationNode::root(book());
        root.resolve("author__mentor", true).unwrap();
        root.resolve("editor", true).unwrap();
        let width = root.get_column_names().len();
        assert_eq!(width, 4 + 3 + 3 + 3);

        let row = vec![
            Value::Int(1),
            Value::from("Dune"),
            Value::Int(10),
            Value::Null,
            // author
            Value::Int(10),
            Value::from("Frank"),
            Value::Int(20),
            // author.mentor
            Value::Int(20),
            Value::from("Ursula"),
            Value::Null,
            // editor, unmatched outer join
            Value::Null,
            Value::Null,
            Value::Null,
        ];
        let (record, consumed) = root.row_to_instance(&row, 0).unwrap();
        assert_eq!(consumed, width);
        assert_eq!(record.values()[1], Value::from("Dune"));

        let author = record.related("author").unwrap();
        assert_eq!(author.values()[1], Value::from("Frank"));
        let mentor = author.related("mentor").unwrap();
        assert_eq!(mentor.values()[1], Value::from("Ursula"));
        assert!(record.related("editor").is_none());
    }

    #[test]
    fn test_short_row_is_error() {
        let root = RelationNode::root(book());
        assert!(root.row_to_instance(&[Value::Int(1)], 0).is_err());
    }

    #[test]
    fn test_clone_is_independent() {
        let mut base = RelationNode::root(book());
        base.resolve("author", false).unwrap();
        let mut refined = base.clone();
        refined.resolve("editor", true).unwrap();
        assert_eq!(base.get_joins().len(), 1);
        assert_eq!(refined.get_joins().len(), 2);
    }
}
