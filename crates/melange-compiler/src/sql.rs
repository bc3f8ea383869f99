//! Stage 5 — SQL DSL (spec.md §4.5).
//!
//! `Expr` is a closed algebraic type; callers match exhaustively rather
//! than reaching for subtype dispatch (spec.md §9). `Raw` is the one escape
//! hatch and is used sparingly, only by [`crate::schema`]'s fixed DDL text.
//! `.sql()` is a pure total function: equal structural inputs render equal
//! strings, which is what makes `compile` deterministic (spec.md §8).

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Str(String),
    Int(i64),
    Bool(bool),
}

impl Literal {
    fn sql(&self) -> String {
        match self {
            Literal::Str(s) => format!("'{}'", s.replace('\'', "''")),
            Literal::Int(i) => i.to_string(),
            Literal::Bool(b) => if *b { "TRUE".to_string() } else { "FALSE".to_string() },
        }
    }
}

/// The ~20-constructor closed expression algebra of spec.md §4.5.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Col { table: Option<String>, column: String },
    Lit(Literal),
    ParamRef(String),
    Null,
    Raw(String),

    Eq(Box<Expr>, Box<Expr>),
    Ne(Box<Expr>, Box<Expr>),
    Lt(Box<Expr>, Box<Expr>),
    Gt(Box<Expr>, Box<Expr>),
    In(Box<Expr>, Vec<Expr>),
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),

    HasUserset(Box<Expr>),
    UsersetRelation(Box<Expr>),
    UsersetObjectId(Box<Expr>),
    SubjectIdMatch {
        column: Box<Expr>,
        id: Box<Expr>,
        allow_wildcard: bool,
    },
    NormalizedUsersetSubject {
        subject_id: Box<Expr>,
        relation: Box<Expr>,
    },

    Exists(Box<SelectStmt>),
    NotExists(Box<SelectStmt>),
    FunctionCall {
        name: String,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn col(table: impl Into<String>, column: impl Into<String>) -> Self {
        Expr::Col {
            table: Some(table.into()),
            column: column.into(),
        }
    }

    pub fn bare_col(column: impl Into<String>) -> Self {
        Expr::Col {
            table: None,
            column: column.into(),
        }
    }

    pub fn str_lit(s: impl Into<String>) -> Self {
        Expr::Lit(Literal::Str(s.into()))
    }

    pub fn int_lit(i: i64) -> Self {
        Expr::Lit(Literal::Int(i))
    }

    pub fn param(name: impl Into<String>) -> Self {
        Expr::ParamRef(name.into())
    }

    pub fn eq(self, other: Expr) -> Self {
        Expr::Eq(Box::new(self), Box::new(other))
    }

    pub fn and(parts: Vec<Expr>) -> Self {
        Expr::And(parts)
    }

    pub fn or(parts: Vec<Expr>) -> Self {
        Expr::Or(parts)
    }

    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    fn needs_parens(&self) -> bool {
        matches!(self, Expr::And(_) | Expr::Or(_))
    }

    fn render_maybe_parens(&self) -> String {
        let s = self.sql();
        if self.needs_parens() {
            format!("({s})")
        } else {
            s
        }
    }

    fn render_bool_list(op: &str, parts: &[Expr]) -> String {
        if parts.is_empty() {
            return "TRUE".to_string();
        }
        parts
            .iter()
            .map(Expr::render_maybe_parens)
            .collect::<Vec<_>>()
            .join(&format!(" {op} "))
    }

    /// Renders this expression to Postgres-syntax SQL text.
    pub fn sql(&self) -> String {
        match self {
            Expr::Col { table: Some(t), column } => format!("{t}.{column}"),
            Expr::Col { table: None, column } => column.clone(),
            Expr::Lit(l) => l.sql(),
            Expr::ParamRef(name) => name.clone(),
            Expr::Null => "NULL".to_string(),
            Expr::Raw(text) => text.clone(),

            Expr::Eq(l, r) => format!("{} = {}", l.sql(), r.sql()),
            Expr::Ne(l, r) => format!("{} <> {}", l.sql(), r.sql()),
            Expr::Lt(l, r) => format!("{} < {}", l.sql(), r.sql()),
            Expr::Gt(l, r) => format!("{} > {}", l.sql(), r.sql()),
            Expr::In(e, values) => {
                if values.is_empty() {
                    "FALSE".to_string()
                } else {
                    let list = values.iter().map(Expr::sql).collect::<Vec<_>>().join(", ");
                    format!("{} IN ({})", e.sql(), list)
                }
            }
            Expr::And(parts) => Self::render_bool_list("AND", parts),
            Expr::Or(parts) => Self::render_bool_list("OR", parts),
            Expr::Not(inner) => format!("NOT ({})", inner.sql()),

            Expr::HasUserset(inner) => format!("position('#' in {}) > 0", inner.sql()),
            Expr::UsersetRelation(inner) => format!("split_part({}, '#', 2)", inner.sql()),
            Expr::UsersetObjectId(inner) => format!("split_part({}, '#', 1)", inner.sql()),
            Expr::SubjectIdMatch { column, id, allow_wildcard } => {
                if *allow_wildcard {
                    format!("({} = {} OR {} = '*')", column.sql(), id.sql(), column.sql())
                } else {
                    format!("{} = {}", column.sql(), id.sql())
                }
            }
            Expr::NormalizedUsersetSubject { subject_id, relation } => {
                format!("(split_part({}, '#', 1) || '#' || {})", subject_id.sql(), relation.sql())
            }

            Expr::Exists(stmt) => format!("EXISTS ({})", stmt.sql()),
            Expr::NotExists(stmt) => format!("NOT EXISTS ({})", stmt.sql()),
            Expr::FunctionCall { name, args } => {
                format!("{name}({})", args.iter().map(Expr::sql).collect::<Vec<_>>().join(", "))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum JoinKind {
    Inner,
    Left,
    LateralLeft,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableRef {
    Named(String),
    Function { name: String, args: Vec<Expr> },
    Subquery(Box<SelectStmt>),
}

impl TableRef {
    fn sql(&self) -> String {
        match self {
            TableRef::Named(name) => name.clone(),
            TableRef::Function { name, args } => {
                format!("{name}({})", args.iter().map(Expr::sql).collect::<Vec<_>>().join(", "))
            }
            TableRef::Subquery(stmt) => format!("({})", stmt.sql()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub kind: JoinKind,
    pub table: TableRef,
    pub alias: String,
    pub on: Option<Expr>,
}

impl JoinClause {
    fn sql(&self) -> String {
        let keyword = match self.kind {
            JoinKind::Inner => "JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::LateralLeft => "LEFT JOIN LATERAL",
        };
        let on = self
            .on
            .as_ref()
            .map(|e| e.sql())
            .unwrap_or_else(|| "TRUE".to_string());
        format!("{keyword} {} {} ON {}", self.table.sql(), self.alias, on)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FromClause {
    Table { name: String, alias: Option<String> },
    Subquery { stmt: Box<SelectStmt>, alias: String },
}

impl FromClause {
    fn sql(&self) -> String {
        match self {
            FromClause::Table { name, alias: Some(a) } => format!("{name} {a}"),
            FromClause::Table { name, alias: None } => name.clone(),
            FromClause::Subquery { stmt, alias } => format!("({}) {alias}", stmt.sql()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectColumn {
    pub expr: Expr,
    pub alias: Option<String>,
}

impl SelectColumn {
    pub fn new(expr: Expr, alias: Option<&str>) -> Self {
        Self {
            expr,
            alias: alias.map(str::to_string),
        }
    }

    fn sql(&self) -> String {
        match &self.alias {
            Some(a) => format!("{} AS {a}", self.expr.sql()),
            None => self.expr.sql(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectStmt {
    pub distinct: bool,
    pub columns: Vec<SelectColumn>,
    pub from: FromClause,
    pub joins: Vec<JoinClause>,
    pub where_clause: Option<Expr>,
    pub order_by: Vec<(Expr, bool)>,
    pub limit: Option<Expr>,
}

impl SelectStmt {
    pub fn sql(&self) -> String {
        let mut out = String::from("SELECT ");
        if self.distinct {
            out.push_str("DISTINCT ");
        }
        out.push_str(
            &self
                .columns
                .iter()
                .map(SelectColumn::sql)
                .collect::<Vec<_>>()
                .join(", "),
        );
        out.push_str(" FROM ");
        out.push_str(&self.from.sql());
        for join in &self.joins {
            out.push(' ');
            out.push_str(&join.sql());
        }
        if let Some(pred) = &self.where_clause {
            out.push_str(" WHERE ");
            out.push_str(&pred.sql());
        }
        if !self.order_by.is_empty() {
            out.push_str(" ORDER BY ");
            out.push_str(
                &self
                    .order_by
                    .iter()
                    .map(|(e, asc)| format!("{} {}", e.sql(), if *asc { "ASC" } else { "DESC" }))
                    .collect::<Vec<_>>()
                    .join(", "),
            );
        }
        if let Some(limit) = &self.limit {
            out.push_str(" LIMIT ");
            out.push_str(&limit.sql());
        }
        out
    }
}

/// Renders a sequence of `SELECT`s combined with a textual set operator
/// (`UNION`, `UNION ALL`, `INTERSECT`). Used by the function builders
/// (spec.md §4.7) to compose per-pattern blocks; the DSL itself has no
/// dedicated set-operation node since a bare string join is unambiguous
/// and total here.
pub fn render_set_op(op: &str, stmts: &[SelectStmt]) -> String {
    stmts
        .iter()
        .map(|s| s.sql())
        .collect::<Vec<_>>()
        .join(&format!(" {op} "))
}

/// Fluent facade for the common shape `SELECT … FROM melange_tuples t WHERE
/// object_type = ? AND relation IN (…) AND <predicates>` (spec.md §4.5).
pub struct TupleQuery {
    alias: String,
    distinct: bool,
    columns: Vec<SelectColumn>,
    object_type: Option<String>,
    relations: Vec<String>,
    predicates: Vec<Expr>,
}

impl TupleQuery {
    pub fn new(alias: impl Into<String>) -> Self {
        Self {
            alias: alias.into(),
            distinct: false,
            columns: Vec::new(),
            object_type: None,
            relations: Vec::new(),
            predicates: Vec::new(),
        }
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn select(mut self, expr: Expr, alias: Option<&str>) -> Self {
        self.columns.push(SelectColumn::new(expr, alias));
        self
    }

    pub fn object_type(mut self, object_type: impl Into<String>) -> Self {
        self.object_type = Some(object_type.into());
        self
    }

    pub fn relations(mut self, relations: Vec<String>) -> Self {
        self.relations = relations;
        self
    }

    pub fn and_where(mut self, predicate: Expr) -> Self {
        self.predicates.push(predicate);
        self
    }

    pub fn build(self) -> SelectStmt {
        let mut preds = Vec::new();
        if let Some(ot) = &self.object_type {
            preds.push(Expr::col(self.alias.clone(), "object_type").eq(Expr::str_lit(ot.clone())));
        }
        if !self.relations.is_empty() {
            let values = self.relations.iter().map(|r| Expr::str_lit(r.clone())).collect();
            preds.push(Expr::In(Box::new(Expr::col(self.alias.clone(), "relation")), values));
        }
        preds.extend(self.predicates);

        SelectStmt {
            distinct: self.distinct,
            columns: self.columns,
            from: FromClause::Table {
                name: "melange_tuples".to_string(),
                alias: Some(self.alias),
            },
            joins: Vec::new(),
            where_clause: if preds.is_empty() { None } else { Some(Expr::And(preds)) },
            order_by: Vec::new(),
            limit: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eq_renders_both_sides() {
        let e = Expr::col("t", "subject_id").eq(Expr::param("p_subject_id"));
        assert_eq!(e.sql(), "t.subject_id = p_subject_id");
    }

    #[test]
    fn tuple_query_renders_fixed_shape() {
        let stmt = TupleQuery::new("t")
            .select(Expr::col("t", "object_id"), None)
            .object_type("doc")
            .relations(vec!["viewer".into(), "editor".into()])
            .and_where(Expr::col("t", "subject_id").eq(Expr::param("p_subject_id")))
            .build();

        let sql = stmt.sql();
        assert!(sql.starts_with("SELECT t.object_id FROM melange_tuples t WHERE"));
        assert!(sql.contains("t.object_type = 'doc'"));
        assert!(sql.contains("t.relation IN ('viewer', 'editor')"));
    }

    #[test]
    fn subject_id_match_includes_wildcard_clause_only_when_allowed() {
        let with = Expr::SubjectIdMatch {
            column: Box::new(Expr::bare_col("subject_id")),
            id: Box::new(Expr::param("p_subject_id")),
            allow_wildcard: true,
        };
        assert_eq!(with.sql(), "(subject_id = p_subject_id OR subject_id = '*')");

        let without = Expr::SubjectIdMatch {
            column: Box::new(Expr::bare_col("subject_id")),
            id: Box::new(Expr::param("p_subject_id")),
            allow_wildcard: false,
        };
        assert_eq!(without.sql(), "subject_id = p_subject_id");
    }

    #[test]
    fn and_rendering_is_deterministic() {
        let a = Expr::And(vec![
            Expr::col("t", "a").eq(Expr::int_lit(1)),
            Expr::col("t", "b").eq(Expr::int_lit(2)),
        ]);
        assert_eq!(a.sql(), a.sql());
        assert_eq!(a.sql(), "t.a = 1 AND t.b = 2");
    }
}
