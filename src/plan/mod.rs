//! Physical query plans
//!
//! A plan is an immutable tree produced by the planner. Each node is
//! tagged with `#operator` in its JSON form:
//!
//! ```json
//! {"#operator": "Sequence", "children": [
//!     {"#operator": "IndexScan", "index": "by_age", ...},
//!     {"#operator": "Filter", "condition": {...}},
//!     {"#operator": "Stream"}
//! ]}
//! ```
//!
//! The node set is closed. Kinds the planner must rewrite away before
//! execution are still representable so that the builder can reject
//! them with a precise error.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::expression::Expr;

/// Default namespace for keyspace terms
pub const DEFAULT_NAMESPACE: &str = "default";

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

/// A keyspace reference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyspaceTerm {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub keyspace: String,
    #[serde(default)]
    pub alias: Option<String>,
}

impl KeyspaceTerm {
    pub fn new(keyspace: &str) -> Self {
        Self {
            namespace: default_namespace(),
            keyspace: keyspace.to_string(),
            alias: None,
        }
    }

    /// `namespace:keyspace`
    pub fn target(&self) -> String {
        format!("{}:{}", self.namespace, self.keyspace)
    }
}

/// Which range bounds are inclusive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Inclusion {
    #[default]
    Neither,
    Low,
    High,
    Both,
}

impl Inclusion {
    pub fn includes_low(&self) -> bool {
        matches!(self, Inclusion::Low | Inclusion::Both)
    }

    pub fn includes_high(&self) -> bool {
        matches!(self, Inclusion::High | Inclusion::Both)
    }
}

/// Key range; an empty bound is open
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Range {
    #[serde(default)]
    pub low: Vec<Expr>,
    #[serde(default)]
    pub high: Vec<Expr>,
    #[serde(default)]
    pub inclusion: Inclusion,
}

/// One index span: an exact seek or a range
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Span {
    #[serde(default)]
    pub seek: Option<Vec<Expr>>,
    #[serde(default)]
    pub range: Range,
}

/// A filter predicate the index already guarantees, exposed as a cover
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterCover {
    pub cover: Expr,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexScan {
    pub index: String,
    pub term: KeyspaceTerm,
    pub spans: Vec<Span>,
    #[serde(default)]
    pub distinct: bool,
    /// Pushed-down limit
    #[serde(default)]
    pub limit: Option<Expr>,
    /// Covering expressions, index keys first then the primary key
    #[serde(default)]
    pub covers: Vec<Expr>,
    #[serde(default)]
    pub filter_covers: Vec<FilterCover>,
}

impl IndexScan {
    pub fn is_covering(&self) -> bool {
        !self.covers.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub condition: Expr,
}

/// A projected result term
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultTerm {
    #[serde(default, rename = "as")]
    pub alias: Option<String>,
    pub expr: Expr,
}

impl ResultTerm {
    /// Output name: the explicit alias, the last path segment of a
    /// field, or `$<position>` (1-based).
    pub fn output_name(&self, position: usize) -> String {
        if let Some(alias) = &self.alias {
            return alias.clone();
        }
        match &self.expr {
            Expr::Field { path } => match path.last() {
                Some(last) => last.clone(),
                None => format!("${}", position + 1),
            },
            _ => format!("${}", position + 1),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InitialProject {
    pub terms: Vec<ResultTerm>,
    /// `SELECT RAW`: emit the first term's value instead of an object
    #[serde(default)]
    pub raw: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Limit {
    pub expr: Expr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrivilegeKind {
    Read,
    Write,
    Ddl,
}

/// A privilege required on a `namespace:keyspace` target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Privilege {
    pub target: String,
    pub kind: PrivilegeKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Authorize {
    #[serde(default)]
    pub privileges: Vec<Privilege>,
    pub child: Box<PlanNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parallel {
    /// Declared degree; 0 means the request budget
    #[serde(default)]
    pub max_parallelism: usize,
    pub child: Box<PlanNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sequence {
    pub children: Vec<PlanNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prepare {
    pub prepared: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DropIndex {
    pub index: String,
    pub term: KeyspaceTerm,
}

/// Physical plan node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "#operator")]
pub enum PlanNode {
    // Buildable
    IndexScan(IndexScan),
    DummyScan,
    Filter(Filter),
    InitialProject(InitialProject),
    FinalProject,
    Limit(Limit),
    Authorize(Authorize),
    Parallel(Parallel),
    Sequence(Sequence),
    Stream,
    Prepare(Prepare),
    DropIndex(DropIndex),

    // Rewritten away by the planner before execution
    PrimaryScan,
    ParentScan,
    IndexCountScan,
    KeyScan,
    ValueScan,
    CountScan,
    IntersectScan,
    UnionScan,
    DistinctScan,
    Fetch,
    DummyFetch,
    Join,
    IndexJoin,
    Nest,
    IndexNest,
    Unnest,
    Let,
    InitialGroup,
    IntermediateGroup,
    FinalGroup,
    IndexCountProject,
    Distinct,
    UnionAll,
    IntersectAll,
    ExceptAll,
    Order,
    Offset,
    SendInsert,
    SendUpsert,
    SendDelete,
    Clone,
    Set,
    Unset,
    SendUpdate,
    Merge,
    Alias,
    Discard,
    Collect,
    Channel,
    CreatePrimaryIndex,
    CreateIndex,
    AlterIndex,
    BuildIndexes,
    Explain,
    InferKeyspace,
}

impl PlanNode {
    /// The `#operator` name
    pub fn name(&self) -> &'static str {
        match self {
            PlanNode::IndexScan(_) => "IndexScan",
            PlanNode::DummyScan => "DummyScan",
            PlanNode::Filter(_) => "Filter",
            PlanNode::InitialProject(_) => "InitialProject",
            PlanNode::FinalProject => "FinalProject",
            PlanNode::Limit(_) => "Limit",
            PlanNode::Authorize(_) => "Authorize",
            PlanNode::Parallel(_) => "Parallel",
            PlanNode::Sequence(_) => "Sequence",
            PlanNode::Stream => "Stream",
            PlanNode::Prepare(_) => "Prepare",
            PlanNode::DropIndex(_) => "DropIndex",
            PlanNode::PrimaryScan => "PrimaryScan",
            PlanNode::ParentScan => "ParentScan",
            PlanNode::IndexCountScan => "IndexCountScan",
            PlanNode::KeyScan => "KeyScan",
            PlanNode::ValueScan => "ValueScan",
            PlanNode::CountScan => "CountScan",
            PlanNode::IntersectScan => "IntersectScan",
            PlanNode::UnionScan => "UnionScan",
            PlanNode::DistinctScan => "DistinctScan",
            PlanNode::Fetch => "Fetch",
            PlanNode::DummyFetch => "DummyFetch",
            PlanNode::Join => "Join",
            PlanNode::IndexJoin => "IndexJoin",
            PlanNode::Nest => "Nest",
            PlanNode::IndexNest => "IndexNest",
            PlanNode::Unnest => "Unnest",
            PlanNode::Let => "Let",
            PlanNode::InitialGroup => "InitialGroup",
            PlanNode::IntermediateGroup => "IntermediateGroup",
            PlanNode::FinalGroup => "FinalGroup",
            PlanNode::IndexCountProject => "IndexCountProject",
            PlanNode::Distinct => "Distinct",
            PlanNode::UnionAll => "UnionAll",
            PlanNode::IntersectAll => "IntersectAll",
            PlanNode::ExceptAll => "ExceptAll",
            PlanNode::Order => "Order",
            PlanNode::Offset => "Offset",
            PlanNode::SendInsert => "SendInsert",
            PlanNode::SendUpsert => "SendUpsert",
            PlanNode::SendDelete => "SendDelete",
            PlanNode::Clone => "Clone",
            PlanNode::Set => "Set",
            PlanNode::Unset => "Unset",
            PlanNode::SendUpdate => "SendUpdate",
            PlanNode::Merge => "Merge",
            PlanNode::Alias => "Alias",
            PlanNode::Discard => "Discard",
            PlanNode::Collect => "Collect",
            PlanNode::Channel => "Channel",
            PlanNode::CreatePrimaryIndex => "CreatePrimaryIndex",
            PlanNode::CreateIndex => "CreateIndex",
            PlanNode::AlterIndex => "AlterIndex",
            PlanNode::BuildIndexes => "BuildIndexes",
            PlanNode::Explain => "Explain",
            PlanNode::InferKeyspace => "InferKeyspace",
        }
    }

    pub fn sequence(children: Vec<PlanNode>) -> Self {
        PlanNode::Sequence(Sequence { children })
    }

    pub fn parallel(max_parallelism: usize, child: PlanNode) -> Self {
        PlanNode::Parallel(Parallel {
            max_parallelism,
            child: Box::new(child),
        })
    }

    pub fn filter(condition: Expr) -> Self {
        PlanNode::Filter(Filter { condition })
    }

    pub fn limit(expr: Expr) -> Self {
        PlanNode::Limit(Limit { expr })
    }
}
