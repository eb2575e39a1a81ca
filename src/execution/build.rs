//! Builder: plan tree to operator tree
//!
//! One exhaustive match over [`PlanNode`]. Children are built first.
//! Plan kinds that the planner must rewrite away before execution are a
//! fatal invariant violation, never a runtime fallback.

use std::collections::BTreeSet;
use std::sync::Arc;

use super::authorize::Authorize;
use super::base::Operator;
use super::context::Context;
use super::dummy_scan::{DummyScan, Prepare};
use super::errors::{ExecutionError, ExecutionResult};
use super::filter::Filter;
use super::index_drop::DropIndex;
use super::limit::Limit;
use super::parallel::Parallel;
use super::project::{FinalProject, InitialProject};
use super::scan_index::IndexScan;
use super::sequence::Sequence;
use super::stream::Stream;
use crate::datastore::Index;
use crate::observability::{Event, Logger, Severity};
use crate::plan::{KeyspaceTerm, PlanNode};
use crate::timestamp::VectorKind;

/// Builds the operator tree for `plan`.
pub fn build(plan: &PlanNode, context: &Arc<Context>) -> ExecutionResult<Box<dyn Operator>> {
    let mut builder = Builder {
        context,
        single_vector: context.vector_source().kind() == VectorKind::Single,
        targets: BTreeSet::new(),
    };

    let built = builder.visit(plan).and_then(|root| builder.check_targets().map(|()| root));

    let request_id = context.request_id().to_string();
    match &built {
        Ok(root) => Logger::event(
            Severity::Info,
            Event::PipelineBuilt,
            &[("request_id", request_id.as_str()), ("root", root.name())],
        ),
        Err(e) => {
            let message = e.to_string();
            Logger::event(
                Severity::Error,
                Event::BuildFailed,
                &[
                    ("code", e.code()),
                    ("message", message.as_str()),
                    ("request_id", request_id.as_str()),
                ],
            );
        }
    }
    built
}

struct Builder<'a> {
    context: &'a Arc<Context>,
    single_vector: bool,
    targets: BTreeSet<String>,
}

impl Builder<'_> {
    fn visit(&mut self, plan: &PlanNode) -> ExecutionResult<Box<dyn Operator>> {
        match plan {
            PlanNode::IndexScan(scan) => {
                self.targets.insert(scan.term.target());
                let index = self.resolve_index(&scan.term, &scan.index)?;
                Ok(Box::new(IndexScan::new(Arc::new(scan.clone()), index)))
            }
            PlanNode::DummyScan => Ok(Box::new(DummyScan::new())),
            PlanNode::Filter(filter) => Ok(Box::new(Filter::new(Arc::new(filter.clone())))),
            PlanNode::InitialProject(project) => {
                Ok(Box::new(InitialProject::new(Arc::new(project.clone()))))
            }
            PlanNode::FinalProject => Ok(Box::new(FinalProject::new())),
            PlanNode::Limit(limit) => Ok(Box::new(Limit::new(Arc::new(limit.clone())))),
            PlanNode::Authorize(authorize) => {
                let child = self.visit(&authorize.child)?;
                Ok(Box::new(Authorize::new(Arc::new(authorize.clone()), child)))
            }
            PlanNode::Parallel(parallel) => {
                let child = self.visit(&parallel.child)?;
                let budget = self.context.max_parallelism();
                let degree = match parallel.max_parallelism {
                    0 => budget,
                    declared => declared.min(budget),
                };
                if degree <= 1 {
                    return Ok(child);
                }
                Ok(Box::new(Parallel::new(
                    Arc::new(parallel.clone()),
                    child,
                    degree,
                )))
            }
            PlanNode::Sequence(sequence) => {
                let children = sequence
                    .children
                    .iter()
                    .map(|child| self.visit(child))
                    .collect::<ExecutionResult<Vec<_>>>()?;
                Ok(Box::new(Sequence::new(Arc::new(sequence.clone()), children)))
            }
            PlanNode::Stream => Ok(Box::new(Stream::new())),
            PlanNode::Prepare(prepare) => Ok(Box::new(Prepare::new(Arc::new(prepare.clone())))),
            PlanNode::DropIndex(ddl) => {
                let index = self.resolve_index(&ddl.term, &ddl.index)?;
                Ok(Box::new(DropIndex::new(Arc::new(ddl.clone()), index)))
            }

            PlanNode::PrimaryScan
            | PlanNode::ParentScan
            | PlanNode::IndexCountScan
            | PlanNode::KeyScan
            | PlanNode::ValueScan
            | PlanNode::CountScan
            | PlanNode::IntersectScan
            | PlanNode::UnionScan
            | PlanNode::DistinctScan
            | PlanNode::Fetch
            | PlanNode::DummyFetch
            | PlanNode::Join
            | PlanNode::IndexJoin
            | PlanNode::Nest
            | PlanNode::IndexNest
            | PlanNode::Unnest
            | PlanNode::Let
            | PlanNode::InitialGroup
            | PlanNode::IntermediateGroup
            | PlanNode::FinalGroup
            | PlanNode::IndexCountProject
            | PlanNode::Distinct
            | PlanNode::UnionAll
            | PlanNode::IntersectAll
            | PlanNode::ExceptAll
            | PlanNode::Order
            | PlanNode::Offset
            | PlanNode::SendInsert
            | PlanNode::SendUpsert
            | PlanNode::SendDelete
            | PlanNode::Clone
            | PlanNode::Set
            | PlanNode::Unset
            | PlanNode::SendUpdate
            | PlanNode::Merge
            | PlanNode::Alias
            | PlanNode::Discard
            | PlanNode::Collect
            | PlanNode::Channel
            | PlanNode::CreatePrimaryIndex
            | PlanNode::CreateIndex
            | PlanNode::AlterIndex
            | PlanNode::BuildIndexes
            | PlanNode::Explain
            | PlanNode::InferKeyspace => {
                Err(ExecutionError::UnexpectedPlanOperator(plan.name().to_string()))
            }
        }
    }

    fn resolve_index(&self, term: &KeyspaceTerm, name: &str) -> ExecutionResult<Arc<dyn Index>> {
        self.context
            .datastore()
            .index(&term.namespace, &term.keyspace, name)
            .ok_or_else(|| ExecutionError::IndexNotFound {
                index: name.to_string(),
                keyspace: term.target(),
            })
    }

    /// A single scan vector only describes one keyspace.
    fn check_targets(&self) -> ExecutionResult<()> {
        if self.single_vector && self.targets.len() > 1 {
            return Err(ExecutionError::TooManyScannedTargets(
                self.targets.iter().cloned().collect(),
            ));
        }
        Ok(())
    }
}
