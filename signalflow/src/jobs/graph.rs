//! Job graphs: an arena of jobs wired by upstream edges.

use futures::stream::{FuturesUnordered, StreamExt};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::debug;

use super::{JobEngine, JobSpec};
use crate::core::Artifact;
use crate::errors::PipelineError;

/// Compute function of a job: upstream artifacts (in declared order) to
/// the job's artifact.
pub type ComputeFn = Box<dyn FnOnce(Vec<Arc<Artifact>>) -> Result<Artifact, PipelineError> + Send>;

/// Index of a job in its [`JobGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(usize);

impl JobId {
    /// Position in the graph.
    #[must_use]
    pub fn index(self) -> usize {
        self.0
    }
}

struct JobNode {
    spec: JobSpec,
    parents: Vec<JobId>,
    children: Vec<JobId>,
    compute: ComputeFn,
}

impl fmt::Debug for JobNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobNode")
            .field("spec", &self.spec)
            .field("parents", &self.parents)
            .field("children", &self.children)
            .finish_non_exhaustive()
    }
}

/// A directed acyclic graph of jobs.
///
/// Jobs can only depend on jobs added before them, so the graph is acyclic
/// by construction.
#[derive(Debug, Default)]
pub struct JobGraph {
    nodes: Vec<JobNode>,
}

impl JobGraph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a job depending on `parents`.
    ///
    /// # Errors
    ///
    /// Returns `DependencyUnavailable` if a parent is not in this graph.
    pub fn add<F>(&mut self, spec: JobSpec, parents: &[JobId], compute: F) -> Result<JobId, PipelineError>
    where
        F: FnOnce(Vec<Arc<Artifact>>) -> Result<Artifact, PipelineError> + Send + 'static,
    {
        let id = JobId(self.nodes.len());
        if let Some(unknown) = parents.iter().find(|p| p.0 >= id.0) {
            return Err(PipelineError::dependency_unavailable(format!(
                "job '{}' depends on unknown job #{}",
                spec.name, unknown.0
            ))
            .in_context(spec.context()));
        }

        for parent in parents {
            self.nodes[parent.0].children.push(id);
        }
        self.nodes.push(JobNode {
            spec,
            parents: parents.to_vec(),
            children: Vec::new(),
            compute: Box::new(compute),
        });
        Ok(id)
    }

    /// Number of jobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Returns true if the graph has no jobs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// The spec of job `id`.
    #[must_use]
    pub fn spec(&self, id: JobId) -> Option<&JobSpec> {
        self.nodes.get(id.0).map(|n| &n.spec)
    }

    /// Upstream jobs of `id`, in declared order.
    #[must_use]
    pub fn parents(&self, id: JobId) -> &[JobId] {
        self.nodes
            .get(id.0)
            .map(|n| n.parents.as_slice())
            .unwrap_or_default()
    }

    /// Runs every job through `engine`.
    ///
    /// A job is spawned as soon as all of its parents have published their
    /// artifacts. The first failure is returned; jobs downstream of it never
    /// start, while jobs already running finish in the background and keep
    /// their cached results.
    ///
    /// # Errors
    ///
    /// Returns the error of the first job to fail.
    pub async fn execute(self, engine: Arc<JobEngine>) -> Result<GraphOutputs, PipelineError> {
        let start = Instant::now();
        let total = self.nodes.len();

        let mut in_degree = Vec::with_capacity(total);
        let mut specs = Vec::with_capacity(total);
        let mut parents = Vec::with_capacity(total);
        let mut children = Vec::with_capacity(total);
        let mut computes = Vec::with_capacity(total);
        for node in self.nodes {
            in_degree.push(node.parents.len());
            specs.push(node.spec);
            parents.push(node.parents);
            children.push(node.children);
            computes.push(Some(node.compute));
        }

        let mut outputs: Vec<Option<Arc<Artifact>>> = vec![None; total];
        let mut active: FuturesUnordered<JoinHandle<(usize, Result<Arc<Artifact>, PipelineError>)>> =
            FuturesUnordered::new();

        for id in (0..total).filter(|&id| in_degree[id] == 0) {
            let compute = take_compute(&mut computes, id)?;
            active.push(spawn_job(&engine, id, specs[id].clone(), compute, Vec::new()));
        }

        let mut completed = 0;
        while completed < total {
            let Some(joined) = active.next().await else {
                return Err(PipelineError::internal(format!(
                    "job graph stalled with {completed} of {total} jobs complete"
                )));
            };
            let (id, result) =
                joined.map_err(|e| PipelineError::internal(format!("job task failed: {e}")))?;
            outputs[id] = Some(result?);
            completed += 1;

            for child in &children[id] {
                let child = child.0;
                in_degree[child] -= 1;
                if in_degree[child] > 0 {
                    continue;
                }
                let inputs = parents[child]
                    .iter()
                    .map(|p| outputs[p.0].clone())
                    .collect::<Option<Vec<_>>>()
                    .ok_or_else(|| {
                        PipelineError::internal(format!(
                            "job '{}' became ready before its inputs",
                            specs[child].name
                        ))
                    })?;
                let compute = take_compute(&mut computes, child)?;
                active.push(spawn_job(&engine, child, specs[child].clone(), compute, inputs));
            }
        }

        debug!(
            jobs = total,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Job graph complete"
        );
        Ok(GraphOutputs { artifacts: outputs })
    }
}

fn take_compute(computes: &mut [Option<ComputeFn>], id: usize) -> Result<ComputeFn, PipelineError> {
    computes[id]
        .take()
        .ok_or_else(|| PipelineError::internal(format!("job #{id} scheduled twice")))
}

fn spawn_job(
    engine: &Arc<JobEngine>,
    id: usize,
    spec: JobSpec,
    compute: ComputeFn,
    inputs: Vec<Arc<Artifact>>,
) -> JoinHandle<(usize, Result<Arc<Artifact>, PipelineError>)> {
    let engine = Arc::clone(engine);
    tokio::spawn(async move {
        let result = engine.get_or_compute(&spec, move || compute(inputs)).await;
        (id, result)
    })
}

/// Artifacts published by an executed graph, indexed by [`JobId`].
#[derive(Debug, Clone)]
pub struct GraphOutputs {
    artifacts: Vec<Option<Arc<Artifact>>>,
}

impl GraphOutputs {
    /// The artifact of job `id`.
    ///
    /// # Errors
    ///
    /// Returns `DependencyUnavailable` if the job produced nothing.
    pub fn get(&self, id: JobId) -> Result<&Arc<Artifact>, PipelineError> {
        self.artifacts
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or_else(|| {
                PipelineError::dependency_unavailable(format!("job #{} has no artifact", id.0))
            })
    }
}
