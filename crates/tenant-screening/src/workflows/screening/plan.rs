use std::collections::HashMap;

use serde::Serialize;

/// Registry of stage names and their declared dependencies.
///
/// Registration order is significant: stages that land in the same wave are
/// listed in the order they were registered.
#[derive(Debug, Clone, Default)]
pub struct StageGraph {
    nodes: Vec<StageNode>,
    index: HashMap<String, usize>,
}

#[derive(Debug, Clone)]
struct StageNode {
    name: String,
    dependencies: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

impl StageGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dependencies may name stages that are registered later; they are
    /// resolved when the plan is built.
    pub fn register<I, S>(&mut self, name: impl Into<String>, dependencies: I) -> Result<(), GraphError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let name = name.into();
        if self.index.contains_key(&name) {
            return Err(GraphError::DuplicateStage(name));
        }

        let mut declared: Vec<String> = Vec::new();
        for dependency in dependencies {
            let dependency = dependency.into();
            if !declared.contains(&dependency) {
                declared.push(dependency);
            }
        }

        self.index.insert(name.clone(), self.nodes.len());
        self.nodes.push(StageNode {
            name,
            dependencies: declared,
        });
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn dependencies(&self, name: &str) -> Option<&[String]> {
        self.index
            .get(name)
            .map(|&idx| self.nodes[idx].dependencies.as_slice())
    }

    pub fn stage_names(&self) -> impl Iterator<Item = &str> {
        self.nodes.iter().map(|node| node.name.as_str())
    }

    /// Group stages into waves: a stage's wave is one more than the deepest
    /// wave among its dependencies, and stages without dependencies run in
    /// wave zero.
    pub fn build_plan(&self) -> Result<ExecutionPlan, GraphError> {
        for node in &self.nodes {
            for dependency in &node.dependencies {
                if !self.index.contains_key(dependency) {
                    return Err(GraphError::UnknownDependency {
                        stage: node.name.clone(),
                        dependency: dependency.clone(),
                    });
                }
            }
        }

        let mut marks = vec![Mark::Unvisited; self.nodes.len()];
        let mut depths = vec![0usize; self.nodes.len()];
        let mut path = Vec::new();
        for idx in 0..self.nodes.len() {
            self.visit(idx, &mut marks, &mut depths, &mut path)?;
        }

        let wave_count = depths.iter().max().map_or(0, |deepest| deepest + 1);
        let mut waves: Vec<Vec<String>> = vec![Vec::new(); wave_count];
        for (idx, node) in self.nodes.iter().enumerate() {
            waves[depths[idx]].push(node.name.clone());
        }

        Ok(ExecutionPlan { waves })
    }

    fn visit(
        &self,
        idx: usize,
        marks: &mut [Mark],
        depths: &mut [usize],
        path: &mut Vec<usize>,
    ) -> Result<usize, GraphError> {
        match marks[idx] {
            Mark::Done => return Ok(depths[idx]),
            Mark::InProgress => {
                let start = path.iter().position(|&seen| seen == idx).unwrap_or(0);
                let mut cycle: Vec<String> = path[start..]
                    .iter()
                    .map(|&seen| self.nodes[seen].name.clone())
                    .collect();
                cycle.push(self.nodes[idx].name.clone());
                return Err(GraphError::CyclicDependency { cycle });
            }
            Mark::Unvisited => {}
        }

        marks[idx] = Mark::InProgress;
        path.push(idx);

        let mut depth = 0;
        for dependency in &self.nodes[idx].dependencies {
            let dep_idx = *self
                .index
                .get(dependency)
                .ok_or_else(|| GraphError::UnknownDependency {
                    stage: self.nodes[idx].name.clone(),
                    dependency: dependency.clone(),
                })?;
            let dep_depth = self.visit(dep_idx, marks, depths, path)?;
            depth = depth.max(dep_depth + 1);
        }

        path.pop();
        marks[idx] = Mark::Done;
        depths[idx] = depth;
        Ok(depth)
    }
}

/// Ordered waves of stage names. Every stage appears exactly once, and all
/// of a stage's dependencies sit in strictly earlier waves.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionPlan {
    waves: Vec<Vec<String>>,
}

impl ExecutionPlan {
    pub fn waves(&self) -> &[Vec<String>] {
        &self.waves
    }

    pub fn len(&self) -> usize {
        self.waves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waves.is_empty()
    }

    pub fn stage_count(&self) -> usize {
        self.waves.iter().map(Vec::len).sum()
    }

    pub fn wave_of(&self, stage: &str) -> Option<usize> {
        self.waves
            .iter()
            .position(|wave| wave.iter().any(|name| name == stage))
    }

    /// Stages flattened in execution order.
    pub fn stages(&self) -> impl Iterator<Item = &str> {
        self.waves.iter().flatten().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GraphError {
    #[error("stage `{0}` is already registered")]
    DuplicateStage(String),
    #[error("stage `{stage}` depends on unregistered stage `{dependency}`")]
    UnknownDependency { stage: String, dependency: String },
    #[error("cyclic stage dependency: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },
}
