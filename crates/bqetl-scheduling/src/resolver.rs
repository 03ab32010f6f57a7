//! Cross-task dependency resolution
//!
//! A task depends on every other task whose destination table appears in
//! its `referenced_tables`. Dependencies may cross DAG boundaries; the
//! resolver works on the union of all tasks in a collection.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet, VecDeque};

use crate::collection::DagCollection;
use crate::error::SchedulingError;
use crate::task::{TableRef, Task};

/// `upstream` must run before `downstream`
#[derive(Debug, Clone, Copy)]
pub struct Dependency<'a> {
    pub upstream: &'a Task,
    pub downstream: &'a Task,
}

/// A referenced table that is not produced by any task in the collection
#[derive(Debug, Clone)]
pub struct ExternalDependency<'a> {
    pub task: &'a Task,
    pub location: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    /// On the DFS stack at this depth
    InProgress(usize),
    Done,
}

/// Resolves the dependency order of all tasks in a collection
pub struct DependencyResolver;

impl DependencyResolver {
    /// Build the dependency graph, reject cycles and compute a stable order
    pub fn resolve(collection: &DagCollection) -> Result<Resolution<'_>, SchedulingError> {
        // Node indices follow the tie-break order, so the smallest ready
        // index is always the next task to emit.
        let mut tasks: Vec<&Task> = collection.tasks().collect();
        tasks.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));

        // Task names join dataset and table with `__`, so two distinct
        // tables can still collide on the name the renderer sees.
        let mut producers: HashMap<&TableRef, usize> = HashMap::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        for (idx, task) in tasks.iter().enumerate() {
            let task_name = task.task_name();
            if producers.insert(task.table_ref(), idx).is_some()
                || index.insert(task_name.clone(), idx).is_some()
            {
                return Err(SchedulingError::DuplicateTask { task: task_name });
            }
        }

        let n = tasks.len();
        let mut parents: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut children: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut external = Vec::new();

        for (consumer, task) in tasks.iter().enumerate() {
            for location in task.metadata().referenced_tables() {
                let producer = TableRef::parse(location).and_then(|r| producers.get(&r).copied());

                match producer {
                    Some(producer) if producer == consumer => {
                        tracing::trace!(task = %task.task_name(), "ignoring self reference");
                    }
                    Some(producer) => {
                        if !parents[consumer].contains(&producer) {
                            parents[consumer].push(producer);
                            children[producer].push(consumer);
                        }
                    }
                    None => external.push(ExternalDependency {
                        task: *task,
                        location: location.clone(),
                    }),
                }
            }
            parents[consumer].sort_unstable();
        }

        Self::check_acyclic(&tasks, &children)?;
        let order = Self::topological_order(&parents, &children);

        tracing::debug!(
            tasks = n,
            external = external.len(),
            "resolved task dependencies"
        );

        Ok(Resolution {
            tasks,
            index,
            parents,
            children,
            order,
            external,
        })
    }

    /// Depth-first search with an explicit stack
    ///
    /// A child that is still in progress closes a cycle; the cycle is the
    /// part of the stack from that child's recorded depth to the current node.
    fn check_acyclic(tasks: &[&Task], children: &[Vec<usize>]) -> Result<(), SchedulingError> {
        let mut marks = vec![Mark::Unvisited; tasks.len()];

        for root in 0..tasks.len() {
            if marks[root] != Mark::Unvisited {
                continue;
            }

            marks[root] = Mark::InProgress(0);
            let mut stack: Vec<(usize, usize)> = vec![(root, 0)];

            while let Some(frame) = stack.last_mut() {
                let node = frame.0;

                if let Some(&child) = children[node].get(frame.1) {
                    frame.1 += 1;

                    match marks[child] {
                        Mark::Unvisited => {
                            marks[child] = Mark::InProgress(stack.len());
                            stack.push((child, 0));
                        }
                        Mark::InProgress(start) => {
                            let cycle = stack[start..]
                                .iter()
                                .map(|&(idx, _)| tasks[idx].task_name())
                                .collect();
                            return Err(SchedulingError::CyclicDependency { cycle });
                        }
                        Mark::Done => {}
                    }
                } else {
                    marks[node] = Mark::Done;
                    stack.pop();
                }
            }
        }

        Ok(())
    }

    /// Kahn's algorithm, always taking the smallest ready index
    fn topological_order(parents: &[Vec<usize>], children: &[Vec<usize>]) -> Vec<usize> {
        let mut in_degree: Vec<usize> = parents.iter().map(Vec::len).collect();
        let mut ready: BinaryHeap<Reverse<usize>> = in_degree
            .iter()
            .enumerate()
            .filter(|(_, degree)| **degree == 0)
            .map(|(idx, _)| Reverse(idx))
            .collect();

        let mut order = Vec::with_capacity(parents.len());
        while let Some(Reverse(node)) = ready.pop() {
            order.push(node);

            for &child in &children[node] {
                in_degree[child] -= 1;
                if in_degree[child] == 0 {
                    ready.push(Reverse(child));
                }
            }
        }

        order
    }
}

/// Validated dependency graph of a collection
#[derive(Debug, Clone)]
pub struct Resolution<'a> {
    tasks: Vec<&'a Task>,
    index: HashMap<String, usize>,
    parents: Vec<Vec<usize>>,
    children: Vec<Vec<usize>>,
    order: Vec<usize>,
    external: Vec<ExternalDependency<'a>>,
}

impl<'a> Resolution<'a> {
    /// All tasks, every task after the tasks it depends on
    pub fn order(&self) -> Vec<&'a Task> {
        self.order.iter().map(|&idx| self.tasks[idx]).collect()
    }

    /// Every internal dependency edge
    pub fn edges(&self) -> Vec<Dependency<'a>> {
        self.parents
            .iter()
            .enumerate()
            .flat_map(|(consumer, producers)| {
                producers.iter().map(move |&producer| Dependency {
                    upstream: self.tasks[producer],
                    downstream: self.tasks[consumer],
                })
            })
            .collect()
    }

    /// Look up a task by its task name
    pub fn task(&self, task_name: &str) -> Option<&'a Task> {
        self.index.get(task_name).map(|&idx| self.tasks[idx])
    }

    /// Tasks that must run directly before `task_name`
    pub fn upstream(&self, task_name: &str) -> Vec<&'a Task> {
        self.index
            .get(task_name)
            .map(|&idx| self.parents[idx].iter().map(|&p| self.tasks[p]).collect())
            .unwrap_or_default()
    }

    /// All tasks affected by a change to `task_name` (transitive children)
    pub fn downstream(&self, task_name: &str) -> Vec<&'a Task> {
        let Some(&start) = self.index.get(task_name) else {
            return Vec::new();
        };

        let mut visited = HashSet::new();
        let mut queue: VecDeque<usize> = self.children[start].iter().copied().collect();
        let mut result = Vec::new();

        while let Some(current) = queue.pop_front() {
            if !visited.insert(current) {
                continue;
            }

            result.push(self.tasks[current]);
            queue.extend(
                self.children[current]
                    .iter()
                    .filter(|child| !visited.contains(*child)),
            );
        }

        result
    }

    /// Referenced tables not produced by any task in the collection
    pub fn external_dependencies(&self) -> &[ExternalDependency<'a>] {
        &self.external
    }
}
