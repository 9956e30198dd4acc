//! Command table.
//!
//! Commands are nested groups of tasks (`server` → `start`, `stop`, ...),
//! registered explicitly at startup. Lookups walk the table along a dot- or
//! space-separated path; a group on its own is not runnable.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{AdminError, Result};
use crate::executor::task::Task;

#[derive(Debug, Clone)]
enum Node {
    Group(BTreeMap<String, Node>),
    Task(Arc<Task>),
}

#[derive(Debug, Clone, Default)]
pub struct Registry {
    root: BTreeMap<String, Node>,
}

fn split_path(name: &str) -> Vec<&str> {
    name.split(|c: char| c == '.' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `task` under its command path.
    pub fn register(&mut self, task: Task) -> Result<()> {
        let path: Vec<String> = task.path().map(str::to_string).collect();
        let Some((leaf, groups)) = path.split_last() else {
            return Err(AdminError::config("Task with an empty name"));
        };

        let mut level = &mut self.root;
        for group in groups {
            let node = level
                .entry(group.clone())
                .or_insert_with(|| Node::Group(BTreeMap::new()));
            level = match node {
                Node::Group(children) => children,
                Node::Task(_) => {
                    return Err(AdminError::config(format!(
                        "'{}' is a task, not a command group",
                        group
                    )))
                }
            };
        }
        if level.contains_key(leaf) {
            return Err(AdminError::config(format!(
                "Command '{}' registered twice",
                task.name()
            )));
        }
        level.insert(leaf.clone(), Node::Task(Arc::new(task)));
        Ok(())
    }

    /// Looks up a runnable task by its full path, e.g. `server start` or
    /// `server.start`.
    pub fn resolve(&self, name: &str) -> Option<Arc<Task>> {
        let path = split_path(name);
        let (leaf, groups) = path.split_last()?;
        let mut level = &self.root;
        for group in groups {
            match level.get(*group)? {
                Node::Group(children) => level = children,
                Node::Task(_) => return None,
            }
        }
        match level.get(*leaf)? {
            Node::Task(task) => Some(Arc::clone(task)),
            Node::Group(_) => None,
        }
    }

    /// Splits command line words into a task and its arguments. Words are
    /// consumed through groups until a task is reached; the rest are
    /// arguments.
    pub fn resolve_command<'a>(&self, words: &'a [String]) -> Option<(Arc<Task>, &'a [String])> {
        let mut level = &self.root;
        for (i, word) in words.iter().enumerate() {
            // `server.start` on the command line is one word.
            let mut node: Option<&Node> = None;
            for part in split_path(word) {
                match node {
                    Some(Node::Task(_)) => return None,
                    Some(Node::Group(children)) => level = children,
                    None => {}
                }
                node = Some(level.get(part)?);
            }
            match node? {
                Node::Task(task) => return Some((Arc::clone(task), &words[i + 1..])),
                Node::Group(children) => level = children,
            }
        }
        None
    }

    /// Every runnable command path, sorted.
    pub fn commands(&self) -> Vec<Arc<Task>> {
        fn walk(level: &BTreeMap<String, Node>, out: &mut Vec<Arc<Task>>) {
            for node in level.values() {
                match node {
                    Node::Task(task) => out.push(Arc::clone(task)),
                    Node::Group(children) => walk(children, out),
                }
            }
        }
        let mut out = vec![];
        walk(&self.root, &mut out);
        out
    }

    /// Command listing for help output.
    pub fn listing(&self) -> String {
        let commands = self.commands();
        let width = commands.iter().map(|t| t.name().len()).max().unwrap_or(0);
        commands
            .iter()
            .map(|task| format!("    {:width$}  {}", task.name(), task.get_summary(), width = width))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
