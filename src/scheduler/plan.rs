use serde::{Deserialize, Serialize};

/// Reference to one shard of a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShardRef {
    name: String,
}

impl ShardRef {
    pub fn new(dataset: &str, shard: u32) -> Self {
        Self {
            name: format!("{dataset}@{shard}"),
        }
    }

    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    pub inputs: Vec<ShardRef>,
    pub outputs: Vec<ShardRef>,
}

impl Task {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_input(mut self, input: ShardRef) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn with_output(mut self, output: ShardRef) -> Self {
        self.outputs.push(output);
        self
    }
}

/// Tasks that are placed together on one allocation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskGroup {
    pub id: u32,
    pub tasks: Vec<Task>,
    /// Capability tag the hosting node must provide.
    pub required_resource: Option<String>,
}

impl TaskGroup {
    pub fn new(id: u32) -> Self {
        Self {
            id,
            ..Default::default()
        }
    }

    pub fn with_task(mut self, task: Task) -> Self {
        self.tasks.push(task);
        self
    }

    pub fn requiring(mut self, tag: impl Into<String>) -> Self {
        self.required_resource = Some(tag.into());
        self
    }

    /// The task whose inputs stand for the whole group.
    pub fn representative(&self) -> Option<&Task> {
        self.tasks.first()
    }
}
