//! # Task descriptor.
//!
//! [`TaskDescriptor`] is what the controller hands to the service facility at
//! start time: the task name, a flat key/value data bundle, and the status
//! indicator configuration. It is immutable once built.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::ipc::Primitive;

use super::status::{StatusOverrides, StatusSpec};

/// Flat launch data passed to every task body.
pub type TaskData = BTreeMap<String, Primitive>;

/// Immutable description of one task session.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDescriptor {
    name: Arc<str>,
    data: Arc<TaskData>,
    status: StatusSpec,
}

impl TaskDescriptor {
    /// Creates a descriptor with empty data and the default status spec.
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            data: Arc::new(TaskData::new()),
            status: StatusSpec::default(),
        }
    }

    /// Returns a new descriptor with `key` set in the data bundle.
    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Primitive>) -> Self {
        Arc::make_mut(&mut self.data).insert(key.into(), value.into());
        self
    }

    /// Returns a new descriptor with the given status spec.
    pub fn with_status(mut self, status: StatusSpec) -> Self {
        self.status = status;
        self
    }

    /// Returns a new descriptor with `overrides` merged over its status spec.
    pub fn with_status_overrides(mut self, overrides: &StatusOverrides) -> Self {
        self.status = self.status.merged(overrides);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data(&self) -> &Arc<TaskData> {
        &self.data
    }

    pub fn status(&self) -> &StatusSpec {
        &self.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_does_not_mutate_clones() {
        let base = TaskDescriptor::new("sync").with_data("a", 1);
        let extended = base.clone().with_data("b", "two");
        assert_eq!(base.data().len(), 1);
        assert_eq!(extended.data().get("b"), Some(&Primitive::Str("two".into())));
    }
}
