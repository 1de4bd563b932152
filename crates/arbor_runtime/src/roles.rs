//! Ready-made component shapes used by the `arbor` binary.

use crate::{Component, ComponentSettings};
use arbor_core::CoreError;
use arbor_jobs::{CounterTask, JobRecord};
use arbor_transport::Transport;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Job path of the counter demo
pub const COUNTER_JOB: &str = "/jobs/counter";

/// Output path of the counter demo
pub const COUNTER_OUTPUT: &str = "/products/counter";

/// What a component does besides registering and replicating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Role {
    /// Issues the counter job and works it
    Counter,
    /// Journals everything it receives
    Persist,
    /// Nothing extra
    #[default]
    Plain,
}

impl FromStr for Role {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "counter" => Ok(Self::Counter),
            "persist" | "persistence" => Ok(Self::Persist),
            "plain" => Ok(Self::Plain),
            other => Err(CoreError::malformed("role", format!("unknown role '{}'", other))),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Counter => f.write_str("counter"),
            Self::Persist => f.write_str("persist"),
            Self::Plain => f.write_str("plain"),
        }
    }
}

/// Assemble a component playing `role`
#[must_use]
pub fn assemble(
    role: Role,
    settings: ComponentSettings,
    transport: Arc<dyn Transport>,
) -> Component {
    match role {
        Role::Counter => {
            let job = JobRecord::issue(
                settings.name.clone(),
                settings.service_type.clone(),
                COUNTER_OUTPUT,
            )
            .with_priority(settings.priority);
            let component = Component::new(settings, transport)
                .on_pre_start(move |store| CounterTask::prepare(store, COUNTER_JOB, &job));
            let spec = component.worker_spec(COUNTER_JOB);
            component.worker(spec, CounterTask)
        }
        Role::Persist => {
            let config = settings.persist.clone().unwrap_or_default();
            Component::new(settings, transport).with_persistence(config)
        }
        Role::Plain => Component::new(settings, transport),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_names() {
        for role in [Role::Counter, Role::Persist, Role::Plain] {
            assert_eq!(role.to_string().parse::<Role>().unwrap(), role);
        }
        assert_eq!("Persistence".parse::<Role>().unwrap(), Role::Persist);
        assert!("chef".parse::<Role>().is_err());
    }
}
