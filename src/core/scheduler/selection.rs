//! Worker selection policies

use crate::config::SelectionKind;
use crate::core::scheduler::WorkerEndpoint;
use rand::seq::SliceRandom;
use std::sync::Arc;

/// Picks which free worker gets the next task
pub trait SelectionPolicy: Send + Sync {
    fn pick<'a>(&self, free: &'a [WorkerEndpoint]) -> Option<&'a WorkerEndpoint>;
}

/// Uniform random choice
#[derive(Debug, Default, Clone, Copy)]
pub struct RandomSelection;

impl SelectionPolicy for RandomSelection {
    fn pick<'a>(&self, free: &'a [WorkerEndpoint]) -> Option<&'a WorkerEndpoint> {
        free.choose(&mut rand::thread_rng())
    }
}

/// Always the first free worker in configuration order
#[derive(Debug, Default, Clone, Copy)]
pub struct FirstSelection;

impl SelectionPolicy for FirstSelection {
    fn pick<'a>(&self, free: &'a [WorkerEndpoint]) -> Option<&'a WorkerEndpoint> {
        free.first()
    }
}

pub fn policy_for(kind: SelectionKind) -> Arc<dyn SelectionPolicy> {
    match kind {
        SelectionKind::Random => Arc::new(RandomSelection),
        SelectionKind::First => Arc::new(FirstSelection),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ids::WorkerName;
    use std::time::Duration;

    fn endpoints(names: &[&str]) -> Vec<WorkerEndpoint> {
        names
            .iter()
            .map(|n| WorkerEndpoint {
                name: WorkerName::new(n).unwrap(),
                url: None,
                timeout: Duration::from_millis(100),
            })
            .collect()
    }

    #[test]
    fn test_first_selection() {
        let free = endpoints(&["w2", "w1"]);
        assert_eq!(FirstSelection.pick(&free).unwrap().name.as_str(), "w2");
    }

    #[test]
    fn test_random_selection_stays_in_set() {
        let free = endpoints(&["w1", "w2", "w3"]);
        for _ in 0..20 {
            let picked = RandomSelection.pick(&free).unwrap();
            assert!(free.contains(picked));
        }
    }

    #[test]
    fn test_empty_set() {
        assert!(RandomSelection.pick(&[]).is_none());
        assert!(policy_for(SelectionKind::First).pick(&[]).is_none());
    }
}
