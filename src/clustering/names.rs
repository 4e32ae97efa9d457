use std::collections::{HashMap, HashSet};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::clustering::dbscan::Label;
use crate::db::models::UNCLUSTERED;
use crate::errors::EngineError;

const NAME_PREFIX: &str = "Cl_";
const NAME_MAX: u32 = 999_999_999;

/// Hands out cluster names that collide neither with persisted names nor
/// with anything this allocator already issued.
pub struct ClusterNameAllocator<R = StdRng> {
    taken: HashSet<String>,
    rng: R,
    max_attempts: usize,
}

impl ClusterNameAllocator<StdRng> {
    pub fn from_entropy(taken: HashSet<String>, max_attempts: usize) -> Self {
        Self::new(taken, StdRng::from_entropy(), max_attempts)
    }
}

impl<R: Rng> ClusterNameAllocator<R> {
    pub fn new(mut taken: HashSet<String>, rng: R, max_attempts: usize) -> Self {
        taken.insert(UNCLUSTERED.to_string());
        Self {
            taken,
            rng,
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn is_taken(&self, name: &str) -> bool {
        self.taken.contains(name)
    }

    pub fn allocate(&mut self) -> Result<String, EngineError> {
        for _ in 0..self.max_attempts {
            let candidate = format!("{NAME_PREFIX}{:09}", self.rng.gen_range(1..=NAME_MAX));
            if self.taken.insert(candidate.clone()) {
                return Ok(candidate);
            }
        }

        Err(EngineError::NameSpaceExhausted {
            attempts: self.max_attempts,
        })
    }

    /// Map each label to its name: one fresh name per distinct cluster,
    /// `Unclustered` for noise. Output order matches `labels`.
    pub fn names_for(&mut self, labels: &[Label]) -> Result<Vec<String>, EngineError> {
        let mut by_cluster: HashMap<usize, String> = HashMap::new();
        let mut names = Vec::with_capacity(labels.len());

        for label in labels {
            let name = match label {
                Label::Noise => UNCLUSTERED.to_string(),
                Label::Cluster(id) => match by_cluster.get(id) {
                    Some(name) => name.clone(),
                    None => {
                        let name = self.allocate()?;
                        by_cluster.insert(*id, name.clone());
                        name
                    }
                },
            };
            names.push(name);
        }

        Ok(names)
    }
}
