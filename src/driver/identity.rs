use crate::config::IdentityConfig;
use rand::seq::SliceRandom;

/// Picks a user agent for every page the driver opens
#[derive(Debug, Clone)]
pub struct UserAgentRotator {
    pool: Vec<String>,
}

impl UserAgentRotator {
    pub fn new(config: &IdentityConfig) -> Self {
        Self {
            pool: config.user_agents.clone(),
        }
    }

    /// A random user agent from the pool, or `None` when the pool is empty
    pub fn pick(&self) -> Option<&str> {
        self.pool
            .choose(&mut rand::thread_rng())
            .map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.pool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }
}
