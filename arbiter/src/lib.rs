//! Arbiter aggregate crate that re-exports the main components for downstream users.

pub use arbiter_broker as broker;
pub use arbiter_config as config;
pub use arbiter_core as core;
pub use arbiter_engine as engine;
pub use arbiter_features as features;
pub use arbiter_learner as learner;
pub use arbiter_registry as registry;
pub use arbiter_strategy as strategy;

/// Convenience prelude to pull commonly used items into scope.
pub mod prelude {
    pub use arbiter_broker::*;
    pub use arbiter_config::*;
    pub use arbiter_core::*;
    pub use arbiter_engine::*;
    pub use arbiter_features::*;
    pub use arbiter_learner::*;
    pub use arbiter_registry::*;
    pub use arbiter_strategy::*;
}
