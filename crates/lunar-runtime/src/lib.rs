//! Lunar Runtime
//!
//! Executes workflow documents in-process:
//! - [`ComponentWrapper`] binds a component document to its implementation
//!   and runs it, fanning out over mapped inputs
//! - [`update_inputs`] copies an upstream output into a downstream input
//! - [`Scheduler`] walks the dependency graph, runs independent branches in
//!   parallel and collects one [`lunar_config::Outcome`] per component

mod cache;
mod env;
mod error;
mod events;
mod profiles;
mod promise;
mod scheduler;
mod wiring;
mod wrapper;

pub use cache::{RESULT_CACHE_TTL, ResultCache};
pub use env::{ENVIRONMENT_PREFIX, substitute_env, substitute_env_with};
pub use error::{ComponentError, UPSTREAM_FAILED};
pub use events::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier};
pub use profiles::{JsonProfileStore, PROFILES_FILE, Profile, ProfileError, ProfileKind, ProfileStore};
pub use promise::{StreamFold, TaskPromise, consume, split_link_key};
pub use scheduler::{NodeOutcome, Scheduler};
pub use wiring::update_inputs;
pub use wrapper::{ComponentWrapper, FORCE_RUN, is_mapped, parse_flag};
