//! Lunar Engine
//!
//! Loads workflow and component documents and runs them, either in this
//! process or isolated inside a per-workflow Python virtual environment.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                         Engine                           │
//! │  - load workflow / component JSON                        │
//! │  - run_file(path, target, executor, cancel) → ResultSet  │
//! └──────────────────────────────────────────────────────────┘
//!                 │                          │
//!                 ▼                          ▼
//! ┌──────────────────────────┐ ┌─────────────────────────────┐
//! │    InProcessExecutor     │ │      IsolatedExecutor       │
//! │  - lunar-runtime         │ │  - venv + requirements      │
//! │    Scheduler             │ │  - engine child process     │
//! └──────────────────────────┘ │  - framed stdout results    │
//!                              └─────────────────────────────┘
//! ```

mod config;
mod dependencies;
mod engine;
mod error;
mod executor;

pub use config::{DATA_DIR_NAME, DEFAULT_VENV, EngineConfig};
pub use dependencies::{collect_requirements, python_imports};
pub use engine::{Engine, RunTarget, compose_output, load_component, load_workflow};
pub use error::EngineError;
pub use executor::{Executor, InProcessExecutor, IsolatedExecutor};
