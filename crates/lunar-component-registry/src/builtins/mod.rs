//! Components compiled into the engine.

mod aggregator;
mod io;
mod python_coder;
mod stream;
mod subworkflow;

pub use aggregator::Aggregator;
pub use io::{JsonInput, TextInput};
pub use python_coder::{PYTHON_CODER_CLASS, PythonCoder};
pub use stream::{ListStreamer, StreamCollector};
pub use subworkflow::SUBWORKFLOW_CLASS;

use crate::registry::RegisteredComponent;

/// Every builtin component class.
pub fn builtin_components() -> Vec<RegisteredComponent> {
  vec![
    io::text_input(),
    io::json_input(),
    aggregator::registered(),
    stream::list_streamer(),
    stream::stream_collector(),
    subworkflow::registered(),
    python_coder::registered(),
  ]
}
