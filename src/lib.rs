// Library root
// -----------
// The binary (`main.rs`) is a thin shell over these modules:
// - `cli`: argument surface and the async run() entrypoint.
// - `config`: upload target resolution (endpoint URL, expires hint).
// - `source`: byte-source abstraction over file / tar pipe / stdin.
// - `multipart`: streaming multipart/form-data encoder.
// - `progress`: byte counting and throttled terminal rendering.
// - `upload`: endpoint seam, HTTP implementation and orchestration.
// - `clip`: clipboard helper wrapper.

pub mod cli;
pub mod clip;
pub mod config;
pub mod multipart;
pub mod progress;
pub mod source;
pub mod upload;

pub use cli::{run, Cli, Outcome};
