//! SafeSpace: isolated execution sandboxes combining directory isolation,
//! network isolation and traffic shaping, VM and container facets, a
//! content-addressed artifact cache, and an adaptive resource manager.
//!
//! `sandbox` is the facade: it composes the network, vm, and container
//! modules behind one verb surface rather than exposing them separately.

pub mod cache;
pub mod constants;
pub mod container;
pub mod errors;
pub mod logging;
pub mod network;
pub mod resource;
pub mod sandbox;
pub mod settings;
pub mod state_store;
pub mod util;
pub mod vm;

pub use errors::{SafeSpaceError, SafeSpaceResult};
pub use sandbox::{HealthReport, Sandbox, SandboxController, SandboxMode};
pub use settings::Settings;
