mod model;
mod registry;
mod store;

pub use model::{Context, DashboardSettings, GsyncConfig};
pub use registry::FileRegistry;
pub use store::ConfigStore;
