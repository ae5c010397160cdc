pub mod common;
pub mod events;
pub mod limits;
pub mod metrics;
pub mod principals;
pub mod settings;

pub use events::{DashboardExtensions, EventBus};
pub use limits::{register_limit_handlers, LimitService, LimitSynchronizer, LimitWidgets};
pub use settings::StaticSettingsService;

#[cfg(test)]
mod test_utils;
