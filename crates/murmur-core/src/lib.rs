pub mod clock;
pub mod config;
pub mod error;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{
    AgentConfig, GeneralConfig, MurmurConfig, PermissionMode, RegistryConfig, RouterConfig,
};
pub use error::{MurmurError, Result};
