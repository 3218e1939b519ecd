pub mod catalog;
pub mod gatekeeper;
pub mod loader;
pub mod proxy;

pub use catalog::{Catalog, SkillClass, SkillMethod};
pub use gatekeeper::{Gatekeeper, RemoteDispatch};
pub use loader::{discover_modules, parse_classes, ModuleSource, ParsedClass, ParsedMethod};
pub use proxy::{DeviceProxy, DevicesProxy, MethodProxy, SkillProxy};
