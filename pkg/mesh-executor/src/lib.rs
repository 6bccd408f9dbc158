pub mod cancellation;
pub mod report_tracker;
pub mod resource;
pub mod resource_dependencies;
pub mod resource_group;
pub mod root_resource;
pub mod task_resource;

pub use cancellation::*;
pub use resource::*;
pub use resource_group::*;
pub use root_resource::*;
pub use task_resource::*;
