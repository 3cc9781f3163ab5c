/// Chart addition command handler
pub mod addition;

/// Copy command handler
pub mod copy;

/// Delete and delete-tag command handler
pub mod delete;

/// Turning command-line references into job resources
pub mod endpoint;

/// Version command handlers
pub mod version;
