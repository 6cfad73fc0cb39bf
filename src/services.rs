pub mod auth;
pub mod approval_service;
pub mod audit_service;
pub mod fulfillment_service;
pub mod workflow_service;

pub use approval_service::ApprovalService;
pub use audit_service::AuditService;
pub use fulfillment_service::FulfillmentService;
pub use workflow_service::WorkflowService;
