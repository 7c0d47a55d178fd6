//! Business logic services layer

pub mod audit_service;
pub mod expiration_service;
pub mod hierarchy_service;
pub mod permit_service;
pub mod risk_assessment_service;

pub use audit_service::{AuditAction, AuditService};
pub use expiration_service::{ExpirationService, SweepFailure, SweepReport, SweepStage};
pub use hierarchy_service::HierarchyService;
pub use permit_service::PermitService;
pub use risk_assessment_service::{calculate_risk_level, RiskAssessmentService};
