//! Risk assessment models
//! 危害识别、风险等级与风险评估

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use uuid::Uuid;
use validator::{Validate, ValidationError};

/// 风险等级，声明顺序即严重程度顺序 LOW < MEDIUM < HIGH < CRITICAL
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[sqlx(type_name = "risk_level", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    /// 风险分值映射：>=15 CRITICAL，10..15 HIGH，5..10 MEDIUM，其余 LOW
    pub fn from_score(score: u32) -> Self {
        match score {
            s if s >= 15 => RiskLevel::Critical,
            s if s >= 10 => RiskLevel::High,
            s if s >= 5 => RiskLevel::Medium,
            _ => RiskLevel::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
            RiskLevel::Critical => "CRITICAL",
        }
    }
}

/// 危害（值对象）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Hazard {
    #[serde(rename = "type")]
    #[validate(length(min = 1, message = "hazard type must not be empty"))]
    pub hazard_type: String,
    pub description: String,
    #[serde(default)]
    pub consequences: Vec<String>,
    #[validate(range(min = 1, max = 5, message = "likelihood must be between 1 and 5"))]
    pub likelihood: u8,
    #[validate(range(min = 1, max = 5, message = "severity must be between 1 and 5"))]
    pub severity: u8,
    #[validate(
        length(min = 1, message = "each hazard needs at least one control measure"),
        custom(function = "validate_control_measures")
    )]
    pub control_measures: Vec<String>,
}

impl Hazard {
    pub fn score(&self) -> u32 {
        u32::from(self.likelihood) * u32::from(self.severity)
    }

    pub fn risk_level(&self) -> RiskLevel {
        RiskLevel::from_score(self.score())
    }
}

fn validate_control_measures(measures: &[String]) -> Result<(), ValidationError> {
    if measures.iter().any(|m| m.trim().is_empty()) {
        let mut err = ValidationError::new("blank_control_measure");
        err.message = Some("control measures must not be blank".into());
        return Err(err);
    }
    Ok(())
}

/// 风险评估（与许可一一对应）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct RiskAssessment {
    pub id: Uuid,
    pub permit_id: Uuid,
    pub assessor_id: Uuid,
    pub reviewer_id: Option<Uuid>,
    /// 最近一次复核结论
    pub review_approved: Option<bool>,
    pub risk_level: RiskLevel,
    pub hazards: Json<Vec<Hazard>>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 创建风险评估请求
#[derive(Debug, Deserialize)]
pub struct CreateRiskAssessmentRequest {
    pub hazards: Vec<Hazard>,
}

/// 复核请求
#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    pub approved: bool,
}

/// 复核写入：评估记录复核人，同时条件推进许可状态
#[derive(Debug, Clone)]
pub struct ReviewRecord {
    pub assessment_id: Uuid,
    pub reviewer_id: Uuid,
    pub approved: bool,
    pub permit_id: Uuid,
    pub permit_from: crate::models::permit::PermitStatus,
    pub permit_to: crate::models::permit::PermitStatus,
    pub reviewed_at: DateTime<Utc>,
}
