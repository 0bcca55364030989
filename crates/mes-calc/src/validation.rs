//! 報工提交驗證閘門

use chrono::{DateTime, Utc};
use mes_core::{EngineConfig, MaterialAllocation, MesError, RejectRequest, SubmitRequest, ValidationError};
use rust_decimal::Decimal;

use crate::{PlanWarning, WarningKind};

/// 驗證所需的外部資訊
#[derive(Debug, Clone)]
pub struct ValidationContext<'a> {
    /// 目前時間
    pub now: DateTime<Utc>,

    /// 作業剩餘可報工數量
    pub remaining_quantity: Decimal,

    /// 可選設備（None 表示不檢查）
    pub known_equipment: Option<&'a [String]>,

    /// 啟用中操作員（None 表示不檢查）
    pub known_operators: Option<&'a [String]>,

    /// 物料分配彙總
    pub materials: &'a [MaterialAllocation],
}

impl<'a> ValidationContext<'a> {
    pub fn new(now: DateTime<Utc>, remaining_quantity: Decimal) -> Self {
        Self {
            now,
            remaining_quantity,
            known_equipment: None,
            known_operators: None,
            materials: &[],
        }
    }

    /// 建構器模式：設置設備與操作員名冊
    pub fn with_rosters(mut self, equipment: &'a [String], operators: &'a [String]) -> Self {
        self.known_equipment = Some(equipment);
        self.known_operators = Some(operators);
        self
    }

    /// 建構器模式：設置物料分配彙總
    pub fn with_materials(mut self, materials: &'a [MaterialAllocation]) -> Self {
        self.materials = materials;
        self
    }
}

/// 驗證結果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    /// 阻擋錯誤
    pub errors: Vec<ValidationError>,

    /// 非阻擋警告
    pub warnings: Vec<PlanWarning>,
}

impl ValidationReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// 有錯誤時轉為 `MesError::Validation`，否則回傳警告
    pub fn into_result(self) -> Result<Vec<PlanWarning>, MesError> {
        if self.errors.is_empty() {
            Ok(self.warnings)
        } else {
            Err(MesError::Validation(self.errors))
        }
    }
}

/// 報工驗證器
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfirmationValidator {
    block_on_unallocated_mandatory: bool,
}

impl ConfirmationValidator {
    pub fn new(block_on_unallocated_mandatory: bool) -> Self {
        Self {
            block_on_unallocated_mandatory,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.block_on_unallocated_mandatory)
    }

    /// 驗證報工提交
    pub fn validate_submission(
        &self,
        request: &SubmitRequest,
        context: &ValidationContext<'_>,
    ) -> ValidationReport {
        let mut report = ValidationReport::default();

        Self::check_common(request, context, &mut report.errors);

        if request.produced_quantity <= Decimal::ZERO {
            report.errors.push(ValidationError::NonPositiveQuantity);
        } else if request.produced_quantity > context.remaining_quantity {
            report.errors.push(ValidationError::ExceedsRemainingQuantity {
                produced: request.produced_quantity,
                remaining: context.remaining_quantity,
            });
        }

        for material in context.materials {
            if material.mandatory && material.is_unallocated() {
                if self.block_on_unallocated_mandatory {
                    report.errors.push(ValidationError::UnallocatedMandatoryMaterial(
                        material.material_id.clone(),
                    ));
                } else {
                    report.warnings.push(PlanWarning::warning(
                        material.material_id.clone(),
                        WarningKind::UnallocatedMandatory,
                        format!("必要物料 {} 未分配任何批次", material.material_id),
                    ));
                }
            } else if !material.sufficient_stock {
                report.warnings.push(PlanWarning::warning(
                    material.material_id.clone(),
                    WarningKind::StockShortfall,
                    format!(
                        "物料 {} 分配不足：需要 {}, 已分配 {}",
                        material.material_id, material.required_quantity, material.allocated_quantity
                    ),
                ));
            }
        }

        if !report.is_ok() {
            tracing::debug!("報工驗證失敗: {:?}", report.errors);
        }

        report
    }

    /// 驗證駁回（共用閘門，但不檢查數量與物料）
    pub fn validate_rejection(
        &self,
        request: &RejectRequest,
        context: &ValidationContext<'_>,
    ) -> ValidationReport {
        let mut report = ValidationReport::default();

        if request.reason.trim().is_empty() {
            report.errors.push(ValidationError::MissingRejectionReason);
        }
        Self::check_common(&request.submission, context, &mut report.errors);

        report
    }

    /// 設備、操作員、時間與延誤原因
    fn check_common(
        request: &SubmitRequest,
        context: &ValidationContext<'_>,
        errors: &mut Vec<ValidationError>,
    ) {
        if request.equipment_ids.is_empty() {
            errors.push(ValidationError::MissingEquipment);
        } else if let Some(known) = context.known_equipment {
            errors.extend(
                request
                    .equipment_ids
                    .iter()
                    .filter(|id| !known.contains(id))
                    .map(|id| ValidationError::UnknownEquipment(id.clone())),
            );
        }

        if request.operator_ids.is_empty() {
            errors.push(ValidationError::MissingOperator);
        } else if let Some(known) = context.known_operators {
            errors.extend(
                request
                    .operator_ids
                    .iter()
                    .filter(|id| !known.contains(id))
                    .map(|id| ValidationError::UnknownOperator(id.clone())),
            );
        }

        if request.end_time <= request.start_time {
            errors.push(ValidationError::InvalidTimeRange);
        }

        if request.start_time > context.now {
            errors.push(ValidationError::StartInFuture);
        }

        let has_reason = request
            .delay_reason
            .as_deref()
            .is_some_and(|r| !r.trim().is_empty());
        if request.delay_minutes > 0 && !has_reason {
            errors.push(ValidationError::MissingDelayReason(request.delay_minutes));
        }

        if request.scrap_quantity < Decimal::ZERO {
            errors.push(ValidationError::NegativeScrap);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 11, 3, 12, 0, 0).unwrap()
    }

    fn valid_request() -> SubmitRequest {
        SubmitRequest::new(
            Decimal::from(100),
            now() - Duration::hours(3),
            now() - Duration::hours(1),
            "alice".to_string(),
        )
        .with_equipment(vec!["MIXER-01".to_string()])
        .with_operators(vec!["OP-ALICE".to_string()])
    }

    fn roster() -> (Vec<String>, Vec<String>) {
        (vec!["MIXER-01".to_string()], vec!["OP-ALICE".to_string()])
    }

    #[test]
    fn test_valid_submission() {
        let validator = ConfirmationValidator::default();
        let (equipment, operators) = roster();
        let context =
            ValidationContext::new(now(), Decimal::from(100)).with_rosters(&equipment, &operators);

        let report = validator.validate_submission(&valid_request(), &context);
        assert!(report.is_ok());
        assert!(report.into_result().unwrap().is_empty());
    }

    #[test]
    fn test_missing_equipment_and_operator() {
        let validator = ConfirmationValidator::default();
        let context = ValidationContext::new(now(), Decimal::from(100));
        let request = SubmitRequest::new(
            Decimal::from(100),
            now() - Duration::hours(3),
            now() - Duration::hours(1),
            "alice".to_string(),
        );

        let report = validator.validate_submission(&request, &context);
        assert_eq!(
            report.errors,
            vec![ValidationError::MissingEquipment, ValidationError::MissingOperator]
        );
    }

    #[test]
    fn test_unknown_roster_entries() {
        let validator = ConfirmationValidator::default();
        let (equipment, operators) = roster();
        let context =
            ValidationContext::new(now(), Decimal::from(100)).with_rosters(&equipment, &operators);
        let request = valid_request().with_equipment(vec!["OVEN-99".to_string()]);

        let report = validator.validate_submission(&request, &context);
        assert_eq!(
            report.errors,
            vec![ValidationError::UnknownEquipment("OVEN-99".to_string())]
        );
    }

    #[test]
    fn test_time_gates() {
        let validator = ConfirmationValidator::default();
        let context = ValidationContext::new(now(), Decimal::from(100));

        let mut reversed = valid_request();
        reversed.end_time = reversed.start_time;
        let report = validator.validate_submission(&reversed, &context);
        assert_eq!(report.errors, vec![ValidationError::InvalidTimeRange]);

        let mut future = valid_request();
        future.start_time = now() + Duration::minutes(5);
        future.end_time = now() + Duration::hours(1);
        let report = validator.validate_submission(&future, &context);
        assert_eq!(report.errors, vec![ValidationError::StartInFuture]);
    }

    #[test]
    fn test_delay_reason_required() {
        let validator = ConfirmationValidator::default();
        let context = ValidationContext::new(now(), Decimal::from(100));

        let request = valid_request().with_delay(20, Some("  ".to_string()));
        let report = validator.validate_submission(&request, &context);
        assert_eq!(report.errors, vec![ValidationError::MissingDelayReason(20)]);
        assert_eq!(report.errors[0].field(), "delay_reason");

        let request = valid_request().with_delay(20, Some("換線".to_string()));
        assert!(validator.validate_submission(&request, &context).is_ok());
    }

    #[test]
    fn test_quantity_gates() {
        let validator = ConfirmationValidator::default();
        let context = ValidationContext::new(now(), Decimal::from(20));

        let report = validator.validate_submission(&valid_request(), &context);
        assert!(matches!(
            report.errors.as_slice(),
            [ValidationError::ExceedsRemainingQuantity { .. }]
        ));

        let mut zero = valid_request();
        zero.produced_quantity = Decimal::ZERO;
        let report = validator.validate_submission(&zero, &context);
        assert_eq!(report.errors, vec![ValidationError::NonPositiveQuantity]);
    }

    #[test]
    fn test_unallocated_mandatory_escalation() {
        let materials = vec![
            MaterialAllocation::new("X".to_string(), Decimal::from(10), Decimal::ZERO, true),
            MaterialAllocation::new("Y".to_string(), Decimal::from(10), Decimal::from(5), true),
        ];
        let context = ValidationContext::new(now(), Decimal::from(100)).with_materials(&materials);

        let lenient = ConfirmationValidator::new(false).validate_submission(&valid_request(), &context);
        assert!(lenient.is_ok());
        assert_eq!(lenient.warnings.len(), 2);

        let strict = ConfirmationValidator::new(true).validate_submission(&valid_request(), &context);
        assert_eq!(
            strict.errors,
            vec![ValidationError::UnallocatedMandatoryMaterial("X".to_string())]
        );
        assert_eq!(strict.warnings.len(), 1);
        assert_eq!(strict.warnings[0].kind, WarningKind::StockShortfall);
    }

    #[test]
    fn test_rejection_requires_reason() {
        let validator = ConfirmationValidator::default();
        let context = ValidationContext::new(now(), Decimal::ZERO);
        let request = RejectRequest {
            submission: valid_request(),
            reason: String::new(),
            rejected_by: "qa".to_string(),
        };

        let report = validator.validate_rejection(&request, &context);
        assert_eq!(report.errors, vec![ValidationError::MissingRejectionReason]);
    }
}
