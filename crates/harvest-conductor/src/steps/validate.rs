use anyhow::Result;

use harvest_core::{JobState, ValidationStatus};
use harvest_fetch::TargetValidation;

use crate::runner::pipeline::{StepContext, StepHandler};

/// Resolve every target against its controller. Fails the step only when no
/// target validated.
pub struct ValidateTargets;

#[async_trait::async_trait]
impl StepHandler for ValidateTargets {
    async fn run(&self, state: &mut JobState, ctx: &StepContext) -> Result<bool> {
        for target in state.targets.iter_mut() {
            let outcome = match ctx.api.validate_target(target).await {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(
                        controller = %target.controller_host(),
                        application = %target.application_name,
                        error = %e,
                        "controller unreachable"
                    );
                    TargetValidation::NoController
                }
            };
            target.validation_status = match outcome {
                TargetValidation::Valid {
                    application_id,
                    application_name,
                } => {
                    target.application_id = application_id;
                    if !application_name.is_empty() {
                        target.application_name = application_name;
                    }
                    ValidationStatus::Valid
                }
                TargetValidation::Invalid => ValidationStatus::Invalid,
                TargetValidation::NoController => ValidationStatus::NoController,
            };
            tracing::info!(
                controller = %target.controller_host(),
                application = %target.application_name,
                application_id = target.application_id,
                status = ?target.validation_status,
                "target validated"
            );
        }

        let valid = state.valid_targets().count();
        ctx.progress
            .report("validate_targets", &state.job_name, "valid targets", valid);
        if valid == 0 {
            tracing::error!(job = %state.job_name, "no target validated");
        }
        Ok(valid > 0)
    }
}
