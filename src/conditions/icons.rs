use async_trait::async_trait;
use serde_json::Value;

use super::{str_vec_param, ConditionChecker};
use crate::error::Result;
use crate::options::{CheckCtx, CheckDetail, CheckOutcome, IconMatchMode};

/// Asks the icon-detection collaborator to locate named templates in the
/// frame's screenshot. When both `any` and `all` are configured, `any` is
/// tried first and short-circuits on success; `all` is still tried
/// afterward on an `any` miss, rather than the two being mutually
/// exclusive. Requires `options.icons` to be configured.
pub struct IconsChecker;

#[async_trait]
impl ConditionChecker for IconsChecker {
    async fn check(&self, ctx: &CheckCtx<'_>, params: &Value) -> Result<CheckOutcome> {
        let Some(detector) = &ctx.options.icons else {
            return Ok(CheckOutcome::miss().with_checker_type("icons"));
        };

        let any = str_vec_param(params, "any");
        let all = str_vec_param(params, "all");
        let threshold = params.get("threshold").and_then(Value::as_f64);
        let app_id = params.get("app_id").and_then(Value::as_str);

        if any.is_empty() && all.is_empty() {
            return Ok(CheckOutcome::miss().with_checker_type("icons"));
        }

        let mut unmatched_icons = Vec::new();

        if !any.is_empty() {
            let result = detector
                .detect(ctx.frame, &any, app_id, threshold, IconMatchMode::Any)
                .await?;
            if result.success {
                return Ok(CheckOutcome {
                    matched: true,
                    checker_type: Some("icons".to_string()),
                    detail: Some(CheckDetail {
                        checker_result: result.details,
                        matched_keywords: result.matched_icons,
                        unmatched_keywords: result.unmatched_icons,
                    }),
                });
            }
            unmatched_icons.extend(result.unmatched_icons);
        }

        if !all.is_empty() {
            let result = detector
                .detect(ctx.frame, &all, app_id, threshold, IconMatchMode::All)
                .await?;
            if result.success {
                return Ok(CheckOutcome {
                    matched: true,
                    checker_type: Some("icons".to_string()),
                    detail: Some(CheckDetail {
                        checker_result: result.details,
                        matched_keywords: result.matched_icons,
                        unmatched_keywords: result.unmatched_icons,
                    }),
                });
            }
            unmatched_icons.extend(result.unmatched_icons);
        }

        Ok(CheckOutcome {
            matched: false,
            checker_type: Some("icons".to_string()),
            detail: Some(CheckDetail {
                checker_result: Some(if unmatched_icons.is_empty() {
                    "no matching condition".to_string()
                } else {
                    format!("no icon match, unmatched: {unmatched_icons:?}")
                }),
                unmatched_keywords: unmatched_icons,
                ..Default::default()
            }),
        })
    }
}
