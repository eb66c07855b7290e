use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use super::{get_checker, ConditionChecker};
use crate::error::Result;
use crate::options::{CheckCtx, CheckDetail, CheckOutcome};

/// First-true short-circuit over a configurable order (defaults to
/// `VerifierOptions::escalation_order`). `force_llm_verification` narrows
/// the attempt to just the LLM sub-check when both the option and the
/// node's own `llm` params are present.
///
/// Icons policy (see DESIGN.md decision D1): when the `icons` sub-check
/// is configured and fails, the combinator returns false immediately
/// only if no LLM is configured; if an LLM is configured, iteration
/// continues to the remaining checkers in the order instead of treating
/// the icon miss as a hard negative.
pub struct EscalateChecker;

#[async_trait]
impl ConditionChecker for EscalateChecker {
    async fn check(&self, ctx: &CheckCtx<'_>, params: &Value) -> Result<CheckOutcome> {
        let sub_configs = match params.as_object() {
            Some(m) => m,
            None => return Ok(CheckOutcome::miss().with_checker_type("escalate")),
        };

        if ctx.options.force_llm_verification
            && ctx.options.llm.is_some()
            && sub_configs.contains_key("llm")
        {
            return run_sub("llm", &sub_configs["llm"], ctx).await;
        }

        for name in &ctx.options.escalation_order {
            let Some(sub_params) = sub_configs.get(name) else {
                continue;
            };

            if name == "ocr" && ctx.options.ocr.is_none() {
                continue;
            }
            if name == "llm" && ctx.options.llm.is_none() {
                continue;
            }

            let outcome = match run_sub(name, sub_params, ctx).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(target: "dagverify::conditions", checker = %name, error = %e, "sub-checker failed, skipping");
                    continue;
                }
            };

            if outcome.matched {
                return Ok(outcome);
            }

            if name == "icons" && ctx.options.llm.is_none() {
                return Ok(outcome);
            }
            // icons miss with an LLM configured: continue to the next
            // checker in the order (decision D1).
        }

        Ok(CheckOutcome::miss().with_checker_type("escalate"))
    }
}

/// Requires all configured sub-checkers to return true, inspected in a
/// fixed order regardless of `escalation_order`. Short-circuits false on
/// the first failing sub-checker; false if nothing is configured.
pub struct JuxtapositionChecker;

const JUXTAPOSITION_ORDER: &[&str] = &[
    "text",
    "regex",
    "ui",
    "action",
    "xml",
    "dynamic_match",
    "icons",
    "ocr",
    "llm",
];

#[async_trait]
impl ConditionChecker for JuxtapositionChecker {
    async fn check(&self, ctx: &CheckCtx<'_>, params: &Value) -> Result<CheckOutcome> {
        let sub_configs = match params.as_object() {
            Some(m) => m,
            None => return Ok(CheckOutcome::miss().with_checker_type("juxtaposition")),
        };

        let configured: Vec<&str> = JUXTAPOSITION_ORDER
            .iter()
            .copied()
            .filter(|name| sub_configs.contains_key(*name))
            .collect();

        if configured.is_empty() {
            return Ok(CheckOutcome::miss().with_checker_type("juxtaposition"));
        }

        for name in configured {
            let sub_params = &sub_configs[name];
            let outcome = match run_sub(name, sub_params, ctx).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(target: "dagverify::conditions", checker = %name, error = %e, "sub-checker failed, treating as miss");
                    return Ok(CheckOutcome::miss().with_checker_type("juxtaposition"));
                }
            };
            if !outcome.matched {
                return Ok(CheckOutcome {
                    matched: false,
                    checker_type: Some("juxtaposition".to_string()),
                    detail: Some(CheckDetail {
                        checker_result: Some(format!("{name} missed")),
                        ..Default::default()
                    }),
                });
            }
        }

        Ok(CheckOutcome::hit().with_checker_type("juxtaposition"))
    }
}

async fn run_sub(name: &str, params: &Value, ctx: &CheckCtx<'_>) -> Result<CheckOutcome> {
    let checker = get_checker(name)?;
    checker.check(ctx, params).await
}
