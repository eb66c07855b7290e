use async_trait::async_trait;
use serde_json::Value;

use super::ConditionChecker;
use crate::error::Result;
use crate::options::{CheckCtx, CheckDetail, CheckOutcome, LlmContext};

/// Delegates to `options.llm(ctx)`; returns true iff the callback returns
/// boolean true (`None`/unknown is treated as false).
pub struct LlmChecker;

#[async_trait]
impl ConditionChecker for LlmChecker {
    async fn check(&self, ctx: &CheckCtx<'_>, params: &Value) -> Result<CheckOutcome> {
        let Some(backend) = &ctx.options.llm else {
            return Ok(CheckOutcome::miss().with_checker_type("llm"));
        };

        let prompt = params
            .get("prompt")
            .and_then(Value::as_str)
            .unwrap_or("Does this frame satisfy the described condition?")
            .to_string();
        let expected_true = params
            .get("expected_true")
            .and_then(Value::as_bool)
            .unwrap_or(true);

        let verdict = backend
            .judge(LlmContext {
                frame: ctx.frame,
                prev_frame: ctx.frame.prev.and_then(|i| ctx.frames.get(i)),
                next_frame: ctx.frame.next.and_then(|i| ctx.frames.get(i)),
                prompt,
                expected_true,
            })
            .await?;

        let matched = verdict.unwrap_or(false);
        Ok(CheckOutcome {
            matched,
            checker_type: Some("llm".to_string()),
            detail: Some(CheckDetail {
                checker_result: Some(match verdict {
                    Some(true) => "yes".to_string(),
                    Some(false) => "no".to_string(),
                    None => "unknown".to_string(),
                }),
                ..Default::default()
            }),
        })
    }
}
