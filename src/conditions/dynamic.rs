use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

use super::{bool_param, ConditionChecker};
use crate::error::Result;
use crate::options::{CheckCtx, CheckDetail, CheckOutcome, LlmContext};

#[derive(Debug, Deserialize)]
struct PatternSpec {
    #[serde(default)]
    trigger_keywords: Vec<String>,
    #[serde(default)]
    verify_keywords: Vec<String>,
    #[serde(default)]
    llm_prompt: Option<String>,
}

/// Two-stage predicate: pick the first configured pattern whose trigger
/// keywords appear in a named source field (default `task_description`),
/// then require its verify keywords to appear across a configured set of
/// verification fields (default `reasoning`, `text`). Falls back to an
/// LLM yes/no prompt when `fallback_llm` is set and the base match fails.
pub struct DynamicMatchChecker;

#[async_trait]
impl ConditionChecker for DynamicMatchChecker {
    async fn check(&self, ctx: &CheckCtx<'_>, params: &Value) -> Result<CheckOutcome> {
        let extract_from = params
            .get("extract_from")
            .and_then(Value::as_str)
            .unwrap_or("task_description");
        let source = field_text(ctx, extract_from).to_lowercase();

        let patterns = params
            .get("condition_patterns")
            .and_then(|v| v.as_object())
            .cloned()
            .unwrap_or_default();

        let mut selected: Option<PatternSpec> = None;
        for (_, raw) in patterns.iter() {
            let spec: PatternSpec = match serde_json::from_value(raw.clone()) {
                Ok(s) => s,
                Err(_) => continue,
            };
            if spec
                .trigger_keywords
                .iter()
                .any(|k| source.contains(&k.to_lowercase()))
            {
                selected = Some(spec);
                break;
            }
        }

        let Some(pattern) = selected else {
            return Ok(CheckOutcome::miss().with_checker_type("dynamic_match"));
        };

        let verification_fields = super::str_vec_param(params, "verification_fields");
        let verification_fields = if verification_fields.is_empty() {
            vec!["reasoning".to_string(), "text".to_string()]
        } else {
            verification_fields
        };

        let combined: String = verification_fields
            .iter()
            .map(|f| field_text(ctx, f))
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        let matched = pattern
            .verify_keywords
            .iter()
            .any(|k| combined.contains(&k.to_lowercase()));

        if matched {
            return Ok(CheckOutcome {
                matched: true,
                checker_type: Some("dynamic_match".to_string()),
                detail: Some(CheckDetail {
                    checker_result: Some("hit".to_string()),
                    matched_keywords: pattern.verify_keywords.clone(),
                    ..Default::default()
                }),
            });
        }

        if bool_param(params, "fallback_llm") {
            if let Some(llm) = &ctx.options.llm {
                let prompt = pattern
                    .llm_prompt
                    .clone()
                    .unwrap_or_else(|| "Does this frame satisfy the described condition?".into());
                let verdict = llm
                    .judge(LlmContext {
                        frame: ctx.frame,
                        prev_frame: prev_frame(ctx),
                        next_frame: next_frame(ctx),
                        prompt,
                        expected_true: true,
                    })
                    .await?;
                let matched = verdict.unwrap_or(false);
                return Ok(CheckOutcome {
                    matched,
                    checker_type: Some("dynamic_match".to_string()),
                    detail: Some(CheckDetail {
                        checker_result: Some(if matched { "hit".into() } else { "miss".into() }),
                        ..Default::default()
                    }),
                });
            }
        }

        Ok(CheckOutcome {
            matched: false,
            checker_type: Some("dynamic_match".to_string()),
            detail: Some(CheckDetail {
                checker_result: Some("miss".to_string()),
                unmatched_keywords: pattern.verify_keywords,
                ..Default::default()
            }),
        })
    }
}

fn field_text(ctx: &CheckCtx<'_>, field: &str) -> String {
    match field {
        "task_description" => ctx.frame.task_description.clone(),
        "reasoning" => ctx.frame.reasoning.clone().unwrap_or_default(),
        "text" => ctx.frame.text.clone(),
        "xml_text" => ctx.frame.xml_text.clone(),
        "app_name" => ctx.frame.app_name.clone(),
        _ => String::new(),
    }
}

fn prev_frame<'a>(ctx: &CheckCtx<'a>) -> Option<&'a crate::types::Frame> {
    ctx.frame.prev.and_then(|i| ctx.frames.get(i))
}

fn next_frame<'a>(ctx: &CheckCtx<'a>) -> Option<&'a crate::types::Frame> {
    ctx.frame.next.and_then(|i| ctx.frames.get(i))
}
