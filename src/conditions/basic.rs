use async_trait::async_trait;
use regex::RegexBuilder;
use serde_json::Value;

use super::{str_vec_param, ConditionChecker};
use crate::error::Result;
use crate::options::{CheckCtx, CheckDetail, CheckOutcome};

/// Substring match on `frame.text`. `{any?: [string], all?: [string]}`.
/// True iff at least one of `any`/`all` is non-empty AND every configured
/// list's condition is satisfied.
pub struct TextChecker;

#[async_trait]
impl ConditionChecker for TextChecker {
    async fn check(&self, ctx: &CheckCtx<'_>, params: &Value) -> Result<CheckOutcome> {
        text_match(&ctx.frame.text, params, "text")
    }
}

/// Same semantics as `text`, against accessibility-tree text instead.
pub struct XmlChecker;

#[async_trait]
impl ConditionChecker for XmlChecker {
    async fn check(&self, ctx: &CheckCtx<'_>, params: &Value) -> Result<CheckOutcome> {
        text_match(&ctx.frame.xml_text, params, "xml")
    }
}

fn text_match(haystack: &str, params: &Value, checker_type: &str) -> Result<CheckOutcome> {
    let any = str_vec_param(params, "any");
    let all = str_vec_param(params, "all");
    if any.is_empty() && all.is_empty() {
        return Ok(CheckOutcome::miss().with_checker_type(checker_type));
    }

    let haystack_lower = haystack.to_lowercase();
    let matched_any: Vec<String> = any
        .iter()
        .filter(|k| haystack_lower.contains(&k.to_lowercase()))
        .cloned()
        .collect();
    let any_ok = any.is_empty() || !matched_any.is_empty();

    let matched_all: Vec<String> = all
        .iter()
        .filter(|k| haystack_lower.contains(&k.to_lowercase()))
        .cloned()
        .collect();
    let all_ok = all.is_empty() || matched_all.len() == all.len();

    let matched = any_ok && all_ok;

    let mut unmatched: Vec<String> = any
        .iter()
        .chain(all.iter())
        .filter(|k| !haystack_lower.contains(&k.to_lowercase()))
        .cloned()
        .collect();
    unmatched.sort();
    unmatched.dedup();

    let mut matched_keywords: Vec<String> = matched_any.into_iter().chain(matched_all).collect();
    matched_keywords.sort();
    matched_keywords.dedup();

    let detail = CheckDetail {
        checker_result: Some(if matched { "hit".into() } else { "miss".into() }),
        matched_keywords,
        unmatched_keywords: unmatched,
    };

    Ok(CheckOutcome {
        matched,
        checker_type: Some(checker_type.to_string()),
        detail: Some(detail),
    })
}

/// `re.search(pattern)` on `frame.text` with optional `ignore_case`.
/// Empty pattern is always false.
pub struct RegexChecker;

#[async_trait]
impl ConditionChecker for RegexChecker {
    async fn check(&self, ctx: &CheckCtx<'_>, params: &Value) -> Result<CheckOutcome> {
        let pattern = params.get("pattern").and_then(Value::as_str).unwrap_or("");
        if pattern.is_empty() {
            return Ok(CheckOutcome::miss().with_checker_type("regex"));
        }
        let ignore_case = params
            .get("ignore_case")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        let re = match RegexBuilder::new(pattern).case_insensitive(ignore_case).build() {
            Ok(re) => re,
            Err(_) => return Ok(CheckOutcome::miss().with_checker_type("regex")),
        };
        let matched = re.is_match(&ctx.frame.text);
        Ok(CheckOutcome {
            matched,
            checker_type: Some("regex".to_string()),
            detail: Some(CheckDetail {
                checker_result: Some(if matched { "hit".into() } else { "miss".into() }),
                ..Default::default()
            }),
        })
    }
}

/// Key lookup in `frame.ui`: `{key, equals?}` or `{key, in: [values]}`;
/// with neither, true iff the key is present.
pub struct UiChecker;

#[async_trait]
impl ConditionChecker for UiChecker {
    async fn check(&self, ctx: &CheckCtx<'_>, params: &Value) -> Result<CheckOutcome> {
        let key = match params.get("key").and_then(Value::as_str) {
            Some(k) => k,
            None => return Ok(CheckOutcome::miss().with_checker_type("ui")),
        };
        let value = ctx.frame.ui.get(key);

        let matched = if let Some(equals) = params.get("equals") {
            value.map(|v| v == equals).unwrap_or(false)
        } else if let Some(candidates) = params.get("in").and_then(Value::as_array) {
            value.map(|v| candidates.contains(v)).unwrap_or(false)
        } else {
            value.is_some()
        };

        Ok(CheckOutcome {
            matched,
            checker_type: Some("ui".to_string()),
            detail: Some(CheckDetail {
                checker_result: Some(if matched { "hit".into() } else { "miss".into() }),
                ..Default::default()
            }),
        })
    }
}

/// Matches `frame.action.type` plus a `contains` submap whose keys must
/// equal-match the action's own fields (compared via its JSON form).
/// False if neither `type` nor `contains` is specified.
pub struct ActionChecker;

#[async_trait]
impl ConditionChecker for ActionChecker {
    async fn check(&self, ctx: &CheckCtx<'_>, params: &Value) -> Result<CheckOutcome> {
        let wanted_type = params.get("type").and_then(Value::as_str);
        let contains = params.get("contains").and_then(Value::as_object);
        if wanted_type.is_none() && contains.is_none() {
            return Ok(CheckOutcome::miss().with_checker_type("action"));
        }

        let matched = match &ctx.frame.action {
            None => false,
            Some(action) => {
                let type_ok = wanted_type.map(|t| t == action.type_name()).unwrap_or(true);
                let contains_ok = match contains {
                    None => true,
                    Some(map) => {
                        let action_json = serde_json::to_value(action).unwrap_or(Value::Null);
                        let action_obj = action_json.as_object();
                        map.iter().all(|(k, v)| {
                            action_obj
                                .and_then(|o| o.get(k))
                                .map(|actual| actual == v)
                                .unwrap_or(false)
                        })
                    }
                };
                type_ok && contains_ok
            }
        };

        Ok(CheckOutcome {
            matched,
            checker_type: Some("action".to_string()),
            detail: Some(CheckDetail {
                checker_result: Some(if matched { "hit".into() } else { "miss".into() }),
                ..Default::default()
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::VerifierOptions;
    use crate::types::Frame;

    fn ctx<'a>(frame: &'a Frame, frames: &'a [Frame], options: &'a VerifierOptions) -> CheckCtx<'a> {
        CheckCtx {
            node_id: "n",
            frame,
            frames,
            options,
        }
    }

    #[tokio::test]
    async fn text_any_matches_substring() {
        let mut frame = Frame::blank();
        frame.text = "tap the login button".to_string();
        let frames = vec![frame.clone()];
        let options = VerifierOptions::default();
        let params = serde_json::json!({"any": ["login", "signup"]});
        let outcome = TextChecker.check(&ctx(&frame, &frames, &options), &params).await.unwrap();
        assert!(outcome.matched);
    }

    #[tokio::test]
    async fn text_all_requires_every_keyword() {
        let mut frame = Frame::blank();
        frame.text = "tap the login button".to_string();
        let frames = vec![frame.clone()];
        let options = VerifierOptions::default();
        let params = serde_json::json!({"all": ["login", "missing"]});
        let outcome = TextChecker.check(&ctx(&frame, &frames, &options), &params).await.unwrap();
        assert!(!outcome.matched);
    }

    #[tokio::test]
    async fn regex_empty_pattern_misses() {
        let frame = Frame::blank();
        let frames = vec![frame.clone()];
        let options = VerifierOptions::default();
        let params = serde_json::json!({"pattern": ""});
        let outcome = RegexChecker.check(&ctx(&frame, &frames, &options), &params).await.unwrap();
        assert!(!outcome.matched);
    }
}
