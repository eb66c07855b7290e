use async_trait::async_trait;
use regex::RegexBuilder;
use serde_json::Value;

use super::{str_vec_param, ConditionChecker};
use crate::error::Result;
use crate::ocr::{smart_text_contains, ProcessedText};
use crate::options::{CheckCtx, CheckDetail, CheckOutcome};

/// Invokes `options.ocr(frame)` for a text string derived from the
/// screenshot (possibly merged with accessibility-tree text), then
/// matches in two passes: raw substring/regex first, then an enhanced
/// pass using the normalized `ProcessedText` view.
pub struct OcrChecker;

#[async_trait]
impl ConditionChecker for OcrChecker {
    async fn check(&self, ctx: &CheckCtx<'_>, params: &Value) -> Result<CheckOutcome> {
        let Some(backend) = &ctx.options.ocr else {
            return Ok(CheckOutcome::miss().with_checker_type("ocr"));
        };

        let recognized = match backend.recognize(ctx.frame).await? {
            Some(text) => text,
            None => return Ok(CheckOutcome::miss().with_checker_type("ocr")),
        };

        let any = str_vec_param(params, "any");
        let all = str_vec_param(params, "all");
        let pattern = params.get("pattern").and_then(Value::as_str);
        let ignore_case = params
            .get("ignore_case")
            .and_then(Value::as_bool)
            .unwrap_or(false);

        // Pass 1: raw substring / regex against the recognized string.
        // `ignore_case` only affects the `pattern` regex branch; the
        // any/all substring comparison is always case-sensitive.
        if let Some(hit) = raw_pass(&recognized, &any, &all, pattern, ignore_case) {
            return Ok(hit);
        }

        // Pass 2: normalized, confusable-corrected, fuzzy-tolerant match.
        let processed = ProcessedText::new(&recognized);
        let mut matched_keywords = Vec::new();
        let mut unmatched_keywords = Vec::new();
        for keyword in any.iter().chain(all.iter()) {
            if smart_text_contains(&processed, keyword) {
                matched_keywords.push(keyword.clone());
            } else {
                unmatched_keywords.push(keyword.clone());
            }
        }

        let any_ok = any.is_empty() || any.iter().any(|k| matched_keywords.contains(k));
        let all_ok = all.is_empty() || all.iter().all(|k| matched_keywords.contains(k));
        let matched = (!any.is_empty() || !all.is_empty()) && any_ok && all_ok;

        Ok(CheckOutcome {
            matched,
            checker_type: Some("ocr".to_string()),
            detail: Some(CheckDetail {
                checker_result: Some(if matched { "hit".into() } else { "miss".into() }),
                matched_keywords,
                unmatched_keywords,
            }),
        })
    }
}

fn raw_pass(
    text: &str,
    any: &[String],
    all: &[String],
    pattern: Option<&str>,
    ignore_case: bool,
) -> Option<CheckOutcome> {
    if let Some(pat) = pattern {
        if !pat.is_empty() {
            if let Ok(re) = RegexBuilder::new(pat).case_insensitive(ignore_case).build() {
                if re.is_match(text) {
                    return Some(CheckOutcome {
                        matched: true,
                        checker_type: Some("ocr".to_string()),
                        detail: Some(CheckDetail {
                            checker_result: Some("hit".to_string()),
                            ..Default::default()
                        }),
                    });
                }
            }
        }
    }

    // Always case-sensitive, regardless of `ignore_case`.
    let haystack = text;

    if !any.is_empty() && any.iter().any(|k| haystack.contains(k.as_str())) {
        return Some(CheckOutcome {
            matched: true,
            checker_type: Some("ocr".to_string()),
            detail: Some(CheckDetail {
                checker_result: Some("hit".to_string()),
                ..Default::default()
            }),
        });
    }
    if !all.is_empty() && all.iter().all(|k| haystack.contains(k.as_str())) {
        return Some(CheckOutcome {
            matched: true,
            checker_type: Some("ocr".to_string()),
            detail: Some(CheckDetail {
                checker_result: Some("hit".to_string()),
                ..Default::default()
            }),
        });
    }
    None
}
