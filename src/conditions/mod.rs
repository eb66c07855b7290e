mod basic;
mod combinators;
mod dynamic;
mod icons;
mod llm_checker;
mod ocr_checker;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::options::{CheckCtx, CheckOutcome};

/// A pluggable predicate over a frame. Registered in a process-wide
/// registry by string name; unknown types fail task loading rather than
/// failing at verification time.
#[async_trait]
pub trait ConditionChecker: Send + Sync {
    async fn check(&self, ctx: &CheckCtx<'_>, params: &Value) -> Result<CheckOutcome>;
}

static REGISTRY: Lazy<HashMap<&'static str, Arc<dyn ConditionChecker>>> = Lazy::new(|| {
    let mut m: HashMap<&'static str, Arc<dyn ConditionChecker>> = HashMap::new();
    m.insert("text", Arc::new(basic::TextChecker));
    m.insert("regex", Arc::new(basic::RegexChecker));
    m.insert("ui", Arc::new(basic::UiChecker));
    m.insert("xml", Arc::new(basic::XmlChecker));
    m.insert("action", Arc::new(basic::ActionChecker));
    m.insert("dynamic_match", Arc::new(dynamic::DynamicMatchChecker));
    m.insert("icons", Arc::new(icons::IconsChecker));
    m.insert("ocr", Arc::new(ocr_checker::OcrChecker));
    m.insert("llm", Arc::new(llm_checker::LlmChecker));
    m.insert("escalate", Arc::new(combinators::EscalateChecker));
    m.insert("juxtaposition", Arc::new(combinators::JuxtapositionChecker));
    m
});

pub fn get_checker(condition_type: &str) -> Result<Arc<dyn ConditionChecker>> {
    REGISTRY
        .get(condition_type)
        .cloned()
        .ok_or_else(|| Error::UnknownConditionType(condition_type.to_string()))
}

pub fn is_known_condition_type(condition_type: &str) -> bool {
    REGISTRY.contains_key(condition_type)
}

/// Checkers whose sub-check mix requires OCR or LLM -- these commit and
/// consume frames exclusively on their branch (see the candidate
/// collector). A condition needs exclusivity if it names `ocr` or `llm`
/// directly, or if it's a combinator whose sub-config map contains them.
pub fn condition_needs_exclusive_frame(condition_type: &str, params: &Value) -> bool {
    match condition_type {
        "ocr" | "llm" => true,
        "escalate" | "juxtaposition" => params
            .as_object()
            .map(|m| m.contains_key("ocr") || m.contains_key("llm"))
            .unwrap_or(false),
        "dynamic_match" => params
            .get("fallback_llm")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        _ => false,
    }
}

pub(crate) fn bool_param(params: &Value, key: &str) -> bool {
    params.get(key).and_then(Value::as_bool).unwrap_or(false)
}

pub(crate) fn str_vec_param(params: &Value, key: &str) -> Vec<String> {
    params
        .get(key)
        .and_then(Value::as_array)
        .map(|a| {
            a.iter()
                .filter_map(|v| v.as_str().map(|s| s.to_string()))
                .collect()
        })
        .unwrap_or_default()
}
