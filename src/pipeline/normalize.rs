//! Text cleanup stage.

use crate::error::RunError;
use crate::models::Record;
use crate::pipeline::{RunState, Stage, Verdict};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Trim, collapse each whitespace run to one space, and keep paragraph
/// breaks: a run holding two or more newlines becomes exactly `"\n\n"`.
pub fn clean_text(text: &str) -> String {
    WHITESPACE
        .replace_all(text.trim(), |caps: &Captures<'_>| {
            if caps[0].matches('\n').count() >= 2 {
                "\n\n"
            } else {
                " "
            }
        })
        .into_owned()
}

/// Clean every text field of `record` in place and stamp `scraped_at` if it
/// is missing. Numeric fields and an existing `scraped_at` are untouched.
pub fn normalize(record: &mut Record, now: DateTime<Utc>) {
    let fields = record.fields_mut();

    for value in fields.required_text_mut() {
        *value = clean_text(value);
    }
    for value in fields.optional_text_mut() {
        *value = value
            .as_deref()
            .map(clean_text)
            .filter(|cleaned| !cleaned.is_empty());
    }
    for list in fields.text_lists_mut() {
        *list = list
            .iter()
            .map(|item| clean_text(item))
            .filter(|item| !item.is_empty())
            .collect();
    }

    let scraped_at = fields.scraped_at_mut();
    if scraped_at.as_deref().is_none_or(|s| s.trim().is_empty()) {
        *scraped_at = Some(now.to_rfc3339_opts(SecondsFormat::Micros, true));
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NormalizeStage;

#[async_trait]
impl Stage for NormalizeStage {
    fn name(&self) -> &'static str {
        "normalize"
    }

    async fn process(&self, mut record: Record, _state: &RunState) -> Result<Verdict, RunError> {
        normalize(&mut record, Utc::now());
        Ok(Verdict::Pass(record))
    }
}
