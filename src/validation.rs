//! Boundary validation for ingestion requests and site registration
//!
//! Runs before the store is touched. All problems in a request are collected
//! into one `IngestError::Validation` message so a client can fix them in a
//! single round trip.

use crate::amount::Emission;
use crate::error::IngestError;
use crate::types::{IngestRequest, NewSite, MAX_READINGS_PER_BATCH};

const MAX_TEXT_LEN: usize = 255;

pub fn validate_ingest_request(request: &IngestRequest) -> Result<(), IngestError> {
    let mut problems = Vec::new();

    match request.readings.len() {
        0 => problems.push("at least one reading required".to_string()),
        n if n > MAX_READINGS_PER_BATCH => problems.push(format!(
            "maximum {} readings per batch (got {})",
            MAX_READINGS_PER_BATCH, n
        )),
        _ => {}
    }

    for (index, reading) in request.readings.iter().enumerate() {
        if let Some(problem) = amount_problem(&reading.value, false) {
            problems.push(format!("readings[{}].value {}", index, problem));
        }
    }

    finish(problems)
}

pub fn validate_new_site(site: &NewSite) -> Result<(), IngestError> {
    let mut problems = Vec::new();

    if let Some(problem) = text_problem(&site.name) {
        problems.push(format!("name {}", problem));
    }
    if let Some(problem) = text_problem(&site.location) {
        problems.push(format!("location {}", problem));
    }
    if let Some(problem) = amount_problem(&site.emission_limit, true) {
        problems.push(format!("emission_limit {}", problem));
    }

    finish(problems)
}

fn amount_problem(value: &Emission, must_be_positive: bool) -> Option<String> {
    if value.is_negative() {
        return Some("cannot be negative".to_string());
    }
    if must_be_positive && value.is_zero() {
        return Some("must be positive".to_string());
    }
    value.to_units().err().map(|e| e.to_string())
}

fn text_problem(text: &str) -> Option<String> {
    if text.trim().is_empty() {
        Some("is required".to_string())
    } else if text.chars().count() > MAX_TEXT_LEN {
        Some(format!("must be {} characters or less", MAX_TEXT_LEN))
    } else {
        None
    }
}

fn finish(problems: Vec<String>) -> Result<(), IngestError> {
    if problems.is_empty() {
        Ok(())
    } else {
        Err(IngestError::Validation(problems.join("; ")))
    }
}
