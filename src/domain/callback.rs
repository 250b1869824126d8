//! Payment network callback payload.
//!
//! The network posts confirmation bodies using its own PascalCase field names.
//! Numeric fields arrive either as JSON numbers or as strings, so they are
//! captured as raw values and normalized in [`CallbackEvent::from_payload`].

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CallbackParseError {
    #[error("malformed callback body: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("callback is missing {0}")]
    MissingField(&'static str),
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
    #[error("invalid result code: {0}")]
    InvalidResultCode(String),
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CallbackPayload {
    pub transaction_type: Option<String>,
    #[serde(rename = "TransID")]
    pub trans_id: Option<String>,
    pub trans_time: Option<String>,
    pub trans_amount: Option<Value>,
    pub business_short_code: Option<Value>,
    pub bill_ref_number: Option<String>,
    #[serde(rename = "MSISDN")]
    pub msisdn: Option<Value>,
    pub first_name: Option<String>,
    pub middle_name: Option<String>,
    pub last_name: Option<String>,
    pub result_code: Option<Value>,
    pub result_desc: Option<String>,
}

/// A normalized callback, ready for reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackEvent {
    pub module: String,
    pub transaction_type: String,
    pub external_tx_id: String,
    pub timestamp: Option<String>,
    pub amount: Option<i64>,
    pub short_code: Option<String>,
    pub account_reference: Option<String>,
    pub phone: Option<String>,
    pub payer_name: Option<String>,
    pub result_code: i64,
    pub result_desc: Option<String>,
}

impl CallbackEvent {
    pub fn parse(module: &str, body: &[u8]) -> Result<Self, CallbackParseError> {
        let payload: CallbackPayload = serde_json::from_slice(body)?;
        Self::from_payload(module, payload)
    }

    pub fn from_payload(module: &str, payload: CallbackPayload) -> Result<Self, CallbackParseError> {
        let result_code = match payload.result_code.as_ref() {
            None | Some(Value::Null) => 0,
            Some(value) => parse_result_code(value)?,
        };

        let amount = match payload.trans_amount.as_ref() {
            None | Some(Value::Null) => None,
            Some(value) => Some(parse_amount(value)?),
        };

        let external_tx_id = non_blank(payload.trans_id).unwrap_or_default();

        if result_code == 0 {
            if external_tx_id.is_empty() {
                return Err(CallbackParseError::MissingField("TransID"));
            }
            match amount {
                None => return Err(CallbackParseError::MissingField("TransAmount")),
                Some(value) if value <= 0 => {
                    return Err(CallbackParseError::InvalidAmount(value.to_string()))
                }
                Some(_) => {}
            }
        }

        let payer_name = [&payload.first_name, &payload.middle_name, &payload.last_name]
            .iter()
            .filter_map(|part| part.as_deref())
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        Ok(Self {
            module: module.to_string(),
            transaction_type: non_blank(payload.transaction_type)
                .unwrap_or_else(|| "Payment".to_string()),
            external_tx_id,
            timestamp: non_blank(payload.trans_time),
            amount,
            short_code: payload.business_short_code.as_ref().and_then(value_to_string),
            account_reference: non_blank(payload.bill_ref_number),
            phone: payload.msisdn.as_ref().and_then(value_to_string),
            payer_name: Some(payer_name).filter(|name| !name.is_empty()),
            result_code,
            result_desc: non_blank(payload.result_desc),
        })
    }

    pub fn is_success(&self) -> bool {
        self.result_code == 0
    }

    /// Human-readable description used for categorization of orphans.
    pub fn description(&self) -> String {
        match (&self.payer_name, &self.account_reference) {
            (Some(name), _) => format!("{} from {}", self.transaction_type, name),
            (None, Some(reference)) => format!("{} {}", self.transaction_type, reference),
            (None, None) => self.transaction_type.clone(),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn value_to_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => non_blank(Some(s.clone())),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn parse_amount(value: &Value) -> Result<i64, CallbackParseError> {
    let invalid = || CallbackParseError::InvalidAmount(value.to_string());
    match value {
        Value::Number(n) => {
            if let Some(whole) = n.as_i64() {
                return Ok(whole);
            }
            match n.as_f64() {
                Some(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Ok(f as i64),
                _ => Err(invalid()),
            }
        }
        Value::String(s) => {
            let s = s.trim();
            let (whole, fraction) = s.split_once('.').unwrap_or((s, ""));
            if !fraction.chars().all(|ch| ch == '0') {
                return Err(invalid());
            }
            whole.parse::<i64>().map_err(|_| invalid())
        }
        _ => Err(invalid()),
    }
}

fn parse_result_code(value: &Value) -> Result<i64, CallbackParseError> {
    let parsed = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| CallbackParseError::InvalidResultCode(value.to_string()))
}
