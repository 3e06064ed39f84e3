use axum::{body::Bytes, extract::State, response::Json};
use log::info;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::api::{ApiError, ApiResult, AppState};
use crate::wallet::{from_atomic, to_atomic};

#[derive(Debug, Default, Deserialize)]
pub struct FundRequest {
    /// Standard units, as a string or a number
    pub amount: Option<Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FundResponse {
    pub message: String,
    pub irys_tx_id: String,
    /// `"<standard amount> <token>"`
    pub new_balance: String,
}

/// Prepaid storage balance of the server account
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub token: String,
    /// Base-10 integer
    pub balance_atomic: String,
    pub balance_standard: String,
    pub irys_address: String,
}

fn amount_string(amount: Option<&Value>, default: &str) -> ApiResult<String> {
    match amount {
        None | Some(Value::Null) => Ok(default.to_string()),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(default.to_string()),
        Some(Value::String(s)) => Ok(s.trim().to_string()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(other) => Err(ApiError::bad_request(&format!("Invalid amount: {}", other))),
    }
}

/// An empty body selects the default amount; anything else must be a valid request
fn parse_fund_request(body: &[u8]) -> ApiResult<FundRequest> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(FundRequest::default());
    }
    let Json(req) = Json::<FundRequest>::from_bytes(body)?;
    Ok(req)
}

/// Move funds from the server wallet into its storage balance
pub async fn fund_irys_node(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<FundResponse>> {
    let req = parse_fund_request(&body)?;
    let decimals = state.settings.gateway.token_decimals;
    let token = state.gateway.token().to_string();

    let amount = amount_string(req.amount.as_ref(), &state.settings.uploads.default_fund_amount)?;
    let atomic = to_atomic(&amount, decimals)?;
    if atomic.is_zero() {
        return Err(ApiError::bad_request("Amount must be greater than zero"));
    }

    info!("Funding storage balance with {} {} ({} atomic)", amount, token, atomic);
    let receipt = state.gateway.fund(atomic).await?;
    let funded = from_atomic(receipt.quantity, decimals)?;
    info!("Funding transaction {}: {} {}", receipt.id, funded, receipt.token);

    let balance = state.gateway.loaded_balance().await?;
    let new_balance = from_atomic(balance, decimals)?;

    Ok(Json(FundResponse {
        message: format!("Successfully funded Irys node with {} {}", funded, token),
        irys_tx_id: receipt.id,
        new_balance: format!("{} {}", new_balance, token),
    }))
}

pub async fn irys_balance(State(state): State<AppState>) -> ApiResult<Json<BalanceResponse>> {
    let balance = state.gateway.loaded_balance().await?;
    Ok(Json(BalanceResponse {
        token: state.gateway.token().to_string(),
        balance_atomic: balance.to_string(),
        balance_standard: from_atomic(balance, state.settings.gateway.token_decimals)?,
        irys_address: state.gateway.address(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_amount_string() {
        assert_eq!(amount_string(None, "0.005").unwrap(), "0.005");
        assert_eq!(amount_string(Some(&json!(null)), "0.005").unwrap(), "0.005");
        assert_eq!(amount_string(Some(&json!(" 0.1 ")), "0.005").unwrap(), "0.1");
        assert_eq!(amount_string(Some(&json!(0.25)), "0.005").unwrap(), "0.25");
        assert_eq!(amount_string(Some(&json!(1)), "0.005").unwrap(), "1");
        assert!(amount_string(Some(&json!([1])), "0.005").is_err());
    }

    #[test]
    fn test_parse_fund_request() {
        assert!(parse_fund_request(b"").unwrap().amount.is_none());
        assert!(parse_fund_request(b" \n").unwrap().amount.is_none());
        assert_eq!(parse_fund_request(br#"{"amount":"0.1"}"#).unwrap().amount, Some(json!("0.1")));

        let truncated = parse_fund_request(br#"{"amount": "1.0""#).unwrap_err();
        assert_eq!(truncated.code, 400);
        assert_eq!(parse_fund_request(br#""0.1""#).unwrap_err().code, 400);
    }
}
