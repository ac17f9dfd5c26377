//! Etherscan-compatible contract verification API.

use serde::Deserialize;

/// Envelope returned by every Etherscan API call.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiResponse {
    pub status: String,
    pub message: String,
    pub result: String,
}

impl ApiResponse {
    pub fn is_ok(&self) -> bool {
        self.status == "1"
    }
}

/// State of a submitted verification request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    Pending,
    Verified,
    Failed(String),
}

impl From<&ApiResponse> for CheckStatus {
    fn from(response: &ApiResponse) -> Self {
        if response.result.starts_with("Pending in queue") {
            CheckStatus::Pending
        } else if response.is_ok() {
            CheckStatus::Verified
        } else {
            CheckStatus::Failed(response.result.clone())
        }
    }
}

/// Interpret the answer to a `verifysourcecode` submission.
///
/// Returns the GUID used to poll `checkverifystatus`. Anything else, including
/// "already verified", is a rejection.
pub fn submission_guid(response: &ApiResponse) -> anyhow::Result<String> {
    if response.is_ok() && !response.result.is_empty() {
        return Ok(response.result.clone());
    }

    anyhow::bail!(
        "Explorer rejected verification submission: {} ({})",
        response.result,
        response.message
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: &str, message: &str, result: &str) -> ApiResponse {
        ApiResponse {
            status: status.to_string(),
            message: message.to_string(),
            result: result.to_string(),
        }
    }

    #[test]
    fn test_submission_guid() {
        let ok = response("1", "OK", "ezq878u486pzijkvvmerl6a9mzwhv6sefgvqi5tkwceejc7tvn");
        assert_eq!(
            submission_guid(&ok).unwrap(),
            "ezq878u486pzijkvvmerl6a9mzwhv6sefgvqi5tkwceejc7tvn"
        );

        let already = response("0", "NOTOK", "Contract source code already verified");
        let err = submission_guid(&already).unwrap_err();
        assert!(err.to_string().contains("already verified"));

        let not_indexed = response("0", "NOTOK", "Unable to locate ContractCode at 0x2222");
        assert!(submission_guid(&not_indexed).is_err());
    }

    #[test]
    fn test_check_status() {
        assert_eq!(
            CheckStatus::from(&response("0", "NOTOK", "Pending in queue")),
            CheckStatus::Pending
        );
        assert_eq!(
            CheckStatus::from(&response("1", "OK", "Pass - Verified")),
            CheckStatus::Verified
        );
        assert_eq!(
            CheckStatus::from(&response("0", "NOTOK", "Fail - Unable to verify")),
            CheckStatus::Failed("Fail - Unable to verify".to_string())
        );
    }

    #[test]
    fn test_parse_response() {
        let parsed: ApiResponse =
            serde_json::from_str(r#"{"status":"1","message":"OK","result":"Pass - Verified"}"#)
                .unwrap();
        assert!(parsed.is_ok());
    }
}
