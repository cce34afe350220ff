//! Mini-app descriptor and shareable deep link
//!
//! The hosting platform embeds the mini-app inside a tweet when handed a
//! metadata descriptor: an action payload carrying the on-chain
//! `mintToken` contract call. The deep link encodes that descriptor into
//! a URL, so browsers without the host extension still land on the app.

use serde::{Deserialize, Serialize};
use serde_json::json;

const SHARE_LINK_BASE: &str = "https://sherry.social/link";

/// POAP contract on mainnet
pub const POAP_CONTRACT_ADDRESS: &str = "0x22C1f6050E56d2876009903609a2cC3fEf83B415";

/// Descriptor consumed by the hosting platform's embedding mechanism
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MiniAppMetadata {
    #[serde(rename = "type")]
    pub kind: String,
    pub url: String,
    pub icon: String,
    pub title: String,
    pub description: String,
    pub actions: Vec<MintAction>,
}

/// One embeddable contract-call action
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MintAction {
    pub label: String,
    pub address: String,
    pub abi: serde_json::Value,
    #[serde(rename = "functionName")]
    pub function_name: String,
    #[serde(rename = "paramsLabel")]
    pub params_label: Vec<String>,
    pub chain: String,
}

/// ABI fragment for the POAP `mintToken(eventId, to)` entry point
fn mint_token_abi() -> serde_json::Value {
    json!([
        {
            "inputs": [
                {
                    "internalType": "uint256",
                    "name": "eventId",
                    "type": "uint256"
                },
                {
                    "internalType": "address",
                    "name": "to",
                    "type": "address"
                }
            ],
            "name": "mintToken",
            "outputs": [],
            "stateMutability": "nonpayable",
            "type": "function"
        }
    ])
}

/// Build the mint descriptor for an event
pub fn mint_metadata(app_url: &str, event_name: &str, icon: Option<String>) -> MiniAppMetadata {
    MiniAppMetadata {
        kind: "action".to_string(),
        url: app_url.to_string(),
        icon: icon.unwrap_or_else(|| format!("{}/poap-event-image.png", app_url)),
        title: format!("Mint {}", event_name),
        description: "Claim your commemorative POAP badge on Twitter".to_string(),
        actions: vec![MintAction {
            label: "Mint POAP".to_string(),
            address: POAP_CONTRACT_ADDRESS.to_string(),
            abi: mint_token_abi(),
            function_name: "mintToken".to_string(),
            params_label: vec!["Event ID".to_string(), "Recipient".to_string()],
            chain: "mainnet".to_string(),
        }],
    }
}

/// Encode a descriptor into the shareable deep link
pub fn build_share_link(app_url: &str, metadata: &MiniAppMetadata) -> anyhow::Result<String> {
    let encoded = urlencoding::encode(&serde_json::to_string(metadata)?).into_owned();
    Ok(format!(
        "{}?app={}&metadata={}",
        SHARE_LINK_BASE,
        urlencoding::encode(app_url),
        encoded
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metadata_shape() {
        let metadata = mint_metadata("https://poap.example", "Rustconf 2024", None);
        let value = serde_json::to_value(&metadata).unwrap();

        assert_eq!(value["type"], "action");
        assert_eq!(value["title"], "Mint Rustconf 2024");
        assert_eq!(value["icon"], "https://poap.example/poap-event-image.png");
        assert_eq!(value["actions"][0]["functionName"], "mintToken");
        assert_eq!(value["actions"][0]["address"], POAP_CONTRACT_ADDRESS);
        assert_eq!(value["actions"][0]["abi"][0]["name"], "mintToken");
    }

    #[test]
    fn test_custom_icon_wins() {
        let metadata = mint_metadata(
            "https://poap.example",
            "Rustconf 2024",
            Some("https://assets.poap.xyz/badge.png".to_string()),
        );
        assert_eq!(metadata.icon, "https://assets.poap.xyz/badge.png");
    }

    #[test]
    fn test_share_link_encodes_payload() {
        let metadata = mint_metadata("https://poap.example/app", "POAP", None);
        let link = build_share_link("https://poap.example/app", &metadata).unwrap();

        assert!(link.starts_with("https://sherry.social/link?app=https%3A%2F%2Fpoap.example%2Fapp&metadata="));
        // The raw descriptor must not leak unencoded separators
        let metadata_param = link.split("&metadata=").nth(1).unwrap();
        assert!(!metadata_param.contains('{'));
        assert!(!metadata_param.contains('&'));

        let decoded = urlencoding::decode(metadata_param).unwrap();
        let roundtrip: MiniAppMetadata = serde_json::from_str(&decoded).unwrap();
        assert_eq!(roundtrip.title, metadata.title);
    }
}
