use alloy::primitives::Bytes;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use data_encoding::BASE32_NOPAD;
use serde::Deserialize;
use serde_json::Value;
use sha2::{Digest, Sha512_256};
use tracing::warn;

use algo_wc_core::{RequestItem, RequestMethod, SignedResponse};

/// One entry of an `algo_signTxn` transaction list.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WalletTransaction {
    txn: String,
    #[serde(default)]
    signers: Option<Vec<String>>,
    #[serde(default)]
    auth_addr: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// The only field of a msgpack-encoded transaction the coordinator reads.
#[derive(Debug, Deserialize)]
struct EncodedTransaction {
    snd: Bytes,
}

/// One entry of an `algo_signData` list.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArbitraryData {
    data: String,
    signer: String,
    #[serde(default)]
    chain_id: Option<Value>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedItems {
    pub items: Vec<RequestItem>,
    pub message: Option<String>,
    /// Raw chain id carried by arbitrary-data items, if any.
    pub chain_hint: Option<Value>,
}

/// Decodes the `params` list of a signing request.
///
/// Malformed entries yield an empty item list so the request is still
/// answered, with `MalformedPayload`, by the validator.
pub fn parse_items(method: &RequestMethod, params: &Value) -> ParsedItems {
    let list = params.get(0).cloned().unwrap_or(Value::Null);
    let message = params
        .get(1)
        .and_then(|opts| opts.get("message"))
        .and_then(Value::as_str)
        .map(str::to_owned);

    let parsed = match method {
        RequestMethod::SignTransaction => parse_transactions(list),
        RequestMethod::SignData => parse_data(list),
        RequestMethod::Unsupported(_) => Ok(ParsedItems::default()),
    };
    let mut parsed = parsed.unwrap_or_else(|e| {
        warn!(method = method.wire_name(), error = %e, "malformed request payload");
        ParsedItems::default()
    });
    if message.is_some() {
        parsed.message = message;
    }
    parsed
}

fn parse_transactions(list: Value) -> Result<ParsedItems, String> {
    let txns: Vec<WalletTransaction> =
        serde_json::from_value(list).map_err(|e| format!("transaction list: {e}"))?;
    let mut out = ParsedItems::default();
    for txn in txns {
        let payload = decode_b64(&txn.txn)?;
        let (signer, sign) = match txn.signers {
            Some(signers) if signers.is_empty() => (None, false),
            Some(signers) => (signers.into_iter().next(), true),
            None => match txn.auth_addr {
                Some(auth) => (Some(auth), true),
                None => (Some(transaction_sender(&payload)?), true),
            },
        };
        if out.message.is_none() {
            out.message = txn.message;
        }
        out.items.push(RequestItem {
            payload,
            signer,
            sign,
        });
    }
    Ok(out)
}

fn parse_data(list: Value) -> Result<ParsedItems, String> {
    let entries: Vec<ArbitraryData> =
        serde_json::from_value(list).map_err(|e| format!("data list: {e}"))?;
    let mut out = ParsedItems::default();
    for entry in entries {
        let payload = decode_b64(&entry.data)?;
        if out.chain_hint.is_none() {
            out.chain_hint = entry.chain_id;
        }
        if out.message.is_none() {
            out.message = entry.message;
        }
        out.items.push(RequestItem {
            payload,
            signer: Some(entry.signer),
            sign: true,
        });
    }
    Ok(out)
}

/// Sender address of a msgpack-encoded transaction.
fn transaction_sender(payload: &[u8]) -> Result<String, String> {
    let txn: EncodedTransaction =
        rmp_serde::from_slice(payload).map_err(|e| format!("transaction encoding: {e}"))?;
    let public_key: [u8; 32] = txn
        .snd
        .as_ref()
        .try_into()
        .map_err(|_| format!("sender is {} bytes", txn.snd.len()))?;
    Ok(encode_address(&public_key))
}

/// Algorand address: base32 of the public key followed by a 4 byte checksum.
pub fn encode_address(public_key: &[u8; 32]) -> String {
    let digest = Sha512_256::digest(public_key);
    let mut raw = Vec::with_capacity(36);
    raw.extend_from_slice(public_key);
    raw.extend_from_slice(&digest[digest.len() - 4..]);
    BASE32_NOPAD.encode(&raw)
}

fn decode_b64(raw: &str) -> Result<Bytes, String> {
    STANDARD
        .decode(raw)
        .map(Bytes::from)
        .map_err(|e| format!("invalid base64: {e}"))
}

/// JSON-RPC `result` for a signed request: base64 per item, `null` for unsigned ones.
pub fn encode_signatures(response: &SignedResponse) -> Value {
    Value::Array(
        response
            .signatures
            .iter()
            .map(|sig| match sig {
                Some(bytes) => Value::String(STANDARD.encode(bytes)),
                None => Value::Null,
            })
            .collect(),
    )
}
