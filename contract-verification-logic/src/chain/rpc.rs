use super::{Chain, ChainError, ContractCreation, TransactionInfo};
use crate::ToHex;
use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};
use serde::Deserialize;
use serde_json::json;
use url::Url;

/// Plain JSON-RPC client covering the three methods the engine needs.
#[derive(Clone)]
pub struct JsonRpcChain {
    url: Url,
    client: ClientWithMiddleware,
}

impl JsonRpcChain {
    pub fn new(url: Url, max_retries: u32) -> Self {
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(max_retries);
        let client = reqwest_middleware::ClientBuilder::new(reqwest::Client::new())
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();
        Self { url, client }
    }

    async fn request<T: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T, ChainError> {
        #[derive(Deserialize)]
        struct RpcResponse<T> {
            result: Option<T>,
            error: Option<RpcError>,
        }

        #[derive(Deserialize)]
        struct RpcError {
            code: i64,
            message: String,
        }

        let body = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": method,
            "params": params,
        });

        let response = self
            .client
            .post(self.url.clone())
            .json(&body)
            .send()
            .await
            .map_err(|err| ChainError::Rpc(err.to_string()))?;
        let response: RpcResponse<T> = response
            .json()
            .await
            .map_err(|err| ChainError::InvalidResponse(err.to_string()))?;

        if let Some(error) = response.error {
            return Err(ChainError::Rpc(format!(
                "{method} returned an error: code={}, message={}",
                error.code, error.message
            )));
        }
        response
            .result
            .ok_or_else(|| ChainError::InvalidResponse(format!("{method} returned no result")))
    }
}

fn parse_hex(value: &str, what: &str) -> Result<Vec<u8>, ChainError> {
    hex::decode(value.strip_prefix("0x").unwrap_or(value))
        .map_err(|err| ChainError::InvalidResponse(format!("invalid {what} hex: {err}")))
}

fn parse_quantity(value: &str, what: &str) -> Result<i64, ChainError> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    i64::from_str_radix(digits, 16)
        .map_err(|err| ChainError::InvalidResponse(format!("invalid {what} quantity: {err}")))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcTransaction {
    input: String,
    from: String,
    block_number: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RpcReceipt {
    contract_address: Option<String>,
    transaction_index: String,
    block_number: String,
}

#[async_trait]
impl Chain for JsonRpcChain {
    async fn get_bytecode(&self, address: &[u8]) -> Result<Vec<u8>, ChainError> {
        let code: String = self
            .request("eth_getCode", json!([address.to_hex(), "latest"]))
            .await?;
        parse_hex(&code, "bytecode")
    }

    async fn get_transaction(
        &self,
        transaction_hash: &[u8],
    ) -> Result<Option<TransactionInfo>, ChainError> {
        let transaction: Option<RpcTransaction> = self
            .request("eth_getTransactionByHash", json!([transaction_hash.to_hex()]))
            .await?;
        transaction
            .map(|transaction| {
                Ok(TransactionInfo {
                    block_number: transaction
                        .block_number
                        .as_deref()
                        .map(|value| parse_quantity(value, "block number"))
                        .transpose()?
                        .unwrap_or_default(),
                    from: parse_hex(&transaction.from, "sender address")?,
                })
            })
            .transpose()
    }

    async fn get_contract_creation(
        &self,
        transaction_hash: &[u8],
    ) -> Result<Option<ContractCreation>, ChainError> {
        let transaction: Option<RpcTransaction> = self
            .request("eth_getTransactionByHash", json!([transaction_hash.to_hex()]))
            .await?;
        let transaction = match transaction {
            Some(transaction) => transaction,
            None => return Ok(None),
        };

        let receipt: Option<RpcReceipt> = self
            .request(
                "eth_getTransactionReceipt",
                json!([transaction_hash.to_hex()]),
            )
            .await?;
        let receipt = match receipt {
            Some(receipt) => receipt,
            None => return Ok(None),
        };

        let created_address = match receipt.contract_address {
            Some(created_address) => parse_hex(&created_address, "created address")?,
            // The transaction did not create a contract.
            None => return Ok(None),
        };

        Ok(Some(ContractCreation {
            creation_code: parse_hex(&transaction.input, "creation bytecode")?,
            block_number: parse_quantity(&receipt.block_number, "block number")?,
            transaction_index: parse_quantity(&receipt.transaction_index, "transaction index")?,
            deployer: parse_hex(&transaction.from, "deployer address")?,
            created_address,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantities_and_hex_fields_parse() {
        assert_eq!(parse_quantity("0x2a", "block number").unwrap(), 42);
        assert_eq!(parse_quantity("0x0", "index").unwrap(), 0);
        assert!(parse_quantity("0xzz", "index").is_err());
        assert_eq!(parse_hex("0xcafe", "code").unwrap(), vec![0xca, 0xfe]);
        assert_eq!(parse_hex("0x", "code").unwrap(), Vec::<u8>::new());
    }
}
