//! JSON-RPC ledger backed by an ethers HTTP provider

use super::transport::StatusAwareHttp;
use super::{Account, Ledger, LedgerError, LedgerResult, TransferRequest};
use crate::config::NetworkConfig;

use async_trait::async_trait;
use ethers::prelude::*;
use ethers::providers::{Provider, ProviderError, RpcError};
use ethers::types::transaction::eip2718::TypedTransaction;
use reqwest::{StatusCode, Url};
use std::time::Duration;
use tracing::{debug, info};

/// Ledger over a single JSON-RPC HTTP endpoint
pub struct EthersLedger {
    provider: Provider<StatusAwareHttp>,
    chain_id: u64,
}

impl EthersLedger {
    /// Connect to the endpoint and resolve the chain id
    pub async fn connect(config: &NetworkConfig) -> LedgerResult<Self> {
        let url = Url::parse(&config.rpc_url)
            .map_err(|e| LedgerError::Rpc(format!("Invalid RPC URL: {}", e)))?;
        let provider =
            Provider::new(StatusAwareHttp::new(url)).interval(Duration::from_millis(500));

        let chain_id = match config.chain_id {
            Some(id) => id,
            None => provider
                .get_chainid()
                .await
                .map_err(classify_provider_error)?
                .as_u64(),
        };

        info!("Connected to chain {} via {}", chain_id, config.rpc_url);
        Ok(Self { provider, chain_id })
    }

    fn build_transfer(&self, from: Address, request: &TransferRequest) -> TypedTransaction {
        TransactionRequest::new()
            .from(from)
            .to(request.to)
            .value(request.value)
            .gas(request.gas_limit)
            .gas_price(request.gas_price)
            .nonce(request.nonce)
            .chain_id(self.chain_id)
            .into()
    }
}

#[async_trait]
impl Ledger for EthersLedger {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn get_balance(&self, address: Address) -> LedgerResult<U256> {
        self.provider
            .get_balance(address, None)
            .await
            .map_err(classify_provider_error)
    }

    async fn get_transaction_count(&self, address: Address) -> LedgerResult<U256> {
        self.provider
            .get_transaction_count(address, Some(BlockNumber::Pending.into()))
            .await
            .map_err(classify_provider_error)
    }

    async fn get_gas_price(&self) -> LedgerResult<U256> {
        self.provider
            .get_gas_price()
            .await
            .map_err(classify_provider_error)
    }

    async fn estimate_gas(&self, from: Address, to: Address, value: U256) -> LedgerResult<U256> {
        let tx: TypedTransaction = TransactionRequest::new().from(from).to(to).value(value).into();
        self.provider
            .estimate_gas(&tx, None)
            .await
            .map_err(classify_provider_error)
    }

    async fn send_transfer(
        &self,
        account: &Account,
        request: TransferRequest,
    ) -> LedgerResult<H256> {
        let wallet = account.wallet().clone().with_chain_id(self.chain_id);
        let tx = self.build_transfer(wallet.address(), &request);

        let signature = wallet
            .sign_transaction(&tx)
            .await
            .map_err(|e| LedgerError::Signing(e.to_string()))?;
        let raw = tx.rlp_signed(&signature);

        let pending = self
            .provider
            .send_raw_transaction(raw)
            .await
            .map_err(classify_provider_error)?;

        debug!("Broadcast accepted: {:?}", pending.tx_hash());
        Ok(pending.tx_hash())
    }

    async fn get_transaction_receipt(
        &self,
        tx_hash: H256,
    ) -> LedgerResult<Option<TransactionReceipt>> {
        self.provider
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(classify_provider_error)
    }
}

/// Map a provider failure onto the closed ledger error set
pub fn classify_provider_error(err: ProviderError) -> LedgerError {
    if let ProviderError::HTTPError(ref e) = err {
        if let Some(status) = e.status() {
            if status == StatusCode::BAD_GATEWAY || status == StatusCode::SERVICE_UNAVAILABLE {
                return LedgerError::ServerUnavailable {
                    status: status.as_u16(),
                };
            }
        }
    }

    let message = RpcError::as_error_response(&err)
        .map(|resp| resp.message.clone())
        .unwrap_or_else(|| err.to_string());

    classify_message(&message)
}

/// Classify a node error message
fn classify_message(message: &str) -> LedgerError {
    let lower = message.to_lowercase();

    if lower.contains("replacement transaction underpriced")
        || lower.contains("replacement fee too low")
    {
        return LedgerError::ReplacementUnderpriced;
    }

    if lower.contains("nonce too low") || lower.contains("nonce has already been used") {
        return LedgerError::NonceExpired(message.to_string());
    }

    LedgerError::Rpc(message.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode as ReplyStatus, routing::post, Router};

    /// Serve every JSON-RPC request with a fixed status and body
    async fn endpoint(status: ReplyStatus, body: &'static str) -> Url {
        let app = Router::new().route("/", post(move || async move { (status, body) }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Url::parse(&format!("http://{}/", addr)).unwrap()
    }

    async fn gas_price_reply(status: ReplyStatus, body: &'static str) -> LedgerResult<U256> {
        let client = reqwest::Client::builder().no_proxy().build().unwrap();
        let transport = StatusAwareHttp::with_client(endpoint(status, body).await, client);
        let ledger = EthersLedger {
            provider: Provider::new(transport),
            chain_id: 1,
        };
        ledger.get_gas_price().await
    }

    #[tokio::test]
    async fn test_gateway_status_is_server_unavailable_whatever_the_body() {
        let bodies = [
            "<html><head><title>502: Bad gateway</title></head></html>",
            "upstream connect error or disconnect/reset before headers. reset reason: connection failure",
            "<html><title>502 Server Error</title></html>",
            "",
        ];
        for body in bodies {
            let err = gas_price_reply(ReplyStatus::BAD_GATEWAY, body).await.unwrap_err();
            assert!(
                matches!(err, LedgerError::ServerUnavailable { status: 502 }),
                "body {:?} gave {:?}",
                body,
                err
            );
        }

        let err = gas_price_reply(ReplyStatus::SERVICE_UNAVAILABLE, "")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::ServerUnavailable { status: 503 }));
    }

    #[tokio::test]
    async fn test_other_http_failures_are_not_retryable() {
        let err = gas_price_reply(ReplyStatus::INTERNAL_SERVER_ERROR, "Internal Server Error")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::Rpc(_)));
    }

    #[tokio::test]
    async fn test_successful_reply_is_decoded() {
        let price = gas_price_reply(
            ReplyStatus::OK,
            r#"{"jsonrpc":"2.0","id":1,"result":"0x3b9aca00"}"#,
        )
        .await
        .unwrap();
        assert_eq!(price, U256::from(1_000_000_000u64));
    }

    #[tokio::test]
    async fn test_node_error_messages_are_classified() {
        let err = gas_price_reply(
            ReplyStatus::OK,
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"replacement transaction underpriced"}}"#,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, LedgerError::ReplacementUnderpriced));

        let err = gas_price_reply(
            ReplyStatus::OK,
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"nonce too low: next nonce 7, tx nonce 6"}}"#,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, LedgerError::NonceExpired(_)));

        let err = gas_price_reply(
            ReplyStatus::OK,
            r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32000,"message":"insufficient funds for gas * price + value"}}"#,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, LedgerError::Rpc(_)));
    }

    #[test]
    fn test_message_variants() {
        assert!(matches!(
            classify_message("Replacement fee too low"),
            LedgerError::ReplacementUnderpriced
        ));
        assert!(matches!(
            classify_message("nonce has already been used"),
            LedgerError::NonceExpired(_)
        ));
        assert!(matches!(
            classify_message("502 Bad Gateway"),
            LedgerError::Rpc(_)
        ));
    }
}
