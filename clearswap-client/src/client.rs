//! Authenticated clearnode client.
//!
//! Composes the [`Correlator`], the [`AuthHandshake`], and the signers into
//! the privileged RPC surface the engine drives: application-session
//! creation, state submission, session close, and ledger queries. Every
//! privileged call checks the session first and fails fast with
//! [`SwapError::NotAuthenticated`] - it never attempts the operation.

use parking_lot::RwLock;
use serde_json::{json, Value};
use tracing::info;

use clearswap_core::config::ClearnodeConfig;
use clearswap_core::constants::{APP_PROTOCOL, DEFAULT_REQUEST_TIMEOUT_MS};
use clearswap_core::error::{Result, SwapError};
use clearswap_core::types::{Allocation, LedgerBalance, StateIntent};

use crate::auth::{AuthHandshake, AuthSession};
use crate::correlator::Correlator;
use crate::rpc::{remote_error, RpcRequest};
use crate::signer::SignerAdapter;

/// Identifier and initial version of a freshly created remote session.
#[derive(Clone, Debug)]
pub struct CreatedSession {
    /// Opaque session identifier issued by the node
    pub session_id: String,
    /// Initial state version
    pub version: u64,
}

/// Client for one clearnode connection.
///
/// Explicitly constructed and explicitly passed - there is no process-wide
/// singleton, so tests can run independent instances side by side.
pub struct ClearnodeClient {
    config: ClearnodeConfig,
    main_signer: SignerAdapter,
    correlator: Correlator,
    session: RwLock<Option<AuthSession>>,
}

impl ClearnodeClient {
    /// Creates a client for the configured clearnode. No connection is
    /// opened until [`ClearnodeClient::connect`].
    pub fn new(config: ClearnodeConfig, main_signer: SignerAdapter) -> Self {
        let correlator = Correlator::new(config.ws_url.clone());
        Self {
            config,
            main_signer,
            correlator,
            session: RwLock::new(None),
        }
    }

    /// The underlying correlator.
    pub fn correlator(&self) -> &Correlator {
        &self.correlator
    }

    /// Main wallet address.
    pub fn main_address(&self) -> String {
        self.main_signer.address()
    }

    /// Ephemeral session address, once authenticated.
    pub fn session_address(&self) -> Option<String> {
        self.session
            .read()
            .as_ref()
            .map(|s| s.session_address.clone())
    }

    /// True while an unexpired authenticated session is held.
    pub fn is_authenticated(&self) -> bool {
        self.session
            .read()
            .as_ref()
            .map(AuthSession::is_authenticated)
            .unwrap_or(false)
    }

    /// Opens the connection. Idempotent.
    pub async fn connect(&self) -> Result<()> {
        self.correlator.connect().await
    }

    /// Connects (if needed) and runs the auth handshake, replacing any
    /// previous session with the fresh one.
    pub async fn authenticate(&self) -> Result<()> {
        self.connect().await?;
        let mut handshake = AuthHandshake::new(self.config.clone());
        let session = handshake.run(&self.correlator, &self.main_signer).await?;
        info!(session_key = %session.session_address, "clearnode session established");
        *self.session.write() = Some(session);
        Ok(())
    }

    /// Creates a multi-party application session.
    pub async fn create_app_session(
        &self,
        participants: &[String],
        weights: &[u64],
        quorum: u64,
        allocations: &[Allocation],
    ) -> Result<CreatedSession> {
        let params = json!({
            "definition": {
                "protocol": APP_PROTOCOL,
                "participants": participants,
                "weights": weights,
                "quorum": quorum,
                "challenge": 0,
                "nonce": chrono::Utc::now().timestamp_millis() as u64,
            },
            "allocations": allocations,
        });
        let data = self.privileged_call("create_app_session", params).await?;

        let session_id = data
            .get("app_session_id")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                SwapError::Protocol("create response carries no app_session_id".into())
            })?
            .to_string();
        let version = data.get("version").and_then(Value::as_u64).unwrap_or(1);

        Ok(CreatedSession {
            session_id,
            version,
        })
    }

    /// Submits a state update and returns the version the node accepted.
    pub async fn submit_app_state(
        &self,
        session_id: &str,
        intent: StateIntent,
        version: u64,
        allocations: &[Allocation],
    ) -> Result<u64> {
        let params = json!({
            "app_session_id": session_id,
            "intent": intent,
            "version": version,
            "allocations": allocations,
        });
        let data = self.privileged_call("submit_app_state", params).await?;

        data.get("version").and_then(Value::as_u64).ok_or_else(|| {
            SwapError::Protocol("state response carries no accepted version".into())
        })
    }

    /// Closes an application session with its final allocations. The node
    /// treats this as authorization to settle atomically on-chain.
    pub async fn close_app_session(
        &self,
        session_id: &str,
        allocations: &[Allocation],
    ) -> Result<()> {
        let params = json!({
            "app_session_id": session_id,
            "allocations": allocations,
        });
        self.privileged_call("close_app_session", params).await?;
        Ok(())
    }

    /// Queries the session's off-chain ledger balances.
    pub async fn ledger_balances(&self) -> Result<Vec<LedgerBalance>> {
        let data = self
            .privileged_call("get_ledger_balances", json!({}))
            .await?;
        let raw = data
            .get("ledger_balances")
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new()));
        serde_json::from_value(raw).map_err(SwapError::from)
    }

    /// Builds and signs a privileged request with the session key.
    ///
    /// Fails fast with `NotAuthenticated` before anything touches the wire.
    fn signed_request(&self, method: &str, params: Value) -> Result<(RpcRequest, Vec<String>)> {
        let session = self.session.read();
        let session = session
            .as_ref()
            .filter(|s| s.is_authenticated())
            .ok_or(SwapError::NotAuthenticated)?;

        let request = RpcRequest::new(self.correlator.next_id(), method, params);
        let signature = session.session_signer.sign_payload(&request.payload_bytes())?;
        Ok((request, vec![signature]))
    }

    async fn privileged_call(&self, method: &str, params: Value) -> Result<Value> {
        let (request, signatures) = self.signed_request(method, params)?;
        let response = self
            .correlator
            .send_and_wait(&request, &signatures, DEFAULT_REQUEST_TIMEOUT_MS)
            .await?;

        if response.is_error() {
            return Err(remote_error(&response));
        }
        if response.method != method {
            return Err(SwapError::Protocol(format!(
                "expected {method} response, got {}",
                response.method
            )));
        }
        Ok(response.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::types::U256;
    use futures::{SinkExt, StreamExt};
    use tokio::net::TcpListener;
    use tokio_tungstenite::{accept_async, tungstenite::Message};

    const TEST_KEY: &str = "4c0883a69102937d6231471b5dbb6204fe51296170827936ea5cce4b76994b0f";

    fn test_client(url: String) -> ClearnodeClient {
        let config = ClearnodeConfig {
            ws_url: url,
            ..ClearnodeConfig::default()
        };
        let signer = SignerAdapter::from_private_key(TEST_KEY).unwrap();
        ClearnodeClient::new(config, signer)
    }

    /// A fake clearnode that authenticates anyone and answers every
    /// session method with a canned response.
    async fn spawn_fake_clearnode() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());

        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = accept_async(stream).await.unwrap();
            let (mut sink, mut source) = ws.split();

            while let Some(Ok(msg)) = source.next().await {
                let Message::Text(text) = msg else { continue };
                let v: Value = serde_json::from_str(&text).unwrap();
                let id = v["req"][0].as_u64().unwrap();
                let method = v["req"][1].as_str().unwrap();
                let params = &v["req"][2];

                let (tag, data) = match method {
                    "auth_request" => (
                        "auth_challenge",
                        json!({"challenge_message": "challenge-1"}),
                    ),
                    "auth_verify" => ("auth_verify", json!({"success": true, "jwt_token": "t"})),
                    "create_app_session" => {
                        assert_eq!(params["definition"]["protocol"], APP_PROTOCOL);
                        assert_eq!(
                            params["definition"]["quorum"].as_u64().unwrap(),
                            params["definition"]["participants"].as_array().unwrap().len() as u64
                        );
                        ("create_app_session", json!({"app_session_id": "0xsess-1", "version": 1}))
                    }
                    "submit_app_state" => (
                        "submit_app_state",
                        json!({"version": params["version"].as_u64().unwrap()}),
                    ),
                    "close_app_session" => ("close_app_session", json!({})),
                    "get_ledger_balances" => (
                        "get_ledger_balances",
                        json!({"ledger_balances": [{"asset": "ytest.usd", "amount": "1000"}]}),
                    ),
                    other => panic!("fake clearnode got unexpected method {other}"),
                };
                sink.send(Message::Text(json!({"res": [id, tag, data, 0]}).to_string()))
                    .await
                    .unwrap();
            }
        });

        url
    }

    #[tokio::test]
    async fn test_privileged_call_rejected_before_handshake() {
        let client = test_client("ws://127.0.0.1:1".into());
        let err = client.ledger_balances().await.unwrap_err();
        assert!(matches!(err, SwapError::NotAuthenticated));
        // Nothing touched the wire: no request identifier was ever issued.
        assert_eq!(client.correlator().pending_count(), 0);
    }

    #[tokio::test]
    async fn test_privileged_call_accepted_after_handshake() {
        let url = spawn_fake_clearnode().await;
        let client = test_client(url);

        assert!(!client.is_authenticated());
        client.authenticate().await.unwrap();
        assert!(client.is_authenticated());

        let balances = client.ledger_balances().await.unwrap();
        assert_eq!(balances.len(), 1);
        assert_eq!(balances[0].asset, "ytest.usd");
        assert_eq!(balances[0].amount, U256::from(1000u64));
    }

    #[tokio::test]
    async fn test_create_submit_close_round() {
        let url = spawn_fake_clearnode().await;
        let client = test_client(url);
        client.authenticate().await.unwrap();

        let participants: Vec<String> =
            vec!["0xseller".into(), "0xprovider".into(), "0xbuyer".into()];
        let weights = vec![1, 1, 1];
        let allocations = vec![Allocation::new("0xseller", "wood", U256::from(100u64))];

        let created = client
            .create_app_session(&participants, &weights, 3, &allocations)
            .await
            .unwrap();
        assert_eq!(created.session_id, "0xsess-1");
        assert_eq!(created.version, 1);

        let accepted = client
            .submit_app_state(&created.session_id, StateIntent::Operate, 2, &allocations)
            .await
            .unwrap();
        assert_eq!(accepted, 2);

        client
            .close_app_session(&created.session_id, &allocations)
            .await
            .unwrap();
    }
}
