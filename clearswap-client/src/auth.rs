//! Auth handshake controller.
//!
//! Drives the two-step challenge/response authentication sequence over the
//! request correlator:
//!
//! ```text
//! Unauthenticated -> AwaitingChallenge -> AwaitingVerification -> Authenticated
//!                                                              \-> Failed
//! ```
//!
//! `Failed` is terminal for the attempt; a new attempt starts from a fresh
//! controller and a fresh ephemeral session key. Every operation that
//! requires authentication checks the resulting [`AuthSession`] first and
//! fails fast - privileged calls are never attempted silently.

use chrono::Utc;
use serde_json::{json, Value};
use tracing::{debug, info};

use clearswap_core::config::ClearnodeConfig;
use clearswap_core::constants::DEFAULT_REQUEST_TIMEOUT_MS;
use clearswap_core::error::{Result, SwapError};

use crate::correlator::Correlator;
use crate::rpc::{remote_error, RpcRequest};
use crate::signer::SignerAdapter;

/// States of the handshake state machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthState {
    /// No handshake attempted yet
    Unauthenticated,
    /// Auth request sent, waiting for the challenge
    AwaitingChallenge,
    /// Challenge signed and verification sent, waiting for the verdict
    AwaitingVerification,
    /// Handshake succeeded (terminal)
    Authenticated,
    /// Handshake rejected or malformed (terminal)
    Failed,
}

/// An authenticated session with the clearnode.
///
/// Holds the ephemeral session signer used for every privileged request.
/// The ephemeral key is generated per handshake attempt and never leaves
/// this struct.
pub struct AuthSession {
    /// Main wallet address
    pub main_address: String,
    /// Ephemeral session address registered with the node
    pub session_address: String,
    /// Session expiry, epoch seconds
    pub expires_at: u64,
    /// Scope string granted at authentication
    pub scope: String,
    /// Bearer token issued by the node, if any
    pub token: Option<String>,
    pub(crate) session_signer: SignerAdapter,
    authenticated: bool,
}

impl AuthSession {
    /// True while the handshake result is valid and unexpired.
    pub fn is_authenticated(&self) -> bool {
        self.authenticated && (Utc::now().timestamp() as u64) < self.expires_at
    }
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("main_address", &self.main_address)
            .field("session_address", &self.session_address)
            .field("expires_at", &self.expires_at)
            .field("authenticated", &self.authenticated)
            .finish()
    }
}

/// Drives one authentication attempt against the clearnode.
pub struct AuthHandshake {
    config: ClearnodeConfig,
    state: AuthState,
}

impl AuthHandshake {
    /// Creates a controller in the `Unauthenticated` state.
    pub fn new(config: ClearnodeConfig) -> Self {
        Self {
            config,
            state: AuthState::Unauthenticated,
        }
    }

    /// Current handshake state.
    pub fn state(&self) -> AuthState {
        self.state
    }

    /// Runs the full handshake over the given correlator.
    ///
    /// A fresh ephemeral session key is generated for this attempt. Any
    /// transport failure, explicit rejection, or malformed server payload
    /// moves the machine to `Failed` and surfaces the error; timeouts are
    /// hard failures of the attempt, not resumable conditions.
    pub async fn run(
        &mut self,
        correlator: &Correlator,
        main_signer: &SignerAdapter,
    ) -> Result<AuthSession> {
        let session_signer = SignerAdapter::ephemeral();
        let session_address = session_signer.address();
        let main_address = main_signer.address();
        let expires_at = Utc::now().timestamp() as u64 + self.config.session_ttl_secs;

        let auth_params = json!({
            "address": main_address,
            "application": self.config.app_name,
            "session_key": session_address,
            "allowances": [{
                "asset": self.config.allowance_asset,
                "amount": self.config.allowance_amount,
            }],
            "expires_at": expires_at,
            "scope": self.config.scope,
        });

        info!(address = %main_address, session_key = %session_address, "authenticating with clearnode");

        // Phase 1: request a challenge.
        self.state = AuthState::AwaitingChallenge;
        let request = RpcRequest::new(correlator.next_id(), "auth_request", auth_params.clone());
        let response = correlator
            .send_and_wait(&request, &[], DEFAULT_REQUEST_TIMEOUT_MS)
            .await
            .map_err(|e| self.fail(e))?;

        if response.is_error() {
            return Err(self.fail(remote_error(&response)));
        }
        if response.method != "auth_challenge" {
            return Err(self.fail(SwapError::Protocol(format!(
                "expected auth_challenge, got {}",
                response.method
            ))));
        }
        let Some(challenge) = response
            .data
            .get("challenge_message")
            .and_then(Value::as_str)
            .map(str::to_owned)
        else {
            return Err(self.fail(SwapError::Protocol(
                "challenge frame carries no challenge value".into(),
            )));
        };
        debug!("auth challenge received");

        // Phase 2: sign the challenge with the privileged main-wallet signer
        // and submit the verification.
        self.state = AuthState::AwaitingVerification;
        let signature = main_signer
            .sign_challenge(&self.config.app_name, &challenge, &auth_params)
            .map_err(|e| self.fail(e))?;

        let verify_params = json!({
            "challenge": challenge,
            "signature": signature,
        });
        let request = RpcRequest::new(correlator.next_id(), "auth_verify", verify_params);
        let response = correlator
            .send_and_wait(&request, &[], DEFAULT_REQUEST_TIMEOUT_MS)
            .await
            .map_err(|e| self.fail(e))?;

        if response.is_error() {
            return Err(self.fail(remote_error(&response)));
        }
        if response.method != "auth_verify" {
            return Err(self.fail(SwapError::Protocol(format!(
                "expected auth_verify, got {}",
                response.method
            ))));
        }
        let success = response
            .data
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if !success {
            let reason = response
                .data
                .get("reason")
                .and_then(Value::as_str)
                .unwrap_or("authentication rejected");
            return Err(self.fail(SwapError::Remote {
                code: -1,
                message: reason.into(),
            }));
        }

        let token = response
            .data
            .get("jwt_token")
            .and_then(Value::as_str)
            .map(str::to_owned);

        self.state = AuthState::Authenticated;
        info!(session_key = %session_address, "authenticated with clearnode");

        Ok(AuthSession {
            main_address,
            session_address,
            expires_at,
            scope: self.config.scope.clone(),
            token,
            session_signer,
            authenticated: true,
        })
    }

    fn fail(&mut self, err: SwapError) -> SwapError {
        self.state = AuthState::Failed;
        err
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream::SplitStream;
    use futures::{SinkExt, StreamExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};

    const TEST_KEY: &str = "4c0883a69102937d6231471b5dbb6204fe51296170827936ea5cce4b76994b0f";

    type ServerWs = WebSocketStream<TcpStream>;

    async fn bind() -> (TcpListener, String) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        (listener, url)
    }

    fn response_frame(id: u64, method: &str, data: serde_json::Value) -> Message {
        Message::Text(json!({"res": [id, method, data, 0]}).to_string())
    }

    async fn read_request(source: &mut SplitStream<ServerWs>) -> (u64, String, Value) {
        loop {
            match source.next().await {
                Some(Ok(Message::Text(text))) => {
                    let v: Value = serde_json::from_str(&text).unwrap();
                    return (
                        v["req"][0].as_u64().unwrap(),
                        v["req"][1].as_str().unwrap().to_string(),
                        v["req"][2].clone(),
                    );
                }
                Some(Ok(_)) => continue,
                other => panic!("server read failed: {other:?}"),
            }
        }
    }

    async fn connected(url: String) -> (Correlator, SignerAdapter) {
        let correlator = Correlator::new(url);
        correlator.connect().await.unwrap();
        (correlator, SignerAdapter::from_private_key(TEST_KEY).unwrap())
    }

    #[tokio::test]
    async fn test_happy_path_reaches_authenticated() {
        let (listener, url) = bind().await;
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = accept_async(stream).await.unwrap();
            let (mut sink, mut source) = ws.split();

            let (id, method, params) = read_request(&mut source).await;
            assert_eq!(method, "auth_request");
            assert!(params["session_key"].as_str().unwrap().starts_with("0x"));
            assert!(params["expires_at"].as_u64().is_some());
            sink.send(response_frame(
                id,
                "auth_challenge",
                json!({"challenge_message": "abc-123"}),
            ))
            .await
            .unwrap();

            let (id, method, params) = read_request(&mut source).await;
            assert_eq!(method, "auth_verify");
            assert_eq!(params["challenge"], "abc-123");
            assert!(params["signature"].as_str().unwrap().starts_with("0x"));
            sink.send(response_frame(
                id,
                "auth_verify",
                json!({"success": true, "jwt_token": "tok-1"}),
            ))
            .await
            .unwrap();

            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        });

        let (correlator, signer) = connected(url).await;
        let mut handshake = AuthHandshake::new(ClearnodeConfig::default());
        assert_eq!(handshake.state(), AuthState::Unauthenticated);

        let session = handshake.run(&correlator, &signer).await.unwrap();

        assert_eq!(handshake.state(), AuthState::Authenticated);
        assert!(session.is_authenticated());
        assert_eq!(session.token.as_deref(), Some("tok-1"));
        assert_eq!(session.main_address, signer.address());
        assert_ne!(session.session_address, session.main_address);
    }

    #[tokio::test]
    async fn test_explicit_rejection_is_terminal() {
        let (listener, url) = bind().await;
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = accept_async(stream).await.unwrap();
            let (mut sink, mut source) = ws.split();
            let (id, _, _) = read_request(&mut source).await;
            sink.send(response_frame(
                id,
                "error",
                json!({"error": "address is banned", "code": 403}),
            ))
            .await
            .unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        });

        let (correlator, signer) = connected(url).await;
        let mut handshake = AuthHandshake::new(ClearnodeConfig::default());
        let err = handshake.run(&correlator, &signer).await.unwrap_err();

        assert!(matches!(err, SwapError::Remote { code: 403, .. }));
        assert_eq!(handshake.state(), AuthState::Failed);
    }

    #[tokio::test]
    async fn test_missing_challenge_is_protocol_error() {
        let (listener, url) = bind().await;
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = accept_async(stream).await.unwrap();
            let (mut sink, mut source) = ws.split();
            let (id, _, _) = read_request(&mut source).await;
            sink.send(response_frame(id, "auth_challenge", json!({})))
                .await
                .unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        });

        let (correlator, signer) = connected(url).await;
        let mut handshake = AuthHandshake::new(ClearnodeConfig::default());
        let err = handshake.run(&correlator, &signer).await.unwrap_err();

        assert!(matches!(err, SwapError::Protocol(_)));
        assert_eq!(handshake.state(), AuthState::Failed);
    }

    #[tokio::test]
    async fn test_verification_failure_surfaces_server_reason() {
        let (listener, url) = bind().await;
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let ws = accept_async(stream).await.unwrap();
            let (mut sink, mut source) = ws.split();

            let (id, _, _) = read_request(&mut source).await;
            sink.send(response_frame(
                id,
                "auth_challenge",
                json!({"challenge_message": "abc"}),
            ))
            .await
            .unwrap();

            let (id, _, _) = read_request(&mut source).await;
            sink.send(response_frame(
                id,
                "auth_verify",
                json!({"success": false, "reason": "signature mismatch"}),
            ))
            .await
            .unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        });

        let (correlator, signer) = connected(url).await;
        let mut handshake = AuthHandshake::new(ClearnodeConfig::default());
        let err = handshake.run(&correlator, &signer).await.unwrap_err();

        match err {
            SwapError::Remote { message, .. } => assert_eq!(message, "signature mismatch"),
            other => panic!("expected remote error, got {other:?}"),
        }
        assert_eq!(handshake.state(), AuthState::Failed);
    }
}
