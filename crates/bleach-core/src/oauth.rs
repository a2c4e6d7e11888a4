//! OAuth 2.0 authorization-code flow with PKCE.
//!
//! Only the pieces that talk to the platform live here: generating the
//! verifier/challenge pair, building the authorize URL, and calling the
//! token endpoint. The local redirect listener belongs to the CLI.

use std::time::Duration;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::{distributions::Alphanumeric, Rng};
use reqwest::blocking::Client;
use reqwest::Url;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::credentials::Credentials;
use crate::error::{BleachError, Result};
use crate::types::{ApiProblem, TokenResponse};

pub const DEFAULT_AUTHORIZE_URL: &str = "https://twitter.com/i/oauth2/authorize";
pub const DEFAULT_TOKEN_URL: &str = "https://api.twitter.com/2/oauth2/token";

/// Scopes needed to read and undo follows, likes, posts and lists.
pub const SCOPES: &str = "tweet.read tweet.write users.read like.read like.write \
                          follows.read follows.write list.read list.write offline.access";

/// Local ports tried, in order, for the redirect listener.
pub const CALLBACK_PORTS: [u16; 6] = [8888, 8880, 8080, 9977, 4356, 3307];

const VERIFIER_LEN: usize = 64;
const STATE_LEN: usize = 32;

pub fn redirect_uri(port: u16) -> String {
    format!("http://127.0.0.1:{port}/")
}

/// HTTP client for the token endpoint, used before any credentials exist.
pub fn token_client(timeout: Duration) -> Result<Client> {
    Ok(Client::builder().timeout(timeout).build()?)
}

// ---------------------------------------------------------------------------
// Pkce
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pkce {
    pub verifier: String,
    pub challenge: String,
    pub state: String,
}

impl Pkce {
    pub fn generate() -> Self {
        let verifier = random_token(VERIFIER_LEN);
        let state = random_token(STATE_LEN);
        Self::from_parts(verifier, state)
    }

    pub fn from_parts(verifier: impl Into<String>, state: impl Into<String>) -> Self {
        let verifier = verifier.into();
        Self {
            challenge: s256_challenge(&verifier),
            verifier,
            state: state.into(),
        }
    }
}

fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// `BASE64URL(SHA256(verifier))` without padding (RFC 7636 §4.2).
pub fn s256_challenge(verifier: &str) -> String {
    let digest = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(digest)
}

// ---------------------------------------------------------------------------
// OAuthApp
// ---------------------------------------------------------------------------

/// Registered application the user authorizes.
///
/// `client_secret` is only set for confidential clients; public clients
/// send `client_id` in the form body instead of basic auth.
#[derive(Debug, Clone)]
pub struct OAuthApp {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub authorize_url: String,
    pub token_url: String,
}

impl OAuthApp {
    pub fn new(client_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            authorize_url: DEFAULT_AUTHORIZE_URL.to_string(),
            token_url: DEFAULT_TOKEN_URL.to_string(),
        }
    }

    /// URL the user opens in a browser to grant access.
    pub fn authorize_url(&self, redirect_uri: &str, pkce: &Pkce) -> Result<String> {
        let url = Url::parse_with_params(
            &self.authorize_url,
            &[
                ("response_type", "code"),
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", redirect_uri),
                ("scope", SCOPES),
                ("state", pkce.state.as_str()),
                ("code_challenge", pkce.challenge.as_str()),
                ("code_challenge_method", "S256"),
            ],
        )
        .map_err(|e| BleachError::InvalidConfig(format!("authorize url: {e}")))?;
        Ok(url.into())
    }

    /// Trade an authorization code for credentials.
    pub fn exchange_code(
        &self,
        http: &Client,
        code: &str,
        redirect_uri: &str,
        pkce: &Pkce,
    ) -> Result<Credentials> {
        let resp = self.token_request(
            http,
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("redirect_uri", redirect_uri),
                ("code_verifier", pkce.verifier.as_str()),
            ],
        )?;
        Ok(Credentials::from_token_response(resp, None))
    }

    /// Trade a refresh token for a new access token.
    pub fn refresh(&self, http: &Client, refresh_token: &str) -> Result<Credentials> {
        let resp = self.token_request(
            http,
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
            ],
        )?;
        Ok(Credentials::from_token_response(
            resp,
            Some(refresh_token.to_string()),
        ))
    }

    fn token_request(&self, http: &Client, params: &[(&str, &str)]) -> Result<TokenResponse> {
        let mut form: Vec<(&str, &str)> = params.to_vec();
        let mut req = http.post(&self.token_url);
        match &self.client_secret {
            Some(secret) => req = req.basic_auth(&self.client_id, Some(secret)),
            None => form.push(("client_id", self.client_id.as_str())),
        }

        let response = req.form(&form).send()?;
        let status = response.status();
        let body = response.text()?;
        debug!(status = status.as_u16(), "token endpoint responded");

        if !status.is_success() {
            let problem: ApiProblem = serde_json::from_str(&body).unwrap_or_default();
            let message = problem
                .detail
                .clone()
                .or_else(|| oauth_error_description(&body))
                .unwrap_or_else(|| problem.message());
            return Err(BleachError::TokenExchange(format!(
                "HTTP {}: {message}",
                status.as_u16()
            )));
        }

        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| BleachError::TokenExchange(format!("unexpected token response: {e}")))?;
        debug!(expires_in = ?token.expires_in, "access token issued");
        Ok(token)
    }
}

/// Token endpoint errors use the RFC 6749 shape rather than the v2
/// problem object.
fn oauth_error_description(body: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("error_description")
        .or_else(|| value.get("error"))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

/// Pull `code` out of the redirect request line after checking `state`.
///
/// `request_target` is the path-and-query the browser requested, e.g.
/// `/?state=abc&code=xyz`.
pub fn parse_callback(request_target: &str, expected_state: &str) -> Result<String> {
    let url = Url::parse("http://127.0.0.1")
        .and_then(|base| base.join(request_target))
        .map_err(|e| BleachError::TokenExchange(format!("bad redirect request: {e}")))?;

    let mut state = None;
    let mut code = None;
    let mut error = None;
    for (k, v) in url.query_pairs() {
        match k.as_ref() {
            "state" => state = Some(v.into_owned()),
            "code" => code = Some(v.into_owned()),
            "error" => error = Some(v.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Err(BleachError::TokenExchange(format!(
            "authorization denied: {error}"
        )));
    }
    let state = state.unwrap_or_default();
    if state != expected_state {
        return Err(BleachError::StateMismatch {
            expected: expected_state.to_string(),
            actual: state,
        });
    }
    code.filter(|c| !c.is_empty())
        .ok_or_else(|| BleachError::TokenExchange("redirect carried no code".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn challenge_matches_rfc7636_example() {
        // Appendix B of RFC 7636
        let verifier = "dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk";
        assert_eq!(
            s256_challenge(verifier),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn generated_pkce_values_are_distinct() {
        let a = Pkce::generate();
        let b = Pkce::generate();
        assert_eq!(a.verifier.len(), VERIFIER_LEN);
        assert_ne!(a.verifier, b.verifier);
        assert_ne!(a.state, b.state);
        assert_eq!(a.challenge, s256_challenge(&a.verifier));
    }

    #[test]
    fn authorize_url_carries_pkce_and_scopes() {
        let app = OAuthApp::new("client-1");
        let pkce = Pkce::from_parts("verifier", "state-1");
        let url = app.authorize_url(&redirect_uri(8888), &pkce).unwrap();
        let parsed = Url::parse(&url).unwrap();
        let pairs: std::collections::HashMap<String, String> =
            parsed.query_pairs().into_owned().collect();
        assert_eq!(pairs["client_id"], "client-1");
        assert_eq!(pairs["redirect_uri"], "http://127.0.0.1:8888/");
        assert_eq!(pairs["state"], "state-1");
        assert_eq!(pairs["code_challenge_method"], "S256");
        assert_eq!(pairs["code_challenge"], s256_challenge("verifier"));
        assert!(pairs["scope"].contains("offline.access"));
        assert!(pairs["scope"].contains("follows.write"));
    }

    #[test]
    fn callback_with_matching_state_yields_code() {
        let code = parse_callback("/?state=s1&code=abc123", "s1").unwrap();
        assert_eq!(code, "abc123");
    }

    #[test]
    fn callback_with_wrong_state_is_rejected() {
        let err = parse_callback("/?state=evil&code=abc", "s1").unwrap_err();
        assert!(matches!(err, BleachError::StateMismatch { .. }));
    }

    #[test]
    fn callback_with_error_is_rejected() {
        let err = parse_callback("/?error=access_denied&state=s1", "s1").unwrap_err();
        assert!(err.to_string().contains("access_denied"));
    }

    #[test]
    fn exchange_code_posts_verifier_and_reads_tokens() {
        let mut server = mockito::Server::new();
        let mock = server
            .mock("POST", "/2/oauth2/token")
            .match_body(mockito::Matcher::AllOf(vec![
                mockito::Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
                mockito::Matcher::UrlEncoded("code".into(), "the-code".into()),
                mockito::Matcher::UrlEncoded("code_verifier".into(), "verifier".into()),
                mockito::Matcher::UrlEncoded("client_id".into(), "client-1".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"at","refresh_token":"rt","token_type":"bearer","expires_in":7200}"#)
            .create();

        let mut app = OAuthApp::new("client-1");
        app.token_url = format!("{}/2/oauth2/token", server.url());
        let pkce = Pkce::from_parts("verifier", "s");
        let creds = app
            .exchange_code(&Client::new(), "the-code", &redirect_uri(8888), &pkce)
            .unwrap();

        mock.assert();
        assert_eq!(creds.access_token, "at");
        assert_eq!(creds.refresh_token.as_deref(), Some("rt"));
    }

    #[test]
    fn refresh_failure_reports_description() {
        let mut server = mockito::Server::new();
        server
            .mock("POST", "/token")
            .with_status(400)
            .with_body(r#"{"error":"invalid_request","error_description":"Value passed for the token was invalid."}"#)
            .create();

        let mut app = OAuthApp::new("client-1");
        app.token_url = format!("{}/token", server.url());
        let err = app.refresh(&Client::new(), "stale").unwrap_err();
        assert!(matches!(err, BleachError::TokenExchange(_)));
        assert!(err.to_string().contains("token was invalid"));
    }
}
