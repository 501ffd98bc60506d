use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::AdlensError;

pub const DEFAULT_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
/// Loopback redirect for the CLI: the browser lands on an unreachable local
/// page whose URL carries `?code=...`.
pub const DEFAULT_REDIRECT_URI: &str = "http://127.0.0.1:8765/callback";
/// Redirect used by Google's JavaScript popup flow. Only valid for codes
/// obtained by a web front end.
pub const POSTMESSAGE_REDIRECT_URI: &str = "postmessage";
pub const ADSENSE_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/adsense.readonly";

/// Opaque token response from the OAuth token endpoint. The rest of the
/// crate reads the access token and, to renew it, the refresh token and expiry.
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenBundle {
    #[serde(with = "secret_string")]
    pub access_token: SecretString,
    #[serde(default, with = "optional_secret_string", skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<SecretString>,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(default = "Utc::now")]
    pub obtained_at: DateTime<Utc>,
}

impl TokenBundle {
    pub fn bearer(&self) -> &str {
        self.access_token.expose_secret()
    }

    /// `false` when the endpoint gave no lifetime.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_in
            .is_some_and(|secs| now >= self.obtained_at + Duration::seconds(secs))
    }

    /// Profile claims from the ID token, when one was issued and decodes.
    pub fn profile(&self) -> Option<UserProfile> {
        self.id_token.as_deref().and_then(parse_id_token_profile)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub picture: Option<String>,
}

pub fn parse_id_token_profile(token: &str) -> Option<UserProfile> {
    let payload = token.split('.').nth(1)?;
    let decoded = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .ok()?;
    serde_json::from_slice(&decoded).ok()
}

/// Authorization-code exchange against Google's token endpoint.
pub struct GoogleOAuth {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: SecretString,
    redirect_uri: String,
}

impl std::fmt::Debug for GoogleOAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GoogleOAuth")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl GoogleOAuth {
    pub fn new(
        http: reqwest::Client,
        token_url: &str,
        client_id: String,
        client_secret: SecretString,
        redirect_uri: &str,
    ) -> Self {
        Self {
            http,
            token_url: token_url.to_owned(),
            client_id,
            client_secret,
            redirect_uri: redirect_uri.to_owned(),
        }
    }

    /// Consent page that yields an authorization code for the read-only
    /// AdSense scope.
    pub fn authorization_url(&self) -> Result<url::Url, AdlensError> {
        if self.redirect_uri == POSTMESSAGE_REDIRECT_URI {
            return Err(AdlensError::Config(format!(
                "adsense.redirect_uri = {POSTMESSAGE_REDIRECT_URI:?} only works for codes from the web popup flow; \
                 set a loopback uri such as {DEFAULT_REDIRECT_URI:?}"
            )));
        }
        url::Url::parse_with_params(
            DEFAULT_AUTH_URL,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", ADSENSE_READONLY_SCOPE),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .map_err(|e| AdlensError::Config(format!("cannot build authorization url: {e}")))
    }

    pub async fn exchange_code(&self, code: &str) -> Result<TokenBundle, AdlensError> {
        if code.trim().is_empty() {
            return Err(AdlensError::Auth("authorization code is empty".to_owned()));
        }

        self.request_token(&[
            ("grant_type", "authorization_code"),
            ("code", code.trim()),
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose_secret()),
            ("redirect_uri", self.redirect_uri.as_str()),
        ])
        .await
    }

    /// Trade the refresh token for a new access token. Google omits the
    /// refresh token from the response, so the old one is carried over.
    pub async fn refresh(&self, tokens: &TokenBundle) -> Result<TokenBundle, AdlensError> {
        let refresh_token = tokens
            .refresh_token
            .as_ref()
            .ok_or_else(|| AdlensError::Auth("access token expired and no refresh token was issued".to_owned()))?;

        let mut refreshed = self
            .request_token(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.expose_secret()),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.expose_secret()),
            ])
            .await?;

        if refreshed.refresh_token.is_none() {
            refreshed.refresh_token = Some(SecretString::from(refresh_token.expose_secret().to_owned()));
        }
        if refreshed.id_token.is_none() {
            refreshed.id_token = tokens.id_token.clone();
        }
        Ok(refreshed)
    }

    async fn request_token(&self, form: &[(&str, &str)]) -> Result<TokenBundle, AdlensError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(form)
            .send()
            .await
            .map_err(|e| AdlensError::Auth(format!("token endpoint unreachable: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AdlensError::Auth(format!(
                "token endpoint returned status {status}: {}",
                body.trim()
            )));
        }

        response
            .json::<TokenBundle>()
            .await
            .map_err(|e| AdlensError::Auth(format!("malformed token response: {e}")))
    }
}

mod secret_string {
    use secrecy::{ExposeSecret, SecretString};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(secret: &SecretString, ser: S) -> Result<S::Ok, S::Error> {
        ser.serialize_str(secret.expose_secret())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<SecretString, D::Error> {
        String::deserialize(de).map(SecretString::from)
    }
}

mod optional_secret_string {
    use secrecy::{ExposeSecret, SecretString};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(secret: &Option<SecretString>, ser: S) -> Result<S::Ok, S::Error> {
        match secret {
            Some(s) => ser.serialize_some(s.expose_secret()),
            None => ser.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Option<SecretString>, D::Error> {
        Option::<String>::deserialize(de).map(|s| s.map(SecretString::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id_token(claims: &serde_json::Value) -> String {
        let engine = base64::engine::general_purpose::URL_SAFE_NO_PAD;
        format!(
            "{}.{}.sig",
            engine.encode(br#"{"alg":"RS256"}"#),
            engine.encode(claims.to_string())
        )
    }

    #[test]
    fn authorization_url_requests_readonly_scope() {
        let oauth = GoogleOAuth::new(
            reqwest::Client::new(),
            DEFAULT_TOKEN_URL,
            "client-1".to_owned(),
            SecretString::from("secret".to_owned()),
            "http://localhost:8765/callback",
        );
        let url = oauth.authorization_url().unwrap();
        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params["client_id"], "client-1");
        assert_eq!(params["scope"], ADSENSE_READONLY_SCOPE);
        assert_eq!(params["redirect_uri"], "http://localhost:8765/callback");
        assert!(!url.as_str().contains("secret"));
    }

    #[test]
    fn postmessage_redirect_has_no_consent_url() {
        let oauth = GoogleOAuth::new(
            reqwest::Client::new(),
            DEFAULT_TOKEN_URL,
            "client-1".to_owned(),
            SecretString::from("secret".to_owned()),
            POSTMESSAGE_REDIRECT_URI,
        );
        let err = oauth.authorization_url().unwrap_err();
        assert!(matches!(err, AdlensError::Config(msg) if msg.contains("loopback")));
    }

    #[test]
    fn parses_google_token_response() {
        let json = r#"{
            "access_token": "ya29.a0",
            "expires_in": 3599,
            "refresh_token": "1//0g",
            "scope": "https://www.googleapis.com/auth/adsense.readonly",
            "token_type": "Bearer"
        }"#;
        let bundle: TokenBundle = serde_json::from_str(json).unwrap();
        assert_eq!(bundle.bearer(), "ya29.a0");
        assert_eq!(bundle.refresh_token.as_ref().unwrap().expose_secret(), "1//0g");
        assert!(bundle.id_token.is_none());
    }

    #[test]
    fn bundle_survives_serialization() {
        let json = r#"{"access_token":"abc","refresh_token":"def","expires_in":10}"#;
        let bundle: TokenBundle = serde_json::from_str(json).unwrap();
        let again: TokenBundle = serde_json::from_str(&serde_json::to_string(&bundle).unwrap()).unwrap();
        assert_eq!(again.bearer(), "abc");
        assert_eq!(again.obtained_at, bundle.obtained_at);
    }

    #[test]
    fn debug_redacts_tokens() {
        let bundle: TokenBundle = serde_json::from_str(r#"{"access_token":"super-secret"}"#).unwrap();
        assert!(!format!("{bundle:?}").contains("super-secret"));
    }

    #[test]
    fn expiry_uses_obtained_at() {
        let json = r#"{"access_token":"a","expires_in":60,"obtained_at":"2026-01-01T00:00:00Z"}"#;
        let bundle: TokenBundle = serde_json::from_str(json).unwrap();
        let start = bundle.obtained_at;
        assert!(!bundle.is_expired(start + Duration::seconds(59)));
        assert!(bundle.is_expired(start + Duration::seconds(60)));
    }

    #[test]
    fn profile_from_id_token() {
        let token = id_token(&serde_json::json!({
            "sub": "1234",
            "email": "owner@example.com",
            "name": "Site Owner"
        }));
        let profile = parse_id_token_profile(&token).unwrap();
        assert_eq!(profile.sub, "1234");
        assert_eq!(profile.email.as_deref(), Some("owner@example.com"));
        assert_eq!(profile.picture, None);
    }

    #[test]
    fn garbage_id_token_has_no_profile() {
        assert!(parse_id_token_profile("not-a-jwt").is_none());
        assert!(parse_id_token_profile("a.!!!.c").is_none());
    }
}
