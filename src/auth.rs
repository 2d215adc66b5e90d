//! Credential Service and user profiles
//!
//! Identity comes from a [`CredentialService`]; the role that gates admin
//! operations lives in the user's profile at `users/{uid}`, next to the
//! payment methods the user saved.

use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use validator::Validate;
use crate::domain::value_objects::{PaymentSelection, PaymentSummary};
use crate::store::{self, DocumentStore, StoreError, CREDENTIALS};
use crate::{Result, StorefrontError};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: String,
    pub email: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role { Admin, #[default] Customer }

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub email: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default, with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

/// What the profile page shows: the stored profile plus saved payment methods.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub uid: String,
    #[serde(flatten)]
    pub user: UserProfile,
    pub payment_methods: Vec<PaymentSummary>,
}

/// An authenticated user together with their role.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Principal {
    #[serde(flatten)]
    pub identity: Identity,
    pub role: Role,
}

impl Principal {
    pub fn uid(&self) -> &str { &self.identity.uid }
    pub fn is_admin(&self) -> bool { self.role == Role::Admin }

    pub fn require_admin(&self) -> Result<()> {
        if self.is_admin() { Ok(()) } else { Err(StorefrontError::Forbidden) }
    }
}

#[derive(Clone, Deserialize, Validate)]
pub struct Credentials {
    #[validate(email(message = "Please enter a valid email"))]
    pub email: String,
    #[validate(length(min = 6, message = "Password must be at least 6 characters"))]
    pub password: String,
    #[serde(default)]
    pub name: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials").field("email", &self.email).finish_non_exhaustive()
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("Email already registered")]
    EmailTaken,
    #[error("Password hashing failed")]
    PasswordHash,
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[async_trait]
pub trait CredentialService: Send + Sync {
    async fn sign_in(&self, email: &str, password: &str) -> std::result::Result<Identity, AuthError>;
    async fn sign_up(&self, email: &str, password: &str) -> std::result::Result<Identity, AuthError>;
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CredentialRecord {
    uid: String,
    password_hash: String,
}

/// Accounts kept in the Document Store under `credentials/{email}` with
/// Argon2id password hashes, so they live exactly as long as the profiles.
pub struct DocumentCredentials {
    store: Arc<dyn DocumentStore>,
}

impl DocumentCredentials {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self { Self { store } }
}

fn normalize_email(email: &str) -> String { email.trim().to_lowercase() }

/// Path segment for an email: `%`, `/` and `.` are escaped so no email can
/// reach outside its own node.
fn credential_path(email: &str) -> String {
    let key: String = email.chars().map(|c| match c {
        '%' => "%25".to_string(),
        '/' => "%2F".to_string(),
        '.' => "%2E".to_string(),
        c => c.to_string(),
    }).collect();
    format!("{CREDENTIALS}/{key}")
}

#[async_trait]
impl CredentialService for DocumentCredentials {
    async fn sign_in(&self, email: &str, password: &str) -> std::result::Result<Identity, AuthError> {
        let email = normalize_email(email);
        let record = self.store.get(&credential_path(&email)).await?.ok_or(AuthError::InvalidCredentials)?;
        let record: CredentialRecord = serde_json::from_value(record).map_err(|_| AuthError::InvalidCredentials)?;
        verify_password(password, &record.password_hash)?;
        Ok(Identity { uid: record.uid, email })
    }

    async fn sign_up(&self, email: &str, password: &str) -> std::result::Result<Identity, AuthError> {
        let email = normalize_email(email);
        let record = CredentialRecord { uid: uuid::Uuid::new_v4().simple().to_string(), password_hash: hash_password(password)? };
        let value = serde_json::to_value(&record).map_err(|_| AuthError::PasswordHash)?;
        if !self.store.compare_and_set(&credential_path(&email), None, value).await? { return Err(AuthError::EmailTaken); }
        Ok(Identity { uid: record.uid, email })
    }
}

fn hash_password(password: &str) -> std::result::Result<String, AuthError> {
    let salt = SaltString::generate(&mut rand::thread_rng());
    Argon2::default().hash_password(password.as_bytes(), &salt).map(|hash| hash.to_string()).map_err(|_| AuthError::PasswordHash)
}

fn verify_password(password: &str, hash: &str) -> std::result::Result<(), AuthError> {
    let parsed = PasswordHash::new(hash).map_err(|_| AuthError::InvalidCredentials)?;
    Argon2::default().verify_password(password.as_bytes(), &parsed).map_err(|_| AuthError::InvalidCredentials)
}

/// Sign-up and sign-in against the Credential Service, resolving roles from profiles.
#[derive(Clone)]
pub struct Accounts {
    credentials: Arc<dyn CredentialService>,
    store: Arc<dyn DocumentStore>,
    admin_email: Option<String>,
}

impl Accounts {
    pub fn new(credentials: Arc<dyn CredentialService>, store: Arc<dyn DocumentStore>) -> Self {
        Self { credentials, store, admin_email: None }
    }

    /// Accounts registered with this email get the admin role.
    pub fn with_admin_email(mut self, email: Option<String>) -> Self {
        self.admin_email = email.map(|e| e.trim().to_lowercase());
        self
    }

    #[tracing::instrument(skip_all, fields(email = %credentials.email))]
    pub async fn register(&self, credentials: &Credentials) -> Result<Principal> {
        credentials.validate()?;
        let identity = self.credentials.sign_up(&credentials.email, &credentials.password).await?;
        let role = if self.admin_email.as_deref() == Some(identity.email.as_str()) { Role::Admin } else { Role::Customer };
        let profile = UserProfile { email: identity.email.clone(), name: credentials.name.trim().to_string(), role, created_at: Utc::now() };
        self.store.set(&store::user_path(&identity.uid), serde_json::to_value(&profile).unwrap_or_default()).await?;
        tracing::info!(uid = %identity.uid, ?role, "account registered");
        Ok(Principal { identity, role })
    }

    #[tracing::instrument(skip_all, fields(email = %email))]
    pub async fn login(&self, email: &str, password: &str) -> Result<Principal> {
        let identity = self.credentials.sign_in(email, password).await?;
        let role = self.profile(&identity.uid).await?.map(|p| p.user.role).unwrap_or_default();
        Ok(Principal { identity, role })
    }

    pub async fn profile(&self, uid: &str) -> Result<Option<Profile>> {
        let Some(mut record) = self.store.get(&store::user_path(uid)).await? else { return Ok(None) };
        let saved = record.as_object_mut().and_then(|map| map.remove(PAYMENT_METHODS));
        let Ok(user) = serde_json::from_value::<UserProfile>(record) else { return Ok(None) };
        let payment_methods = match saved {
            Some(Value::Object(methods)) => methods.into_iter().filter_map(|(key, method)| match serde_json::from_value(method) {
                Ok(summary) => Some(summary),
                Err(e) => {
                    tracing::warn!(%uid, %key, error = %e, "skipping malformed payment method");
                    None
                }
            }).collect(),
            _ => vec![],
        };
        Ok(Some(Profile { uid: uid.to_string(), user, payment_methods }))
    }

    /// Saves the redacted form of `payment` under the user's profile.
    #[tracing::instrument(skip(self, payment))]
    pub async fn save_payment_method(&self, uid: &str, payment: &PaymentSelection) -> Result<PaymentSummary> {
        payment.validate()?;
        if self.store.get(&store::user_path(uid)).await?.is_none() { return Err(StorefrontError::NotFound(format!("User {uid}"))); }
        let summary = payment.redact();
        let path = self.store.push(&format!("{}/{PAYMENT_METHODS}", store::user_path(uid))).await?;
        self.store.set(&path, serde_json::to_value(&summary).unwrap_or_default()).await?;
        tracing::info!(method = %summary, "payment method saved");
        Ok(summary)
    }
}

const PAYMENT_METHODS: &str = "paymentMethods";

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn accounts() -> (Accounts, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        (Accounts::new(Arc::new(DocumentCredentials::new(store.clone())), store.clone()), store)
    }

    fn creds(email: &str, password: &str) -> Credentials {
        Credentials { email: email.into(), password: password.into(), name: "Test Customer".into() }
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let (accounts, store) = accounts();
        let registered = accounts.register(&creds("Customer@Example.com", "secret1")).await.unwrap();
        assert_eq!(registered.role, Role::Customer);
        assert_eq!(registered.identity.email, "customer@example.com");
        let profile = store.get(&store::user_path(registered.uid())).await.unwrap().unwrap();
        assert_eq!(profile["role"], "customer");

        let logged_in = accounts.login("customer@example.com", "secret1").await.unwrap();
        assert_eq!(logged_in, registered);
    }

    #[tokio::test]
    async fn test_wrong_password() {
        let (accounts, _) = accounts();
        accounts.register(&creds("a@example.com", "secret1")).await.unwrap();
        let err = accounts.login("a@example.com", "nope").await.unwrap_err();
        assert!(matches!(err, StorefrontError::Auth(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_duplicate_email() {
        let (accounts, _) = accounts();
        accounts.register(&creds("a@example.com", "secret1")).await.unwrap();
        let err = accounts.register(&creds("a@example.com", "secret2")).await.unwrap_err();
        assert!(matches!(err, StorefrontError::Auth(AuthError::EmailTaken)));
    }

    #[tokio::test]
    async fn test_register_validates_input() {
        let (accounts, _) = accounts();
        let StorefrontError::Validation(errors) = accounts.register(&creds("not-an-email", "123")).await.unwrap_err() else { panic!("expected validation error") };
        let fields = errors.field_errors();
        assert!(fields.contains_key("email"));
        assert!(fields.contains_key("password"));
    }

    #[tokio::test]
    async fn test_admin_email_gets_admin_role() {
        let (accounts, _) = accounts();
        let accounts = accounts.with_admin_email(Some("Admin@Example.com".into()));
        let admin = accounts.register(&creds("admin@example.com", "secret1")).await.unwrap();
        assert!(admin.is_admin());
        assert!(admin.require_admin().is_ok());
        let customer = accounts.register(&creds("c@example.com", "secret1")).await.unwrap();
        assert!(matches!(customer.require_admin(), Err(StorefrontError::Forbidden)));
    }

    #[tokio::test]
    async fn test_accounts_survive_a_new_credential_service() {
        let (accounts, store) = accounts();
        let registered = accounts.register(&creds("a@example.com", "secret1")).await.unwrap();
        let restarted = Accounts::new(Arc::new(DocumentCredentials::new(store.clone())), store.clone());
        assert_eq!(restarted.login("A@example.com ", "secret1").await.unwrap(), registered);
        let record = store.get(&credential_path("a@example.com")).await.unwrap().unwrap();
        assert!(!record.to_string().contains("secret1"));
    }

    #[test]
    fn test_credential_path_escapes_separators() {
        assert_eq!(credential_path("a.b@x.io"), "credentials/a%2Eb@x%2Eio");
        assert_eq!(credential_path("a/../b%"), "credentials/a%2F%2E%2E%2Fb%25");
    }

    #[tokio::test]
    async fn test_profile_with_saved_payment_methods() {
        let (accounts, _) = accounts();
        let before = Utc::now().timestamp_millis();
        let user = accounts.register(&creds("a@example.com", "secret1")).await.unwrap();
        let card = PaymentSelection::Card(crate::domain::value_objects::CardDetails::new("4111 1111 1111 4242", "12/27", "123"));
        let summary = accounts.save_payment_method(user.uid(), &card).await.unwrap();
        assert_eq!(summary, PaymentSummary::Card { card_last4: "4242".into(), expiry_date: "12/27".into() });
        accounts.save_payment_method(user.uid(), &PaymentSelection::Mobile).await.unwrap();

        let profile = accounts.profile(user.uid()).await.unwrap().unwrap();
        assert_eq!(profile.user.email, "a@example.com");
        assert!(profile.user.created_at.timestamp_millis() >= before);
        assert_eq!(profile.payment_methods.len(), 2);
        assert!(profile.payment_methods.contains(&summary));
        assert!(profile.payment_methods.contains(&PaymentSummary::Mobile));
        let json = serde_json::to_value(&profile).unwrap();
        assert_eq!(json["role"], "customer");
        assert!(json["createdAt"].is_i64());
        assert!(!json.to_string().contains("4111"));
        assert_eq!(accounts.login("a@example.com", "secret1").await.unwrap().role, Role::Customer);
    }

    #[tokio::test]
    async fn test_invalid_payment_method_is_not_saved() {
        let (accounts, store) = accounts();
        let user = accounts.register(&creds("a@example.com", "secret1")).await.unwrap();
        let short = PaymentSelection::Card(crate::domain::value_objects::CardDetails::new("4111", "12/27", "123"));
        assert!(matches!(accounts.save_payment_method(user.uid(), &short).await, Err(StorefrontError::Validation(_))));
        assert!(store.get(&format!("users/{}/paymentMethods", user.uid())).await.unwrap().is_none());
        assert!(matches!(accounts.save_payment_method("ghost", &PaymentSelection::Cash).await, Err(StorefrontError::NotFound(_))));
    }
}
