#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use secrecy::SecretString;
use statement_analyzer::auth::{IdentityProvider, SignInOutcome, UserInfo};
use statement_analyzer::client::TokenSource;
use statement_analyzer::pipeline::{StatementFile, PDF_CONTENT_TYPE};

/// A realistic backend payload for one statement.
pub const SAMPLE_RESULT: &str = r#"{
    "account_details": {
        "name": "J DOE",
        "account_number": "0001234567",
        "currency": "LKR",
        "statement_date": "31JAN2024"
    },
    "transactions": {
        "income": [
            {"date": "05JAN2024", "description": "SALARY JAN", "amount": 250000},
            {"date": "20JAN2024", "description": "INTEREST", "amount": 1250.75}
        ],
        "expenses": [
            {"date": "07JAN2024", "description": "PIZZA HUT COLOMBO", "amount": 4200},
            {"date": "09JAN2024", "description": "UBER TRIP", "amount": 1850.5},
            {"date": "12JAN2024", "description": "DIALOG PHONE BILL", "amount": 3499},
            {"date": "15JAN2024", "description": "ATM WITHDRAWAL", "amount": 20000},
            {"date": "18JAN2024", "description": "KEELLS SUPER MARKET", "amount": 15320.25},
            {"date": "22JAN2024", "description": "TRANSFER TO SAVINGS", "amount": 50000},
            {"date": "02FEB2024", "description": "CITY PHARMACY", "amount": 2200}
        ]
    },
    "final_balance": 154181.0
}"#;

pub fn pdf(name: &str, size: usize) -> StatementFile {
    let mut data = b"%PDF-1.4\n".to_vec();
    data.resize(size.max(data.len()), b' ');
    StatementFile::new(name, PDF_CONTENT_TYPE, data)
}

pub fn user(groups: Option<&[&str]>) -> UserInfo {
    UserInfo {
        sub: Some("u-1".to_string()),
        username: Some("jdoe".to_string()),
        name: Some("Jane Doe".to_string()),
        email: Some("jane@example.com".to_string()),
        groups: groups.map(|g| g.iter().map(|s| s.to_string()).collect()),
        ..UserInfo::default()
    }
}

/// Token source handing out fixed tokens and counting refreshes.
pub struct StaticTokens {
    pub current: Option<String>,
    pub fail_current: bool,
    /// `None` makes refresh fail.
    pub refreshed: Option<String>,
    pub refresh_calls: AtomicUsize,
}

impl StaticTokens {
    pub fn new(current: &str, refreshed: Option<&str>) -> Self {
        Self {
            current: Some(current.to_string()),
            fail_current: false,
            refreshed: refreshed.map(str::to_string),
            refresh_calls: AtomicUsize::new(0),
        }
    }

    pub fn refreshes(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenSource for StaticTokens {
    async fn access_token(&self) -> Result<Option<SecretString>> {
        if self.fail_current {
            anyhow::bail!("token store unavailable");
        }
        Ok(self.current.clone().map(SecretString::from))
    }

    async fn refresh_access_token(&self) -> Result<Option<SecretString>> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        match &self.refreshed {
            Some(token) => Ok(Some(SecretString::from(token.clone()))),
            None => anyhow::bail!("refresh token revoked"),
        }
    }
}

/// In-memory identity provider with call counters.
#[derive(Default)]
pub struct MockIdentity {
    pub user: Mutex<Option<UserInfo>>,
    /// `None` makes `access_token` fail.
    pub token: Mutex<Option<String>>,
    /// `None` makes `refresh_access_token` fail; otherwise it becomes the
    /// current token.
    pub refreshed_token: Mutex<Option<String>>,
    pub id_token: Mutex<Option<String>>,
    pub sign_in_error: Mutex<Option<String>>,
    pub sign_out_error: Mutex<Option<String>>,
    pub sign_in_calls: AtomicUsize,
    pub sign_out_calls: AtomicUsize,
    pub access_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
}

impl MockIdentity {
    pub fn signed_in(user: UserInfo, token: &str) -> Self {
        let identity = Self::default();
        *identity.user.lock().unwrap() = Some(user);
        *identity.token.lock().unwrap() = Some(token.to_string());
        identity
    }

    pub fn sign_ins(&self) -> usize {
        self.sign_in_calls.load(Ordering::SeqCst)
    }

    pub fn refreshes(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IdentityProvider for MockIdentity {
    fn name(&self) -> &str {
        "mock"
    }

    async fn sign_in(&self) -> Result<SignInOutcome> {
        self.sign_in_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.sign_in_error.lock().unwrap().clone() {
            anyhow::bail!(err);
        }
        if self.user.lock().unwrap().is_some() {
            Ok(SignInOutcome::SignedIn)
        } else {
            Ok(SignInOutcome::Redirect {
                url: "https://id.example.com/authorize".to_string(),
            })
        }
    }

    async fn sign_out(&self) -> Result<()> {
        self.sign_out_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.sign_out_error.lock().unwrap().clone() {
            anyhow::bail!(err);
        }
        *self.user.lock().unwrap() = None;
        *self.token.lock().unwrap() = None;
        Ok(())
    }

    async fn user_info(&self) -> Result<Option<UserInfo>> {
        Ok(self.user.lock().unwrap().clone())
    }

    async fn access_token(&self) -> Result<SecretString> {
        self.access_calls.fetch_add(1, Ordering::SeqCst);
        match self.token.lock().unwrap().clone() {
            Some(token) => Ok(SecretString::from(token)),
            None => anyhow::bail!("access token expired"),
        }
    }

    async fn refresh_access_token(&self) -> Result<()> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let refreshed = self.refreshed_token.lock().unwrap().clone();
        match refreshed {
            Some(token) => {
                *self.token.lock().unwrap() = Some(token);
                Ok(())
            }
            None => anyhow::bail!("refresh rejected"),
        }
    }

    async fn id_token(&self) -> Result<Option<SecretString>> {
        Ok(self.id_token.lock().unwrap().clone().map(SecretString::from))
    }
}
