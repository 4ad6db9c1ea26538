//! Environment-driven configuration: database URL, outbound sender settings,
//! and the operator preference map consulted by the engine and dispatcher.

use std::collections::HashMap;
use std::env;
use std::sync::{Arc, RwLock};

use crate::notifications::senders::smtp::SmtpConfig;
use crate::notifications::senders::twilio::TwilioConfig;

/// Preference keys consulted at runtime.
pub mod prefs {
    /// "1" enables the scheduler at startup.
    pub const MONITORING_LIVE: &str = "monitoring_live";
    pub const NOTIFY_VIA_EMAIL: &str = "notify_via_email";
    pub const NOTIFY_VIA_SMS: &str = "notify_via_sms";
    pub const NOTIFY_NAME: &str = "notify_name";
    pub const NOTIFY_EMAIL: &str = "notify_email";
    pub const SMS_NOTIFY_NUMBER: &str = "sms_notify_number";
}

pub type PreferenceMap = HashMap<String, String>;

/// The preference map is shared between the engine, the dispatcher, and the
/// admin layer, which may toggle values at runtime.
pub type SharedPreferences = Arc<RwLock<PreferenceMap>>;

pub fn new_shared_preferences(map: PreferenceMap) -> SharedPreferences {
    Arc::new(RwLock::new(map))
}

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub smtp: Option<SmtpConfig>,
    pub twilio: Option<TwilioConfig>,
    pub preferences: PreferenceMap,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, String> {
        let database_url =
            env::var("DATABASE_URL").map_err(|_| "DATABASE_URL must be set".to_string())?;

        // SMTP and Twilio are optional; monitoring runs without them and the
        // dispatcher simply has no sender to call.
        let smtp = match env::var("SMTP_HOST") {
            Ok(host) => Some(SmtpConfig {
                host,
                port: env::var("SMTP_PORT")
                    .ok()
                    .and_then(|p| p.parse().ok())
                    .unwrap_or(587),
                username: env::var("SMTP_USERNAME").unwrap_or_default(),
                password: env::var("SMTP_PASSWORD").unwrap_or_default(),
                from_address: env::var("SMTP_FROM")
                    .map_err(|_| "SMTP_FROM must be set when SMTP_HOST is".to_string())?,
            }),
            Err(_) => None,
        };

        let twilio = match env::var("TWILIO_SID") {
            Ok(account_sid) => Some(TwilioConfig {
                account_sid,
                auth_token: env::var("TWILIO_AUTH_TOKEN")
                    .map_err(|_| "TWILIO_AUTH_TOKEN must be set when TWILIO_SID is".to_string())?,
                from_number: env::var("TWILIO_PHONE_NUMBER")
                    .map_err(|_| "TWILIO_PHONE_NUMBER must be set when TWILIO_SID is".to_string())?,
            }),
            Err(_) => None,
        };

        let mut preferences = PreferenceMap::new();
        preferences.insert(
            prefs::MONITORING_LIVE.to_string(),
            env::var("MONITORING_LIVE").unwrap_or_else(|_| "1".to_string()),
        );
        preferences.insert(
            prefs::NOTIFY_VIA_EMAIL.to_string(),
            env::var("NOTIFY_VIA_EMAIL").unwrap_or_else(|_| "0".to_string()),
        );
        preferences.insert(
            prefs::NOTIFY_VIA_SMS.to_string(),
            env::var("NOTIFY_VIA_SMS").unwrap_or_else(|_| "0".to_string()),
        );
        preferences.insert(
            prefs::NOTIFY_NAME.to_string(),
            env::var("NOTIFY_NAME").unwrap_or_default(),
        );
        preferences.insert(
            prefs::NOTIFY_EMAIL.to_string(),
            env::var("NOTIFY_EMAIL").unwrap_or_default(),
        );
        preferences.insert(
            prefs::SMS_NOTIFY_NUMBER.to_string(),
            env::var("SMS_NOTIFY_NUMBER").unwrap_or_default(),
        );

        Ok(AppConfig {
            database_url,
            smtp,
            twilio,
            preferences,
        })
    }
}
