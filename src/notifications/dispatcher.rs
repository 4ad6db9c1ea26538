//! Composes and sends operator notifications for qualifying transitions.
//! Recipient details and the enable flags come from the preference map; a
//! send failure is logged and never aborts the check pipeline.

use std::sync::Arc;
use tracing::{error, info};

use super::senders::{EmailSender, MailMessage, SmsSender};
use crate::config::{SharedPreferences, prefs};
use crate::status::ServiceStatus;

pub struct NotificationDispatcher {
    email: Option<Arc<dyn EmailSender>>,
    sms: Option<Arc<dyn SmsSender>>,
    preferences: SharedPreferences,
}

impl NotificationDispatcher {
    pub fn new(
        email: Option<Arc<dyn EmailSender>>,
        sms: Option<Arc<dyn SmsSender>>,
        preferences: SharedPreferences,
    ) -> Self {
        Self {
            email,
            sms,
            preferences,
        }
    }

    fn pref(&self, key: &str) -> Option<String> {
        self.preferences.read().ok()?.get(key).cloned()
    }

    fn pref_enabled(&self, key: &str) -> bool {
        self.pref(key).as_deref() == Some("1")
    }

    /// Sends email and/or SMS for the new status, per operator preferences.
    /// `Pending` has no message templates and never notifies.
    pub async fn dispatch(
        &self,
        new_status: ServiceStatus,
        service_name: &str,
        host_name: &str,
        probe_message: &str,
    ) {
        if let Some(sender) = self.email.as_deref() {
            if self.pref_enabled(prefs::NOTIFY_VIA_EMAIL) {
                self.send_email(sender, new_status, service_name, host_name, probe_message)
                    .await;
            }
        }

        if let Some(sender) = self.sms.as_deref() {
            if self.pref_enabled(prefs::NOTIFY_VIA_SMS) {
                self.send_sms(sender, new_status, service_name, host_name, probe_message)
                    .await;
            }
        }
    }

    async fn send_email(
        &self,
        sender: &dyn EmailSender,
        status: ServiceStatus,
        service_name: &str,
        host_name: &str,
        probe_message: &str,
    ) {
        let Some((subject, html_body)) =
            compose_email(status, service_name, host_name, probe_message)
        else {
            return;
        };

        let message = MailMessage {
            to_name: self.pref(prefs::NOTIFY_NAME).unwrap_or_default(),
            to_address: match self.pref(prefs::NOTIFY_EMAIL) {
                Some(address) if !address.is_empty() => address,
                _ => {
                    error!("email notifications enabled but no notify_email configured");
                    return;
                }
            },
            subject,
            html_body,
        };

        match sender.send(&message).await {
            Ok(()) => info!(to = %message.to_address, subject = %message.subject, "sent email notification"),
            Err(err) => error!(error = %err, "failed to send email notification"),
        }
    }

    async fn send_sms(
        &self,
        sender: &dyn SmsSender,
        status: ServiceStatus,
        service_name: &str,
        host_name: &str,
        probe_message: &str,
    ) {
        let Some(body) = compose_sms(status, service_name, host_name, probe_message) else {
            return;
        };

        let to = match self.pref(prefs::SMS_NOTIFY_NUMBER) {
            Some(number) if !number.is_empty() => number,
            _ => {
                error!("sms notifications enabled but no sms_notify_number configured");
                return;
            }
        };

        match sender.send(&to, &body).await {
            Ok(()) => info!(to = %to, "sent sms notification"),
            Err(err) => error!(error = %err, "failed to send sms notification"),
        }
    }
}

fn compose_email(
    status: ServiceStatus,
    service_name: &str,
    host_name: &str,
    probe_message: &str,
) -> Option<(String, String)> {
    let (label, body_line) = match status {
        ServiceStatus::Healthy => ("HEALTHY", "reported healthy status"),
        ServiceStatus::Problem => ("PROBLEM", "reported problem"),
        ServiceStatus::Warning => ("WARNING", "reported warning"),
        ServiceStatus::Pending => return None,
    };

    let subject = format!("{label}: service {service_name} on {host_name}");
    let html_body = format!(
        "<p>Service {service_name} on {host_name} {body_line}</p>\
         <p><strong>Message received: {probe_message}</strong></p>"
    );
    Some((subject, html_body))
}

fn compose_sms(
    status: ServiceStatus,
    service_name: &str,
    host_name: &str,
    probe_message: &str,
) -> Option<String> {
    match status {
        ServiceStatus::Healthy => {
            Some(format!("Service {service_name} on {host_name} is healthy"))
        }
        ServiceStatus::Problem => Some(format!(
            "Service {service_name} on {host_name} reports a problem: {probe_message}"
        )),
        ServiceStatus::Warning => Some(format!(
            "Service {service_name} on {host_name} reports a warning: {probe_message}"
        )),
        ServiceStatus::Pending => None,
    }
}
