use crate::domain::model::OrderStatus;
use crate::utils::error::Result;
use crate::utils::validation::{
    validate_non_empty_string, validate_positive_number, validate_range, validate_rate, Validate,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Business rules shared by every billing job. Each section maps to a TOML
/// table of the same name and may be omitted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BillingPolicy {
    pub commission: CommissionPolicy,
    pub invoice: InvoicePolicy,
    pub reminders: ReminderPolicy,
    pub subscription: SubscriptionPolicy,
    pub suspension: SuspensionPolicy,
    pub notifications: NotificationPolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CommissionPolicy {
    /// Percent applied when a tenant has no rate of its own.
    pub default_rate: Decimal,
    /// Decimal places kept on commission amounts (0 for KRW).
    pub amount_scale: u32,
    pub eligible_statuses: Vec<OrderStatus>,
}

impl Default for CommissionPolicy {
    fn default() -> Self {
        Self {
            default_rate: Decimal::new(3, 0),
            amount_scale: 0,
            eligible_statuses: vec![
                OrderStatus::Paid,
                OrderStatus::Preparing,
                OrderStatus::Shipped,
                OrderStatus::Delivered,
                OrderStatus::Completed,
            ],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InvoicePolicy {
    pub due_days: u32,
    pub number_prefix: String,
    pub currency: String,
    /// Day of month on which the daily run also settles and invoices.
    pub billing_day: u32,
}

impl Default for InvoicePolicy {
    fn default() -> Self {
        Self {
            due_days: 14,
            number_prefix: "INV".to_string(),
            currency: "KRW".to_string(),
            billing_day: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderPolicy {
    pub days_before_due: Vec<i64>,
    pub overdue_interval_days: i64,
    pub max_overdue_reminders: u32,
}

impl Default for ReminderPolicy {
    fn default() -> Self {
        Self {
            days_before_due: vec![7, 3, 1],
            overdue_interval_days: 3,
            max_overdue_reminders: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionPolicy {
    pub grace_period_days: i64,
}

impl Default for SubscriptionPolicy {
    fn default() -> Self {
        Self {
            grace_period_days: 7,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SuspensionPolicy {
    pub overdue_days: i64,
}

impl Default for SuspensionPolicy {
    fn default() -> Self {
        Self { overdue_days: 30 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationPolicy {
    pub enabled: bool,
    pub from_name: String,
}

impl Default for NotificationPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            from_name: "Zero Farm".to_string(),
        }
    }
}

impl Validate for BillingPolicy {
    fn validate(&self) -> Result<()> {
        validate_rate("commission.default_rate", self.commission.default_rate)?;
        validate_range("commission.amount_scale", self.commission.amount_scale, 0, 4)?;
        validate_positive_number("invoice.due_days", self.invoice.due_days as usize, 1)?;
        validate_non_empty_string("invoice.number_prefix", &self.invoice.number_prefix)?;
        validate_non_empty_string("invoice.currency", &self.invoice.currency)?;
        // 28 keeps the billing day present in every month
        validate_range("invoice.billing_day", self.invoice.billing_day, 1, 28)?;
        for days in &self.reminders.days_before_due {
            validate_range("reminders.days_before_due", *days, 1, 60)?;
        }
        validate_range(
            "reminders.overdue_interval_days",
            self.reminders.overdue_interval_days,
            1,
            30,
        )?;
        validate_range(
            "subscription.grace_period_days",
            self.subscription.grace_period_days,
            0,
            90,
        )?;
        validate_range("suspension.overdue_days", self.suspension.overdue_days, 1, 365)?;
        Ok(())
    }
}
