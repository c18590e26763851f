use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A record type stored in the remote entity store.
pub trait Entity: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Entity collection name as the store knows it, e.g. `Order`.
    const NAME: &'static str;

    fn id(&self) -> &str;
}

macro_rules! entity {
    ($ty:ty, $name:literal) => {
        impl Entity for $ty {
            const NAME: &'static str = $name;

            fn id(&self) -> &str {
                &self.id
            }
        }
    };
}

macro_rules! status_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl From<$name> for serde_json::Value {
            fn from(status: $name) -> Self {
                serde_json::Value::String(status.as_str().to_string())
            }
        }
    };
}

status_enum!(TenantStatus {
    Pending => "pending",
    Active => "active",
    Suspended => "suspended",
    Closed => "closed",
});

status_enum!(OrderStatus {
    Pending => "pending",
    Paid => "paid",
    Preparing => "preparing",
    Shipped => "shipped",
    Delivered => "delivered",
    Completed => "completed",
    Cancelled => "cancelled",
    Refunded => "refunded",
});

impl OrderStatus {
    pub fn is_void(&self) -> bool {
        matches!(self, Self::Cancelled | Self::Refunded)
    }
}

status_enum!(CommissionStatus {
    Pending => "pending",
    Settled => "settled",
    Invoiced => "invoiced",
});

status_enum!(SettlementStatus {
    Completed => "completed",
});

status_enum!(SubscriptionStatus {
    Trial => "trial",
    Active => "active",
    PastDue => "past_due",
    Suspended => "suspended",
    Expired => "expired",
    Cancelled => "cancelled",
});

status_enum!(BillingCycle {
    Monthly => "monthly",
    Yearly => "yearly",
});

impl BillingCycle {
    pub fn months(&self) -> u32 {
        match self {
            Self::Monthly => 1,
            Self::Yearly => 12,
        }
    }
}

impl Default for BillingCycle {
    fn default() -> Self {
        Self::Monthly
    }
}

status_enum!(InvoiceStatus {
    Pending => "pending",
    Paid => "paid",
    Overdue => "overdue",
    Cancelled => "cancelled",
});

impl InvoiceStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::Overdue)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tenant {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub owner_email: Option<String>,
    pub status: TenantStatus,
    /// Percent of each order total kept by the platform.
    #[serde(default)]
    pub commission_rate: Option<Decimal>,
    #[serde(default)]
    pub subscription_plan: Option<String>,
    #[serde(default, with = "lenient_timestamp")]
    pub suspended_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub suspension_reason: Option<String>,
    #[serde(default, with = "lenient_timestamp")]
    pub created_date: Option<DateTime<Utc>>,
}
entity!(Tenant, "Tenant");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub tenant_id: String,
    #[serde(default)]
    pub order_number: Option<String>,
    pub total_amount: Decimal,
    pub status: OrderStatus,
    #[serde(default)]
    pub commission_calculated: bool,
    #[serde(default)]
    pub commission_amount: Option<Decimal>,
    #[serde(default, with = "lenient_timestamp")]
    pub created_date: Option<DateTime<Utc>>,
}
entity!(Order, "Order");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commission {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub tenant_id: String,
    pub order_id: String,
    pub order_amount: Decimal,
    pub commission_rate: Decimal,
    pub commission_amount: Decimal,
    pub status: CommissionStatus,
    /// `YYYY-MM` of the month whose settlement picks this commission up.
    pub settlement_month: String,
    #[serde(default)]
    pub settled_date: Option<NaiveDate>,
    #[serde(default)]
    pub invoice_id: Option<String>,
    #[serde(default, with = "lenient_timestamp")]
    pub created_date: Option<DateTime<Utc>>,
}
entity!(Commission, "Commission");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommissionSettlement {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub tenant_id: String,
    pub settlement_month: String,
    pub commission_count: u32,
    pub total_order_amount: Decimal,
    pub total_commission: Decimal,
    pub status: SettlementStatus,
    pub settled_date: NaiveDate,
}
entity!(CommissionSettlement, "CommissionSettlement");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Subscription {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub tenant_id: String,
    pub plan_name: String,
    pub monthly_fee: Decimal,
    #[serde(default)]
    pub billing_cycle: BillingCycle,
    pub status: SubscriptionStatus,
    #[serde(default = "default_true")]
    pub auto_renew: bool,
    #[serde(default)]
    pub current_period_start: Option<NaiveDate>,
    #[serde(default)]
    pub next_billing_date: Option<NaiveDate>,
    #[serde(default)]
    pub past_due_since: Option<NaiveDate>,
    #[serde(default)]
    pub trial_end_date: Option<NaiveDate>,
    #[serde(default)]
    pub renewal_count: u32,
}
entity!(Subscription, "Subscription");

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub tenant_id: String,
    pub invoice_number: String,
    pub billing_period: String,
    pub subscription_fee: Decimal,
    pub commission_total: Decimal,
    pub total_amount: Decimal,
    pub currency: String,
    pub status: InvoiceStatus,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub reminder_count: u32,
    /// Reminders sent after the due date; capped by the reminder policy.
    #[serde(default)]
    pub overdue_reminder_count: u32,
    #[serde(default)]
    pub last_reminder_date: Option<NaiveDate>,
    #[serde(default)]
    pub paid_date: Option<NaiveDate>,
}
entity!(Invoice, "Invoice");

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyAnalytics {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub date: NaiveDate,
    /// `None` marks the platform-wide row.
    #[serde(default)]
    pub tenant_id: Option<String>,
    pub order_count: u32,
    pub gross_revenue: Decimal,
    pub commission_total: Decimal,
    pub cancelled_count: u32,
    #[serde(default)]
    pub active_tenants: Option<u32>,
    #[serde(default)]
    pub new_tenants: Option<u32>,
}
entity!(DailyAnalytics, "DailyAnalytics");

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// The entity API emits timestamps with and without an offset
/// (`2024-05-01T03:00:00.000Z`, `2024-05-01T03:00:00.000000`), and
/// occasionally a bare date. Naive values are taken as UTC.
pub mod lenient_timestamp {
    use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn parse(raw: &str) -> Option<DateTime<Utc>> {
        let raw = raw.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(dt.with_timezone(&Utc));
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
            return Some(naive.and_utc());
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f") {
            return Some(naive.and_utc());
        }
        NaiveDate::parse_from_str(raw, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|naive| naive.and_utc())
    }

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(dt) => serializer.serialize_str(&dt.to_rfc3339()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(s) if s.trim().is_empty() => Ok(None),
            Some(s) => parse(&s)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("unrecognised timestamp '{}'", s))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, Timelike};
    use serde_json::json;

    #[test]
    fn test_order_from_entity_api_json() {
        let order: Order = serde_json::from_value(json!({
            "id": "ord_1",
            "tenant_id": "t_1",
            "order_number": "ZF-1001",
            "total_amount": 100000,
            "status": "paid",
            "created_date": "2026-09-30T23:10:00.000000"
        }))
        .unwrap();

        assert_eq!(order.total_amount, Decimal::new(100000, 0));
        assert_eq!(order.status, OrderStatus::Paid);
        assert!(!order.commission_calculated);
        let created = order.created_date.unwrap();
        assert_eq!(created.day(), 30);
        assert_eq!(created.hour(), 23);
    }

    #[test]
    fn test_new_record_serializes_without_id() {
        let tenant = Tenant {
            id: String::new(),
            name: "Green Acres".to_string(),
            owner_email: Some("owner@greenacres.kr".to_string()),
            status: TenantStatus::Active,
            commission_rate: None,
            subscription_plan: None,
            suspended_at: None,
            suspension_reason: None,
            created_date: None,
        };
        let value = serde_json::to_value(&tenant).unwrap();
        assert!(value.get("id").is_none());
        assert_eq!(value["status"], "active");
    }

    #[test]
    fn test_subscription_defaults() {
        let sub: Subscription = serde_json::from_value(json!({
            "id": "s1",
            "tenant_id": "t1",
            "plan_name": "basic",
            "monthly_fee": 29000,
            "status": "past_due"
        }))
        .unwrap();
        assert!(sub.auto_renew);
        assert_eq!(sub.billing_cycle, BillingCycle::Monthly);
        assert_eq!(sub.status, SubscriptionStatus::PastDue);
    }

    #[test]
    fn test_lenient_timestamp_formats() {
        assert!(lenient_timestamp::parse("2026-10-01T00:00:00Z").is_some());
        assert!(lenient_timestamp::parse("2026-10-01T09:00:00+09:00").is_some());
        assert!(lenient_timestamp::parse("2026-10-01 12:30:00").is_some());
        assert_eq!(
            lenient_timestamp::parse("2026-10-01").unwrap().date_naive(),
            NaiveDate::from_ymd_opt(2026, 10, 1).unwrap()
        );
        assert!(lenient_timestamp::parse("yesterday").is_none());
    }
}
