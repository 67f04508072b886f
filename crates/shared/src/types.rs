//! Payment and subscription status vocabulary
//!
//! Wire forms follow the gateway's conventions (`PIX`, `CREDIT_CARD`,
//! `MONTHLY`); database columns store the lowercase names.

use serde::{Deserialize, Serialize};

/// How a payment is (or was) charged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentMethod {
    #[serde(rename = "PIX")]
    Pix,
    #[serde(rename = "BOLETO")]
    Boleto,
    #[serde(rename = "CREDIT_CARD")]
    CreditCard,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Pix => "pix",
            PaymentMethod::Boleto => "boleto",
            PaymentMethod::CreditCard => "credit_card",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pix" | "PIX" => Some(PaymentMethod::Pix),
            "boleto" | "BOLETO" => Some(PaymentMethod::Boleto),
            "credit_card" | "CREDIT_CARD" => Some(PaymentMethod::CreditCard),
            _ => None,
        }
    }

    /// Wire form used when talking to the gateway.
    pub fn wire_name(&self) -> &'static str {
        match self {
            PaymentMethod::Pix => "PIX",
            PaymentMethod::Boleto => "BOLETO",
            PaymentMethod::CreditCard => "CREDIT_CARD",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of a ledger row. Advances monotonically; see
/// `galeria-billing::ledger::next_status` for the merge rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Paid,
    Overdue,
    Cancelled,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Paid => "paid",
            TransactionStatus::Overdue => "overdue",
            TransactionStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(TransactionStatus::Pending),
            "paid" => Some(TransactionStatus::Paid),
            "overdue" => Some(TransactionStatus::Overdue),
            "cancelled" => Some(TransactionStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Status of the tracked entitlement period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SubscriptionStatus {
    Active,
    Suspended,
    Expired,
    Canceled,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Suspended => "suspended",
            SubscriptionStatus::Expired => "expired",
            SubscriptionStatus::Canceled => "canceled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SubscriptionStatus::Active),
            "suspended" => Some(SubscriptionStatus::Suspended),
            "expired" => Some(SubscriptionStatus::Expired),
            "canceled" => Some(SubscriptionStatus::Canceled),
            _ => None,
        }
    }

    /// Whether the state machine allows moving from `self` to `to`.
    ///
    /// `expired` and `canceled` are terminal; re-entry happens only by
    /// creating a brand-new active row, never by mutating a terminal one.
    pub fn can_transition(&self, to: SubscriptionStatus) -> bool {
        use SubscriptionStatus::*;
        match (self, to) {
            (Active, Suspended) | (Active, Expired) | (Active, Canceled) => true,
            (Suspended, Active) | (Suspended, Expired) => true,
            // Renewal resets an already-active row in place.
            (Active, Active) => true,
            _ => false,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SubscriptionStatus::Expired | SubscriptionStatus::Canceled
        )
    }
}

impl std::fmt::Display for SubscriptionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Recurring billing cycle. Monthly is the only cycle the engine
/// issues, but the wire format keeps it explicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BillingCycle {
    #[default]
    #[serde(rename = "MONTHLY")]
    Monthly,
}

impl BillingCycle {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingCycle::Monthly => "monthly",
        }
    }

    pub fn wire_name(&self) -> &'static str {
        match self {
            BillingCycle::Monthly => "MONTHLY",
        }
    }
}

impl std::fmt::Display for BillingCycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_reject_all_transitions() {
        use SubscriptionStatus::*;
        for from in [Expired, Canceled] {
            for to in [Active, Suspended, Expired, Canceled] {
                assert!(!from.can_transition(to), "{from} -> {to} must be rejected");
            }
        }
    }

    #[test]
    fn suspended_recovers_or_expires() {
        use SubscriptionStatus::*;
        assert!(Suspended.can_transition(Active));
        assert!(Suspended.can_transition(Expired));
        assert!(!Suspended.can_transition(Canceled));
        assert!(!Suspended.can_transition(Suspended));
    }

    #[test]
    fn active_reaches_every_state() {
        use SubscriptionStatus::*;
        assert!(Active.can_transition(Suspended));
        assert!(Active.can_transition(Expired));
        assert!(Active.can_transition(Canceled));
        assert!(Active.can_transition(Active));
    }

    #[test]
    fn payment_method_wire_names() {
        assert_eq!(PaymentMethod::Pix.wire_name(), "PIX");
        assert_eq!(PaymentMethod::CreditCard.wire_name(), "CREDIT_CARD");
        assert_eq!(PaymentMethod::parse("BOLETO"), Some(PaymentMethod::Boleto));
        assert_eq!(PaymentMethod::parse("cash"), None);
    }
}
