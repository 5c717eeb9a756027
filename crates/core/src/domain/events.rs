use serde::Serialize;

/// A platform event that workflows and agents may react to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub struct TriggerEvent {
    pub name: &'static str,
    pub category: &'static str,
    pub description: &'static str,
}

pub const MANUAL_EVENT: &str = "manual";

pub const TRIGGER_EVENTS: [TriggerEvent; 24] = [
    TriggerEvent { name: "vessel_status_changed", category: "vessel", description: "A tracked vessel changed navigational status" },
    TriggerEvent { name: "vessel_eta_updated", category: "vessel", description: "A vessel's estimated arrival changed" },
    TriggerEvent { name: "vessel_arrived", category: "vessel", description: "A vessel arrived in port" },
    TriggerEvent { name: "vessel_departed", category: "vessel", description: "A vessel left port" },
    TriggerEvent { name: "order_created", category: "order", description: "A new order was placed" },
    TriggerEvent { name: "order_updated", category: "order", description: "An order was modified" },
    TriggerEvent { name: "order_linked", category: "order", description: "An order was linked to a vessel or company" },
    TriggerEvent { name: "order_completed", category: "order", description: "An order was fulfilled" },
    TriggerEvent { name: "company_connection_created", category: "company", description: "Two companies were connected" },
    TriggerEvent { name: "company_updated", category: "company", description: "Company details changed" },
    TriggerEvent { name: "support_ticket_created", category: "support", description: "A support ticket was opened" },
    TriggerEvent { name: "support_ticket_updated", category: "support", description: "A support ticket changed" },
    TriggerEvent { name: "support_escalation", category: "support", description: "A support ticket was escalated" },
    TriggerEvent { name: "email_received", category: "support", description: "An inbound email arrived" },
    TriggerEvent { name: "subscription_started", category: "billing", description: "A subscription began" },
    TriggerEvent { name: "subscription_cancelled", category: "billing", description: "A subscription was cancelled" },
    TriggerEvent { name: "payment_successful", category: "billing", description: "A payment succeeded" },
    TriggerEvent { name: "payment_failed", category: "billing", description: "A payment failed" },
    TriggerEvent { name: "broker_approved", category: "broker", description: "A broker membership was approved" },
    TriggerEvent { name: "deal_created", category: "broker", description: "A broker deal was opened" },
    TriggerEvent { name: "deal_completed", category: "broker", description: "A broker deal closed" },
    TriggerEvent { name: "document_uploaded", category: "document", description: "A document was uploaded" },
    TriggerEvent { name: "document_processed", category: "document", description: "An uploaded document finished processing" },
    TriggerEvent { name: MANUAL_EVENT, category: "system", description: "Started by an operator" },
];

/// Events accepted by the webhook dispatcher. `manual` is reserved for direct triggers.
pub fn is_dispatchable(event: &str) -> bool {
    event != MANUAL_EVENT && TRIGGER_EVENTS.iter().any(|known| known.name == event)
}

/// Registry ordered by category, then name.
pub fn registry() -> Vec<TriggerEvent> {
    let mut events = TRIGGER_EVENTS.to_vec();
    events.sort_by(|left, right| left.category.cmp(right.category).then(left.name.cmp(right.name)));
    events
}

#[cfg(test)]
mod tests {
    use super::{is_dispatchable, registry, TRIGGER_EVENTS};

    #[test]
    fn webhook_rejects_unknown_and_manual_events() {
        assert!(is_dispatchable("order_created"));
        assert!(!is_dispatchable("manual"));
        assert!(!is_dispatchable("order_exploded"));
    }

    #[test]
    fn registry_is_sorted_and_complete() {
        let events = registry();
        assert_eq!(events.len(), TRIGGER_EVENTS.len());
        assert!(events.windows(2).all(|pair| pair[0].category <= pair[1].category));
    }
}
