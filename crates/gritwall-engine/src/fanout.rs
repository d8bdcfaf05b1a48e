use gritwall_types::events::GatewayEvent;

/// The engine's one-way view of the real-time transport. Room scoping rides
/// on the event itself (`GatewayEvent::room_id`); connection membership is
/// entirely the transport's business.
pub trait Fanout: Send + Sync {
    fn broadcast(&self, event: GatewayEvent);
}

/// Drops every event. Used in tests and headless tools.
pub struct NullFanout;

impl Fanout for NullFanout {
    fn broadcast(&self, _event: GatewayEvent) {}
}
