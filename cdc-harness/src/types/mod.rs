mod event;

pub use event::*;

/// Identifier under which a connector, resource or callback factory is registered.
pub type Identifier = String;
